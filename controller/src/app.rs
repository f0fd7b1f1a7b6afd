use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use terrarium_common::{
    OperatingMode, RegulationEngine, RelayCommand, RuntimeConfig, StatePayload,
    TOPIC_CMD_DISABLE, TOPIC_CMD_MODE, TOPIC_CONTROLLER_STATE, TOPIC_SENSOR_TEMP,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<RegulationEngine>>,
    /// Freshest sensor sample since the last tick; the regulation loop takes
    /// it each tick, an empty slot degrades to hold-previous.
    sample: Arc<Mutex<Option<f64>>>,
    timezone: Arc<Mutex<Tz>>,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct TimezoneUpdate {
    timezone: String,
}

#[derive(Debug, Serialize)]
struct TimeStatus {
    timezone: String,
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

/// Celsius range the sensor transport accepts. Anything outside is a wiring
/// or decode fault and is dropped before it reaches the regulation core.
const PLAUSIBLE_CELSIUS: std::ops::RangeInclusive<f64> = -30.0..=70.0;

const TICK_PERIOD: Duration = Duration::from_secs(1);
const STATE_PUBLISH_PERIOD: Duration = Duration::from_secs(10);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let runtime = store
        .load_runtime_config()
        .await
        .context("failed to load runtime config")?;

    // Malformed regulation settings are fatal at startup, never discovered
    // mid-run.
    runtime
        .regulation
        .validate()
        .context("invalid regulation config")?;
    let timezone: Tz = runtime
        .timezone
        .parse()
        .ok()
        .with_context(|| format!("invalid timezone {:?}", runtime.timezone))?;

    let engine = RegulationEngine::new(&runtime.regulation);

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("terrarium-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        sample: Arc::new(Mutex::new(None)),
        timezone: Arc::new(Mutex::new(timezone)),
        mqtt,
        store,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_regulation_loop(app_state.clone());
    spawn_state_publish_loop(app_state.clone());

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/disable", post(handle_disable))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/time", get(handle_get_time))
        .route("/api/timezone", put(handle_put_timezone))
        .fallback_service(ServeDir::new(web_root))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.http_port);
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().unwrap();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [TOPIC_SENSOR_TEMP, TOPIC_CMD_DISABLE, TOPIC_CMD_MODE];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    handle_mqtt_message(&app_state, message.topic, message.payload.to_vec()).await;
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_regulation_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        let mut driven: Option<RelayCommand> = None;

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();

            let local = {
                let timezone = app_state.timezone.lock().await;
                now_in_timezone(*timezone)
            };
            let sample = { app_state.sample.lock().await.take() };

            let command = {
                let mut engine = app_state.engine.lock().await;
                engine.tick(local.hour(), sample, now_ms)
            };

            drive_relay(command, &mut driven);
        }
    });
}

/// The relay sink: a fire-and-forget digital write, no acknowledgement.
/// The GPIO transport for the target board hooks in here; the host build
/// only records the drive level.
fn drive_relay(command: RelayCommand, driven: &mut Option<RelayCommand>) {
    if *driven != Some(command) {
        info!("relay {}", command.as_str());
        *driven = Some(command);
    } else {
        debug!("relay held {}", command.as_str());
    }
}

fn spawn_state_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATE_PUBLISH_PERIOD);
        loop {
            interval.tick().await;

            let snapshot = { app_state.engine.lock().await.state_payload() };
            if let Err(err) = publish_state(&app_state.mqtt, &snapshot).await {
                warn!("state telemetry dropped: {err:#}");
            }
        }
    });
}

/// Retained so late subscribers see the last regulator state immediately.
async fn publish_state(mqtt: &AsyncClient, snapshot: &StatePayload) -> anyhow::Result<()> {
    let body = serde_json::to_vec(snapshot).context("state snapshot serialization")?;
    mqtt.publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
        .await
        .context("state publish")?;
    Ok(())
}

async fn handle_mqtt_message(app_state: &AppState, topic: String, payload: Vec<u8>) {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return;
    }

    let Ok(message) = String::from_utf8(payload) else {
        warn!("non utf8 mqtt payload on topic {topic}");
        return;
    };

    match topic.as_str() {
        TOPIC_SENSOR_TEMP => {
            if let Ok(celsius) = message.trim().parse::<f64>() {
                if celsius.is_finite() && PLAUSIBLE_CELSIUS.contains(&celsius) {
                    *app_state.sample.lock().await = Some(celsius);
                } else {
                    warn!("dropping implausible sensor reading {celsius}");
                }
            }
        }
        TOPIC_CMD_DISABLE => {
            let mut engine = app_state.engine.lock().await;
            engine.disable();
            info!("heating disabled via mqtt command");
        }
        TOPIC_CMD_MODE => {
            if let Some(mode) = OperatingMode::parse(message.trim()) {
                let mut engine = app_state.engine.lock().await;
                if engine.set_mode(mode) {
                    info!("operating mode set to {} via mqtt", mode.as_str());
                }
            }
        }
        _ => {}
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let local = {
        let timezone = state.timezone.lock().await;
        now_in_timezone(*timezone)
    };

    let status = {
        let engine = state.engine.lock().await;
        engine.status(local.hour(), local.minute())
    };

    Json(status)
}

async fn handle_disable(State(state): State<AppState>) -> impl IntoResponse {
    {
        let mut engine = state.engine.lock().await;
        engine.disable();
    }
    info!("heating disabled via http");

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    let Some(mode) = OperatingMode::parse(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid mode. Use 'automatic', 'manual' or 'off'",
        );
    };

    {
        let mut engine = state.engine.lock().await;
        engine.set_mode(mode);
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_get_time(State(state): State<AppState>) -> impl IntoResponse {
    let timezone = state.timezone.lock().await;
    Json(TimeStatus {
        timezone: timezone.to_string(),
        now_epoch: Utc::now().timestamp(),
    })
}

async fn handle_put_timezone(
    State(state): State<AppState>,
    Json(update): Json<TimezoneUpdate>,
) -> impl IntoResponse {
    let Ok(timezone) = update.timezone.parse::<Tz>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid timezone value");
    };

    {
        let mut active = state.timezone.lock().await;
        *active = timezone;
    }

    if let Err(err) = persist_timezone(&state, &update.timezone).await {
        warn!("failed to persist timezone update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }

    handle_get_time(State(state)).await.into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("TERRARIUM_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.terrarium"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// A missing file falls back to defaults; a present but unreadable or
    /// malformed file is an error the startup path treats as fatal.
    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

async fn persist_timezone(state: &AppState, timezone: &str) -> anyhow::Result<()> {
    let mut runtime = state.store.load_runtime_config().await?;
    runtime.timezone = timezone.to_string();
    state.store.save_runtime_config(&runtime).await
}

fn now_in_timezone(timezone: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&timezone)
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
