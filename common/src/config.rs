use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by configuration validation. Every variant is fatal at load
/// time; the regulator refuses to run with a malformed schedule window or
/// hysteresis band.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("schedule hour {0} is outside 0..24")]
    HourOutOfRange(u32),

    #[error("hour_off ({hour_off}) must be after hour_on ({hour_on})")]
    EmptyDaytimeWindow { hour_on: u32, hour_off: u32 },

    #[error("temperature target {what} must be finite, got {value}")]
    InvalidTarget { what: &'static str, value: f64 },

    #[error("pid gain {what} must be finite, got {value}")]
    InvalidGain { what: &'static str, value: f64 },

    #[error("pid time_step_ms must be positive")]
    ZeroTimeStep,

    #[error("hysteresis threshold {what} must be finite and positive, got {value}")]
    InvalidThreshold { what: &'static str, value: f64 },

    #[error("hysteresis off_threshold ({off_threshold}) must be below on_threshold ({on_threshold})")]
    ReversedHysteresisBand {
        on_threshold: f64,
        off_threshold: f64,
    },
}

/// Which control law drives the relay. Chosen at configuration load, never
/// switched per tick; switching strategies means rebuilding the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlStrategy {
    #[default]
    Pid,
    BangBang,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidSettings {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Minimum interval between effective PID updates. Calls arriving earlier
    /// reissue the previous relay command without touching the state.
    pub time_step_ms: u64,
}

impl Default for PidSettings {
    fn default() -> Self {
        Self {
            kp: 70.0,
            ki: 0.05,
            kd: 0.0005,
            time_step_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HysteresisSettings {
    pub on_threshold: f64,
    pub off_threshold: f64,
}

impl Default for HysteresisSettings {
    fn default() -> Self {
        Self {
            on_threshold: 6.0,
            off_threshold: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulationConfig {
    pub day_temp: f64,
    pub night_temp: f64,
    pub hour_on: u32,
    pub hour_off: u32,
    pub strategy: ControlStrategy,
    pub pid: PidSettings,
    pub hysteresis: HysteresisSettings,
}

impl Default for RegulationConfig {
    fn default() -> Self {
        Self {
            day_temp: 28.0,
            night_temp: 16.0,
            hour_on: 9,
            hour_off: 17,
            strategy: ControlStrategy::default(),
            pid: PidSettings::default(),
            hysteresis: HysteresisSettings::default(),
        }
    }
}

impl RegulationConfig {
    /// Reports the first violation found. The daytime window is half-open
    /// `[hour_on, hour_off)` and must be non-empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for hour in [self.hour_on, self.hour_off] {
            if hour >= 24 {
                return Err(ConfigError::HourOutOfRange(hour));
            }
        }
        if self.hour_off <= self.hour_on {
            return Err(ConfigError::EmptyDaytimeWindow {
                hour_on: self.hour_on,
                hour_off: self.hour_off,
            });
        }

        for (what, value) in [("day_temp", self.day_temp), ("night_temp", self.night_temp)] {
            if !value.is_finite() {
                return Err(ConfigError::InvalidTarget { what, value });
            }
        }

        for (what, value) in [
            ("kp", self.pid.kp),
            ("ki", self.pid.ki),
            ("kd", self.pid.kd),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::InvalidGain { what, value });
            }
        }
        if self.pid.time_step_ms == 0 {
            return Err(ConfigError::ZeroTimeStep);
        }

        for (what, value) in [
            ("on_threshold", self.hysteresis.on_threshold),
            ("off_threshold", self.hysteresis.off_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidThreshold { what, value });
            }
        }
        if self.hysteresis.off_threshold >= self.hysteresis.on_threshold {
            return Err(ConfigError::ReversedHysteresisBand {
                on_threshold: self.hysteresis.on_threshold,
                off_threshold: self.hysteresis.off_threshold,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            http_port: 8080,
        }
    }
}

/// On-disk configuration shape consumed by the controller binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub regulation: RegulationConfig,
    pub timezone: String,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            regulation: RegulationConfig::default(),
            timezone: "Europe/Berlin".to_string(),
            network: NetworkConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(RegulationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_inverted_schedule_window() {
        let mut config = RegulationConfig::default();
        config.hour_on = 17;
        config.hour_off = 9;

        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyDaytimeWindow {
                hour_on: 17,
                hour_off: 9,
            })
        );
    }

    #[test]
    fn rejects_empty_schedule_window() {
        let mut config = RegulationConfig::default();
        config.hour_on = 9;
        config.hour_off = 9;

        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_hours() {
        let mut config = RegulationConfig::default();
        config.hour_off = 24;

        assert_eq!(config.validate(), Err(ConfigError::HourOutOfRange(24)));
    }

    #[test]
    fn rejects_reversed_hysteresis_band() {
        let mut config = RegulationConfig::default();
        config.hysteresis.on_threshold = 2.0;
        config.hysteresis.off_threshold = 4.0;

        assert_eq!(
            config.validate(),
            Err(ConfigError::ReversedHysteresisBand {
                on_threshold: 2.0,
                off_threshold: 4.0,
            })
        );
    }

    #[test]
    fn rejects_zero_pid_time_step() {
        let mut config = RegulationConfig::default();
        config.pid.time_step_ms = 0;

        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeStep));
    }

    #[test]
    fn rejects_non_finite_gains() {
        let mut config = RegulationConfig::default();
        config.pid.ki = f64::NAN;

        assert!(config.validate().is_err());
    }

    #[test]
    fn runtime_config_round_trips_from_json() {
        let raw = r#"{
            "regulation": {
                "day_temp": 26.0,
                "night_temp": 18.0,
                "hour_on": 7,
                "hour_off": 16,
                "strategy": "bangbang",
                "pid": { "kp": 30.0, "ki": 0.0, "kd": 0.0, "time_step_ms": 1000 },
                "hysteresis": { "on_threshold": 6.0, "off_threshold": 3.0 }
            },
            "timezone": "Europe/Berlin",
            "network": {
                "mqtt_host": "127.0.0.1",
                "mqtt_port": 1883,
                "mqtt_user": "",
                "mqtt_pass": "",
                "http_port": 8080
            }
        }"#;

        let parsed: RuntimeConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.regulation.strategy, ControlStrategy::BangBang);
        assert_eq!(parsed.regulation.hour_on, 7);
        assert_eq!(parsed.regulation.validate(), Ok(()));
    }
}
