use serde::{Deserialize, Serialize};

/// Setpoint value reserved to mean "heating forcibly disabled". Distinct from
/// a legitimate low target, which is always a finite Celsius figure above zero.
pub const SETPOINT_OFF: f64 = 0.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    #[default]
    Automatic,
    Manual,
    Off,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
            Self::Off => "off",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "automatic" => Some(Self::Automatic),
            "manual" => Some(Self::Manual),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Drive command for the heating relay, the sole output of a regulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    Energized,
    DeEnergized,
}

impl RelayCommand {
    pub fn energized(self) -> bool {
        matches!(self, Self::Energized)
    }

    pub fn from_energized(energized: bool) -> Self {
        if energized {
            Self::Energized
        } else {
            Self::DeEnergized
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Energized => "on",
            Self::DeEnergized => "off",
        }
    }
}

/// Read-only snapshot served to the status page.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub time: String,
    pub mode: &'static str,
    #[serde(rename = "currentTemperature")]
    pub current_temperature: Option<f64>,
    #[serde(rename = "currentSetpoint")]
    pub current_setpoint: f64,
    #[serde(rename = "relayOn")]
    pub relay_on: bool,
    #[serde(rename = "controlLaw")]
    pub control_law: &'static str,
    pub daytime: bool,
}

/// Compact snapshot published as retained telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct StatePayload {
    pub temperature: Option<f64>,
    pub setpoint: f64,
    pub mode: &'static str,
    pub relay: &'static str,
}
