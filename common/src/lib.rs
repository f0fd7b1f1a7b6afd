pub mod config;
pub mod engine;
pub mod law;
pub mod schedule;
pub mod topics;
pub mod types;

pub use config::{
    ConfigError, ControlStrategy, HysteresisSettings, NetworkConfig, PidSettings,
    RegulationConfig, RuntimeConfig,
};
pub use engine::RegulationEngine;
pub use law::{build_law, BangBangLaw, ControlLaw, ControlState, PidLaw};
pub use schedule::SetpointScheduler;
pub use topics::*;
pub use types::{EngineStatus, OperatingMode, RelayCommand, StatePayload, SETPOINT_OFF};
