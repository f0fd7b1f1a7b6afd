use crate::config::RegulationConfig;
use crate::law::{build_law, ControlLaw, ControlState};
use crate::schedule::SetpointScheduler;
use crate::types::{EngineStatus, OperatingMode, RelayCommand, StatePayload, SETPOINT_OFF};

/// The regulation loop state: operating mode, last known reading, current
/// setpoint and the active control law. One instance per heating channel,
/// owned by a single execution context; commands mutate it between ticks.
pub struct RegulationEngine {
    law: Box<dyn ControlLaw>,
    scheduler: SetpointScheduler,
    mode: OperatingMode,
    reading: Option<f64>,
    setpoint: f64,
    state: ControlState,
    last_command: RelayCommand,
}

impl RegulationEngine {
    pub fn new(config: &RegulationConfig) -> Self {
        Self {
            law: build_law(config),
            scheduler: SetpointScheduler::new(config),
            mode: OperatingMode::default(),
            reading: None,
            setpoint: SETPOINT_OFF,
            state: ControlState::default(),
            last_command: RelayCommand::DeEnergized,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn reading(&self) -> Option<f64> {
        self.reading
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn last_command(&self) -> RelayCommand {
        self.last_command
    }

    pub fn control_law_name(&self) -> &'static str {
        self.law.name()
    }

    /// One regulation tick. `sample` carries a fresh sensor reading when the
    /// provider produced one this tick; `None` means the read failed and the
    /// previous reading is held unchanged. Never errors, never panics: every
    /// tick yields a relay command.
    pub fn tick(&mut self, hour: u32, sample: Option<f64>, now_ms: u64) -> RelayCommand {
        if let Some(value) = sample {
            self.reading = Some(value);
        }

        // The setpoint is recomputed from scratch every tick so no stale
        // target survives a mode change or a day/night boundary.
        self.setpoint = self.scheduler.target(hour, self.mode);

        let command = match (self.mode, self.reading) {
            (OperatingMode::Automatic, Some(reading)) => {
                self.law.step(reading, self.setpoint, now_ms, &mut self.state)
            }
            // No reading has ever arrived: keep the heater cold rather than
            // regulate on an invented value.
            (OperatingMode::Automatic, None) => RelayCommand::DeEnergized,
            _ => RelayCommand::DeEnergized,
        };

        self.last_command = command;
        command
    }

    /// The external "heating off now" trigger. Forces Manual mode, the
    /// disabled setpoint and a cold relay, and invalidates the controller
    /// state so the next automatic run starts fresh. Idempotent.
    pub fn disable(&mut self) {
        self.mode = OperatingMode::Manual;
        self.setpoint = SETPOINT_OFF;
        self.state = ControlState::default();
        self.last_command = RelayCommand::DeEnergized;
    }

    /// Administrative mode change (configuration reload path). Any actual
    /// transition drops the relay and resets the controller state; the next
    /// tick decides the new drive from scratch.
    pub fn set_mode(&mut self, mode: OperatingMode) -> bool {
        if self.mode == mode {
            return false;
        }

        self.mode = mode;
        self.setpoint = SETPOINT_OFF;
        self.state = ControlState::default();
        self.last_command = RelayCommand::DeEnergized;
        true
    }

    pub fn status(&self, hour: u32, minute: u32) -> EngineStatus {
        EngineStatus {
            time: format!("{hour:02}:{minute:02}"),
            mode: self.mode.as_str(),
            current_temperature: self.reading,
            current_setpoint: self.setpoint,
            relay_on: self.last_command.energized(),
            control_law: self.law.name(),
            daytime: self.scheduler.is_daytime(hour),
        }
    }

    pub fn state_payload(&self) -> StatePayload {
        StatePayload {
            temperature: self.reading,
            setpoint: self.setpoint,
            mode: self.mode.as_str(),
            relay: self.last_command.as_str(),
        }
    }

    #[cfg(test)]
    pub(crate) fn control_state(&self) -> ControlState {
        self.state
    }
}
