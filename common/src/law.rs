use crate::config::{ControlStrategy, HysteresisSettings, PidSettings, RegulationConfig};
use crate::types::RelayCommand;

/// Accumulated controller state. Owned by the engine, persists across ticks
/// within one continuous run of a strategy, and is reset to neutral whenever
/// the relay is forced off by a mode command.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlState {
    pub integral: f64,
    pub previous_error: f64,
    pub last_update_ms: Option<u64>,
    pub energized: bool,
}

/// A control law turns (reading, setpoint, now) into a relay command.
///
/// Laws never fail and never filter their input: a stale or implausible
/// reading is the sensor provider's problem, not the control law's.
pub trait ControlLaw: Send {
    fn name(&self) -> &'static str;

    fn step(
        &self,
        reading: f64,
        setpoint: f64,
        now_ms: u64,
        state: &mut ControlState,
    ) -> RelayCommand;
}

/// Builds the law selected in the configuration. Called once at engine
/// construction; the choice is fixed for the lifetime of the run.
pub fn build_law(config: &RegulationConfig) -> Box<dyn ControlLaw> {
    match config.strategy {
        ControlStrategy::Pid => Box::new(PidLaw::new(config.pid)),
        ControlStrategy::BangBang => Box::new(BangBangLaw::new(config.hysteresis)),
    }
}

/// Continuous PID law driving a binary relay through the sign of its output.
///
/// The relay cannot modulate, so the PID output is consumed through its sign
/// only: `u > 0` energizes, `u <= 0` de-energizes. The integrator is
/// deliberately unclamped; there is no anti-windup in this tuning.
#[derive(Debug, Clone, Copy)]
pub struct PidLaw {
    kp: f64,
    ki: f64,
    kd: f64,
    time_step_ms: u64,
}

impl PidLaw {
    pub fn new(settings: PidSettings) -> Self {
        Self {
            kp: settings.kp,
            ki: settings.ki,
            kd: settings.kd,
            time_step_ms: settings.time_step_ms,
        }
    }
}

impl ControlLaw for PidLaw {
    fn name(&self) -> &'static str {
        "pid"
    }

    fn step(
        &self,
        reading: f64,
        setpoint: f64,
        now_ms: u64,
        state: &mut ControlState,
    ) -> RelayCommand {
        let error = setpoint - reading;

        let (dt_ms, first) = match state.last_update_ms {
            Some(last) => (now_ms.saturating_sub(last), false),
            // The very first update has no reference timestamp and runs at
            // the configured step with a zero derivative.
            None => (self.time_step_ms, true),
        };

        // Rate limiting: the law only updates once per configured interval.
        // An early call is a no-op that reissues the previous command.
        if !first && dt_ms < self.time_step_ms {
            return RelayCommand::from_energized(state.energized);
        }

        let dt = dt_ms as f64 / 1_000.0;
        state.integral += error * dt;
        let derivative = if first {
            0.0
        } else {
            (error - state.previous_error) / dt
        };

        let output = self.kp * error + self.ki * state.integral + self.kd * derivative;

        state.previous_error = error;
        state.last_update_ms = Some(now_ms);

        let command = RelayCommand::from_energized(output > 0.0);
        state.energized = command.energized();
        command
    }
}

/// Discrete hysteresis law: a 2-state machine keyed by the relay state, with
/// an asymmetric deadband around the setpoint.
///
/// From de-energized, the relay turns on once the reading sits at least half
/// the on-band below the setpoint; from energized, it turns off once the
/// reading climbs back into the half off-band under the setpoint. With
/// `off_threshold < on_threshold` the two triggers never meet, so a single
/// monotonic excursion toggles the relay at most once.
#[derive(Debug, Clone, Copy)]
pub struct BangBangLaw {
    on_threshold: f64,
    off_threshold: f64,
}

impl BangBangLaw {
    pub fn new(settings: HysteresisSettings) -> Self {
        Self {
            on_threshold: settings.on_threshold,
            off_threshold: settings.off_threshold,
        }
    }
}

impl ControlLaw for BangBangLaw {
    fn name(&self) -> &'static str {
        "bangbang"
    }

    fn step(
        &self,
        reading: f64,
        setpoint: f64,
        now_ms: u64,
        state: &mut ControlState,
    ) -> RelayCommand {
        let command = if state.energized {
            if reading >= setpoint - self.off_threshold / 2.0 {
                RelayCommand::DeEnergized
            } else {
                RelayCommand::Energized
            }
        } else if setpoint - reading >= self.on_threshold / 2.0 {
            RelayCommand::Energized
        } else {
            RelayCommand::DeEnergized
        };

        state.last_update_ms = Some(now_ms);
        state.energized = command.energized();
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(kp: f64, ki: f64, kd: f64) -> PidLaw {
        PidLaw::new(PidSettings {
            kp,
            ki,
            kd,
            time_step_ms: 1_000,
        })
    }

    fn bang_bang(on_threshold: f64, off_threshold: f64) -> BangBangLaw {
        BangBangLaw::new(HysteresisSettings {
            on_threshold,
            off_threshold,
        })
    }

    #[test]
    fn proportional_only_output_matches_error_sign() {
        let law = pid(30.0, 0.0, 0.0);
        let mut state = ControlState::default();

        assert_eq!(
            law.step(20.0, 26.0, 1_000, &mut state),
            RelayCommand::Energized
        );
        assert_eq!(
            law.step(27.0, 26.0, 2_000, &mut state),
            RelayCommand::DeEnergized
        );
        // Zero error sits on the de-energized side of the decision.
        assert_eq!(
            law.step(26.0, 26.0, 3_000, &mut state),
            RelayCommand::DeEnergized
        );
    }

    #[test]
    fn early_calls_are_no_ops() {
        let law = pid(30.0, 0.5, 0.0);
        let mut state = ControlState::default();

        let first = law.step(20.0, 26.0, 10_000, &mut state);
        let integral = state.integral;

        let second = law.step(25.9, 26.0, 10_400, &mut state);
        let third = law.step(25.9, 26.0, 10_900, &mut state);

        assert_eq!(second, first);
        assert_eq!(third, first);
        assert_eq!(state.integral, integral);
        assert_eq!(state.last_update_ms, Some(10_000));
    }

    #[test]
    fn integral_accumulates_error_over_effective_steps() {
        let law = pid(0.0, 1.0, 0.0);
        let mut state = ControlState::default();

        law.step(24.0, 26.0, 1_000, &mut state);
        assert_eq!(state.integral, 2.0);

        law.step(24.0, 26.0, 3_000, &mut state);
        assert_eq!(state.integral, 6.0);
    }

    #[test]
    fn integral_is_unclamped() {
        let law = pid(0.0, 1.0, 0.0);
        let mut state = ControlState::default();

        let mut now = 1_000;
        for _ in 0..1_000 {
            law.step(16.0, 26.0, now, &mut state);
            now += 1_000;
        }

        assert!(state.integral > 9_000.0);
    }

    #[test]
    fn first_step_has_no_derivative_kick() {
        let law = pid(0.0, 0.0, 100.0);
        let mut state = ControlState::default();

        // With only Kd active, a first call must not see a jump from the
        // zero-initialized previous error.
        assert_eq!(
            law.step(20.0, 26.0, 5_000, &mut state),
            RelayCommand::DeEnergized
        );
        assert_eq!(state.previous_error, 6.0);
    }

    #[test]
    fn derivative_reacts_to_error_change() {
        let law = pid(0.0, 0.0, 100.0);
        let mut state = ControlState::default();

        law.step(20.0, 26.0, 1_000, &mut state);
        // Error grows from 6.0 to 8.0: positive derivative, relay on.
        assert_eq!(
            law.step(18.0, 26.0, 2_000, &mut state),
            RelayCommand::Energized
        );
    }

    #[test]
    fn bang_bang_energizes_below_half_on_band() {
        let law = bang_bang(20.0, 10.0);
        let mut state = ControlState::default();

        // Gap of 9 is inside the deadband, relay stays off.
        assert_eq!(
            law.step(17.0, 26.0, 1_000, &mut state),
            RelayCommand::DeEnergized
        );
        // Gap of 10 reaches half the on-band.
        assert_eq!(
            law.step(16.0, 26.0, 2_000, &mut state),
            RelayCommand::Energized
        );
    }

    #[test]
    fn bang_bang_holds_until_reading_recovers() {
        let law = bang_bang(20.0, 10.0);
        let mut state = ControlState::default();

        law.step(16.0, 26.0, 1_000, &mut state);
        assert!(state.energized);

        // Recovering but still below the off trigger at 21.0.
        assert_eq!(
            law.step(19.0, 26.0, 2_000, &mut state),
            RelayCommand::Energized
        );
        assert_eq!(
            law.step(20.9, 26.0, 3_000, &mut state),
            RelayCommand::Energized
        );
        assert_eq!(
            law.step(21.0, 26.0, 4_000, &mut state),
            RelayCommand::DeEnergized
        );
    }

    #[test]
    fn bang_bang_toggles_once_per_excursion() {
        let law = bang_bang(20.0, 10.0);
        let mut state = ControlState::default();
        let mut toggles = 0;
        let mut last = RelayCommand::DeEnergized;

        // One monotonic fall from the setpoint and one monotonic recovery.
        let readings = [25.0, 23.0, 21.0, 19.0, 17.0, 15.0, 17.0, 19.0, 21.0, 23.0, 25.0];
        for (index, reading) in readings.into_iter().enumerate() {
            let command = law.step(reading, 26.0, (index as u64 + 1) * 1_000, &mut state);
            if command != last {
                toggles += 1;
                last = command;
            }
        }

        assert_eq!(toggles, 2);
        assert_eq!(last, RelayCommand::DeEnergized);
    }

    #[test]
    fn build_law_honors_strategy_choice() {
        let mut config = RegulationConfig::default();
        config.strategy = ControlStrategy::BangBang;
        assert_eq!(build_law(&config).name(), "bangbang");

        config.strategy = ControlStrategy::Pid;
        assert_eq!(build_law(&config).name(), "pid");
    }
}
