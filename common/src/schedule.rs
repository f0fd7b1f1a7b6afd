use crate::config::RegulationConfig;
use crate::types::{OperatingMode, SETPOINT_OFF};

/// Maps the wall-clock hour and the operating mode to a temperature target.
///
/// The daytime window is half-open: `hour_on` is inside it, `hour_off` is the
/// first night hour. The window test is recomputed on every call since the
/// hour changes underneath the regulator between ticks.
#[derive(Debug, Clone, Copy)]
pub struct SetpointScheduler {
    day_temp: f64,
    night_temp: f64,
    hour_on: u32,
    hour_off: u32,
}

impl SetpointScheduler {
    pub fn new(config: &RegulationConfig) -> Self {
        Self {
            day_temp: config.day_temp,
            night_temp: config.night_temp,
            hour_on: config.hour_on,
            hour_off: config.hour_off,
        }
    }

    pub fn is_daytime(&self, hour: u32) -> bool {
        hour >= self.hour_on && hour < self.hour_off
    }

    /// Automatic mode follows the day/night program; Manual and Off have no
    /// automatic target and yield the reserved disabled setpoint.
    pub fn target(&self, hour: u32, mode: OperatingMode) -> f64 {
        if mode != OperatingMode::Automatic {
            return SETPOINT_OFF;
        }

        if self.is_daytime(hour) {
            self.day_temp
        } else {
            self.night_temp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(hour_on: u32, hour_off: u32) -> SetpointScheduler {
        let mut config = RegulationConfig::default();
        config.day_temp = 28.0;
        config.night_temp = 16.0;
        config.hour_on = hour_on;
        config.hour_off = hour_off;
        SetpointScheduler::new(&config)
    }

    #[test]
    fn daytime_window_is_half_open() {
        let scheduler = scheduler(7, 16);

        assert!(scheduler.is_daytime(7));
        assert!(scheduler.is_daytime(15));
        assert!(!scheduler.is_daytime(16));
        assert!(!scheduler.is_daytime(6));
        assert!(!scheduler.is_daytime(23));
        assert!(!scheduler.is_daytime(0));
    }

    #[test]
    fn window_holds_for_every_hour() {
        let scheduler = scheduler(9, 17);

        for hour in 0..24 {
            assert_eq!(scheduler.is_daytime(hour), (9..17).contains(&hour));
        }
    }

    #[test]
    fn automatic_target_switches_exactly_at_boundaries() {
        let scheduler = scheduler(9, 17);

        assert_eq!(scheduler.target(9, OperatingMode::Automatic), 28.0);
        assert_eq!(scheduler.target(16, OperatingMode::Automatic), 28.0);
        assert_eq!(scheduler.target(17, OperatingMode::Automatic), 16.0);
        assert_eq!(scheduler.target(8, OperatingMode::Automatic), 16.0);
    }

    #[test]
    fn manual_and_off_have_no_automatic_target() {
        let scheduler = scheduler(9, 17);

        assert_eq!(scheduler.target(12, OperatingMode::Manual), SETPOINT_OFF);
        assert_eq!(scheduler.target(12, OperatingMode::Off), SETPOINT_OFF);
    }
}
