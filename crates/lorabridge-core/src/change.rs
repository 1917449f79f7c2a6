//! Change detection and merge of partial updates into the current reading

use crate::reading::{CurrentReading, SensorUpdate, UptimeMs};

/// Decides whether a partial update is a real change worth recording
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeDetector {
    epsilon: f32,
}

impl ChangeDetector {
    /// `epsilon` of `0.0` compares floats with exact inequality
    pub fn new(epsilon: f32) -> Self {
        Self {
            epsilon: epsilon.max(0.0),
        }
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Whether `update` differs from `current` in any present field.
    ///
    /// The first update to an invalid reading is always significant.
    pub fn is_significant(&self, current: &CurrentReading, update: &SensorUpdate) -> bool {
        if !current.valid {
            return true;
        }

        self.float_changed(current.temperature, update.temperature)
            || self.float_changed(current.humidity, update.humidity)
            || self.float_changed(current.lux, update.lux)
            || update
                .soil_moisture
                .is_some_and(|soil| soil != current.soil_moisture)
    }

    /// Merge `update` into `current` if it is significant.
    ///
    /// Present fields overwrite, absent fields are kept, `last_update` moves to
    /// `now` and the reading becomes valid. Returns false without touching
    /// `current` when nothing changed.
    pub fn apply(
        &self,
        current: &mut CurrentReading,
        update: &SensorUpdate,
        now: UptimeMs,
    ) -> bool {
        if !self.is_significant(current, update) {
            return false;
        }

        if let Some(temperature) = update.temperature {
            current.temperature = temperature;
        }
        if let Some(humidity) = update.humidity {
            current.humidity = humidity;
        }
        if let Some(lux) = update.lux {
            current.lux = lux;
        }
        if let Some(soil) = update.soil_moisture {
            current.soil_moisture = soil;
        }
        current.last_update = now;
        current.valid = true;

        true
    }

    fn float_changed(&self, old: f32, new: Option<f32>) -> bool {
        match new {
            None => false,
            Some(new) if new.is_nan() || old.is_nan() => true,
            Some(new) => (new - old).abs() > self.epsilon,
        }
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_reading() -> CurrentReading {
        CurrentReading {
            temperature: 20.0,
            humidity: 50.0,
            lux: 100.0,
            soil_moisture: 30,
            last_update: 1_000,
            valid: true,
        }
    }

    #[test]
    fn test_first_update_always_changes() {
        let detector = ChangeDetector::default();
        let mut reading = CurrentReading::new();
        // All-zero update matches the zeroed reading but must still be accepted
        let update = SensorUpdate {
            temperature: Some(0.0),
            ..Default::default()
        };

        assert!(detector.apply(&mut reading, &update, 42));
        assert!(reading.valid);
        assert_eq!(reading.last_update, 42);
    }

    #[test]
    fn test_identical_update_is_not_a_change() {
        let detector = ChangeDetector::default();
        let mut reading = valid_reading();
        let update = SensorUpdate {
            temperature: Some(20.0),
            soil_moisture: Some(30),
            ..Default::default()
        };

        assert!(!detector.apply(&mut reading, &update, 5_000));
        assert_eq!(reading, valid_reading(), "unchanged update must not mutate state");
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let detector = ChangeDetector::default();
        let mut reading = valid_reading();
        let update = SensorUpdate {
            temperature: Some(23.5),
            humidity: Some(60.0),
            soil_moisture: Some(40),
            lux: None,
        };

        assert!(detector.apply(&mut reading, &update, 2_000));
        assert_eq!(reading.temperature, 23.5);
        assert_eq!(reading.humidity, 60.0);
        assert_eq!(reading.soil_moisture, 40);
        assert_eq!(reading.lux, 100.0, "absent field should keep its value");
        assert_eq!(reading.last_update, 2_000);
    }

    #[test]
    fn test_exact_comparison_by_default() {
        let detector = ChangeDetector::default();
        let update = SensorUpdate {
            temperature: Some(20.01),
            ..Default::default()
        };
        assert!(detector.is_significant(&valid_reading(), &update));
    }

    #[test]
    fn test_epsilon_suppresses_jitter() {
        let detector = ChangeDetector::new(0.1);
        let reading = valid_reading();

        let jitter = SensorUpdate {
            temperature: Some(20.05),
            lux: Some(99.95),
            ..Default::default()
        };
        assert!(!detector.is_significant(&reading, &jitter));

        let step = SensorUpdate {
            temperature: Some(20.5),
            ..Default::default()
        };
        assert!(detector.is_significant(&reading, &step));
    }

    #[test]
    fn test_soil_ignores_epsilon() {
        let detector = ChangeDetector::new(5.0);
        let update = SensorUpdate {
            soil_moisture: Some(31),
            ..Default::default()
        };
        assert!(detector.is_significant(&valid_reading(), &update));
    }

    #[test]
    fn test_empty_update_on_valid_reading() {
        let detector = ChangeDetector::default();
        assert!(!detector.is_significant(&valid_reading(), &SensorUpdate::default()));
    }
}
