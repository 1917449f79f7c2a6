//! Acceptable bounds for each sensor field

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::reading::{CurrentReading, SensorField};
use crate::settings::{SettingValue, SettingsStore, keys};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    #[error("{field} bounds must be finite numbers")]
    NotFinite { field: SensorField },
    #[error("{field} minimum must be below its maximum")]
    MinNotBelowMax { field: SensorField },
    #[error("{field} minimum cannot be negative")]
    NegativeMinimum { field: SensorField },
}

/// Inclusive `[min, max]` bounds. Field names match the dashboard JSON and the settings keys.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RangeConfig {
    pub temp_min: f32,
    pub temp_max: f32,
    pub hum_min: f32,
    pub hum_max: f32,
    pub lux_min: f32,
    pub lux_max: f32,
    pub soil_min: i32,
    pub soil_max: i32,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            temp_min: -40.0,
            temp_max: 80.0,
            hum_min: 0.0,
            hum_max: 100.0,
            lux_min: 0.0,
            lux_max: 100_000.0,
            soil_min: 0,
            soil_max: 100,
        }
    }
}

impl RangeConfig {
    /// Check that every min is below its max and that humidity, light and
    /// soil do not have negative minimums. Temperature may go below zero.
    pub fn validate(&self) -> Result<(), RangeError> {
        let floats = [
            (SensorField::Temperature, self.temp_min, self.temp_max, false),
            (SensorField::Humidity, self.hum_min, self.hum_max, true),
            (SensorField::Lux, self.lux_min, self.lux_max, true),
        ];
        for (field, min, max, non_negative) in floats {
            if !min.is_finite() || !max.is_finite() {
                return Err(RangeError::NotFinite { field });
            }
            if min >= max {
                return Err(RangeError::MinNotBelowMax { field });
            }
            if non_negative && min < 0.0 {
                return Err(RangeError::NegativeMinimum { field });
            }
        }

        let field = SensorField::SoilMoisture;
        if self.soil_min >= self.soil_max {
            return Err(RangeError::MinNotBelowMax { field });
        }
        if self.soil_min < 0 {
            return Err(RangeError::NegativeMinimum { field });
        }

        Ok(())
    }

    /// Whether `field` of `reading` lies within its inclusive bounds
    pub fn field_in_range(&self, reading: &CurrentReading, field: SensorField) -> bool {
        match field {
            SensorField::Temperature => {
                (self.temp_min..=self.temp_max).contains(&reading.temperature)
            }
            SensorField::Humidity => (self.hum_min..=self.hum_max).contains(&reading.humidity),
            SensorField::Lux => (self.lux_min..=self.lux_max).contains(&reading.lux),
            SensorField::SoilMoisture => {
                (self.soil_min..=self.soil_max).contains(&reading.soil_moisture)
            }
        }
    }

    /// Whether all four fields are within bounds at once
    pub fn contains(&self, reading: &CurrentReading) -> bool {
        SensorField::ALL
            .into_iter()
            .all(|field| self.field_in_range(reading, field))
    }

    /// First field that is outside its bounds, if any
    pub fn first_out_of_range(&self, reading: &CurrentReading) -> Option<SensorField> {
        SensorField::ALL
            .into_iter()
            .find(|&field| !self.field_in_range(reading, field))
    }

    /// Read the bounds from `store`, defaulting each key that is missing.
    ///
    /// A stored set that fails [`RangeConfig::validate`] is replaced by the defaults.
    pub fn load<S: SettingsStore>(store: &S) -> Result<Self, S::Error> {
        let d = Self::default();
        let ranges = Self {
            temp_min: store.get_f32_or(keys::TEMP_MIN, d.temp_min)?,
            temp_max: store.get_f32_or(keys::TEMP_MAX, d.temp_max)?,
            hum_min: store.get_f32_or(keys::HUM_MIN, d.hum_min)?,
            hum_max: store.get_f32_or(keys::HUM_MAX, d.hum_max)?,
            lux_min: store.get_f32_or(keys::LUX_MIN, d.lux_min)?,
            lux_max: store.get_f32_or(keys::LUX_MAX, d.lux_max)?,
            soil_min: store.get_i32_or(keys::SOIL_MIN, d.soil_min)?,
            soil_max: store.get_i32_or(keys::SOIL_MAX, d.soil_max)?,
        };

        if let Err(e) = ranges.validate() {
            warn!(" Stored ranges rejected ({}); using defaults", e);
            return Ok(d);
        }

        info!(" Ranges loaded: {}", ranges);
        Ok(ranges)
    }

    /// Write all eight bounds to `store`
    pub fn save<S: SettingsStore>(&self, store: &mut S) -> Result<(), S::Error> {
        store.put(keys::TEMP_MIN, SettingValue::Float(self.temp_min))?;
        store.put(keys::TEMP_MAX, SettingValue::Float(self.temp_max))?;
        store.put(keys::HUM_MIN, SettingValue::Float(self.hum_min))?;
        store.put(keys::HUM_MAX, SettingValue::Float(self.hum_max))?;
        store.put(keys::LUX_MIN, SettingValue::Float(self.lux_min))?;
        store.put(keys::LUX_MAX, SettingValue::Float(self.lux_max))?;
        store.put(keys::SOIL_MIN, SettingValue::Int(self.soil_min))?;
        store.put(keys::SOIL_MAX, SettingValue::Int(self.soil_max))
    }
}

impl core::fmt::Display for RangeConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Temp: {:.1} - {:.1} | Hum: {:.1} - {:.1} | Lux: {:.0} - {:.0} | Soil: {} - {}",
            self.temp_min,
            self.temp_max,
            self.hum_min,
            self.hum_max,
            self.lux_min,
            self.lux_max,
            self.soil_min,
            self.soil_max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsBlob;

    fn reading(temperature: f32) -> CurrentReading {
        CurrentReading {
            temperature,
            humidity: 50.0,
            lux: 200.0,
            soil_moisture: 40,
            last_update: 0,
            valid: true,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(RangeConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_min_not_below_max() {
        let ranges = RangeConfig {
            hum_min: 60.0,
            hum_max: 60.0,
            ..Default::default()
        };
        assert_eq!(
            ranges.validate(),
            Err(RangeError::MinNotBelowMax {
                field: SensorField::Humidity
            })
        );

        let ranges = RangeConfig {
            soil_min: 90,
            soil_max: 10,
            ..Default::default()
        };
        assert_eq!(
            ranges.validate(),
            Err(RangeError::MinNotBelowMax {
                field: SensorField::SoilMoisture
            })
        );
    }

    #[test]
    fn test_negative_minimums() {
        let ranges = RangeConfig {
            temp_min: -10.0,
            ..Default::default()
        };
        assert_eq!(ranges.validate(), Ok(()), "temperature may be negative");

        let ranges = RangeConfig {
            lux_min: -1.0,
            ..Default::default()
        };
        assert_eq!(
            ranges.validate(),
            Err(RangeError::NegativeMinimum {
                field: SensorField::Lux
            })
        );
    }

    #[test]
    fn test_non_finite_bounds() {
        let ranges = RangeConfig {
            temp_max: f32::NAN,
            ..Default::default()
        };
        assert_eq!(
            ranges.validate(),
            Err(RangeError::NotFinite {
                field: SensorField::Temperature
            })
        );
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let ranges = RangeConfig {
            temp_min: 0.0,
            temp_max: 10.0,
            ..Default::default()
        };
        assert!(ranges.contains(&reading(0.0)));
        assert!(ranges.contains(&reading(10.0)));
        assert!(!ranges.contains(&reading(10.5)));
        assert_eq!(
            ranges.first_out_of_range(&reading(-1.0)),
            Some(SensorField::Temperature)
        );
    }

    #[test]
    fn test_camel_case_json() {
        let json = serde_json::to_string(&RangeConfig::default()).unwrap();
        assert!(json.contains("\"tempMin\":-40.0"), "got {}", json);
        assert!(json.contains("\"soilMax\":100"));
    }

    #[test]
    fn test_load_defaults_then_save() {
        let mut store = SettingsBlob::new();
        assert_eq!(RangeConfig::load(&store), Ok(RangeConfig::default()));

        let ranges = RangeConfig {
            temp_min: 5.0,
            soil_max: 70,
            ..Default::default()
        };
        ranges.save(&mut store).unwrap();
        assert_eq!(RangeConfig::load(&store), Ok(ranges));
    }

    #[test]
    fn test_load_rejects_inverted_bounds() {
        let mut store = SettingsBlob::new();
        store.put(keys::TEMP_MIN, SettingValue::Float(5.0)).unwrap();
        store.put(keys::LUX_MIN, SettingValue::Float(900.0)).unwrap();
        store.put(keys::LUX_MAX, SettingValue::Float(100.0)).unwrap();
        assert_eq!(
            RangeConfig::load(&store),
            Ok(RangeConfig::default()),
            "min >= max in storage should fall back to defaults"
        );
    }
}
