//! Sensor reading types shared by every stage of the pipeline

use core::fmt::Display;
use serde::Serialize;

/// Device uptime in milliseconds. Monotonic, unrelated to wall-clock time.
pub type UptimeMs = u64;

/// The four fields carried by a sensor node payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorField {
    Temperature,
    Humidity,
    Lux,
    SoilMoisture,
}

impl SensorField {
    pub const ALL: [SensorField; 4] = [
        Self::Temperature,
        Self::Humidity,
        Self::Lux,
        Self::SoilMoisture,
    ];

    /// Key used for this field in the wire payload
    pub const fn wire_key(self) -> &'static str {
        match self {
            Self::Temperature => "T",
            Self::Humidity => "H",
            Self::Lux => "L",
            Self::SoilMoisture => "S",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Lux => "lux",
            Self::SoilMoisture => "soil moisture",
        }
    }
}

impl Display for SensorField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Latest accepted sensor snapshot.
///
/// Starts zeroed and invalid; only the change detector mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CurrentReading {
    /// Air temperature in °C
    pub temperature: f32,
    /// Relative humidity in %
    pub humidity: f32,
    /// Illuminance in lux
    pub lux: f32,
    /// Soil moisture in %
    pub soil_moisture: i32,
    /// Uptime at which the last accepted update was merged
    pub last_update: UptimeMs,
    /// False until the first accepted update
    pub valid: bool,
}

impl CurrentReading {
    pub const fn new() -> Self {
        Self {
            temperature: 0.0,
            humidity: 0.0,
            lux: 0.0,
            soil_moisture: 0,
            last_update: 0,
            valid: false,
        }
    }

    /// Capture the current field values as a history sample
    pub fn snapshot(&self, timestamp: UptimeMs) -> HistorySample {
        HistorySample {
            timestamp,
            temperature: self.temperature,
            humidity: self.humidity,
            lux: self.lux,
            soil_moisture: self.soil_moisture,
        }
    }
}

impl Display for CurrentReading {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "T:{:.1}°C | H:{:.1}% | L:{:.0}lux | S:{}%",
            self.temperature, self.humidity, self.lux, self.soil_moisture
        )
    }
}

/// Immutable snapshot stored in the history ring.
///
/// Serialises with the field names the dashboard expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySample {
    pub timestamp: UptimeMs,
    pub temperature: f32,
    pub humidity: f32,
    pub lux: f32,
    pub soil_moisture: i32,
}

impl HistorySample {
    pub(crate) const EMPTY: Self = Self {
        timestamp: 0,
        temperature: 0.0,
        humidity: 0.0,
        lux: 0.0,
        soil_moisture: 0,
    };
}

/// Partial update after invalid-token policy has been applied.
///
/// `None` means the field was absent from the payload and keeps its value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorUpdate {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub lux: Option<f32>,
    pub soil_moisture: Option<i32>,
}

impl SensorUpdate {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.humidity.is_none()
            && self.lux.is_none()
            && self.soil_moisture.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reading_is_invalid_and_zeroed() {
        let reading = CurrentReading::new();
        assert!(!reading.valid);
        assert_eq!(reading, CurrentReading::default());
    }

    #[test]
    fn test_snapshot_copies_fields() {
        let reading = CurrentReading {
            temperature: 21.5,
            humidity: 40.0,
            lux: 300.0,
            soil_moisture: 35,
            last_update: 10,
            valid: true,
        };

        let sample = reading.snapshot(1234);
        assert_eq!(sample.timestamp, 1234);
        assert_eq!(sample.temperature, 21.5);
        assert_eq!(sample.soil_moisture, 35);
    }

    #[test]
    fn test_display_format() {
        let reading = CurrentReading {
            temperature: 23.46,
            humidity: 60.0,
            lux: 120.4,
            soil_moisture: 40,
            last_update: 0,
            valid: true,
        };

        assert_eq!(
            alloc::format!("{}", reading),
            "T:23.5°C | H:60.0% | L:120lux | S:40%"
        );
    }
}
