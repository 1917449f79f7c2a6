//! Sensor node payload decoding
//!
//! The payload is a comma-separated list of `KEY:VALUE` tokens in any order.
//! Recognised keys are `T`, `H`, `L` (floats) and `S` (integer). Unknown keys
//! are skipped so newer nodes can add fields without breaking the gateway.

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::reading::{SensorField, SensorUpdate};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload contains no recognised sensor field")]
    NoFields,
}

/// Outcome of decoding one field of the payload
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FieldValue<T> {
    /// The key did not appear in the payload
    #[default]
    Absent,
    /// The key appeared with a well-formed value
    Valid(T),
    /// The key appeared but its value did not parse
    Invalid,
}

impl<T: Copy> FieldValue<T> {
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    pub fn valid(&self) -> Option<T> {
        match self {
            Self::Valid(value) => Some(*value),
            _ => None,
        }
    }
}

/// What to do with a field whose value failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidTokenPolicy {
    /// Treat the field as present with value zero (the sensor node wire contract)
    #[default]
    CoerceToZero,
    /// Treat the field as absent
    Ignore,
}

/// Decoded payload with each field independently absent, valid or invalid
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartialReading {
    pub temperature: FieldValue<f32>,
    pub humidity: FieldValue<f32>,
    pub lux: FieldValue<f32>,
    pub soil_moisture: FieldValue<i32>,
}

impl PartialReading {
    /// Fields that were present but failed to parse
    pub fn invalid_fields(&self) -> impl Iterator<Item = SensorField> + '_ {
        SensorField::ALL.into_iter().filter(move |field| match field {
            SensorField::Temperature => self.temperature == FieldValue::Invalid,
            SensorField::Humidity => self.humidity == FieldValue::Invalid,
            SensorField::Lux => self.lux == FieldValue::Invalid,
            SensorField::SoilMoisture => self.soil_moisture == FieldValue::Invalid,
        })
    }

    /// Turn the decoded fields into an update, applying `policy` to invalid ones
    pub fn resolve(&self, policy: InvalidTokenPolicy) -> SensorUpdate {
        for field in self.invalid_fields() {
            match policy {
                InvalidTokenPolicy::CoerceToZero => {
                    warn!(" Invalid {} value in payload, recording 0", field)
                }
                InvalidTokenPolicy::Ignore => {
                    warn!(" Invalid {} value in payload, ignoring field", field)
                }
            }
        }

        SensorUpdate {
            temperature: resolve_field(self.temperature, policy, 0.0),
            humidity: resolve_field(self.humidity, policy, 0.0),
            lux: resolve_field(self.lux, policy, 0.0),
            soil_moisture: resolve_field(self.soil_moisture, policy, 0),
        }
    }
}

fn resolve_field<T: Copy>(value: FieldValue<T>, policy: InvalidTokenPolicy, zero: T) -> Option<T> {
    match (value, policy) {
        (FieldValue::Absent, _) => None,
        (FieldValue::Valid(v), _) => Some(v),
        (FieldValue::Invalid, InvalidTokenPolicy::CoerceToZero) => Some(zero),
        (FieldValue::Invalid, InvalidTokenPolicy::Ignore) => None,
    }
}

/// Decode a sensor payload such as `T:23.5,H:60,L:300,S:40`.
///
/// Keys and values are trimmed, so ` T : 1 , H:2 ` decodes. A repeated key keeps the last
/// occurrence. Fails only when no recognised key appears at all.
pub fn parse_payload(payload: &str) -> Result<PartialReading, PayloadError> {
    let mut reading = PartialReading::default();
    let mut recognised = false;

    for token in payload.split(',') {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };

        match key.trim() {
            "T" => reading.temperature = parse_float(value),
            "H" => reading.humidity = parse_float(value),
            "L" => reading.lux = parse_float(value),
            "S" => reading.soil_moisture = parse_int(value),
            _ => continue,
        }
        recognised = true;
    }

    if recognised {
        Ok(reading)
    } else {
        Err(PayloadError::NoFields)
    }
}

fn parse_float(value: &str) -> FieldValue<f32> {
    match value.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => FieldValue::Valid(v),
        _ => FieldValue::Invalid,
    }
}

/// Soil is an integer percentage; nodes that send `40.0` are truncated to `40`
fn parse_int(value: &str) -> FieldValue<i32> {
    let value = value.trim();
    if let Ok(v) = value.parse::<i32>() {
        return FieldValue::Valid(v);
    }

    match value.parse::<f32>() {
        Ok(v) if v.is_finite() && v >= i32::MIN as f32 && v <= i32::MAX as f32 => {
            FieldValue::Valid(v as i32)
        }
        _ => FieldValue::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_fields() {
        let reading = parse_payload("T:23.5,H:60,L:300,S:40").unwrap();
        assert_eq!(reading.temperature, FieldValue::Valid(23.5));
        assert_eq!(reading.humidity, FieldValue::Valid(60.0));
        assert_eq!(reading.lux, FieldValue::Valid(300.0));
        assert_eq!(reading.soil_moisture, FieldValue::Valid(40));
    }

    #[test]
    fn test_subset_any_order_with_whitespace() {
        let reading = parse_payload(" S:12 , T:-3.25 ").unwrap();
        assert_eq!(reading.temperature, FieldValue::Valid(-3.25));
        assert_eq!(reading.soil_moisture, FieldValue::Valid(12));
        assert_eq!(reading.humidity, FieldValue::Absent);
        assert_eq!(reading.lux, FieldValue::Absent);
    }

    #[test]
    fn test_space_around_separator() {
        let reading = parse_payload("T :5,H: 60 , L\t:12").unwrap();
        assert_eq!(reading.temperature, FieldValue::Valid(5.0));
        assert_eq!(reading.humidity, FieldValue::Valid(60.0));
        assert_eq!(reading.lux, FieldValue::Valid(12.0));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let reading = parse_payload("V:3.7,T:20,X").unwrap();
        assert_eq!(reading.temperature, FieldValue::Valid(20.0));
        assert_eq!(reading.invalid_fields().count(), 0);
    }

    #[test]
    fn test_no_recognised_keys() {
        assert_eq!(parse_payload(""), Err(PayloadError::NoFields));
        assert_eq!(parse_payload("V:3.7,RSSI:-40"), Err(PayloadError::NoFields));
    }

    #[test]
    fn test_invalid_token_is_flagged() {
        let reading = parse_payload("T:abc,H:55").unwrap();
        assert_eq!(reading.temperature, FieldValue::Invalid);
        assert_eq!(reading.humidity, FieldValue::Valid(55.0));
        assert_eq!(
            reading.invalid_fields().collect::<alloc::vec::Vec<_>>(),
            [SensorField::Temperature]
        );
    }

    #[test]
    fn test_non_finite_is_invalid() {
        let reading = parse_payload("T:NaN,L:inf").unwrap();
        assert_eq!(reading.temperature, FieldValue::Invalid);
        assert_eq!(reading.lux, FieldValue::Invalid);
    }

    #[test]
    fn test_soil_accepts_decimal() {
        let reading = parse_payload("S:40.9").unwrap();
        assert_eq!(reading.soil_moisture, FieldValue::Valid(40));
    }

    #[test]
    fn test_resolve_coerce_to_zero() {
        let update = parse_payload("T:oops,H:50")
            .unwrap()
            .resolve(InvalidTokenPolicy::CoerceToZero);
        assert_eq!(update.temperature, Some(0.0), "invalid token should become 0");
        assert_eq!(update.humidity, Some(50.0));
        assert_eq!(update.lux, None);
    }

    #[test]
    fn test_resolve_ignore() {
        let update = parse_payload("T:oops,H:50")
            .unwrap()
            .resolve(InvalidTokenPolicy::Ignore);
        assert_eq!(update.temperature, None, "invalid token should be dropped");
        assert_eq!(update.humidity, Some(50.0));
    }
}
