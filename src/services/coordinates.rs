use std::collections::HashSet;
use std::str::FromStr;

use bigdecimal::rounding::RoundingMode;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Coordinates are stored and matched at exactly four decimal places.
/// The upstream forecast API forbids requesting finer-grained positions,
/// and anything finer would only multiply near-identical cache rows.
pub const COORDINATE_SCALE: i64 = 4;

#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("malformed coordinate pair: {0}")]
    Malformed(String),
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}

/// Coordinate pair as it arrives on the wire: both components optional,
/// each either a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCoordinate {
    pub lat: Option<Value>,
    pub lon: Option<Value>,
}

/// Validated coordinate pair, rounded to [`COORDINATE_SCALE`] decimals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinate {
    pub latitude: BigDecimal,
    pub longitude: BigDecimal,
}

impl Coordinate {
    /// Canonical lookup key. Both components are forced to scale 4 so that
    /// values coming from the normalizer and values read back from NUMERIC(7,4)
    /// columns produce identical keys.
    pub fn key(&self) -> (String, String) {
        (
            self.latitude.with_scale(COORDINATE_SCALE).to_string(),
            self.longitude.with_scale(COORDINATE_SCALE).to_string(),
        )
    }
}

/// Rounds and validates a batch of raw coordinate pairs.
///
/// Rounding is banker's rounding (half-to-even) applied to the decimal
/// literal of each component, independently. Range checks run on the rounded
/// value. Any bad pair fails the whole batch.
pub fn normalize(raw: &[RawCoordinate]) -> Result<Vec<Coordinate>, CoordinateError> {
    raw.iter()
        .map(|pair| {
            let latitude = round_component(pair.lat.as_ref(), "lat")?;
            let longitude = round_component(pair.lon.as_ref(), "lon")?;
            check_range("lat", &latitude, 90)?;
            check_range("lon", &longitude, 180)?;
            Ok(Coordinate {
                latitude,
                longitude,
            })
        })
        .collect()
}

/// Collapses repeated pairs, keeping first-seen order.
pub fn dedup(coords: Vec<Coordinate>) -> Vec<Coordinate> {
    let mut seen = HashSet::new();
    coords.into_iter().filter(|c| seen.insert(c.key())).collect()
}

fn round_component(
    value: Option<&Value>,
    field: &'static str,
) -> Result<BigDecimal, CoordinateError> {
    let value = value
        .ok_or_else(|| CoordinateError::Malformed(format!("missing '{field}' value")))?;

    // Going through the literal text keeps decimal semantics: a JSON number
    // formats to its shortest decimal form, so 59.32935 rounds as the
    // decimal 59.32935, not as its binary expansion.
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(CoordinateError::Malformed(format!(
                "'{field}' must be a number or numeric string, got {other}"
            )))
        }
    };

    let parsed = BigDecimal::from_str(&text).map_err(|_| {
        CoordinateError::Malformed(format!("'{field}' is not a decimal value: {text}"))
    })?;

    Ok(parsed.with_scale_round(COORDINATE_SCALE, RoundingMode::HalfEven))
}

fn check_range(
    field: &'static str,
    value: &BigDecimal,
    limit: i32,
) -> Result<(), CoordinateError> {
    if value.abs() > BigDecimal::from(limit) {
        return Err(CoordinateError::OutOfRange {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(lat: Value, lon: Value) -> RawCoordinate {
        RawCoordinate {
            lat: Some(lat),
            lon: Some(lon),
        }
    }

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_to_even_at_four_decimals() {
        let out = normalize(&[raw(json!(59.32935), json!(18.06858))]).unwrap();
        assert_eq!(out[0].latitude, dec("59.3294"));
        assert_eq!(out[0].longitude, dec("18.0686"));
    }

    #[test]
    fn half_to_even_keeps_even_neighbor() {
        // ties round towards the even digit, so .32925 stays at .3292
        let out = normalize(&[raw(json!("59.32925"), json!("18.06865"))]).unwrap();
        assert_eq!(out[0].latitude, dec("59.3292"));
        assert_eq!(out[0].longitude, dec("18.0686"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let first = normalize(&[raw(json!(12.341299), json!(-71.00049))]).unwrap();
        let again = [raw(
            json!(first[0].latitude.to_string()),
            json!(first[0].longitude.to_string()),
        )];
        let second = normalize(&again).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        let err = normalize(&[raw(json!(91), json!(0))]).unwrap_err();
        assert!(matches!(err, CoordinateError::OutOfRange { field: "lat", .. }));
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        let err = normalize(&[raw(json!(0), json!(181))]).unwrap_err();
        assert!(matches!(err, CoordinateError::OutOfRange { field: "lon", .. }));
    }

    #[test]
    fn boundary_values_pass() {
        let out = normalize(&[raw(json!(90), json!(-180))]).unwrap();
        assert_eq!(out[0].latitude, dec("90.0000"));
        assert_eq!(out[0].longitude, dec("-180.0000"));
    }

    #[test]
    fn missing_component_is_malformed() {
        let err = normalize(&[RawCoordinate {
            lat: Some(json!(12.0)),
            lon: None,
        }])
        .unwrap_err();
        assert!(matches!(err, CoordinateError::Malformed(_)));
    }

    #[test]
    fn non_numeric_string_is_malformed() {
        let err = normalize(&[raw(json!("north"), json!(18.0686))]).unwrap_err();
        assert!(matches!(err, CoordinateError::Malformed(_)));
    }

    #[test]
    fn accepts_string_components() {
        let out = normalize(&[raw(json!("59.3294"), json!(" 18.0686 "))]).unwrap();
        assert_eq!(out[0].key(), ("59.3294".to_string(), "18.0686".to_string()));
    }

    #[test]
    fn dedup_collapses_equal_pairs_preserving_order() {
        let coords = normalize(&[
            raw(json!(59.32935), json!(18.06858)),
            raw(json!(40.7128), json!(-74.0060)),
            raw(json!(59.3294), json!(18.0686)),
        ])
        .unwrap();
        let distinct = dedup(coords);
        assert_eq!(distinct.len(), 2);
        assert_eq!(distinct[0].latitude, dec("59.3294"));
        assert_eq!(distinct[1].latitude, dec("40.7128"));
    }
}
