use crate::prelude::{DecodeError, DecodeResult};
use crate::wire::record::{
    Classification, ControlSignal, Decoded, EntityState, MultiEntityRecord, SingleEntityRecord,
    TelemetryRecord,
};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Literal payload the simulation publishes once it accepts a bootstrap.
pub const READY_SENTINEL: &str = "READY";

/// Payload shape expected on the wire. Selected by configuration, never
/// sniffed from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    /// `{"id", "diagnosis", "radius_mean", "texture_mean"}`
    #[default]
    Flat,
    /// `{"timestamp", "tumors": {"left": {..}, "right": {..}}}`
    Nested,
}

#[derive(Deserialize)]
struct FlatWire {
    #[serde(deserialize_with = "lenient_id")]
    id: i64,
    diagnosis: String,
    radius_mean: f32,
    #[serde(default)]
    texture_mean: f32,
}

#[derive(Deserialize)]
struct NestedWire {
    #[serde(default)]
    timestamp: f64,
    tumors: TumorsWire,
}

#[derive(Deserialize)]
struct TumorsWire {
    #[serde(default)]
    left: Option<EntityWire>,
    #[serde(default)]
    right: Option<EntityWire>,
}

#[derive(Deserialize)]
struct EntityWire {
    radius: f32,
    #[serde(default)]
    cellularity: f32,
    #[serde(default)]
    drug_level: f32,
    #[serde(default)]
    status: Option<String>,
}

impl From<EntityWire> for EntityState {
    fn from(wire: EntityWire) -> Self {
        Self {
            radius: wire.radius,
            cellularity: wire.cellularity,
            drug_level: wire.drug_level,
            status: wire.status,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

// CSV senders stringify numpy integers, so "842302" and 842302.0 both occur.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match IdRepr::deserialize(deserializer)? {
        IdRepr::Int(value) => Ok(value),
        IdRepr::Float(value) if !value.is_finite() || value.fract() != 0.0 => Err(
            de::Error::custom(format!("id {} is not an integer", value)),
        ),
        // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
        IdRepr::Float(value) if value < i64::MIN as f64 || value >= i64::MAX as f64 => Err(
            de::Error::custom(format!("id {} is out of range", value)),
        ),
        IdRepr::Float(value) => Ok(value as i64),
        IdRepr::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| de::Error::custom(format!("id {:?} is not an integer", text))),
    }
}

/// Decodes raw transport bytes. Non-UTF-8 input is a malformed payload.
pub fn decode(raw: &[u8], schema: SchemaKind) -> DecodeResult<Decoded> {
    let text = std::str::from_utf8(raw)
        .map_err(|err| DecodeError::MalformedPayload(format!("payload is not UTF-8: {}", err)))?;
    decode_str(text, schema)
}

/// Decodes a text payload: the `READY` sentinel first, then JSON against
/// the configured schema.
pub fn decode_str(text: &str, schema: SchemaKind) -> DecodeResult<Decoded> {
    let trimmed = text.trim();
    if trimmed == READY_SENTINEL {
        return Ok(Decoded::Control(ControlSignal::Ready));
    }
    if trimmed.is_empty() {
        return Err(DecodeError::MalformedPayload("empty payload".into()));
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|err| DecodeError::MalformedPayload(err.to_string()))?;

    let record = match schema {
        SchemaKind::Flat => decode_flat(value)?,
        SchemaKind::Nested => decode_nested(value)?,
    };
    Ok(Decoded::Telemetry(record))
}

fn decode_flat(value: Value) -> DecodeResult<TelemetryRecord> {
    let wire: FlatWire = serde_json::from_value(value)
        .map_err(|err| DecodeError::SchemaMismatch(format!("flat record: {}", err)))?;
    Ok(TelemetryRecord::Single(SingleEntityRecord {
        id: wire.id,
        classification: Classification::from_diagnosis(&wire.diagnosis),
        primary_measure: wire.radius_mean,
        secondary_measure: wire.texture_mean,
    }))
}

fn decode_nested(value: Value) -> DecodeResult<TelemetryRecord> {
    let wire: NestedWire = serde_json::from_value(value)
        .map_err(|err| DecodeError::SchemaMismatch(format!("nested record: {}", err)))?;
    Ok(TelemetryRecord::Multi(MultiEntityRecord {
        timestamp: wire.timestamp,
        left: wire.tumors.left.map(EntityState::from),
        right: wire.tumors.right.map(EntityState::from),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(decoded: Decoded) -> SingleEntityRecord {
        match decoded {
            Decoded::Telemetry(TelemetryRecord::Single(record)) => record,
            other => panic!("expected single-entity record, got {:?}", other),
        }
    }

    fn multi(decoded: Decoded) -> MultiEntityRecord {
        match decoded {
            Decoded::Telemetry(TelemetryRecord::Multi(record)) => record,
            other => panic!("expected multi-entity record, got {:?}", other),
        }
    }

    #[test]
    fn ready_sentinel_short_circuits_any_schema() {
        for schema in [SchemaKind::Flat, SchemaKind::Nested] {
            assert_eq!(
                decode(b"READY", schema).unwrap(),
                Decoded::Control(ControlSignal::Ready)
            );
        }
        assert_eq!(
            decode_str(" READY\n", SchemaKind::Flat).unwrap(),
            Decoded::Control(ControlSignal::Ready)
        );
    }

    #[test]
    fn flat_record_decodes_and_classifies() {
        let raw = br#"{"id":1,"diagnosis":"M","radius_mean":20.0,"texture_mean":15.0}"#;
        let record = single(decode(raw, SchemaKind::Flat).unwrap());
        assert_eq!(record.id, 1);
        assert!(record.classification.is_malignant());
        assert_eq!(record.primary_measure, 20.0);
        assert_eq!(record.secondary_measure, 15.0);
    }

    #[test]
    fn flat_record_tolerates_extra_fields_and_missing_texture() {
        let raw = r#"{"id":"842302","slice_index":"12","diagnosis":"B","radius_mean":11.5}"#;
        let record = single(decode_str(raw, SchemaKind::Flat).unwrap());
        assert_eq!(record.id, 842302);
        assert_eq!(record.classification, Classification::Benign);
        assert_eq!(record.secondary_measure, 0.0);
    }

    #[test]
    fn flat_record_accepts_integral_float_id() {
        let raw = r#"{"id":7.0,"diagnosis":"B","radius_mean":11.5}"#;
        assert_eq!(single(decode_str(raw, SchemaKind::Flat).unwrap()).id, 7);
    }

    #[test]
    fn flat_record_missing_radius_is_schema_mismatch() {
        let raw = r#"{"id":1,"diagnosis":"M"}"#;
        assert!(matches!(
            decode_str(raw, SchemaKind::Flat),
            Err(DecodeError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn out_of_range_id_is_schema_mismatch() {
        for id in ["1e20", "-1e20", "18446744073709551615"] {
            let raw = format!(r#"{{"id":{},"diagnosis":"M","radius_mean":3.0}}"#, id);
            assert!(
                matches!(
                    decode_str(&raw, SchemaKind::Flat),
                    Err(DecodeError::SchemaMismatch(_))
                ),
                "id {} should be rejected",
                id
            );
        }
    }

    #[test]
    fn non_integer_id_is_schema_mismatch() {
        let raw = r#"{"id":"abc","diagnosis":"M","radius_mean":3.0}"#;
        assert!(matches!(
            decode_str(raw, SchemaKind::Flat),
            Err(DecodeError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn malformed_json_is_reported_as_malformed() {
        for raw in ["{\"id\":1,", "not json", "", "{]"] {
            assert!(matches!(
                decode_str(raw, SchemaKind::Flat),
                Err(DecodeError::MalformedPayload(_))
            ));
        }
        assert!(matches!(
            decode(&[0xff, 0xfe, 0x00], SchemaKind::Nested),
            Err(DecodeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn nested_record_applies_defaults() {
        let raw = r#"{"timestamp":12.5,"tumors":{"left":{"radius":0.52,"status":"growing"},"right":null}}"#;
        let record = multi(decode_str(raw, SchemaKind::Nested).unwrap());
        assert_eq!(record.timestamp, 12.5);
        let left = record.left.unwrap();
        assert_eq!(left.radius, 0.52);
        assert_eq!(left.cellularity, 0.0);
        assert_eq!(left.drug_level, 0.0);
        assert_eq!(left.status.as_deref(), Some("growing"));
        assert!(record.right.is_none());
    }

    #[test]
    fn nested_record_without_tumors_is_schema_mismatch() {
        let raw = r#"{"timestamp":1.0}"#;
        assert!(matches!(
            decode_str(raw, SchemaKind::Nested),
            Err(DecodeError::SchemaMismatch(_))
        ));
        let flat_on_nested = r#"{"id":1,"diagnosis":"M","radius_mean":20.0}"#;
        assert!(matches!(
            decode_str(flat_on_nested, SchemaKind::Nested),
            Err(DecodeError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn json_scalar_is_schema_mismatch_not_malformed() {
        assert!(matches!(
            decode_str("42", SchemaKind::Flat),
            Err(DecodeError::SchemaMismatch(_))
        ));
    }
}
