use serde::{Deserialize, Serialize};

/// Diagnosis attached to a single-entity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Benign,
    Malignant,
    Other(String),
}

impl Classification {
    /// Maps the wire diagnosis (`"M"`, `"B"`, or free text) to a classification.
    pub fn from_diagnosis(diagnosis: &str) -> Self {
        let trimmed = diagnosis.trim();
        if trimmed.eq_ignore_ascii_case("m") || trimmed.eq_ignore_ascii_case("malignant") {
            Classification::Malignant
        } else if trimmed.eq_ignore_ascii_case("b") || trimmed.eq_ignore_ascii_case("benign") {
            Classification::Benign
        } else {
            Classification::Other(trimmed.to_string())
        }
    }

    pub fn is_malignant(&self) -> bool {
        matches!(self, Classification::Malignant)
    }
}

/// One tracked entity from a single flat measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleEntityRecord {
    pub id: i64,
    pub classification: Classification,
    pub primary_measure: f32,
    pub secondary_measure: f32,
}

/// Simulated state of one tumor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub radius: f32,
    pub cellularity: f32,
    pub drug_level: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Snapshot of both tumors at one simulation instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiEntityRecord {
    pub timestamp: f64,
    pub left: Option<EntityState>,
    pub right: Option<EntityState>,
}

/// Validated telemetry; never constructed from a partial decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryRecord {
    Single(SingleEntityRecord),
    Multi(MultiEntityRecord),
}

/// Non-telemetry sentinel announcing that the remote side is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlSignal {
    Ready,
}

/// Result of a successful decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Control(ControlSignal),
    Telemetry(TelemetryRecord),
}
