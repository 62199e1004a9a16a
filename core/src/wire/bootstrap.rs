use crate::prelude::PublishError;
use serde::{Deserialize, Serialize};

/// Session metadata and initial tumor sizes sent once the simulation is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub patient_id: String,
    pub age: u32,
    pub left_tumor_radius: f32,
    pub right_tumor_radius: f32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            patient_id: "PATIENT_001".into(),
            age: 45,
            left_tumor_radius: 0.5,
            right_tumor_radius: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapMeta {
    pub patient_id: String,
    pub age: u32,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    pub left_tumor_radius: f32,
    pub right_tumor_radius: f32,
}

/// Bootstrap payload consumed by the edge simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapMessage {
    pub meta: BootstrapMeta,
    pub initial_state: InitialState,
}

impl BootstrapMessage {
    pub fn from_config(config: &BootstrapConfig, timestamp: u64) -> Self {
        Self {
            meta: BootstrapMeta {
                patient_id: config.patient_id.clone(),
                age: config.age,
                timestamp,
            },
            initial_state: InitialState {
                left_tumor_radius: config.left_tumor_radius,
                right_tumor_radius: config.right_tumor_radius,
            },
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PublishError> {
        Ok(serde_json::to_vec(self)?)
    }
}
