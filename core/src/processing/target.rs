use crate::math::scale::ScaleHelper;
use crate::prelude::ConfigError;
use crate::wire::{Classification, EntityState, SchemaKind, TelemetryRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters mapping a measurement to a visual scale.
///
/// A measurement at or below `near_zero` collapses the target to zero;
/// anything above maps to `(measure / reference) * multiplier` clamped to
/// `[min_scale, max_scale]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub reference: f32,
    pub multiplier: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub near_zero: f32,
}

impl TargetConfig {
    /// Mean-radius records: 14.12 is the dataset's mean `radius_mean`.
    pub fn flat_defaults() -> Self {
        Self {
            reference: 14.12,
            multiplier: 3.0,
            min_scale: 0.5,
            max_scale: 5.0,
            near_zero: 0.1,
        }
    }

    /// Simulated tumors: radius to diameter, capped at 5 scene units.
    pub fn nested_defaults() -> Self {
        Self {
            reference: 0.5,
            multiplier: 1.0,
            min_scale: 0.01,
            max_scale: 5.0,
            near_zero: 0.001,
        }
    }

    pub fn for_schema(schema: SchemaKind) -> Self {
        match schema {
            SchemaKind::Flat => Self::flat_defaults(),
            SchemaKind::Nested => Self::nested_defaults(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let values = [
            self.reference,
            self.multiplier,
            self.min_scale,
            self.max_scale,
            self.near_zero,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidTarget("values must be finite".into()));
        }
        if self.reference <= 0.0 {
            return Err(ConfigError::InvalidTarget(format!(
                "reference must be positive, got {}",
                self.reference
            )));
        }
        if self.min_scale < 0.0 || self.min_scale > self.max_scale {
            return Err(ConfigError::InvalidTarget(format!(
                "clamp bounds [{}, {}] are invalid",
                self.min_scale, self.max_scale
            )));
        }
        if self.near_zero < 0.0 {
            return Err(ConfigError::InvalidTarget(
                "near_zero must not be negative".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self::flat_defaults()
    }
}

/// Which rendered object a target belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySlot {
    Primary,
    Left,
    Right,
}

/// Value the renderer animates toward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualTarget {
    pub scale: f32,
    pub collapsed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl VisualTarget {
    pub fn from_measure(measure: f32, config: &TargetConfig) -> Self {
        if measure <= config.near_zero {
            return Self {
                scale: 0.0,
                collapsed: true,
                classification: None,
                status: None,
            };
        }
        Self {
            scale: ScaleHelper::scaled_clamp(
                measure,
                config.reference,
                config.multiplier,
                config.min_scale,
                config.max_scale,
            ),
            collapsed: false,
            classification: None,
            status: None,
        }
    }

    fn from_entity(state: &EntityState, config: &TargetConfig) -> Self {
        Self {
            status: state.status.clone(),
            ..Self::from_measure(state.radius, config)
        }
    }
}

/// Full set of targets handed to the sink after each record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetFrame {
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    pub entities: BTreeMap<EntitySlot, VisualTarget>,
}

impl TargetFrame {
    pub fn get(&self, slot: EntitySlot) -> Option<&VisualTarget> {
        self.entities.get(&slot)
    }
}

/// Derives the next frame from the previous one and a record. Slots the
/// record does not mention keep their previous target. The entity `status`
/// never gates an update; it is carried through for display.
pub fn derive_frame(
    previous: &TargetFrame,
    record: &TelemetryRecord,
    config: &TargetConfig,
) -> TargetFrame {
    let mut next = previous.clone();
    next.sequence = previous.sequence + 1;

    match record {
        TelemetryRecord::Single(single) => {
            next.timestamp = None;
            let target = VisualTarget {
                classification: Some(single.classification.clone()),
                ..VisualTarget::from_measure(single.primary_measure, config)
            };
            next.entities.insert(EntitySlot::Primary, target);
        }
        TelemetryRecord::Multi(multi) => {
            next.timestamp = Some(multi.timestamp);
            if let Some(left) = &multi.left {
                next.entities
                    .insert(EntitySlot::Left, VisualTarget::from_entity(left, config));
            }
            if let Some(right) = &multi.right {
                next.entities
                    .insert(EntitySlot::Right, VisualTarget::from_entity(right, config));
            }
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{MultiEntityRecord, SingleEntityRecord};

    fn flat(radius: f32, diagnosis: &str) -> TelemetryRecord {
        TelemetryRecord::Single(SingleEntityRecord {
            id: 1,
            classification: Classification::from_diagnosis(diagnosis),
            primary_measure: radius,
            secondary_measure: 15.0,
        })
    }

    fn entity(radius: f32, status: &str) -> EntityState {
        EntityState {
            radius,
            cellularity: 10.0,
            drug_level: 0.0,
            status: Some(status.into()),
        }
    }

    #[test]
    fn flat_measure_scales_proportionally_within_clamp() {
        let config = TargetConfig::flat_defaults();
        let frame = derive_frame(&TargetFrame::default(), &flat(20.0, "M"), &config);
        let target = frame.get(EntitySlot::Primary).unwrap();
        let expected = ((20.0f32 / 14.12) * 3.0).clamp(0.5, 5.0);
        assert!(ScaleHelper::approx_eq(target.scale, expected, 1e-5));
        assert!(ScaleHelper::approx_eq(target.scale, 4.25, 0.01));
        assert!(!target.collapsed);
        assert_eq!(target.classification, Some(Classification::Malignant));
    }

    #[test]
    fn measures_in_range_stay_inside_clamp() {
        let config = TargetConfig::flat_defaults();
        for radius in [0.11f32, 1.0, 6.0, 14.12, 28.0, 1000.0] {
            let target = VisualTarget::from_measure(radius, &config);
            assert!(!target.collapsed);
            assert!(target.scale >= config.min_scale && target.scale <= config.max_scale);
        }
    }

    #[test]
    fn near_zero_and_negative_measures_collapse() {
        let config = TargetConfig::flat_defaults();
        for radius in [0.1f32, 0.0, -3.0] {
            let target = VisualTarget::from_measure(radius, &config);
            assert!(target.collapsed);
            assert_eq!(target.scale, 0.0);
        }
    }

    #[test]
    fn missing_side_keeps_previous_target() {
        let config = TargetConfig::nested_defaults();
        let both = TelemetryRecord::Multi(MultiEntityRecord {
            timestamp: 1.0,
            left: Some(entity(0.5, "growing")),
            right: Some(entity(0.7, "growing")),
        });
        let only_left = TelemetryRecord::Multi(MultiEntityRecord {
            timestamp: 2.0,
            left: Some(entity(0.0, "healing")),
            right: None,
        });

        let first = derive_frame(&TargetFrame::default(), &both, &config);
        let second = derive_frame(&first, &only_left, &config);

        assert_eq!(second.sequence, 2);
        assert_eq!(second.timestamp, Some(2.0));
        assert!(second.get(EntitySlot::Left).unwrap().collapsed);
        assert_eq!(second.get(EntitySlot::Right), first.get(EntitySlot::Right));
        assert!(ScaleHelper::approx_eq(
            first.get(EntitySlot::Right).unwrap().scale,
            1.4,
            1e-5
        ));
    }

    #[test]
    fn unhealthy_status_does_not_gate_update() {
        let config = TargetConfig::nested_defaults();
        let record = TelemetryRecord::Multi(MultiEntityRecord {
            timestamp: 3.0,
            left: Some(entity(1.0, "critical")),
            right: None,
        });
        let frame = derive_frame(&TargetFrame::default(), &record, &config);
        let left = frame.get(EntitySlot::Left).unwrap();
        assert_eq!(left.status.as_deref(), Some("critical"));
        assert!(ScaleHelper::approx_eq(left.scale, 2.0, 1e-5));
    }

    #[test]
    fn validate_rejects_inverted_bounds_and_zero_reference() {
        let mut config = TargetConfig::flat_defaults();
        assert!(config.validate().is_ok());
        config.min_scale = 6.0;
        assert!(config.validate().is_err());
        let zero_reference = TargetConfig {
            reference: 0.0,
            ..TargetConfig::flat_defaults()
        };
        assert!(zero_reference.validate().is_err());
    }
}
