use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use twincore::wire::{SchemaKind, READY_SENTINEL};

/// Configuration for the synthetic edge simulation used in offline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub frames: usize,
    pub seed: u64,
    /// Simulated seconds between frames.
    pub tick_seconds: f64,
    /// Frame at which a drug dose reaches both tumors.
    pub dose_at_frame: Option<usize>,
    pub dose_efficacy: f64,
    pub schema: SchemaKind,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            frames: 50,
            seed: 0,
            tick_seconds: 0.1,
            dose_at_frame: None,
            dose_efficacy: 2.0,
            schema: SchemaKind::Nested,
        }
    }
}

/// Logistic tumor growth with a randomly perturbed proliferation rate and a
/// decaying drug term.
#[derive(Debug, Clone)]
pub struct TumorModel {
    radius: f64,
    cellularity: f64,
    proliferation_rate: f64,
    carrying_capacity: f64,
    drug_efficacy: f64,
    drug_decay: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TumorSnapshot {
    pub radius: f64,
    pub cellularity: f64,
    pub drug_level: f64,
    pub status: &'static str,
}

impl TumorModel {
    pub fn new(radius: f64, cellularity: f64) -> Self {
        Self {
            radius,
            cellularity,
            proliferation_rate: 0.01,
            carrying_capacity: 100.0,
            drug_efficacy: 0.0,
            drug_decay: 0.005,
        }
    }

    pub fn inject_drug(&mut self, efficacy: f64) {
        self.drug_efficacy += efficacy;
    }

    pub fn step(&mut self, dt: f64, rng: &mut StdRng) -> TumorSnapshot {
        let flux = rng.gen_range(0.8..1.2);
        let growth = self.proliferation_rate
            * flux
            * self.cellularity
            * (1.0 - self.cellularity / self.carrying_capacity);
        let death = self.drug_efficacy * self.cellularity;
        let delta = (growth - death) * dt;

        self.cellularity = (self.cellularity + delta).max(0.0);
        self.radius = (self.radius + delta * 0.05).max(0.0);
        if self.drug_efficacy > 0.0 {
            self.drug_efficacy = (self.drug_efficacy - self.drug_decay * self.drug_efficacy * dt).max(0.0);
        }

        TumorSnapshot {
            radius: round4(self.radius),
            cellularity: round4(self.cellularity),
            drug_level: round4(self.drug_efficacy),
            status: if delta > 0.0 { "growing" } else { "healing" },
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn nested_payloads(config: &GeneratorConfig, rng: &mut StdRng) -> anyhow::Result<Vec<String>> {
    let mut left = TumorModel::new(0.5, 10.0);
    let mut right = TumorModel::new(0.7, 20.0);
    let mut payloads = Vec::with_capacity(config.frames);

    for frame in 0..config.frames {
        if config.dose_at_frame == Some(frame) {
            left.inject_drug(config.dose_efficacy);
            right.inject_drug(config.dose_efficacy);
        }
        let left_state = left.step(config.tick_seconds, rng);
        let right_state = right.step(config.tick_seconds, rng);
        let payload = json!({
            "timestamp": frame as f64 * config.tick_seconds,
            "tumors": { "left": left_state, "right": right_state },
        });
        payloads.push(
            serde_json::to_string(&payload)
                .with_context(|| format!("serializing simulation frame {}", frame))?,
        );
    }
    Ok(payloads)
}

fn flat_payloads(config: &GeneratorConfig, rng: &mut StdRng) -> anyhow::Result<Vec<String>> {
    (0..config.frames)
        .map(|index| {
            let diagnosis = if rng.gen_bool(0.37) { "M" } else { "B" };
            let payload = json!({
                "id": 842_302 + index as i64,
                "diagnosis": diagnosis,
                "radius_mean": round4(rng.gen_range(6.0..28.0)),
                "texture_mean": round4(rng.gen_range(9.0..39.0)),
            });
            serde_json::to_string(&payload)
                .with_context(|| format!("serializing dataset record {}", index))
        })
        .collect()
}

/// READY followed by `frames` telemetry payloads in the configured schema.
pub fn build_session(config: &GeneratorConfig) -> anyhow::Result<Vec<String>> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let telemetry = match config.schema {
        SchemaKind::Nested => nested_payloads(config, &mut rng)?,
        SchemaKind::Flat => flat_payloads(config, &mut rng)?,
    };
    let mut session = Vec::with_capacity(telemetry.len() + 1);
    session.push(READY_SENTINEL.to_string());
    session.extend(telemetry);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use twincore::wire::{decode_str, ControlSignal, Decoded, TelemetryRecord};

    #[test]
    fn session_starts_with_ready_and_decodes() {
        let config = GeneratorConfig {
            frames: 12,
            seed: 7,
            ..Default::default()
        };
        let session = build_session(&config).unwrap();
        assert_eq!(session.len(), 13);
        assert_eq!(
            decode_str(&session[0], SchemaKind::Nested).unwrap(),
            Decoded::Control(ControlSignal::Ready)
        );
        for payload in &session[1..] {
            match decode_str(payload, SchemaKind::Nested).unwrap() {
                Decoded::Telemetry(TelemetryRecord::Multi(record)) => {
                    assert!(record.left.is_some());
                    assert!(record.right.is_some());
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn flat_session_uses_dataset_fields() {
        let config = GeneratorConfig {
            frames: 5,
            schema: SchemaKind::Flat,
            ..Default::default()
        };
        let session = build_session(&config).unwrap();
        for payload in &session[1..] {
            assert!(matches!(
                decode_str(payload, SchemaKind::Flat).unwrap(),
                Decoded::Telemetry(TelemetryRecord::Single(_))
            ));
        }
    }

    #[test]
    fn same_seed_gives_same_session() {
        let config = GeneratorConfig {
            frames: 8,
            seed: 42,
            ..Default::default()
        };
        assert_eq!(build_session(&config).unwrap(), build_session(&config).unwrap());
    }

    #[test]
    fn tumor_grows_untreated_and_heals_after_dose() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut tumor = TumorModel::new(0.5, 10.0);
        let grown = tumor.step(1.0, &mut rng);
        assert_eq!(grown.status, "growing");
        assert!(grown.radius > 0.5);

        tumor.inject_drug(2.0);
        let treated = tumor.step(1.0, &mut rng);
        assert_eq!(treated.status, "healing");
        assert!(treated.radius < grown.radius);
        assert!(treated.drug_level > 0.0 && treated.drug_level < 2.0);
    }
}
