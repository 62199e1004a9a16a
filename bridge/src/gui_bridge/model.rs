use serde::{Deserialize, Serialize};
use twincore::processing::TargetFrame;

/// State served to the renderer. It animates toward `frame` at
/// `smoothing_rate`; the bridge only publishes targets.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VisualizationModel {
    pub frame: TargetFrame,
    pub smoothing_rate: f32,
    pub updates: u64,
    pub status: Option<String>,
}

impl VisualizationModel {
    pub fn new(smoothing_rate: f32) -> Self {
        Self {
            smoothing_rate,
            ..Self::default()
        }
    }

    pub fn apply_frame(&mut self, frame: &TargetFrame) {
        self.frame = frame.clone();
        self.updates += 1;
    }
}
