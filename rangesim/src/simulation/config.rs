use crate::Result;
use serde::{Deserialize, Serialize};

/// The frame that simulated points and normals are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFrame {
    /// The frame of the sensor at the time of the sample
    #[default]
    Sensor,

    /// The frame of the map
    Map,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub output_frame: OutputFrame,

    /// Number of worker threads in the simulator's pool, 0 to let rayon decide
    pub threads: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            output_frame: OutputFrame::Sensor,
            threads: 0,
        }
    }
}

impl SimulatorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
