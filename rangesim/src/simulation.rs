//! Simulating sensor readings: a `Simulator` binds a committed map, a sensor model, and the sensor
//! mounting pose, and casts the model's rays from each of a batch of body poses.
//!
//! Results are written into `SimulationBuffers`, one flat buffer per requested attribute, with
//! `poses.len() * model.size()` entries each. Entry `p * model.size() + s` holds sample `s` of pose
//! `p`.

mod buffers;
mod config;
mod launch;
mod simulator;

pub use buffers::{Attributes, SimulationBuffers};
pub use config::{OutputFrame, SimulatorConfig};
pub use launch::PendingSimulation;
pub use simulator::Simulator;
