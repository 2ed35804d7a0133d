//! Range sensor simulation by ray casting against a scene graph of triangle meshes.
//!
//! Meshes and instances are organized into `Scene`s, committed into a queryable structure, and
//! then sampled by a `Simulator` which maps (sensor model, pose) pairs to per-ray results.

pub mod common;
pub mod errors;
pub mod io;
pub mod map;
pub mod sensors;
pub mod simulation;

pub use parry3d_f64::na;

pub use common::{DiscreteInterval, Interval, ScaledIso3};
pub use errors::{RaycastError, Result};
pub use map::{
    BuildQuality, Geometry, GeometryType, Instance, Mesh, RayHit, Scene, SceneFlags, SceneHandle,
    SceneSettings, Stage, INVALID_ID,
};
pub use sensors::{O1DnModel, OnDnModel, PinholeModel, RayModel, SensorModel, SphericalModel};
pub use simulation::{
    Attributes, OutputFrame, PendingSimulation, SimulationBuffers, Simulator, SimulatorConfig,
};

pub type Point3 = parry3d_f64::na::Point3<f64>;
pub type Vector3 = parry3d_f64::na::Vector3<f64>;
pub type UnitVec3 = parry3d_f64::na::Unit<Vector3>;
pub type Iso3 = parry3d_f64::na::Isometry3<f64>;
