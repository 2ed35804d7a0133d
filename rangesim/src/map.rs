//! The scene graph: meshes, instances, and the scenes which contain them.
//!
//! Geometries are shared through `Arc`. A scene owns the geometries added to it, while each
//! geometry only keeps weak references back to the scenes that contain it, and a scene only keeps
//! weak references back to the instances that wrap it.
//!
//! Edits follow an apply-then-commit discipline. Changing a transform, scale, or mesh buffer puts
//! a geometry into the `Modified` stage; `apply()` recomputes its derived world data, `commit()`
//! pushes that data into the ray tracing backend, and `Scene::commit()` aggregates the committed
//! geometries into a `SceneHandle` which can be queried.

pub(crate) mod accel;
mod geometry;
mod instance;
mod mesh;
mod scene;
mod shapes;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub use accel::{RayHit, SceneHandle, INVALID_ID};
pub use geometry::{Geometry, GeometryType, Stage};
pub use instance::Instance;
pub use mesh::Mesh;
pub use scene::Scene;

/// Build quality hint for a scene's top level structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildQuality {
    /// Builds the same tree as `Medium`; the backend has a single build strategy.
    Low,

    /// Build from scratch on every structural change.
    #[default]
    Medium,

    /// Rebalance the tree after every refit.
    High,

    /// Refit the existing tree whenever the set of geometries is unchanged, regardless of the
    /// scene flags.
    Refit,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SceneFlags: u32 {
        /// Geometries are expected to move between commits, so a commit with an unchanged set of
        /// geometries refits the existing tree instead of rebuilding it.
        const DYNAMIC = 1;
    }
}

/// Settings passed to the backend when a scene is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SceneSettings {
    pub quality: BuildQuality,
    pub flags: SceneFlags,
}

impl SceneSettings {
    pub fn new(quality: BuildQuality, flags: SceneFlags) -> Self {
        Self { quality, flags }
    }

    pub fn dynamic() -> Self {
        Self::new(BuildQuality::Low, SceneFlags::DYNAMIC)
    }

    pub(crate) fn allows_refit(&self) -> bool {
        self.quality == BuildQuality::Refit || self.flags.contains(SceneFlags::DYNAMIC)
    }
}
