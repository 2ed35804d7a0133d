use super::accel::AccelEntry;
use super::{Instance, Mesh, Scene};
use crate::common::ScaledIso3;
use crate::errors::RaycastError;
use crate::{Iso3, Result, Vector3};
use std::sync::Arc;
use uuid::Uuid;

/// Where a geometry is in the edit/apply/commit lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// A transform, scale, or buffer was changed and `apply()` has not been called since.
    Modified,

    /// Derived world data is up to date, but the backend has not seen it yet.
    Applied,

    /// The backend holds the current state of the geometry.
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Mesh,
    Instance,
}

/// The per-geometry attributes shared by meshes and instances.
#[derive(Debug, Clone)]
pub(crate) struct Placement {
    pub name: Option<String>,
    pub transform: ScaledIso3,
    pub stage: Stage,
}

impl Placement {
    pub fn new() -> Self {
        Self {
            name: None,
            transform: ScaledIso3::identity(),
            stage: Stage::Modified,
        }
    }

    pub fn set_iso(&mut self, iso: Iso3) {
        self.transform.iso = iso;
        self.stage = Stage::Modified;
    }

    pub fn set_scale(&mut self, scale: Vector3) {
        self.transform.scale = scale;
        self.stage = Stage::Modified;
    }

    pub fn label(&self, kind: &str) -> String {
        match &self.name {
            Some(n) => format!("{} '{}'", kind, n),
            None => kind.to_string(),
        }
    }

    /// Check that the transform can be applied, returning it.
    pub fn appliable(&self, kind: &str) -> Result<ScaledIso3> {
        if self.transform.is_degenerate() {
            return Err(RaycastError::config(format!(
                "{} has a degenerate scale {:?}",
                self.label(kind),
                self.transform.scale.as_slice()
            )));
        }
        Ok(self.transform)
    }

    /// Check that there are no edits pending an `apply()`.
    pub fn committable(&self, kind: &str) -> Result<()> {
        if self.stage == Stage::Modified {
            return Err(RaycastError::config(format!(
                "{} has edits which have not been applied",
                self.label(kind)
            )));
        }
        Ok(())
    }
}

/// A shared reference to either kind of geometry which can be added to a `Scene`.
#[derive(Clone)]
pub enum Geometry {
    Mesh(Arc<Mesh>),
    Instance(Arc<Instance>),
}

macro_rules! dispatch {
    ($self:ident, $g:ident => $e:expr) => {
        match $self {
            Geometry::Mesh($g) => $e,
            Geometry::Instance($g) => $e,
        }
    };
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Mesh(_) => GeometryType::Mesh,
            Geometry::Instance(_) => GeometryType::Instance,
        }
    }

    pub fn as_mesh(&self) -> Option<&Arc<Mesh>> {
        match self {
            Geometry::Mesh(m) => Some(m),
            Geometry::Instance(_) => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Arc<Instance>> {
        match self {
            Geometry::Mesh(_) => None,
            Geometry::Instance(i) => Some(i),
        }
    }

    pub fn uuid(&self) -> Uuid {
        dispatch!(self, g => g.uuid())
    }

    pub fn name(&self) -> Option<String> {
        dispatch!(self, g => g.name())
    }

    pub fn set_name(&self, name: &str) {
        dispatch!(self, g => g.set_name(name))
    }

    pub fn transform(&self) -> Iso3 {
        dispatch!(self, g => g.transform())
    }

    pub fn set_transform(&self, iso: Iso3) {
        dispatch!(self, g => g.set_transform(iso))
    }

    pub fn scale(&self) -> Vector3 {
        dispatch!(self, g => g.scale())
    }

    pub fn set_scale(&self, scale: Vector3) {
        dispatch!(self, g => g.set_scale(scale))
    }

    pub fn stage(&self) -> Stage {
        dispatch!(self, g => g.stage())
    }

    pub fn apply(&self) -> Result<()> {
        dispatch!(self, g => g.apply())
    }

    pub fn commit(&self) -> Result<()> {
        dispatch!(self, g => g.commit())
    }

    /// Every live scene containing this geometry, with the id the geometry has in that scene.
    pub fn ids(&self) -> Vec<(Arc<Scene>, u32)> {
        dispatch!(self, g => g.ids())
    }

    pub fn id_in(&self, scene: &Arc<Scene>) -> Option<u32> {
        dispatch!(self, g => g.id_in(scene))
    }

    pub fn is_attached(&self) -> bool {
        dispatch!(self, g => g.is_attached())
    }

    /// True if both values refer to the same underlying geometry.
    pub fn ptr_eq(&self, other: &Geometry) -> bool {
        match (self, other) {
            (Geometry::Mesh(a), Geometry::Mesh(b)) => Arc::ptr_eq(a, b),
            (Geometry::Instance(a), Geometry::Instance(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn parent_refs(&self) -> &crate::common::BackRefs<Scene, u32> {
        dispatch!(self, g => g.parent_refs())
    }

    /// The committed state of the geometry as an entry of a scene's top level structure, or an
    /// error if it was never committed.
    pub(crate) fn accel_entry(&self, id: u32) -> Result<AccelEntry> {
        let entry = match self {
            Geometry::Mesh(m) => m
                .committed_accel()
                .map(|mesh| AccelEntry::Mesh { id, mesh }),
            Geometry::Instance(i) => i
                .committed_accel()
                .map(|instance| AccelEntry::Instance { id, instance }),
        };

        entry.ok_or_else(|| {
            let label = match self.name() {
                Some(n) => format!("'{}'", n),
                None => self.uuid().to_string(),
            };
            RaycastError::config(format!(
                "geometry {} ({:?} {}) has never been committed",
                id,
                self.geometry_type(),
                label
            ))
        })
    }
}

impl std::fmt::Debug for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geometry")
            .field("type", &self.geometry_type())
            .field("uuid", &self.uuid())
            .field("name", &self.name())
            .field("stage", &self.stage())
            .finish()
    }
}

impl From<Arc<Mesh>> for Geometry {
    fn from(value: Arc<Mesh>) -> Self {
        Geometry::Mesh(value)
    }
}

impl From<&Arc<Mesh>> for Geometry {
    fn from(value: &Arc<Mesh>) -> Self {
        Geometry::Mesh(value.clone())
    }
}

impl From<Arc<Instance>> for Geometry {
    fn from(value: Arc<Instance>) -> Self {
        Geometry::Instance(value)
    }
}

impl From<&Arc<Instance>> for Geometry {
    fn from(value: &Arc<Instance>) -> Self {
        Geometry::Instance(value.clone())
    }
}
