//! The committed, queryable side of the scene graph, built on parry3d. Each mesh is committed into
//! a `TriMesh` (which owns its own BVH and the ray/triangle math), and each scene into a `Qbvh`
//! over the bounding boxes of its committed geometries. Committed structures are immutable and
//! shared through `Arc`, so a `SceneHandle` stays valid and consistent while the scene it came
//! from is edited.

use crate::common::ScaledIso3;
use crate::errors::RaycastError;
use crate::{Point3, Result, Vector3};
use parry3d_f64::bounding_volume::{Aabb, BoundingVolume};
use parry3d_f64::partitioning::{Qbvh, QbvhUpdateWorkspace};
use parry3d_f64::query::visitors::RayIntersectionsVisitor;
use parry3d_f64::query::{Ray, RayCast};
use parry3d_f64::shape::{FeatureId, Shape, TriMesh};
use std::sync::Arc;

/// Sentinel for face, geometry and object ids when a ray hits nothing.
pub const INVALID_ID: u32 = u32::MAX;

/// The closest intersection of a ray with a committed scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance along the ray, in units of the ray direction's length
    pub range: f64,

    /// Unit surface normal in the frame of the queried scene, oriented to face the ray origin
    pub normal: Vector3,

    /// Index of the hit triangle within its mesh
    pub face_id: u32,

    /// Id of the hit mesh within the scene that directly contains it
    pub geom_id: u32,

    /// Id of the top level geometry (mesh or instance) in the queried scene
    pub object_id: u32,
}

pub(crate) struct MeshAccel {
    shape: TriMesh,
    face_normals: Vec<Vector3>,
    aabb: Aabb,
}

impl MeshAccel {
    pub fn build(
        vertices: Vec<Point3>,
        faces: Vec<[u32; 3]>,
        face_normals: Vec<Vector3>,
    ) -> Result<Self> {
        let shape = TriMesh::new(vertices, faces).map_err(|e| {
            RaycastError::backend(format!("failed to build triangle mesh: {:?}", e))
        })?;
        let aabb = shape.compute_local_aabb();
        Ok(Self {
            shape,
            face_normals,
            aabb,
        })
    }

    pub fn face_count(&self) -> usize {
        self.face_normals.len()
    }

    fn cast(&self, id: u32, ray: &Ray, max_toi: f64) -> Option<RayHit> {
        let hit = self
            .shape
            .cast_local_ray_and_get_normal(ray, max_toi, false)?;

        // Back face hits are reported with the face index offset by the number of triangles
        let n = self.face_normals.len() as u32;
        let face_id = match hit.feature {
            FeatureId::Face(f) if n > 0 => f % n,
            _ => INVALID_ID,
        };

        let mut normal = if face_id == INVALID_ID {
            hit.normal
        } else {
            self.face_normals[face_id as usize]
        };
        if normal.dot(&ray.dir) > 0.0 {
            normal = -normal;
        }

        Some(RayHit {
            range: hit.time_of_impact,
            normal,
            face_id,
            geom_id: id,
            object_id: id,
        })
    }
}

pub(crate) struct InstanceAccel {
    transform: ScaledIso3,
    child: SceneHandle,
    aabb: Option<Aabb>,
}

impl InstanceAccel {
    pub fn new(transform: ScaledIso3, child: SceneHandle) -> Self {
        let aabb = child.aabb().map(|a| transform.transform_aabb(&a));
        Self {
            transform,
            child,
            aabb,
        }
    }

    pub fn transform(&self) -> ScaledIso3 {
        self.transform
    }

    pub fn child(&self) -> &SceneHandle {
        &self.child
    }

    fn cast(&self, id: u32, ray: &Ray, max_toi: f64) -> Option<RayHit> {
        // The local direction is not re-normalized, so the ray parameter (and therefore the
        // range) is the same in both frames.
        let local = Ray::new(
            self.transform.inverse_transform_point(&ray.origin),
            self.transform.inverse_transform_vector(&ray.dir),
        );
        let mut hit = self.child.accel.cast(&local, max_toi)?;
        hit.normal = self.transform.transform_normal(&hit.normal);
        hit.object_id = id;
        Some(hit)
    }
}

#[derive(Clone)]
pub(crate) enum AccelEntry {
    Mesh { id: u32, mesh: Arc<MeshAccel> },
    Instance { id: u32, instance: Arc<InstanceAccel> },
}

impl AccelEntry {
    pub fn id(&self) -> u32 {
        match self {
            AccelEntry::Mesh { id, .. } => *id,
            AccelEntry::Instance { id, .. } => *id,
        }
    }

    fn aabb(&self) -> Option<Aabb> {
        match self {
            AccelEntry::Mesh { mesh, .. } => Some(mesh.aabb),
            AccelEntry::Instance { instance, .. } => instance.aabb,
        }
    }

    fn depth(&self) -> usize {
        match self {
            AccelEntry::Mesh { .. } => 1,
            AccelEntry::Instance { instance, .. } => 1 + instance.child.depth(),
        }
    }

    /// True if both entries point at the same committed geometry state.
    fn same_state(&self, other: &AccelEntry) -> bool {
        match (self, other) {
            (AccelEntry::Mesh { mesh: a, .. }, AccelEntry::Mesh { mesh: b, .. }) => {
                Arc::ptr_eq(a, b)
            }
            (
                AccelEntry::Instance { instance: a, .. },
                AccelEntry::Instance { instance: b, .. },
            ) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn cast(&self, ray: &Ray, max_toi: f64) -> Option<RayHit> {
        match self {
            AccelEntry::Mesh { id, mesh } => mesh.cast(*id, ray, max_toi),
            AccelEntry::Instance { id, instance } => instance.cast(*id, ray, max_toi),
        }
    }
}

pub(crate) struct SceneAccel {
    entries: Vec<AccelEntry>,
    qbvh: Qbvh<u32>,
    aabb: Option<Aabb>,
    depth: usize,
}

impl SceneAccel {
    /// Build a new top level structure from scratch. The entries should be ordered by id.
    pub fn build(entries: Vec<AccelEntry>) -> Self {
        let leaves = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.aabb().map(|a| (i as u32, a)))
            .collect::<Vec<_>>();

        let mut qbvh = Qbvh::new();
        if !leaves.is_empty() {
            qbvh.clear_and_rebuild(leaves.into_iter(), 0.0);
        }

        Self::from_parts(entries, qbvh)
    }

    /// Refit the bounding volumes of an existing structure to a new set of entries with the same
    /// topology, re-using the tree layout. Returns `None` if the topology differs, in which case
    /// the structure must be rebuilt.
    pub fn refit(&self, entries: Vec<AccelEntry>, rebalance: bool) -> Option<Self> {
        if entries.len() != self.entries.len() {
            return None;
        }

        let topology_matches = self.entries.iter().zip(entries.iter()).all(|(old, new)| {
            old.id() == new.id() && old.aabb().is_some() == new.aabb().is_some()
        });
        if !topology_matches {
            return None;
        }

        let mut qbvh = self.qbvh.clone();
        let mut changed = 0;
        for (i, (old, new)) in self.entries.iter().zip(entries.iter()).enumerate() {
            if !old.same_state(new) && new.aabb().is_some() {
                qbvh.pre_update_or_insert(i as u32);
                changed += 1;
            }
        }

        if changed > 0 {
            let aabbs = entries
                .iter()
                .map(|e| e.aabb().unwrap_or_else(Aabb::new_invalid))
                .collect::<Vec<_>>();
            let mut workspace = QbvhUpdateWorkspace::default();
            qbvh.refit(0.0, &mut workspace, |leaf: &u32| aabbs[*leaf as usize]);
            if rebalance {
                qbvh.rebalance(0.0, &mut workspace);
            }
        }

        Some(Self::from_parts(entries, qbvh))
    }

    fn from_parts(entries: Vec<AccelEntry>, qbvh: Qbvh<u32>) -> Self {
        let aabb = entries
            .iter()
            .filter_map(|e| e.aabb())
            .reduce(|a, b| a.merged(&b));
        let depth = entries.iter().map(|e| e.depth()).max().unwrap_or(0);
        Self {
            entries,
            qbvh,
            aabb,
            depth,
        }
    }

    /// True if the structure was built from exactly these entries, in which case committing them
    /// again would change nothing.
    pub fn matches(&self, entries: &[AccelEntry]) -> bool {
        self.entries.len() == entries.len()
            && self
                .entries
                .iter()
                .zip(entries.iter())
                .all(|(a, b)| a.id() == b.id() && a.same_state(b))
    }

    fn cast(&self, ray: &Ray, max_toi: f64) -> Option<RayHit> {
        if self.aabb.is_none() {
            return None;
        }

        let mut best: Option<RayHit> = None;
        let mut limit = max_toi;
        {
            let entries = &self.entries;
            let mut on_leaf = |leaf: &u32| {
                if let Some(hit) = entries[*leaf as usize].cast(ray, limit) {
                    if hit.range <= limit {
                        limit = hit.range;
                        best = Some(hit);
                    }
                }
                true
            };
            let mut visitor = RayIntersectionsVisitor::new(ray, max_toi, &mut on_leaf);
            self.qbvh.traverse_depth_first(&mut visitor);
        }
        best
    }
}

/// A handle to a committed scene. This is the only thing ray queries need; it keeps the
/// committed structure (and every structure it references) alive until the last clone of the
/// handle is dropped, and is independent of later edits to the scene it came from.
#[derive(Clone)]
pub struct SceneHandle {
    accel: Arc<SceneAccel>,
}

impl SceneHandle {
    pub(crate) fn new(accel: SceneAccel) -> Self {
        Self {
            accel: Arc::new(accel),
        }
    }

    pub(crate) fn accel(&self) -> &SceneAccel {
        &self.accel
    }

    /// Cast a single ray and return the closest hit whose distance lies in `[t_min, t_max]`.
    /// Distances are measured in multiples of the length of `direction`, so with a unit direction
    /// the returned range is a metric distance from `origin`.
    pub fn intersect(
        &self,
        origin: &Point3,
        direction: &Vector3,
        t_min: f64,
        t_max: f64,
    ) -> Option<RayHit> {
        if t_max < t_min {
            return None;
        }

        // parry has no near clipping distance, so the ray is started at t_min instead
        let ray = Ray::new(origin + direction * t_min, *direction);
        let mut hit = self.accel.cast(&ray, t_max - t_min)?;
        hit.range += t_min;
        Some(hit)
    }

    /// The bounding box of everything in the committed scene, `None` if it is empty.
    pub fn aabb(&self) -> Option<Aabb> {
        self.accel.aabb
    }

    /// Number of top level geometries in the committed scene.
    pub fn len(&self) -> usize {
        self.accel.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accel.entries.is_empty()
    }

    /// Levels of the committed hierarchy, 1 for a scene of meshes only.
    pub fn depth(&self) -> usize {
        self.accel.depth
    }

    /// True if both handles refer to the same committed structure.
    pub fn ptr_eq(&self, other: &SceneHandle) -> bool {
        Arc::ptr_eq(&self.accel, &other.accel)
    }
}

impl std::fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneHandle")
            .field("len", &self.len())
            .field("depth", &self.depth())
            .finish()
    }
}
