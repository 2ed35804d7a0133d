//! Triangle meshes. A mesh keeps its base vertices, faces, and normals in its local frame, and
//! `apply()` derives the world buffers (in the frame of the containing scene) by scaling and then
//! moving the base buffers by the mesh transform.

use super::accel::MeshAccel;
use super::geometry::{Placement, Stage};
use super::Scene;
use crate::common::BackRefs;
use crate::errors::RaycastError;
use crate::{Iso3, Point3, Result, Vector3};
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

const KIND: &str = "mesh";

pub struct Mesh {
    uuid: Uuid,
    state: RwLock<MeshState>,
    parents: BackRefs<Scene, u32>,
}

struct MeshState {
    placement: Placement,
    vertices: Vec<Point3>,
    faces: Vec<[u32; 3]>,

    /// Face normals given explicitly at construction, used instead of the ones computed from the
    /// triangle winding for as long as the face count does not change
    given_normals: Option<Vec<Vector3>>,

    world: Option<WorldBuffers>,
    committed: Option<Arc<MeshAccel>>,
}

#[derive(Clone)]
struct WorldBuffers {
    vertices: Vec<Point3>,
    face_normals: Vec<Vector3>,
    vertex_normals: Vec<Vector3>,
}

impl Mesh {
    /// Create a new mesh from vertices and triangle faces given as indices into the vertex list.
    /// The mesh starts out in the `Modified` stage with an identity transform.
    ///
    /// # Arguments
    ///
    /// * `vertices`: the base vertices in the mesh's local frame
    /// * `faces`: triangles as counter-clockwise (seen from outside) triples of vertex indices
    ///
    /// returns: Result<Arc<Mesh>, RaycastError>
    pub fn new(vertices: Vec<Point3>, faces: Vec<[u32; 3]>) -> Result<Arc<Self>> {
        check_faces(&faces, vertices.len())?;
        Ok(Self::from_parts(vertices, faces, None))
    }

    /// Create a new mesh with explicit per-face normals. There must be exactly one normal per face.
    pub fn with_face_normals(
        vertices: Vec<Point3>,
        faces: Vec<[u32; 3]>,
        face_normals: Vec<Vector3>,
    ) -> Result<Arc<Self>> {
        check_faces(&faces, vertices.len())?;
        if face_normals.len() != faces.len() {
            return Err(RaycastError::config(format!(
                "{} face normals were given for {} faces",
                face_normals.len(),
                faces.len()
            )));
        }

        let normals = face_normals
            .iter()
            .map(|n| n.try_normalize(1e-12).unwrap_or_else(Vector3::zeros))
            .collect();
        Ok(Self::from_parts(vertices, faces, Some(normals)))
    }

    /// Build a mesh whose face indices are already known to be valid.
    pub(crate) fn from_parts(
        vertices: Vec<Point3>,
        faces: Vec<[u32; 3]>,
        given_normals: Option<Vec<Vector3>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid: Uuid::new_v4(),
            state: RwLock::new(MeshState {
                placement: Placement::new(),
                vertices,
                faces,
                given_normals,
                world: None,
                committed: None,
            }),
            parents: BackRefs::new(),
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> Option<String> {
        self.state.read().placement.name.clone()
    }

    pub fn set_name(&self, name: &str) {
        self.state.write().placement.name = Some(name.to_string());
    }

    pub fn transform(&self) -> Iso3 {
        self.state.read().placement.transform.iso
    }

    pub fn set_transform(&self, iso: Iso3) {
        self.state.write().placement.set_iso(iso);
    }

    pub fn scale(&self) -> Vector3 {
        self.state.read().placement.transform.scale
    }

    pub fn set_scale(&self, scale: Vector3) {
        self.state.write().placement.set_scale(scale);
    }

    pub fn stage(&self) -> Stage {
        self.state.read().placement.stage
    }

    pub fn vertex_count(&self) -> usize {
        self.state.read().vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.state.read().faces.len()
    }

    /// The base vertices, in the local frame of the mesh.
    pub fn vertices(&self) -> Vec<Point3> {
        self.state.read().vertices.clone()
    }

    pub fn faces(&self) -> Vec<[u32; 3]> {
        self.state.read().faces.clone()
    }

    /// The base face normals, in the local frame of the mesh. Degenerate triangles get a zero
    /// normal.
    pub fn face_normals(&self) -> Vec<Vector3> {
        self.state.read().base_face_normals()
    }

    /// The base vertex normals, in the local frame of the mesh.
    pub fn vertex_normals(&self) -> Vec<Vector3> {
        let state = self.state.read();
        vertex_normals(&state.vertices, &state.faces)
    }

    /// Replace the base vertices. Fails without changing the mesh if any face refers to a vertex
    /// beyond the new vertex count.
    pub fn set_vertices(&self, vertices: Vec<Point3>) -> Result<()> {
        let mut state = self.state.write();
        check_faces(&state.faces, vertices.len())?;
        state.vertices = vertices;
        state.placement.stage = Stage::Modified;
        Ok(())
    }

    /// Replace the faces. Explicit face normals given at construction are dropped if the number
    /// of faces changes.
    pub fn set_faces(&self, faces: Vec<[u32; 3]>) -> Result<()> {
        let mut state = self.state.write();
        check_faces(&faces, state.vertices.len())?;
        if state
            .given_normals
            .as_ref()
            .is_some_and(|n| n.len() != faces.len())
        {
            state.given_normals = None;
        }
        state.faces = faces;
        state.placement.stage = Stage::Modified;
        Ok(())
    }

    /// Edit the base vertices in place. The vertex count cannot change this way.
    pub fn edit_vertices<F>(&self, f: F)
    where
        F: FnOnce(&mut [Point3]),
    {
        let mut state = self.state.write();
        f(&mut state.vertices);
        state.placement.stage = Stage::Modified;
    }

    /// Vertices in the frame of the containing scene, available after `apply()`.
    pub fn world_vertices(&self) -> Option<Vec<Point3>> {
        self.state.read().world.as_ref().map(|w| w.vertices.clone())
    }

    pub fn world_face_normals(&self) -> Option<Vec<Vector3>> {
        self.state
            .read()
            .world
            .as_ref()
            .map(|w| w.face_normals.clone())
    }

    pub fn world_vertex_normals(&self) -> Option<Vec<Vector3>> {
        self.state
            .read()
            .world
            .as_ref()
            .map(|w| w.vertex_normals.clone())
    }

    /// Recompute the world buffers from the base buffers and the current transform and scale.
    /// Fails if any scale component is zero.
    pub fn apply(&self) -> Result<()> {
        let mut state = self.state.write();
        let transform = state.placement.appliable(KIND)?;

        let vertices = state
            .vertices
            .iter()
            .map(|v| transform.transform_point(v))
            .collect();
        let face_normals = state
            .base_face_normals()
            .iter()
            .map(|n| transform.transform_normal(n))
            .collect();
        let vertex_normals = vertex_normals(&state.vertices, &state.faces)
            .iter()
            .map(|n| transform.transform_normal(n))
            .collect();

        state.world = Some(WorldBuffers {
            vertices,
            face_normals,
            vertex_normals,
        });
        state.placement.stage = Stage::Applied;
        Ok(())
    }

    /// Push the applied world buffers into the backend. Committing an already committed mesh does
    /// nothing. Fails if there are edits which have not been applied, or if the backend cannot
    /// build the mesh.
    pub fn commit(&self) -> Result<()> {
        let mut state = self.state.write();
        state.placement.committable(KIND)?;
        if state.placement.stage == Stage::Committed && state.committed.is_some() {
            return Ok(());
        }

        let world = state.world.clone().ok_or_else(|| {
            RaycastError::config(format!(
                "{} has never been applied",
                state.placement.label(KIND)
            ))
        })?;

        let accel = MeshAccel::build(world.vertices, state.faces.clone(), world.face_normals)?;
        log::trace!(
            "committed {} ({} faces)",
            state.placement.label(KIND),
            accel.face_count()
        );
        state.committed = Some(Arc::new(accel));
        state.placement.stage = Stage::Committed;
        Ok(())
    }

    pub fn ids(&self) -> Vec<(Arc<Scene>, u32)> {
        self.parents.alive()
    }

    pub fn id_in(&self, scene: &Arc<Scene>) -> Option<u32> {
        self.parents.get(scene)
    }

    pub fn parents(&self) -> Vec<Arc<Scene>> {
        self.parents.alive().into_iter().map(|(s, _)| s).collect()
    }

    pub fn is_attached(&self) -> bool {
        !self.parents.is_empty()
    }

    pub(crate) fn parent_refs(&self) -> &BackRefs<Scene, u32> {
        &self.parents
    }

    pub(crate) fn committed_accel(&self) -> Option<Arc<MeshAccel>> {
        self.state.read().committed.clone()
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Mesh")
            .field("uuid", &self.uuid)
            .field("name", &state.placement.name)
            .field("vertices", &state.vertices.len())
            .field("faces", &state.faces.len())
            .field("stage", &state.placement.stage)
            .finish()
    }
}

impl MeshState {
    fn base_face_normals(&self) -> Vec<Vector3> {
        match &self.given_normals {
            Some(n) => n.clone(),
            None => self
                .faces
                .iter()
                .map(|f| {
                    face_cross(&self.vertices, f)
                        .try_normalize(1e-12)
                        .unwrap_or_else(Vector3::zeros)
                })
                .collect(),
        }
    }
}

fn check_faces(faces: &[[u32; 3]], vertex_count: usize) -> Result<()> {
    for (i, face) in faces.iter().enumerate() {
        if face.iter().any(|&v| v as usize >= vertex_count) {
            return Err(RaycastError::config(format!(
                "face {} {:?} refers to a vertex outside of the {} vertices",
                i, face, vertex_count
            )));
        }
    }
    Ok(())
}

/// The (unnormalized) cross product of a triangle's edges, which points along the face normal and
/// has a length of twice the triangle's area.
fn face_cross(vertices: &[Point3], face: &[u32; 3]) -> Vector3 {
    let a = vertices[face[0] as usize];
    let b = vertices[face[1] as usize];
    let c = vertices[face[2] as usize];
    (b - a).cross(&(c - a))
}

/// Area weighted vertex normals. Vertices which are not part of any non-degenerate face get a
/// zero normal.
fn vertex_normals(vertices: &[Point3], faces: &[[u32; 3]]) -> Vec<Vector3> {
    let mut sums = vec![Vector3::zeros(); vertices.len()];
    for face in faces {
        let n = face_cross(vertices, face);
        for &i in face {
            sums[i as usize] += n;
        }
    }

    sums.into_iter()
        .map(|n| n.try_normalize(1e-12).unwrap_or_else(Vector3::zeros))
        .collect()
}
