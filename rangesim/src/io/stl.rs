use crate::errors::RaycastError;
use crate::map::{Mesh, Scene};
use crate::{Point3, Result, Vector3};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

fn load_error(path: &Path, reason: impl ToString) -> RaycastError {
    RaycastError::Load {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Read an ASCII or binary STL file into a new mesh in the `Modified` stage. Face normals stored
/// in the file are used when every one of them is non-zero; otherwise they are computed from the
/// triangle winding.
pub fn load_stl_mesh(path: &Path) -> Result<Arc<Mesh>> {
    let mut file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| load_error(path, e))?;
    let stl = stl_io::read_stl(&mut file).map_err(|e| load_error(path, e))?;

    if stl.faces.is_empty() {
        return Err(load_error(path, "the file contains no triangles"));
    }

    let vertices = stl
        .vertices
        .iter()
        .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect::<Vec<_>>();

    let mut faces = Vec::with_capacity(stl.faces.len());
    let mut normals = Vec::with_capacity(stl.faces.len());
    for face in stl.faces.iter() {
        faces.push([
            face.vertices[0] as u32,
            face.vertices[1] as u32,
            face.vertices[2] as u32,
        ]);
        normals.push(Vector3::new(
            face.normal[0] as f64,
            face.normal[1] as f64,
            face.normal[2] as f64,
        ));
    }

    let mesh = if normals.iter().all(|n| n.norm() > 1e-6) {
        Mesh::with_face_normals(vertices, faces, normals)
    } else {
        Mesh::new(vertices, faces)
    }
    .map_err(|e| load_error(path, e))?;

    log::info!(
        "loaded {} vertices and {} faces from {}",
        mesh.vertex_count(),
        mesh.face_count(),
        path.display()
    );
    Ok(mesh)
}

/// Read an STL file into a committed scene holding a single committed mesh, with id 0.
pub fn load_stl(path: &Path) -> Result<Arc<Scene>> {
    let mesh = load_stl_mesh(path)?;
    mesh.set_name(
        &path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
    );
    mesh.apply()?;
    mesh.commit()?;

    let scene = Scene::new();
    scene.add(mesh);
    scene.commit()?;
    Ok(scene)
}

/// Write the world buffers of an applied mesh (or its base buffers if it was never applied) to
/// a binary STL file.
pub fn write_stl(path: &Path, mesh: &Mesh) -> Result<()> {
    let vertices = mesh.world_vertices().unwrap_or_else(|| mesh.vertices());
    let normals = mesh
        .world_face_normals()
        .unwrap_or_else(|| mesh.face_normals());

    let to_vertex = |p: &Point3| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);
    let triangles = mesh
        .faces()
        .iter()
        .zip(normals.iter())
        .map(|(f, n)| stl_io::Triangle {
            normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
            vertices: [
                to_vertex(&vertices[f[0] as usize]),
                to_vertex(&vertices[f[1] as usize]),
                to_vertex(&vertices[f[2] as usize]),
            ],
        })
        .collect::<Vec<_>>();

    let mut file = File::create(path)?;
    stl_io::write_stl(&mut file, triangles.iter())?;
    Ok(())
}
