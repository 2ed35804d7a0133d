//! Loading meshes from files.

#[cfg(feature = "stl")]
mod stl;

#[cfg(feature = "stl")]
pub use stl::{load_stl, load_stl_mesh, write_stl};
