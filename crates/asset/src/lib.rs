//! Asset loading: COLLADA-subset documents resolved into CPU-side
//! skeletal meshes.

pub mod collada;
pub mod mesh;

pub use collada::error::{LoadError, Result};
pub use collada::{load_mesh_from_path, load_mesh_from_str};
