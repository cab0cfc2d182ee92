//! COLLADA-subset loading pipeline: document index, element factory,
//! link resolution, mesh extraction.

pub mod error;

mod accessor;
mod anim;
mod document;
mod elements;
mod extract;
mod factory;
mod resolve;

use std::path::Path;

use log::info;

use self::document::Document;
use self::elements::Elements;
use self::error::{LoadError, Result};
use crate::mesh::Mesh;

/// Load a skeletal mesh from a document on disk.
pub fn load_mesh_from_path(path: impl AsRef<Path>) -> Result<Mesh> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_mesh_from_str(&xml)
}

/// Load a skeletal mesh from document text.
pub fn load_mesh_from_str(xml: &str) -> Result<Mesh> {
    let mut doc = Document::parse(xml)?;
    let mut elements = Elements::new(doc.node_count());
    let (visited, recreated) = factory::run(&mut doc, &mut elements)?;
    resolve::run(&doc, &mut elements)?;
    info!("document processed: {visited} nodes visited, {recreated} elements recreated");
    let mesh = extract::extract_mesh(&doc, &elements)?;
    info!(
        "mesh loaded: {} vertices, {} polylists, {} joints, {} animation channels",
        mesh.vertices.len(),
        mesh.polylists.len(),
        mesh.joints.len(),
        mesh.animation_channels.len()
    );
    Ok(mesh)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::document::Document;
    use super::elements::Elements;
    use super::error::Result;
    use super::{factory, resolve};

    /// Parse, recreate and resolve a document, without extraction.
    pub(crate) fn resolve_document(xml: &str) -> Result<(Document, Elements)> {
        let mut doc = Document::parse(xml)?;
        let mut elements = Elements::new(doc.node_count());
        factory::run(&mut doc, &mut elements)?;
        resolve::run(&doc, &mut elements)?;
        Ok((doc, elements))
    }
}
