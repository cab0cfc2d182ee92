//! Entry point for the Kostra3D mesh inspector: loads a skeletal mesh
//! document, optionally poses it, and reports what came out.

use anyhow::{Context, Result, bail};
use corelib::DVec3;

fn parse_path_arg() -> Option<String> {
    // Accept: --input=<path> or the first bare argument.
    let mut path = None;
    for arg in std::env::args().skip(1) {
        if let Some(v) = arg.strip_prefix("--input=") {
            path = Some(v.to_string());
        } else if !arg.starts_with("--") && path.is_none() {
            path = Some(arg);
        }
    }
    path
}

fn parse_time_arg() -> Option<f64> {
    // --time=<seconds>, animation evaluation time.
    for arg in std::env::args() {
        if let Some(v) = arg.strip_prefix("--time=") {
            match v.parse::<f64>() {
                Ok(t) => return Some(t),
                Err(_) => eprintln!("[warn] Bad --time value '{v}', ignoring."),
            }
        }
    }
    None
}

fn skinned_bounds(mesh: &asset::mesh::Mesh) -> Option<(DVec3, DVec3)> {
    let mut vertices = mesh.vertices.iter();
    let first = vertices.next()?;
    let mut min = first.skinned_position;
    let mut max = first.skinned_position;
    for vertex in vertices {
        min = min.min(vertex.skinned_position);
        max = max.max(vertex.skinned_position);
    }
    Some((min, max))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(path) = parse_path_arg() else {
        bail!("usage: app [--time=<seconds>] <document.dae>");
    };
    let time = parse_time_arg();

    let mut mesh = asset::load_mesh_from_path(&path).with_context(|| format!("loading '{path}'"))?;
    log::info!(
        "'{}': {} vertices, {} triangles, {} joints, {} animation channels",
        path,
        mesh.vertices.len(),
        mesh.triangle_count(),
        mesh.joints.len(),
        mesh.animation_channels.len()
    );
    if !mesh.is_valid() {
        log::warn!("the mesh carries no renderable geometry");
    }

    if let Some(t) = time {
        mesh.apply_animation(t);
        log::info!("posed at t={t}");
    }
    mesh.apply_skinning();
    if let Some((min, max)) = skinned_bounds(&mesh) {
        log::info!(
            "skinned bounds: min=({:.3}, {:.3}, {:.3}) max=({:.3}, {:.3}, {:.3})",
            min.x,
            min.y,
            min.z,
            max.x,
            max.y,
            max.z
        );
    }
    Ok(())
}
