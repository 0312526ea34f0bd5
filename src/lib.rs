//! # scenebake
//!
//! Offline scene compiler for a path tracer.
//!
//! Turns an editable scene (meshes, instances, material expressions, a
//! camera) into a flat binary representation ready for ray traversal:
//! a two-level SAH BVH, packed material nodes, baked textures, flattened
//! triangle buffers and per-instance emissive primitives, stored in a
//! zlib-compressed container.
//!
//! ## Modules
//!
//! - [`util`] - Errors, math types and bounding boxes
//! - [`bvh`] - Node model and the generic parallel SAH builder
//! - [`material`] - Material expression parser, validation and compiler
//! - [`scene`] - Raw and compiled scene models, the scene compiler
//! - [`io`] - Binary container (serialize, compress, read, write)
//! - [`config`] - Compile options
//!
//! ## Example
//!
//! ```ignore
//! use scenebake::prelude::*;
//!
//! let raw = SceneDescription::load("scene.json")?;
//! let scene = compile(&raw, &CompileOptions::default())?;
//! scenebake::io::write_scene("scene.bin", &scene, 9)?;
//! ```

pub mod util;
pub mod bvh;
pub mod material;
pub mod scene;
pub mod io;
pub mod config;

use std::path::Path;
use std::time::Instant;

use tracing::info;

// Re-export commonly used types
pub use config::CompileOptions;
pub use scene::{compile, RawScene, RawStats, Scene, SceneStats};
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bvh::{BvhBuilder, BvhNode, BuildOptions, NodeKind, SahStrategy};
    pub use crate::config::CompileOptions;
    pub use crate::io::{from_bytes, read_scene, to_bytes, write_scene};
    pub use crate::material::{parse_expr, Expr, MaterialCompiler, MaterialNode, ResourceContext};
    pub use crate::scene::*;
    pub use crate::util::{BBox3f, Error, Result, Transform};
}

/// Statistics of a scene file, compiled or not.
#[derive(Debug, Clone, PartialEq)]
pub enum Stats {
    Compiled(SceneStats),
    Raw(RawStats),
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stats::Compiled(s) => s.fmt(f),
            Stats::Raw(s) => s.fmt(f),
        }
    }
}

/// Load a JSON scene description, compile it and write the container.
pub fn compile_file(input: impl AsRef<Path>, output: impl AsRef<Path>, options: &CompileOptions) -> Result<SceneStats> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let start = Instant::now();

    let mut raw = scene::SceneDescription::load(input)?;
    let unused = raw.prune_unused_materials();
    info!(
        input = %input.display(),
        triangles = raw.triangle_count(),
        materials = raw.materials.len(),
        unused,
        "loaded scene"
    );

    let compiled = compile(&raw, options)?;
    io::write_scene(output, &compiled, options.compression_level)?;

    info!(
        output = %output.display(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "compile finished"
    );
    Ok(SceneStats::from_scene(&compiled))
}

/// Statistics for a `.json` description or a compiled container.
///
/// Anything that is not `.json` is read as a container.
pub fn scene_stats(path: impl AsRef<Path>) -> Result<Stats> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let mut raw = scene::SceneDescription::load(path)?;
        raw.mark_used_materials();
        Ok(Stats::Raw(RawStats::from_raw(&raw)))
    } else {
        let compiled = io::read_scene(path)?;
        Ok(Stats::Compiled(SceneStats::from_scene(&compiled)))
    }
}
