//! Scenes before and after compilation.
//!
//! - [`RawScene`] - editable input: meshes, instances, material expressions, camera
//! - [`SceneDescription`] - JSON form of a raw scene
//! - [`Scene`] - flattened output with the two-level BVH and packed materials
//! - [`compile`] / [`SceneCompiler`] - raw to compiled
//! - [`SceneStats`] / [`RawStats`] - summaries for reporting

mod camera;
mod compiled;
mod compiler;
mod description;
mod raw;
mod stats;

pub use camera::*;
pub use compiled::*;
pub use compiler::{compile, SceneCompiler};
pub use description::*;
pub use raw::*;
pub use stats::*;
