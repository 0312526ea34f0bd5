//! Compile options

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::bvh::BuildOptions;
use crate::util::{Error, Result};

/// Options controlling scene compilation and serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    // Bottom-level BVH
    pub min_primitives_per_leaf: usize,

    // SAH split search
    pub split_candidates: u32,
    pub min_axis_extent: f32,
    pub min_split_step: f32,

    // Threads used for split scoring, 0 = one per hardware thread
    pub worker_threads: usize,

    // zlib level, 0-9
    pub compression_level: u32,

    // Camera
    pub aspect_ratio: f32,

    // Abort on the first material that fails to compile
    pub strict_materials: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            min_primitives_per_leaf: 10,
            split_candidates: 100,
            min_axis_extent: 1e-3,
            min_split_step: 1e-5,
            worker_threads: 0,
            compression_level: 9,
            aspect_ratio: 1.25,
            strict_materials: false,
        }
    }
}

impl CompileOptions {
    /// Load options from a JSON file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Resource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let options: Self = serde_json::from_str(&text)?;
        options.check()?;
        Ok(options)
    }

    /// Save options as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject values the compiler cannot work with.
    pub fn check(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(Error::other(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        if self.split_candidates < 2 {
            return Err(Error::other("split_candidates must be at least 2"));
        }
        if !(self.aspect_ratio > 0.0) {
            return Err(Error::other("aspect_ratio must be positive"));
        }
        Ok(())
    }

    /// Builder options for the per-mesh trees.
    pub fn mesh_build_options(&self) -> BuildOptions {
        BuildOptions {
            min_leaf_size: self.min_primitives_per_leaf.max(1),
            max_leaf_size: None,
            split_candidates: self.split_candidates,
            min_axis_extent: self.min_axis_extent,
            min_split_step: self.min_split_step,
        }
    }

    /// Builder options for the instance tree: one instance per leaf.
    pub fn instance_build_options(&self) -> BuildOptions {
        BuildOptions {
            min_leaf_size: 1,
            max_leaf_size: Some(1),
            ..self.mesh_build_options()
        }
    }

    /// Dedicated pool for split scoring, if `worker_threads` asks for one.
    pub fn thread_pool(&self) -> Result<Option<rayon::ThreadPool>> {
        if self.worker_threads == 0 {
            return Ok(None);
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads)
            .thread_name(|i| format!("scenebake-sah-{i}"))
            .build()
            .map(Some)
            .map_err(|e| Error::other(format!("cannot start worker threads: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options: CompileOptions = serde_json::from_str(r#"{ "strict_materials": true }"#).unwrap();
        assert!(options.strict_materials);
        assert_eq!(options.min_primitives_per_leaf, 10);
        assert_eq!(options.split_candidates, 100);
        assert_eq!(options.aspect_ratio, 1.25);
    }

    #[test]
    fn test_load_save() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let options = CompileOptions {
            worker_threads: 2,
            compression_level: 1,
            ..Default::default()
        };
        options.save(file.path()).unwrap();
        assert_eq!(CompileOptions::load(file.path()).unwrap(), options);
    }

    #[test]
    fn test_check_rejects_bad_level() {
        let options = CompileOptions {
            compression_level: 12,
            ..Default::default()
        };
        assert!(options.check().is_err());
    }

    #[test]
    fn test_instance_options() {
        let o = CompileOptions::default().instance_build_options();
        assert_eq!(o.min_leaf_size, 1);
        assert_eq!(o.max_leaf_size, Some(1));
        assert_eq!(o.split_candidates, 100);
    }

    #[test]
    fn test_thread_pool() {
        assert!(CompileOptions::default().thread_pool().unwrap().is_none());
        let pool = CompileOptions {
            worker_threads: 2,
            ..Default::default()
        }
        .thread_pool()
        .unwrap()
        .unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }
}
