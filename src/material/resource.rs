//! Resolution of texture names relative to the file that declared them.

use std::path::{Path, PathBuf};

/// Where a material's relative resource names are looked up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceContext {
    base_dir: PathBuf,
}

impl ResourceContext {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Context for resources declared by the file at `path`.
    pub fn relative_to_file(path: &Path) -> Self {
        Self::new(path.parent().unwrap_or(Path::new("")))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve `name` to an existing file.
    ///
    /// Returns `None` when the file does not exist. Remote URIs are never
    /// fetched and always resolve to `None`. The returned path is
    /// canonical when possible so it can be used as a cache key.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.contains("://") {
            tracing::warn!(uri = name, "remote resources are not supported");
            return None;
        }

        // Accept both separators in scene files written on other platforms.
        let name = name.replace('\\', "/");
        let relative = Path::new(&name);
        let path = if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.base_dir.join(relative)
        };

        if !path.is_file() {
            return None;
        }
        Some(std::fs::canonicalize(&path).unwrap_or(path))
    }
}
