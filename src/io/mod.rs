//! Compiled scene container.
//!
//! A container is `[uncompressed_size: u64 LE][zlib(payload)]`, where the
//! payload layout is described in [`container`].

pub mod compression;
pub mod container;

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::scene::Scene;
use crate::util::{Error, Result};

pub use compression::{compress, decompress, is_compressed};
pub use container::{decode_payload, encode_payload};

/// Serialize and compress `scene`.
#[tracing::instrument(skip_all, fields(nodes = scene.bvh_nodes.len(), level = level))]
pub fn to_bytes(scene: &Scene, level: u32) -> Result<Vec<u8>> {
    let start = Instant::now();
    let payload = encode_payload(scene)?;
    let bytes = compress(&payload, level)?;
    debug!(
        payload = payload.len(),
        compressed = bytes.len(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "serialized scene"
    );
    Ok(bytes)
}

/// Decompress and parse a container produced by [`to_bytes`].
pub fn from_bytes(data: &[u8]) -> Result<Scene> {
    let payload = decompress(data)?;
    decode_payload(&payload)
}

/// Write `scene` to `path` as a compressed container.
pub fn write_scene(path: impl AsRef<Path>, scene: &Scene, level: u32) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_bytes(scene, level)?;
    std::fs::write(path, &bytes).map_err(|e| Error::Resource {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote scene");
    Ok(())
}

/// Read a container written by [`write_scene`].
pub fn read_scene(path: impl AsRef<Path>) -> Result<Scene> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| Error::Resource {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    from_bytes(&bytes)
}
