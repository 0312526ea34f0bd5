//! zlib framing for the scene container.
//!
//! Format: `[uncompressed_size: u64 LE][zlib stream]`.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Compress `data` at `level` (0-9) and prepend its uncompressed size.
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(8 + data.len() / 2);
    out.extend_from_slice(&(data.len() as u64).to_le_bytes());

    let mut encoder = ZlibEncoder::new(out, Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`compress`]. The decompressed length must match the header.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 8 {
        return Err(Error::corrupt(format!("{} bytes is too short for a size header", data.len())));
    }
    if !is_compressed(data) {
        return Err(Error::corrupt("missing zlib header"));
    }

    let mut header = [0u8; 8];
    header.copy_from_slice(&data[..8]);
    let expected = u64::from_le_bytes(header);

    // Read at most one byte past the promised size so an oversized stream is
    // detected without inflating all of it.
    let mut decoder = ZlibDecoder::new(&data[8..]).take(expected.saturating_add(1));
    let mut out = Vec::with_capacity(expected.min(64 << 20) as usize);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::corrupt(format!("zlib stream: {e}")))?;

    if out.len() as u64 != expected {
        return Err(Error::SizeMismatch {
            expected,
            actual: out.len() as u64,
        });
    }
    Ok(out)
}

/// True if a zlib header follows the size prefix.
pub fn is_compressed(data: &[u8]) -> bool {
    if data.len() < 10 {
        return false;
    }

    // zlib header: 0x78 followed by 0x01, 0x5E, 0x9C, or 0xDA
    let zlib_header = data[8];
    let zlib_flags = data[9];

    zlib_header == 0x78 && matches!(zlib_flags, 0x01 | 0x5E | 0x9C | 0xDA)
}
