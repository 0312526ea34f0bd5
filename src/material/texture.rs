//! Texture decoding and the shared texture blob.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use image::{DynamicImage, ImageReader};

use super::resource::ResourceContext;
use crate::util::{Error, Result};

/// Pixel layout of a baked texture.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Luminance8 = 0,
    Luminance32F = 1,
    Rgba8 = 2,
    Rgba32F = 3,
}

impl TextureFormat {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Luminance8),
            1 => Some(Self::Luminance32F),
            2 => Some(Self::Rgba8),
            3 => Some(Self::Rgba32F),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Luminance8 => 1,
            Self::Luminance32F | Self::Rgba8 => 4,
            Self::Rgba32F => 16,
        }
    }
}

/// Decoded texture pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Texture {
    /// Decode an image file.
    ///
    /// Single-channel images become luminance, three and four channel images
    /// become RGBA. 8-bit sources stay 8-bit, everything else is converted to
    /// 32-bit float.
    pub fn load(path: &Path) -> Result<Self> {
        let err = |reason: String| Error::Texture {
            path: path.to_path_buf(),
            reason,
        };

        let img = ImageReader::open(path)
            .map_err(|e| err(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| err(e.to_string()))?
            .decode()
            .map_err(|e| err(e.to_string()))?;

        Self::from_image(&img).map_err(err)
    }

    pub fn from_image(img: &DynamicImage) -> std::result::Result<Self, String> {
        let color = img.color();
        let channels = color.channel_count();
        let eight_bit = color.bytes_per_pixel() == channels;
        let (width, height) = (img.width(), img.height());

        let (format, data) = match (channels, eight_bit) {
            (1, true) => (TextureFormat::Luminance8, img.to_luma8().into_raw()),
            (1, false) => (
                TextureFormat::Luminance32F,
                bytemuck::cast_slice(img.to_luma32f().as_raw()).to_vec(),
            ),
            (3 | 4, true) => (TextureFormat::Rgba8, img.to_rgba8().into_raw()),
            (3 | 4, false) => (
                TextureFormat::Rgba32F,
                bytemuck::cast_slice(img.to_rgba32f().as_raw()).to_vec(),
            ),
            (n, _) => return Err(format!("unsupported channel count {n}")),
        };

        Ok(Self {
            format,
            width,
            height,
            data,
        })
    }
}

/// Location of one texture inside the blob (24 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct TextureMetadata {
    pub format: u32,
    pub width: u32,
    pub height: u32,
    pub _pad: u32,
    /// Byte offset into the texture blob, always a multiple of 4.
    pub offset: u64,
}

/// Undo point for [`TextureStore::rollback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCheckpoint {
    data_len: usize,
    count: usize,
}

/// Deduplicated, dword-aligned texture blob.
#[derive(Debug, Default)]
pub struct TextureStore {
    data: Vec<u8>,
    metadata: Vec<TextureMetadata>,
    cache: HashMap<PathBuf, i32>,
}

impl TextureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn metadata(&self) -> &[TextureMetadata] {
        &self.metadata
    }

    /// Texture index for `name`, decoding it on first use.
    ///
    /// A name that does not resolve to a file is not an error: it logs a
    /// warning and yields -1.
    pub fn bake(&mut self, ctx: &ResourceContext, name: &str) -> Result<i32> {
        let Some(path) = ctx.resolve(name) else {
            tracing::warn!(texture = name, base = %ctx.base_dir().display(), "texture not found, ignoring");
            return Ok(-1);
        };

        if let Some(&index) = self.cache.get(&path) {
            return Ok(index);
        }

        let texture = Texture::load(&path)?;
        tracing::debug!(
            path = %path.display(),
            width = texture.width,
            height = texture.height,
            format = ?texture.format,
            "baked texture"
        );
        let index = self.push(texture);
        self.cache.insert(path, index);
        Ok(index)
    }

    /// Append pixels, padding the blob to a 4-byte boundary.
    pub fn push(&mut self, texture: Texture) -> i32 {
        let offset = self.data.len();
        self.data.extend_from_slice(&texture.data);
        let padded = self.data.len().next_multiple_of(4);
        self.data.resize(padded, 0);

        self.metadata.push(TextureMetadata {
            format: texture.format as u32,
            width: texture.width,
            height: texture.height,
            _pad: 0,
            offset: offset as u64,
        });
        (self.metadata.len() - 1) as i32
    }

    pub fn checkpoint(&self) -> TextureCheckpoint {
        TextureCheckpoint {
            data_len: self.data.len(),
            count: self.metadata.len(),
        }
    }

    /// Drop every texture added since `cp`.
    pub fn rollback(&mut self, cp: TextureCheckpoint) {
        self.data.truncate(cp.data_len);
        self.metadata.truncate(cp.count);
        self.cache.retain(|_, index| (*index as usize) < cp.count);
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<TextureMetadata>) {
        (self.data, self.metadata)
    }
}
