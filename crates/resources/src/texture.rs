//! CPU-side texture data and mip chain generation.
//!
//! # Overview
//!
//! [`TextureData`] holds RGBA8 texels as a list of [`MipLevel`]s, level 0
//! first. Each level records its row and slice pitch so the uploader can lay
//! levels out in a staging buffer without recomputing them.
//!
//! # Example
//!
//! ```no_run
//! use lumen_resources::TextureData;
//!
//! # fn example() -> lumen_resources::ResourceResult<()> {
//! let texture = TextureData::load("assets/uvChecker.png")?.with_mips();
//! for level in texture.levels() {
//!     println!("{}x{} pitch {}", level.width, level.height, level.row_pitch);
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::error::{ResourceError, ResourceResult};

/// Bytes per RGBA8 texel.
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    /// Bytes per row.
    pub row_pitch: usize,
    /// Bytes for the whole level.
    pub slice_pitch: usize,
    pub pixels: Vec<u8>,
}

impl MipLevel {
    fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let row_pitch = width as usize * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            row_pitch,
            slice_pitch: row_pitch * height as usize,
            pixels: image.into_raw(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureData {
    levels: Vec<MipLevel>,
}

impl TextureData {
    /// Decodes an image file to RGBA8 (single level).
    ///
    /// # Errors
    ///
    /// [`ResourceError::FileNotFound`] if `path` does not exist, or the
    /// decoder's error.
    pub fn load(path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let image = image::open(path)?.to_rgba8();
        info!(
            "Loaded texture {:?} ({}x{})",
            path,
            image.width(),
            image.height()
        );

        Ok(Self {
            levels: vec![MipLevel::from_image(image)],
        })
    }

    /// Loads `path`, or falls back to a checkerboard when it cannot be read.
    pub fn load_or_checkerboard(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(texture) => texture,
            Err(e) => {
                warn!("Using generated checkerboard in place of {:?}: {}", path, e);
                Self::checkerboard(256, 8)
            }
        }
    }

    /// Wraps raw RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidTexture`] if the dimensions are zero or the
    /// byte count does not match them.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> ResourceResult<Self> {
        if width == 0 || height == 0 {
            return Err(ResourceError::InvalidTexture(format!(
                "zero-sized texture {}x{}",
                width, height
            )));
        }

        let len = pixels.len();
        let image = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            ResourceError::InvalidTexture(format!(
                "{} bytes cannot hold {}x{} RGBA8 texels",
                len, width, height
            ))
        })?;
        if len != width as usize * height as usize * BYTES_PER_PIXEL {
            return Err(ResourceError::InvalidTexture(format!(
                "{} bytes for {}x{} RGBA8 texels",
                len, width, height
            )));
        }

        Ok(Self {
            levels: vec![MipLevel::from_image(image)],
        })
    }

    /// Square `size` texture of `cells` x `cells` alternating white and
    /// gray squares.
    pub fn checkerboard(size: u32, cells: u32) -> Self {
        let size = size.max(1);
        let cell = (size / cells.max(1)).max(1);
        let image = RgbaImage::from_fn(size, size, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([64, 64, 64, 255])
            }
        });

        Self {
            levels: vec![MipLevel::from_image(image)],
        }
    }

    /// Replaces any existing chain with a full one down to 1x1, each level
    /// half the previous (rounded down, minimum 1).
    pub fn with_mips(self) -> Self {
        let Some(base) = self.levels.into_iter().next() else {
            return Self { levels: Vec::new() };
        };

        let (width, height) = (base.width, base.height);
        let mut levels = Vec::with_capacity(mip_count(width, height) as usize);
        let mut current = match RgbaImage::from_raw(width, height, base.pixels) {
            Some(image) => image,
            None => return Self { levels: Vec::new() },
        };

        loop {
            let (w, h) = current.dimensions();
            let next = if w > 1 || h > 1 {
                Some(imageops::resize(
                    &current,
                    (w / 2).max(1),
                    (h / 2).max(1),
                    FilterType::Triangle,
                ))
            } else {
                None
            };
            levels.push(MipLevel::from_image(current));
            match next {
                Some(image) => current = image,
                None => break,
            }
        }

        debug!(
            "Generated {} mip level(s) for {}x{} texture",
            levels.len(),
            width,
            height
        );

        Self { levels }
    }

    #[inline]
    pub fn levels(&self) -> &[MipLevel] {
        &self.levels
    }

    pub fn width(&self) -> u32 {
        self.levels.first().map_or(0, |l| l.width)
    }

    pub fn height(&self) -> u32 {
        self.levels.first().map_or(0, |l| l.height)
    }

    #[inline]
    pub fn mip_count(&self) -> usize {
        self.levels.len()
    }
}

/// Levels in a full chain for the given base size.
pub fn mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}
