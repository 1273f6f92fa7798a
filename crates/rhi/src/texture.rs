//! Sampled textures and the static sampler.
//!
//! [`Texture::upload`] creates a device-local image with one level per
//! supplied mip and copies every level from a single staging buffer in a
//! one-time submission. The image ends in `SHADER_READ_ONLY_OPTIMAL` and is
//! never transitioned again.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::submit_immediate;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};

/// Texel format of every uploaded texture.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// One level of tightly packed RGBA8 texels.
#[derive(Debug, Clone, Copy)]
pub struct MipData<'a> {
    pub width: u32,
    pub height: u32,
    pub bytes: &'a [u8],
}

pub struct Texture {
    image: Image,
}

impl Texture {
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if `mips` is empty or a level's byte count
    /// does not match its extent; otherwise any upload failure.
    pub fn upload(device: Arc<Device>, mips: &[MipData<'_>]) -> RhiResult<Self> {
        let base = mips
            .first()
            .ok_or_else(|| RhiError::InvalidHandle("Texture has no mip levels".to_string()))?;

        let offsets = staging_layout(mips)?;
        let total = offsets.last().copied().unwrap_or(0)
            + mips.last().map_or(0, |m| m.bytes.len() as vk::DeviceSize);

        let staging = Buffer::new(device.clone(), BufferUsage::Staging, total)?;
        for (mip, &offset) in mips.iter().zip(&offsets) {
            staging.write_data(offset, mip.bytes)?;
        }

        let image = Image::new(
            device.clone(),
            ImageDesc {
                width: base.width,
                height: base.height,
                format: TEXTURE_FORMAT,
                usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                aspect: vk::ImageAspectFlags::COLOR,
                mip_levels: mips.len() as u32,
                name: "texture",
            },
        )?;

        let regions: Vec<vk::BufferImageCopy> = mips
            .iter()
            .zip(&offsets)
            .enumerate()
            .map(|(level, (mip, &offset))| {
                vk::BufferImageCopy::default()
                    .buffer_offset(offset)
                    .image_subresource(
                        vk::ImageSubresourceLayers::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .mip_level(level as u32)
                            .layer_count(1),
                    )
                    .image_extent(vk::Extent3D {
                        width: mip.width,
                        height: mip.height,
                        depth: 1,
                    })
            })
            .collect();

        let levels = mips.len() as u32;
        submit_immediate(&device, |cmd| {
            cmd.transition_image_layout(
                image.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageAspectFlags::COLOR,
                levels,
            );
            cmd.copy_buffer_to_image(staging.handle(), image.handle(), &regions);
            cmd.transition_image_layout(
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageAspectFlags::COLOR,
                levels,
            );
            Ok(())
        })?;

        info!(
            "Uploaded texture {}x{} with {} mip level(s), {} bytes",
            base.width, base.height, levels, total
        );

        Ok(Self { image })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.desc().mip_levels
    }
}

/// Byte offset of each level inside the staging buffer.
///
/// Offsets are 4-byte aligned as buffer-to-image copies require.
fn staging_layout(mips: &[MipData<'_>]) -> RhiResult<Vec<vk::DeviceSize>> {
    let mut offsets = Vec::with_capacity(mips.len());
    let mut offset: vk::DeviceSize = 0;

    for (level, mip) in mips.iter().enumerate() {
        let expected = mip.width as usize * mip.height as usize * 4;
        if mip.width == 0 || mip.height == 0 || mip.bytes.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Mip level {} is {}x{} but holds {} bytes",
                level,
                mip.width,
                mip.height,
                mip.bytes.len()
            )));
        }
        offsets.push(offset);
        offset = (offset + mip.bytes.len() as vk::DeviceSize).next_multiple_of(4);
    }

    Ok(offsets)
}

/// Immutable linear/wrap sampler over the whole mip chain.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    pub fn linear_wrap(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = sampler_create_info();
        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

fn sampler_create_info() -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .compare_enable(false)
        .compare_op(vk::CompareOp::NEVER)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
    }
}
