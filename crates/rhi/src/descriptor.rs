//! Descriptor set layout, pool and writes for the object binding table.
//!
//! Every draw binds one set with the same three slots:
//!
//! | binding | resource                 | stage    |
//! |---------|--------------------------|----------|
//! | 0       | material uniform         | fragment |
//! | 1       | WVP uniform              | vertex   |
//! | 2       | texture + static sampler | fragment |
//!
//! The sampler on binding 2 is immutable, baked into the layout.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

pub const MATERIAL_BINDING: u32 = 0;
pub const TRANSFORM_BINDING: u32 = 1;
pub const TEXTURE_BINDING: u32 = 2;

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Layout of the object binding table with `sampler` baked into
    /// binding 2.
    pub fn for_objects(device: Arc<Device>, sampler: vk::Sampler) -> RhiResult<Self> {
        let samplers = [sampler];
        let bindings = object_bindings(&samplers);
        Self::new(device, &bindings)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

fn object_bindings(samplers: &[vk::Sampler; 1]) -> [vk::DescriptorSetLayoutBinding<'_>; 3] {
    [
        vk::DescriptorSetLayoutBinding::default()
            .binding(MATERIAL_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT),
        vk::DescriptorSetLayoutBinding::default()
            .binding(TRANSFORM_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX),
        vk::DescriptorSetLayoutBinding::default()
            .binding(TEXTURE_BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .immutable_samplers(samplers),
    ]
}

/// Pool sizes for `max_sets` object binding tables.
pub fn object_pool_sizes(max_sets: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(max_sets * 2),
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(max_sets),
    ]
}

/// Pool whose sets can be freed individually.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    pub fn for_objects(device: Arc<Device>, max_sets: u32) -> RhiResult<Self> {
        Self::new(device, max_sets, &object_pool_sizes(max_sets))
    }

    pub fn allocate(&self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }

    /// The set must not be referenced by pending GPU work.
    pub fn free(&self, set: vk::DescriptorSet) -> RhiResult<()> {
        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, &[set])?;
        }
        Ok(())
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Resources referenced by one object binding table.
#[derive(Debug, Clone, Copy)]
pub struct ObjectBindings {
    pub material: vk::Buffer,
    pub material_size: vk::DeviceSize,
    pub transform: vk::Buffer,
    pub transform_size: vk::DeviceSize,
    pub texture_view: vk::ImageView,
}

/// Points `set` at the resources in `bindings`.
pub fn write_object_set(device: &Device, set: vk::DescriptorSet, bindings: &ObjectBindings) {
    let material = [vk::DescriptorBufferInfo::default()
        .buffer(bindings.material)
        .offset(0)
        .range(bindings.material_size)];
    let transform = [vk::DescriptorBufferInfo::default()
        .buffer(bindings.transform)
        .offset(0)
        .range(bindings.transform_size)];
    // The sampler comes from the layout.
    let texture = [vk::DescriptorImageInfo::default()
        .image_view(bindings.texture_view)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];

    let writes = [
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(MATERIAL_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&material),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(TRANSFORM_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&transform),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(TEXTURE_BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&texture),
    ];

    unsafe {
        device.handle().update_descriptor_sets(&writes, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_bindings_layout() {
        let samplers = [vk::Sampler::null()];
        let bindings = object_bindings(&samplers);

        assert_eq!(bindings[0].binding, MATERIAL_BINDING);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(bindings[1].binding, TRANSFORM_BINDING);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            bindings[2].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(bindings[2].descriptor_count, 1);
        assert!(!bindings[2].p_immutable_samplers.is_null());
    }

    #[test]
    fn test_object_pool_sizes() {
        let sizes = object_pool_sizes(8);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 16);
        assert_eq!(sizes[1].descriptor_count, 8);
    }
}
