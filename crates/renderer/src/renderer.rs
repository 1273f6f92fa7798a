//! Scene pass on top of the frame orchestrator.
//!
//! [`Renderer`] owns every GPU object of the application: instance, surface,
//! device, the [`VulkanBackend`] driven by a [`FrameOrchestrator`], and the
//! pipeline plus per-object resources for the textured triangle pair and the
//! sprite quad.
//!
//! # Resource Destruction Order
//!
//! Fields are declared in drop order: render objects, then shared scene
//! resources, then the orchestrator (swapchain, depth, command pool, fence),
//! then device, surface and instance. [`Drop`] waits for the device to go idle
//! before any of them is released, unless the GPU was reported hung or lost.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use lumen_core::RendererConfig;
use lumen_core::config::{MAX_DESCRIPTOR_SETS, OBJECT_ARENA_CAPACITY};
use lumen_platform::{Surface, Window};
use lumen_resources::{Material, TextureData};
use lumen_rhi::adapter::{DEFAULT_FEATURE_LEVELS, VulkanAdapters, bootstrap_device};
use lumen_rhi::buffer::{Buffer, BufferUsage};
use lumen_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, ObjectBindings, write_object_set};
use lumen_rhi::device::Device;
use lumen_rhi::instance::{Instance, ValidationConfig};
use lumen_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use lumen_rhi::shader::{Shader, ShaderCompiler, ShaderProfile};
use lumen_rhi::texture::{MipData, Sampler, Texture};
use lumen_rhi::vertex::Vertex;
use lumen_rhi::{RhiError, RhiResult};
use lumen_scene::{Camera, Transform};

use crate::arena::{ObjectArena, ObjectHandle};
use crate::error::FrameResult;
use crate::orchestrator::{FrameConfig, FrameOrchestrator, FrameReport};
use crate::ubo::{MaterialUniform, TransformUniform};
use crate::vulkan::VulkanBackend;

pub const VERTEX_SHADER_PATH: &str = "shaders/Object3D.VS.hlsl";
pub const PIXEL_SHADER_PATH: &str = "shaders/Object3D.PS.hlsl";
pub const TEXTURE_PATH: &str = "assets/uvChecker.png";

/// Radians added to the triangle pair's Y rotation every frame.
pub const ROTATION_PER_FRAME: f32 = 0.01;

/// Two triangles; the second is tilted through depth.
pub const TRIANGLE_VERTICES: [Vertex; 6] = [
    Vertex::at(-0.5, -0.5, 0.0, 0.0, 1.0),
    Vertex::at(0.0, 0.5, 0.0, 0.5, 0.0),
    Vertex::at(0.5, -0.5, 0.0, 1.0, 1.0),
    Vertex::at(-0.5, -0.5, 0.5, 0.0, 1.0),
    Vertex::at(0.0, 0.0, 0.0, 0.5, 0.0),
    Vertex::at(0.5, -0.5, -0.5, 1.0, 1.0),
];

/// 640x360 pixel quad anchored at the top-left corner.
pub const SPRITE_VERTICES: [Vertex; 6] = [
    Vertex::at(0.0, 360.0, 0.0, 0.0, 1.0),
    Vertex::at(0.0, 0.0, 0.0, 0.0, 0.0),
    Vertex::at(640.0, 360.0, 0.0, 1.0, 1.0),
    Vertex::at(0.0, 0.0, 0.0, 0.0, 0.0),
    Vertex::at(640.0, 0.0, 0.0, 1.0, 0.0),
    Vertex::at(640.0, 360.0, 0.0, 1.0, 1.0),
];

/// Which camera an object is projected with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectPass {
    Scene,
    Sprite,
}

/// A drawable with its own vertex buffer, WVP buffer and descriptor set.
pub struct RenderObject {
    pub transform: Transform,
    pass: ObjectPass,
    descriptor_set: vk::DescriptorSet,
    vertex_buffer: Buffer,
    transform_buffer: Buffer,
    vertex_count: u32,
}

impl RenderObject {
    #[inline]
    pub fn pass(&self) -> ObjectPass {
        self.pass
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

pub struct Renderer {
    objects: ObjectArena<RenderObject>,
    material_buffer: Buffer,
    texture: Texture,
    descriptor_pool: DescriptorPool,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    set_layout: DescriptorSetLayout,
    _sampler: Sampler,
    orchestrator: FrameOrchestrator<VulkanBackend>,
    device: Arc<Device>,
    _surface: Surface,
    _instance: Instance,

    scene_camera: Camera,
    sprite_camera: Camera,
    /// The rotating pair; `None` once destroyed.
    triangle: Option<ObjectHandle>,
}

impl Renderer {
    /// Brings up the device and swapchain for `window`, compiles the shaders,
    /// uploads the texture and creates the triangle pair and sprite.
    ///
    /// # Errors
    ///
    /// Any initialization failure. Shader compilation errors carry the
    /// compiler diagnostics.
    pub fn new(window: &Window, config: &RendererConfig) -> FrameResult<Self> {
        let config = RendererConfig {
            width: window.width(),
            height: window.height(),
            ..config.clone()
        };
        info!(
            "Initializing renderer ({}x{})",
            config.width, config.height
        );

        let validation = if config.validation {
            ValidationConfig::for_build()
        } else {
            ValidationConfig::disabled()
        };
        let instance = Instance::new(&validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let bootstrapped = bootstrap_device(
            &VulkanAdapters::new(&instance, surface.handle(), surface.loader()),
            DEFAULT_FEATURE_LEVELS,
        )?;
        for rejection in &bootstrapped.rejected {
            debug!(
                "Bootstrap rejected '{}' at {}: {}",
                rejection.adapter, rejection.level, rejection.reason
            );
        }
        let device = bootstrapped.device;

        let backend = VulkanBackend::new(&instance, device.clone(), surface.handle(), &config)?;
        let color_format = backend.swapchain().format();
        let depth_format = backend.depth_buffer().format();
        let orchestrator = FrameOrchestrator::new(backend, FrameConfig::from(&config))?;

        let sampler = Sampler::linear_wrap(device.clone())?;
        let set_layout = DescriptorSetLayout::for_objects(device.clone(), sampler.handle())?;
        let pipeline_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()])?;
        let pipeline = create_pipeline(&device, &pipeline_layout, color_format, depth_format)?;
        let descriptor_pool = DescriptorPool::for_objects(device.clone(), MAX_DESCRIPTOR_SETS)?;

        let texture = upload_texture(&device, Path::new(TEXTURE_PATH))?;

        let material = Material::default();
        let material_buffer = Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            MaterialUniform::SIZE as vk::DeviceSize,
        )?;
        material_buffer.write(&MaterialUniform::from(&material))?;

        let mut renderer = Self {
            objects: ObjectArena::with_capacity(OBJECT_ARENA_CAPACITY),
            material_buffer,
            texture,
            descriptor_pool,
            pipeline,
            pipeline_layout,
            set_layout,
            _sampler: sampler,
            orchestrator,
            device,
            _surface: surface,
            _instance: instance,
            scene_camera: Camera::perspective(config.aspect_ratio()),
            sprite_camera: Camera::sprite(config.width as f32, config.height as f32),
            triangle: None,
        };

        let triangle =
            renderer.create_object(&TRIANGLE_VERTICES, ObjectPass::Scene, Transform::new())?;
        renderer.triangle = Some(triangle);
        renderer.create_object(&SPRITE_VERTICES, ObjectPass::Sprite, Transform::new())?;

        info!(
            "Renderer initialized: {} objects, texture with {} mip level(s)",
            renderer.objects.len(),
            renderer.texture.mip_levels()
        );
        Ok(renderer)
    }

    /// Adds a drawable.
    ///
    /// Only valid between frames: the descriptor set is written immediately.
    pub fn create_object(
        &mut self,
        vertices: &[Vertex],
        pass: ObjectPass,
        transform: Transform,
    ) -> FrameResult<ObjectHandle> {
        let object = ObjectResources {
            device: &self.device,
            pool: &self.descriptor_pool,
            layout: &self.set_layout,
            material: &self.material_buffer,
            texture: &self.texture,
        }
        .build(vertices, pass, transform)?;

        let handle = self.objects.insert(object);
        debug!("Created {:?} object {}", pass, handle);
        Ok(handle)
    }

    /// Removes a drawable and releases its GPU resources.
    ///
    /// Only valid between frames, when the fence has retired every use.
    pub fn destroy_object(&mut self, handle: ObjectHandle) -> FrameResult<()> {
        let object = self
            .objects
            .remove(handle)
            .ok_or_else(|| RhiError::InvalidHandle(format!("render object {}", handle)))?;
        self.descriptor_pool.free(object.descriptor_set)?;
        if self.triangle == Some(handle) {
            self.triangle = None;
        }
        debug!("Destroyed object {}", handle);
        Ok(())
    }

    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut RenderObject> {
        self.objects.get_mut(handle)
    }

    /// Updates the animation, writes every WVP and renders one frame.
    ///
    /// # Errors
    ///
    /// Protocol violations, [`FrameError::DeviceHung`] and
    /// [`FrameError::DeviceLost`] are fatal to the caller.
    ///
    /// [`FrameError::DeviceHung`]: crate::FrameError::DeviceHung
    /// [`FrameError::DeviceLost`]: crate::FrameError::DeviceLost
    pub fn render_frame(&mut self) -> FrameResult<FrameReport> {
        if let Some(handle) = self.triangle
            && let Some(triangle) = self.object_mut(handle)
        {
            triangle.transform.rotate.y += ROTATION_PER_FRAME;
        }

        // The previous frame's fence has completed, so the GPU no longer
        // reads these buffers.
        for object in self.objects.iter_mut() {
            let camera = match object.pass {
                ObjectPass::Scene => &self.scene_camera,
                ObjectPass::Sprite => &self.sprite_camera,
            };
            object
                .transform_buffer
                .write(&TransformUniform::new(camera.wvp(&object.transform)))?;
        }

        let frame = self.orchestrator.begin_frame()?;
        {
            let cmd = self.orchestrator.commands(&frame)?.recorder()?;
            cmd.bind_pipeline(self.pipeline.handle());
            for (_, object) in self.objects.iter() {
                cmd.bind_vertex_buffer(object.vertex_buffer.handle());
                cmd.bind_descriptor_set(self.pipeline_layout.handle(), object.descriptor_set);
                cmd.draw(object.vertex_count);
            }
        }
        self.orchestrator.end_frame(frame)
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.orchestrator.frame_count()
    }

    /// Flushes the fence so nothing is in flight, then releases every
    /// object.
    ///
    /// Objects are left to `Drop` when the device has failed.
    pub fn shutdown(&mut self) -> FrameResult<()> {
        self.orchestrator.shutdown()?;
        if self.orchestrator.is_device_failed() {
            return Ok(());
        }
        let handles: Vec<ObjectHandle> = self.objects.iter().map(|(handle, _)| handle).collect();
        for handle in handles {
            self.destroy_object(handle)?;
        }
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }
        info!("Renderer destroyed after {} frames", self.frame_count());
    }
}

/// Shared objects every render object's descriptor set points at.
struct ObjectResources<'a> {
    device: &'a Arc<Device>,
    pool: &'a DescriptorPool,
    layout: &'a DescriptorSetLayout,
    material: &'a Buffer,
    texture: &'a Texture,
}

impl ObjectResources<'_> {
    fn build(
        &self,
        vertices: &[Vertex],
        pass: ObjectPass,
        transform: Transform,
    ) -> RhiResult<RenderObject> {
        let vertex_buffer = Buffer::new_with_data(
            self.device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(vertices),
        )?;
        let transform_buffer = Buffer::new(
            self.device.clone(),
            BufferUsage::Uniform,
            TransformUniform::SIZE as vk::DeviceSize,
        )?;
        transform_buffer.write(&TransformUniform::default())?;

        let descriptor_set = self.pool.allocate(self.layout)?;
        write_object_set(
            self.device,
            descriptor_set,
            &ObjectBindings {
                material: self.material.handle(),
                material_size: self.material.size(),
                transform: transform_buffer.handle(),
                transform_size: transform_buffer.size(),
                texture_view: self.texture.view(),
            },
        );

        Ok(RenderObject {
            transform,
            pass,
            descriptor_set,
            vertex_buffer,
            transform_buffer,
            vertex_count: vertices.len() as u32,
        })
    }
}

fn create_pipeline(
    device: &Arc<Device>,
    layout: &PipelineLayout,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> FrameResult<Pipeline> {
    let compiler = ShaderCompiler::new();
    let vs_code = compiler.compile(Path::new(VERTEX_SHADER_PATH), ShaderProfile::Vertex6_0)?;
    let ps_code = compiler.compile(Path::new(PIXEL_SHADER_PATH), ShaderProfile::Pixel6_0)?;

    let vertex_shader = Shader::from_spirv_words(
        device.clone(),
        &vs_code,
        ShaderProfile::Vertex6_0.stage(),
        "main",
    )?;
    let pixel_shader = Shader::from_spirv_words(
        device.clone(),
        &ps_code,
        ShaderProfile::Pixel6_0.stage(),
        "main",
    )?;

    let pipeline = GraphicsPipelineBuilder::new()
        .vertex_shader(&vertex_shader)
        .fragment_shader(&pixel_shader)
        .vertex_input(
            Vertex::binding_description(),
            &Vertex::attribute_descriptions(),
        )
        .color_attachment_format(color_format)
        .depth_attachment_format(depth_format)
        .build(device.clone(), layout)?;
    Ok(pipeline)
}

fn upload_texture(device: &Arc<Device>, path: &Path) -> RhiResult<Texture> {
    let data = TextureData::load_or_checkerboard(path).with_mips();
    if data.mip_count() == 1 {
        warn!("Texture {:?} has a single mip level", path);
    }

    let mips: Vec<MipData<'_>> = data
        .levels()
        .iter()
        .map(|level| MipData {
            width: level.width,
            height: level.height,
            bytes: &level.pixels,
        })
        .collect();

    Texture::upload(device.clone(), &mips)
}
