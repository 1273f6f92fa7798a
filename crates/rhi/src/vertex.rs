//! Vertex format and input descriptions.
//!
//! Every mesh uses [`Vertex`]: a homogeneous position and a texture
//! coordinate, matching `VertexShaderInput` in `Object3D.VS.hlsl`.

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Position (float4) and UV (float2).
///
/// Plain arrays keep the layout tightly packed at 24 bytes; `glam::Vec4`
/// would pull in 16-byte alignment and trailing padding.
///
/// - location 0: position, offset 0
/// - location 1: tex_coord, offset 16
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 4],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    #[inline]
    pub const fn new(position: [f32; 4], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            tex_coord,
        }
    }

    /// Vertex at `(x, y, z, 1)`.
    #[inline]
    pub const fn at(x: f32, y: f32, z: f32, u: f32, v: f32) -> Self {
        Self::new([x, y, z, 1.0], [u, v])
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        assert_eq!(Vertex::binding_description().stride, 24);

        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 16);
        assert_eq!(attrs[1].location, 1);
    }

    #[test]
    fn test_vertex_at_sets_w() {
        let v = Vertex::at(0.5, -0.5, 0.0, 1.0, 1.0);
        assert_eq!(v.position, [0.5, -0.5, 0.0, 1.0]);
        assert_eq!(v.tex_coord, [1.0, 1.0]);
    }

    #[test]
    fn test_vertex_bytes() {
        let vertices = [Vertex::at(0.0, 0.5, 0.0, 0.5, 0.0); 3];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 72);
    }
}
