//! Uniform buffer layouts shared with `shaders/Object3D.*.hlsl`.
//!
//! Both structs are `#[repr(C)]` and `Pod` so they can be written straight
//! into mapped buffers.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use lumen_resources::Material;

/// `cbuffer Material` (binding 0, pixel shader).
///
/// - Offset 0: color (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    pub color: Vec4,
}

impl MaterialUniform {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl From<&Material> for MaterialUniform {
    fn from(material: &Material) -> Self {
        Self {
            color: material.color,
        }
    }
}

/// `cbuffer TransformationMatrix` (binding 1, vertex shader).
///
/// - Offset 0: WVP (64 bytes, column-major)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformUniform {
    pub wvp: Mat4,
}

impl TransformUniform {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(wvp: Mat4) -> Self {
        Self { wvp }
    }
}

impl Default for TransformUniform {
    fn default() -> Self {
        Self {
            wvp: Mat4::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_uniform_layout() {
        assert_eq!(MaterialUniform::SIZE, 16);
        assert_eq!(std::mem::align_of::<MaterialUniform>() % 4, 0);
    }

    #[test]
    fn test_transform_uniform_layout() {
        assert_eq!(TransformUniform::SIZE, 64);
        assert_eq!(std::mem::align_of::<TransformUniform>() % 4, 0);
    }

    #[test]
    fn test_material_uniform_from_default_material() {
        let uniform = MaterialUniform::from(&Material::default());
        let bytes: &[u8] = bytemuck::bytes_of(&uniform);
        let floats: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(floats, &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_transform_uniform_is_column_major() {
        let translation = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let uniform = TransformUniform::new(translation);
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&uniform));
        assert_eq!(&floats[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(TransformUniform::default().wvp, Mat4::IDENTITY);
    }
}
