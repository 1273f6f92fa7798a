//! Material definitions.

use glam::Vec4;

/// Surface color multiplied with the sampled texel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub color: Vec4,
}

impl Material {
    pub fn new(color: Vec4) -> Self {
        Self { color }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self { color: Vec4::ONE }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_material_is_white() {
        assert_eq!(Material::default().color, Vec4::new(1.0, 1.0, 1.0, 1.0));
    }
}
