//! Scale / rotate / translate transforms.
//!
//! Rotation is stored as Euler angles in radians and applied X, then Y,
//! then Z, so a per-frame spin is a plain addition to one component.
//!
//! # Example
//!
//! ```
//! use lumen_scene::Transform;
//! use glam::Vec3;
//!
//! let mut transform = Transform::new().with_translate(Vec3::new(0.0, 0.0, -5.0));
//! transform.rotate.y += 0.01;
//!
//! let origin = transform.matrix().transform_point3(Vec3::ZERO);
//! assert!((origin - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-6);
//! ```

use glam::{EulerRot, Mat4, Quat, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub scale: Vec3,
    /// Euler angles in radians.
    pub rotate: Vec3,
    pub translate: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: Vec3::ONE,
            rotate: Vec3::ZERO,
            translate: Vec3::ZERO,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotate(mut self, rotate: Vec3) -> Self {
        self.rotate = rotate;
        self
    }

    pub fn with_translate(mut self, translate: Vec3) -> Self {
        self.translate = translate;
        self
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::ZYX, self.rotate.z, self.rotate.y, self.rotate.x)
    }

    /// Affine matrix: scale, then rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation(), self.translate)
    }
}
