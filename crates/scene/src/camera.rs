//! Cameras and projections.
//!
//! Projections are left-handed with a 0..1 depth range. The Y axis is
//! flipped on the way out so +Y in view space is up on screen under
//! Vulkan's top-left clip convention.

use glam::{Mat4, Vec3};

use crate::transform::Transform;

/// Field of view of the scene camera, in radians.
pub const DEFAULT_FOV_Y: f32 = 0.45;
pub const DEFAULT_NEAR: f32 = 0.1;
pub const DEFAULT_FAR: f32 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    /// Off-center orthographic; with `top < bottom` Y grows downward.
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    /// Left-handed projection before the Vulkan Y flip.
    pub fn matrix_lh(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_lh(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_lh(left, right, bottom, top, near, far),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Placement of the camera in world space.
    pub transform: Transform,
    /// `false` leaves view space equal to world space.
    pub has_view: bool,
    pub projection: Projection,
}

impl Camera {
    /// Perspective scene camera at `z = -5` looking down +Z.
    pub fn perspective(aspect: f32) -> Self {
        Self {
            transform: Transform::new().with_translate(Vec3::new(0.0, 0.0, -5.0)),
            has_view: true,
            projection: Projection::Perspective {
                fov_y: DEFAULT_FOV_Y,
                aspect,
                near: DEFAULT_NEAR,
                far: DEFAULT_FAR,
            },
        }
    }

    /// Pixel-space camera for sprites: origin top-left, Y down, identity
    /// view.
    pub fn sprite(width: f32, height: f32) -> Self {
        Self {
            transform: Transform::new(),
            has_view: false,
            projection: Projection::Orthographic {
                left: 0.0,
                right: width,
                bottom: height,
                top: 0.0,
                near: 0.0,
                far: DEFAULT_FAR,
            },
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        if self.has_view {
            self.transform.matrix().inverse()
        } else {
            Mat4::IDENTITY
        }
    }

    /// Projection with the Vulkan Y flip applied.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * self.projection.matrix_lh()
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// World-view-projection for an object placed by `world`.
    pub fn wvp(&self, world: &Transform) -> Mat4 {
        self.view_projection_matrix() * world.matrix()
    }
}
