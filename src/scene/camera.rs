//! Camera record of a compiled scene.

use bytemuck::{Pod, Zeroable};

use super::raw::RawCamera;
use crate::util::{Mat4, Vec4};

pub const NEAR_PLANE: f32 = 1.0;
pub const FAR_PLANE: f32 = 1000.0;

/// Camera with precomputed view and projection matrices (192 bytes).
///
/// `pitch` and `yaw` are pending interactive rotations in degrees and start
/// at zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompiledCamera {
    pub view: Mat4,
    pub proj: Mat4,
    pub eye: Vec4,
    pub look_at: Vec4,
    pub up: Vec4,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub invert_y: u32,
}

impl CompiledCamera {
    pub fn new(raw: &RawCamera, aspect_ratio: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(raw.eye, raw.look_at, raw.up),
            proj: Mat4::perspective_rh(raw.fov.to_radians(), aspect_ratio, NEAR_PLANE, FAR_PLANE),
            eye: raw.eye.extend(1.0),
            look_at: raw.look_at.extend(1.0),
            up: raw.up.extend(0.0),
            fov: raw.fov,
            pitch: 0.0,
            yaw: 0.0,
            invert_y: 0,
        }
    }
}

impl Default for CompiledCamera {
    fn default() -> Self {
        Self::new(&RawCamera::default(), 1.25)
    }
}
