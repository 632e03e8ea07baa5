//! Pose metadata attached to captures.
//!
//! Orientation is estimated elsewhere; the session only snapshots it at
//! issuance time so the stitcher can place the finished image.

use serde::{Deserialize, Serialize};

/// Row-major 3×3 rotation matrix from the device frame to the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationMatrix(pub [f32; 9]);

impl RotationMatrix {
    /// The identity rotation.
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    /// Rotation of `radians` about the vertical (y) axis.
    pub fn from_yaw(radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self([cos, 0.0, sin, 0.0, 1.0, 0.0, -sin, 0.0, cos])
    }

    /// Element at `row`, `col`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < 3 && col < 3 {
            self.0.get(row * 3 + col).copied()
        } else {
            None
        }
    }
}

impl Default for RotationMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Position of a capture within the shooting sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    /// Index of the target in the sequence.
    pub id: u32,
    /// Target yaw in degrees.
    pub yaw: f32,
    /// Target pitch in degrees.
    pub pitch: f32,
}

impl ReferencePoint {
    /// Creates a reference point.
    pub fn new(id: u32, yaw: f32, pitch: f32) -> Self {
        Self { id, yaw, pitch }
    }
}

/// Source of the current device orientation.
pub trait PoseProvider: Send + Sync {
    /// Snapshot of the current rotation matrix.
    fn rotation_matrix(&self) -> RotationMatrix;
}

impl<F> PoseProvider for F
where
    F: Fn() -> RotationMatrix + Send + Sync,
{
    fn rotation_matrix(&self) -> RotationMatrix {
        self()
    }
}

/// Pose provider that always reports the same orientation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPose(pub RotationMatrix);

impl PoseProvider for FixedPose {
    fn rotation_matrix(&self) -> RotationMatrix {
        self.0
    }
}
