use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{check_records, OpsError};
use crate::geometry::Rect2d;

/// Number of values describing a box in a flat buffer.
pub const BOX_DIM: usize = 7;

/// A 3D box rotated about the z-axis.
///
/// The flat layout is `[x, y, z, dx, dy, dz, yaw]` where `(x, y, z)` is the box center,
/// `(dx, dy, dz)` the full extents along the local axes and `yaw` the rotation about z.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Box3d {
    /// The center of the box.
    pub center: Vec3,
    /// The full extents of the box along its local axes.
    pub extent: Vec3,
    /// The rotation about the z-axis in radians.
    pub yaw: f32,
}

impl Box3d {
    /// Create a new box from its center, extents and yaw.
    pub fn new(center: [f32; 3], extent: [f32; 3], yaw: f32) -> Self {
        Self {
            center: Vec3::from_array(center),
            extent: Vec3::from_array(extent),
            yaw,
        }
    }

    /// Create a box from a 7-element record `[x, y, z, dx, dy, dz, yaw]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not have exactly 7 elements.
    pub fn from_slice(record: &[f32]) -> Result<Self, OpsError> {
        match record {
            &[x, y, z, dx, dy, dz, yaw] => Ok(Self::new([x, y, z], [dx, dy, dz], yaw)),
            _ => Err(OpsError::InvalidShape {
                name: "box",
                len: record.len(),
                width: BOX_DIM,
            }),
        }
    }

    /// Return the box as a 7-element record.
    pub fn to_array(&self) -> [f32; BOX_DIM] {
        [
            self.center.x,
            self.center.y,
            self.center.z,
            self.extent.x,
            self.extent.y,
            self.extent.z,
            self.yaw,
        ]
    }

    /// The bird's-eye-view footprint of the box.
    #[inline]
    pub fn bev(&self) -> Rect2d {
        Rect2d::new(self.center.truncate(), self.extent.truncate() * 0.5, self.yaw)
    }

    /// The footprint of the box with its yaw ignored.
    #[inline]
    pub fn bev_axis_aligned(&self) -> Rect2d {
        Rect2d::new(self.center.truncate(), self.extent.truncate() * 0.5, 0.0)
    }

    /// The BEV area of the box.
    #[inline]
    pub fn area_bev(&self) -> f32 {
        self.extent.x * self.extent.y
    }

    /// The volume of the box.
    #[inline]
    pub fn volume(&self) -> f32 {
        self.extent.x * self.extent.y * self.extent.z
    }

    /// The lowest z of the box.
    #[inline]
    pub fn z_min(&self) -> f32 {
        self.center.z - self.extent.z * 0.5
    }

    /// The highest z of the box.
    #[inline]
    pub fn z_max(&self) -> f32 {
        self.center.z + self.extent.z * 0.5
    }

    /// The overlap of the z-ranges of two boxes, zero if disjoint.
    #[inline]
    pub fn z_overlap(&self, other: &Box3d) -> f32 {
        (self.z_max().min(other.z_max()) - self.z_min().max(other.z_min())).max(0.0)
    }

    /// Radius of the sphere around the center enclosing every corner of the box.
    #[inline]
    pub fn bounding_radius(&self) -> f32 {
        (self.extent * 0.5).length()
    }

    /// Return a copy of the box with `extra` added to each extent.
    pub fn enlarged(&self, extra: [f32; 3]) -> Self {
        Self {
            extent: self.extent + Vec3::from_array(extra),
            ..*self
        }
    }

    /// The xy-center of the box.
    #[inline]
    pub fn center_bev(&self) -> Vec2 {
        self.center.truncate()
    }
}

/// Parse a flat `N x 7` buffer into boxes.
///
/// # Errors
///
/// Returns an error if the buffer length is not a multiple of 7.
pub fn boxes_from_slice(name: &'static str, buf: &[f32]) -> Result<Vec<Box3d>, OpsError> {
    check_records(name, buf, BOX_DIM)?;
    buf.chunks_exact(BOX_DIM).map(Box3d::from_slice).collect()
}
