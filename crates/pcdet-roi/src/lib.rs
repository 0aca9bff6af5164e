#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Assignment of points to the boxes that contain them.
pub mod points_in_boxes;

/// Voxel grid pooling of point features inside every box.
pub mod roiaware;

/// Fixed size gathering of the points inside every box.
pub mod roipoint;

pub use points_in_boxes::{points_in_boxes, points_in_boxes_mask};
pub use roiaware::{roiaware_pool3d, PoolMethod, RoiAwarePoolConfig, RoiAwarePoolOutput};
pub use roipoint::{roipoint_pool3d, PaddingPolicy, RoiPointPoolConfig, RoiPointPoolOutput};
