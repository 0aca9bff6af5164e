#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Overlap and intersection-over-union of rotated boxes.
pub mod iou;

/// Greedy non-maximum suppression.
pub mod nms;

pub use iou::{
    boxes_aligned_iou3d, boxes_aligned_iou_bev, boxes_iou3d, boxes_iou_bev, boxes_overlap_bev,
    iou_3d, iou_bev, overlap_bev,
};
pub use nms::{nms, nms_normal, NmsConfig};
