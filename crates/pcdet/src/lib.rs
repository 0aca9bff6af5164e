#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use pcdet_core as core;

#[doc(inline)]
pub use pcdet_iou3d as iou3d;

#[doc(inline)]
pub use pcdet_pointnet2 as pointnet2;

#[doc(inline)]
pub use pcdet_roi as roi;
