#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Rotated boxes and their flat buffer layout.
pub mod boxes;

/// Point-in-box tests and per-box voxel assignment.
pub mod classify;

/// Error types for the operators.
pub mod error;

/// Rotated rectangle intersection kernel.
pub mod geometry;

/// Batch layouts of stacked point clouds.
pub mod layout;

/// Execution context and compute backends.
pub mod parallel;

pub use boxes::{boxes_from_slice, Box3d, BOX_DIM};
pub use error::OpsError;
pub use layout::BatchLayout;
pub use parallel::{ExecutionContext, ExecutionStrategy};

/// Parse a flat `N x 3` buffer into points.
///
/// # Errors
///
/// Returns an error if the buffer length is not a multiple of 3.
pub fn points_from_slice(name: &'static str, buf: &[f32]) -> Result<Vec<glam::Vec3>, OpsError> {
    error::check_records(name, buf, 3)?;
    Ok(buf
        .chunks_exact(3)
        .map(|p| glam::Vec3::new(p[0], p[1], p[2]))
        .collect())
}
