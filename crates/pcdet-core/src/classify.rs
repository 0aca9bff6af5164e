use glam::{Vec2, Vec3};

use crate::boxes::Box3d;

/// Express a point in the local frame of a box.
///
/// The point is translated by the negated box center and rotated by the negated yaw, so
/// the box occupies `[-dx/2, dx/2] x [-dy/2, dy/2] x [-dz/2, dz/2]` in the result.
#[inline]
pub fn to_local(point: Vec3, bbox: &Box3d) -> Vec3 {
    let shift = point - bbox.center;
    let xy = Vec2::from_angle(-bbox.yaw).rotate(shift.truncate());
    xy.extend(shift.z)
}

/// Cheap test rejecting points outside the bounding sphere of a box.
///
/// Never rejects a point that [`point_in_box`] would accept.
#[inline]
pub fn may_contain(point: Vec3, bbox: &Box3d) -> bool {
    let radius = bbox.bounding_radius() * (1.0 + 1e-5) + 1e-6;
    (point - bbox.center).length_squared() <= radius * radius
}

#[inline]
fn local_inside(local: Vec3, bbox: &Box3d) -> bool {
    let half = bbox.extent * 0.5;
    local.x.abs() <= half.x && local.y.abs() <= half.y && local.z.abs() <= half.z
}

/// Check whether a point lies inside a box, boundary included.
///
/// # Arguments
///
/// * `point` - The point to test.
/// * `bbox` - The box.
///
/// # Example
///
/// ```
/// use glam::Vec3;
/// use pcdet_core::{classify::point_in_box, Box3d};
///
/// let bbox = Box3d::new([0.0, 0.0, 0.0], [2.0, 2.0, 2.0], 0.0);
/// assert!(point_in_box(Vec3::new(0.5, -0.5, 1.0), &bbox));
/// assert!(!point_in_box(Vec3::new(1.5, 0.0, 0.0), &bbox));
/// ```
#[inline]
pub fn point_in_box(point: Vec3, bbox: &Box3d) -> bool {
    may_contain(point, bbox) && local_inside(to_local(point, bbox), bbox)
}

/// Find the voxel of the per-box grid that owns a point.
///
/// Each local axis spanning `[-extent/2, extent/2]` is split into `grid[axis]` equal cells;
/// a point on the upper boundary belongs to the last cell.
///
/// # Arguments
///
/// * `point` - The point to classify.
/// * `bbox` - The box defining the grid.
/// * `grid` - The number of cells along the local x, y and z axes.
///
/// # Returns
///
/// The `(i, j, k)` cell index, or `None` if the point is outside the box or the grid is empty.
pub fn voxel_index(point: Vec3, bbox: &Box3d, grid: [usize; 3]) -> Option<[usize; 3]> {
    if grid.contains(&0) || !may_contain(point, bbox) {
        return None;
    }
    let local = to_local(point, bbox);
    if !local_inside(local, bbox) {
        return None;
    }
    let offset = local + bbox.extent * 0.5;
    let bin = |value: f32, extent: f32, cells: usize| -> usize {
        let res = extent / cells as f32;
        let idx = if res > 0.0 { (value / res) as usize } else { 0 };
        idx.min(cells - 1)
    };
    Some([
        bin(offset.x, bbox.extent.x, grid[0]),
        bin(offset.y, bbox.extent.y, grid[1]),
        bin(offset.z, bbox.extent.z, grid[2]),
    ])
}

/// Flatten a voxel index of a `grid` shaped box grid into a row-major offset.
#[inline]
pub fn voxel_offset(index: [usize; 3], grid: [usize; 3]) -> usize {
    (index[0] * grid[1] + index[1]) * grid[2] + index[2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_to_local() {
        let bbox = Box3d::new([1.0, 1.0, 1.0], [4.0, 2.0, 2.0], FRAC_PI_2);
        let local = to_local(Vec3::new(1.0, 3.0, 1.5), &bbox);
        assert_relative_eq!(local.x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(local.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(local.z, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_point_in_box() {
        let bbox = Box3d::new([0.0, 0.0, 0.0], [4.0, 2.0, 2.0], FRAC_PI_2);
        // rotated by 90 degrees the long side runs along y
        assert!(point_in_box(Vec3::new(0.0, 1.9, 0.0), &bbox));
        assert!(!point_in_box(Vec3::new(1.9, 0.0, 0.0), &bbox));
        assert!(!point_in_box(Vec3::new(0.0, 0.0, 1.1), &bbox));
        // boundary included
        let axis = Box3d::new([0.0, 0.0, 0.0], [2.0, 2.0, 2.0], 0.0);
        assert!(point_in_box(Vec3::new(1.0, 1.0, 1.0), &axis));
        assert!(point_in_box(Vec3::new(-1.0, 0.0, -1.0), &axis));
    }

    #[test]
    fn test_voxel_index() {
        let bbox = Box3d::new([0.0, 0.0, 0.0], [4.0, 4.0, 4.0], 0.0);
        let grid = [4, 2, 1];
        assert_eq!(voxel_index(Vec3::new(-1.5, -1.0, 0.0), &bbox, grid), Some([0, 0, 0]));
        assert_eq!(voxel_index(Vec3::new(0.5, 1.0, 1.9), &bbox, grid), Some([2, 1, 0]));
        // the upper boundary folds into the last cell
        assert_eq!(voxel_index(Vec3::new(2.0, 2.0, 2.0), &bbox, grid), Some([3, 1, 0]));
        assert_eq!(voxel_index(Vec3::new(2.5, 0.0, 0.0), &bbox, grid), None);
        assert_eq!(voxel_index(Vec3::ZERO, &bbox, [0, 1, 1]), None);
    }

    #[test]
    fn test_voxel_index_rotated() {
        let bbox = Box3d::new([10.0, 0.0, 0.0], [4.0, 2.0, 2.0], FRAC_PI_2);
        // local +x points along world +y
        assert_eq!(
            voxel_index(Vec3::new(10.0, 1.5, 0.0), &bbox, [2, 1, 1]),
            Some([1, 0, 0])
        );
        assert_eq!(
            voxel_index(Vec3::new(10.0, -1.5, 0.0), &bbox, [2, 1, 1]),
            Some([0, 0, 0])
        );
    }

    #[test]
    fn test_voxel_offset() {
        assert_eq!(voxel_offset([0, 0, 0], [2, 3, 4]), 0);
        assert_eq!(voxel_offset([1, 2, 3], [2, 3, 4]), 23);
    }
}
