use pcdet_core::{
    boxes_from_slice, geometry::rotated_rect_intersection, Box3d, ExecutionContext, OpsError,
};

/// Lower bound on the BEV union area.
const BEV_UNION_EPS: f32 = 1e-8;

/// Lower bound on the 3D union volume.
const VOLUME_UNION_EPS: f32 = 1e-6;

/// Compute the intersection area of the bird's-eye-view footprints of two boxes.
///
/// # Example
///
/// ```
/// use pcdet_core::Box3d;
/// use pcdet_iou3d::iou::overlap_bev;
///
/// let a = Box3d::new([0.0, 0.0, 0.0], [2.0, 2.0, 2.0], 0.0);
/// let b = Box3d::new([1.0, 0.0, 5.0], [2.0, 2.0, 2.0], 0.0);
/// assert!((overlap_bev(&a, &b) - 2.0).abs() < 1e-5);
/// ```
#[inline]
pub fn overlap_bev(a: &Box3d, b: &Box3d) -> f32 {
    rotated_rect_intersection(&a.bev(), &b.bev())
}

/// Compute the intersection-over-union of the BEV footprints of two boxes.
#[inline]
pub fn iou_bev(a: &Box3d, b: &Box3d) -> f32 {
    let inter = overlap_bev(a, b);
    inter / (a.area_bev() + b.area_bev() - inter).max(BEV_UNION_EPS)
}

/// Compute the BEV intersection-over-union of two boxes with their yaw ignored.
#[inline]
pub fn iou_bev_axis_aligned(a: &Box3d, b: &Box3d) -> f32 {
    let inter = rotated_rect_intersection(&a.bev_axis_aligned(), &b.bev_axis_aligned());
    inter / (a.area_bev() + b.area_bev() - inter).max(BEV_UNION_EPS)
}

/// Compute the 3D intersection volume of two boxes.
#[inline]
pub fn overlap_3d(a: &Box3d, b: &Box3d) -> f32 {
    overlap_bev(a, b) * a.z_overlap(b)
}

/// Compute the 3D intersection-over-union of two boxes.
///
/// The intersection is the BEV overlap times the overlap of the z-ranges.
///
/// # Example
///
/// ```
/// use pcdet_core::Box3d;
/// use pcdet_iou3d::iou::iou_3d;
///
/// let a = Box3d::new([0.0, 0.0, 0.0], [2.0, 2.0, 2.0], 0.3);
/// assert!((iou_3d(&a, &a) - 1.0).abs() < 1e-4);
/// ```
#[inline]
pub fn iou_3d(a: &Box3d, b: &Box3d) -> f32 {
    let inter = overlap_3d(a, b);
    inter / (a.volume() + b.volume() - inter).max(VOLUME_UNION_EPS)
}

fn pairwise<F>(
    ctx: &ExecutionContext,
    boxes_a: &[f32],
    boxes_b: &[f32],
    f: F,
) -> Result<Vec<f32>, OpsError>
where
    F: Fn(&Box3d, &Box3d) -> f32 + Send + Sync,
{
    let a = boxes_from_slice("boxes_a", boxes_a)?;
    let b = boxes_from_slice("boxes_b", boxes_b)?;
    let mut out = vec![0.0f32; a.len() * b.len()];
    ctx.for_each_slab(&mut out, a.len(), b.len(), |i, row| {
        row.iter_mut()
            .zip(b.iter())
            .for_each(|(v, box_b)| *v = f(&a[i], box_b));
    });
    Ok(out)
}

fn aligned<F>(
    ctx: &ExecutionContext,
    boxes_a: &[f32],
    boxes_b: &[f32],
    f: F,
) -> Result<Vec<f32>, OpsError>
where
    F: Fn(&Box3d, &Box3d) -> f32 + Send + Sync,
{
    let a = boxes_from_slice("boxes_a", boxes_a)?;
    let b = boxes_from_slice("boxes_b", boxes_b)?;
    if a.len() != b.len() {
        return Err(OpsError::LengthMismatch(
            "boxes_a",
            a.len(),
            "boxes_b",
            b.len(),
        ));
    }
    Ok(ctx.map(a.len(), |i| f(&a[i], &b[i])))
}

/// Compute the BEV overlap area between every pair of boxes.
///
/// # Arguments
///
/// * `ctx` - The execution context.
/// * `boxes_a` - Flat `N x 7` boxes.
/// * `boxes_b` - Flat `M x 7` boxes.
///
/// # Returns
///
/// The `N x M` overlap matrix in row-major order.
///
/// # Errors
///
/// Returns an error if either buffer is not made of 7-element records.
pub fn boxes_overlap_bev(
    ctx: &ExecutionContext,
    boxes_a: &[f32],
    boxes_b: &[f32],
) -> Result<Vec<f32>, OpsError> {
    pairwise(ctx, boxes_a, boxes_b, overlap_bev)
}

/// Compute the BEV IoU between every pair of boxes as a row-major `N x M` matrix.
///
/// # Errors
///
/// Returns an error if either buffer is not made of 7-element records.
pub fn boxes_iou_bev(
    ctx: &ExecutionContext,
    boxes_a: &[f32],
    boxes_b: &[f32],
) -> Result<Vec<f32>, OpsError> {
    pairwise(ctx, boxes_a, boxes_b, iou_bev)
}

/// Compute the 3D IoU between every pair of boxes as a row-major `N x M` matrix.
///
/// # Errors
///
/// Returns an error if either buffer is not made of 7-element records.
pub fn boxes_iou3d(
    ctx: &ExecutionContext,
    boxes_a: &[f32],
    boxes_b: &[f32],
) -> Result<Vec<f32>, OpsError> {
    pairwise(ctx, boxes_a, boxes_b, iou_3d)
}

/// Compute the BEV IoU of `boxes_a[i]` with `boxes_b[i]` for every `i`.
///
/// # Errors
///
/// Returns an error if the buffers are malformed or hold a different number of boxes.
pub fn boxes_aligned_iou_bev(
    ctx: &ExecutionContext,
    boxes_a: &[f32],
    boxes_b: &[f32],
) -> Result<Vec<f32>, OpsError> {
    aligned(ctx, boxes_a, boxes_b, iou_bev)
}

/// Compute the 3D IoU of `boxes_a[i]` with `boxes_b[i]` for every `i`.
///
/// # Errors
///
/// Returns an error if the buffers are malformed or hold a different number of boxes.
pub fn boxes_aligned_iou3d(
    ctx: &ExecutionContext,
    boxes_a: &[f32],
    boxes_b: &[f32],
) -> Result<Vec<f32>, OpsError> {
    aligned(ctx, boxes_a, boxes_b, iou_3d)
}
