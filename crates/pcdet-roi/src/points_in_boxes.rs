use pcdet_core::{
    boxes_from_slice, classify::point_in_box, layout::paired_ranges, points_from_slice,
    BatchLayout, ExecutionContext, OpsError,
};

/// Find, for every point, the first box of its frame that contains it.
///
/// # Arguments
///
/// * `ctx` - The execution context.
/// * `xyz` - Flat `N x 3` point coordinates of all frames.
/// * `xyz_layout` - How the points are split into frames.
/// * `boxes` - Flat `M x 7` boxes of all frames.
/// * `boxes_layout` - How the boxes are split into frames.
///
/// # Returns
///
/// One frame-local box index per point, `-1` for points outside every box.
///
/// # Errors
///
/// Returns an error if a buffer is malformed or the layouts disagree.
pub fn points_in_boxes(
    ctx: &ExecutionContext,
    xyz: &[f32],
    xyz_layout: &BatchLayout,
    boxes: &[f32],
    boxes_layout: &BatchLayout,
) -> Result<Vec<i32>, OpsError> {
    let points = points_from_slice("xyz", xyz)?;
    let boxes = boxes_from_slice("boxes", boxes)?;
    let (point_ranges, box_ranges) = paired_ranges(
        ("xyz", xyz_layout, points.len()),
        ("boxes", boxes_layout, boxes.len()),
    )?;

    let mut frame_of_point = vec![0usize; points.len()];
    for (frame, range) in point_ranges.iter().enumerate() {
        frame_of_point[range.clone()].fill(frame);
    }

    Ok(ctx.map(points.len(), |i| {
        let frame_boxes = &boxes[box_ranges[frame_of_point[i]].clone()];
        frame_boxes
            .iter()
            .position(|b| point_in_box(points[i], b))
            .map_or(-1, |k| k as i32)
    }))
}

/// Compute the box-major membership mask of points in boxes for a single frame.
///
/// # Returns
///
/// A flat `M x N` mask where entry `(m, n)` is 1 if point `n` lies in box `m`.
///
/// # Errors
///
/// Returns an error if a buffer is malformed.
pub fn points_in_boxes_mask(
    ctx: &ExecutionContext,
    xyz: &[f32],
    boxes: &[f32],
) -> Result<Vec<u8>, OpsError> {
    let points = points_from_slice("xyz", xyz)?;
    let boxes = boxes_from_slice("boxes", boxes)?;
    let mut mask = vec![0u8; boxes.len() * points.len()];
    ctx.for_each_slab(&mut mask, boxes.len(), points.len(), |m, row| {
        row.iter_mut()
            .zip(points.iter())
            .for_each(|(v, p)| *v = u8::from(point_in_box(*p, &boxes[m])));
    });
    Ok(mask)
}
