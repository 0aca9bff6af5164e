use serde::{Deserialize, Serialize};

use pcdet_core::{boxes_from_slice, Box3d, ExecutionContext, OpsError};

use crate::iou::{iou_bev, iou_bev_axis_aligned};

/// Configuration of the greedy non-maximum suppression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NmsConfig {
    /// Boxes whose BEV IoU with a kept box exceeds this value are suppressed.
    pub iou_threshold: f32,
    /// Keep only the highest scoring candidates before suppression.
    pub pre_max_size: Option<usize>,
    /// Stop once this many boxes are kept.
    pub post_max_size: Option<usize>,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.7,
            pre_max_size: None,
            post_max_size: None,
        }
    }
}

impl NmsConfig {
    /// Create a configuration with the given threshold and no size limits.
    pub fn new(iou_threshold: f32) -> Self {
        Self {
            iou_threshold,
            ..Default::default()
        }
    }
}

/// Sort box indices by descending score, lower indices first on ties.
fn score_order(scores: &[f32]) -> Result<Vec<usize>, OpsError> {
    if let Some(pos) = scores.iter().position(|s| s.is_nan()) {
        return Err(OpsError::NonFiniteScore(pos));
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // stable sort keeps the original order of equal scores, -0.0 and 0.0 included
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(order)
}

fn greedy_nms<F>(
    ctx: &ExecutionContext,
    boxes: &[f32],
    scores: &[f32],
    config: &NmsConfig,
    iou_fn: F,
) -> Result<Vec<usize>, OpsError>
where
    F: Fn(&Box3d, &Box3d) -> f32 + Send + Sync,
{
    let boxes = boxes_from_slice("boxes", boxes)?;
    if boxes.len() != scores.len() {
        return Err(OpsError::LengthMismatch(
            "boxes",
            boxes.len(),
            "scores",
            scores.len(),
        ));
    }
    if !config.iou_threshold.is_finite() {
        return Err(OpsError::InvalidParameter {
            name: "iou_threshold",
            reason: format!("must be finite, got {}", config.iou_threshold),
        });
    }

    let mut order = score_order(scores)?;
    if let Some(pre) = config.pre_max_size {
        order.truncate(pre);
    }
    let cap = config.post_max_size.unwrap_or(usize::MAX);

    let mut keep = Vec::new();
    let mut suppressed = vec![false; order.len()];
    for pos in 0..order.len() {
        if keep.len() >= cap {
            break;
        }
        if suppressed[pos] {
            continue;
        }
        let current = &boxes[order[pos]];
        keep.push(order[pos]);

        let rest = &order[pos + 1..];
        ctx.for_each_slab(&mut suppressed[pos + 1..], rest.len(), 1, |k, flag| {
            if !flag[0] && iou_fn(current, &boxes[rest[k]]) > config.iou_threshold {
                flag[0] = true;
            }
        });
    }

    log::debug!(
        "nms kept {} of {} boxes (threshold {})",
        keep.len(),
        boxes.len(),
        config.iou_threshold
    );
    Ok(keep)
}

/// Greedy non-maximum suppression of rotated boxes on their BEV IoU.
///
/// Candidates are visited by descending score, ties broken by the lower original index.
/// A candidate is kept if its BEV IoU with every kept box is at most the threshold.
///
/// # Arguments
///
/// * `ctx` - The execution context.
/// * `boxes` - Flat `N x 7` boxes.
/// * `scores` - One score per box.
/// * `config` - The suppression threshold and size limits.
///
/// # Returns
///
/// The original indices of the kept boxes, highest score first.
///
/// # Errors
///
/// Returns an error on malformed boxes, a score count mismatch, a NaN score or a
/// non-finite threshold.
///
/// # Example
///
/// ```
/// use pcdet_core::ExecutionContext;
/// use pcdet_iou3d::nms::{nms, NmsConfig};
///
/// let boxes = [
///     0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 0.0,
///     0.1, 0.0, 0.0, 2.0, 2.0, 2.0, 0.0,
///     5.0, 5.0, 0.0, 2.0, 2.0, 2.0, 0.0,
/// ];
/// let scores = [0.8, 0.9, 0.1];
/// let keep = nms(&ExecutionContext::default(), &boxes, &scores, &NmsConfig::new(0.5)).unwrap();
/// assert_eq!(keep, vec![1, 2]);
/// ```
pub fn nms(
    ctx: &ExecutionContext,
    boxes: &[f32],
    scores: &[f32],
    config: &NmsConfig,
) -> Result<Vec<usize>, OpsError> {
    greedy_nms(ctx, boxes, scores, config, iou_bev)
}

/// Greedy non-maximum suppression that ignores the box yaw.
///
/// Same contract as [`nms`], with the IoU computed on axis-aligned footprints.
///
/// # Errors
///
/// Returns the same errors as [`nms`].
pub fn nms_normal(
    ctx: &ExecutionContext,
    boxes: &[f32],
    scores: &[f32],
    config: &NmsConfig,
) -> Result<Vec<usize>, OpsError> {
    greedy_nms(ctx, boxes, scores, config, iou_bev_axis_aligned)
}
