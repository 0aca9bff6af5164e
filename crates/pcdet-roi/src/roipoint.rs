use serde::{Deserialize, Serialize};

use pcdet_core::{
    boxes_from_slice, classify::point_in_box, error::check_features, layout::paired_ranges,
    points_from_slice, BatchLayout, ExecutionContext, OpsError,
};

/// How the sample slots of a box with too few interior points are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaddingPolicy {
    /// Cycle through the interior points: slot `k` takes interior point `k % count`.
    #[default]
    Cyclic,
    /// Repeat the first interior point in every remaining slot.
    RepeatFirst,
}

/// Configuration of the ROI point pooling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiPointPoolConfig {
    /// Number of points gathered per box.
    pub num_sampled_points: usize,
    /// Amount added to the box extents `(dx, dy, dz)` before testing the points.
    pub pool_extra_width: [f32; 3],
    /// How boxes with fewer interior points than samples are padded.
    pub padding: PaddingPolicy,
}

impl Default for RoiPointPoolConfig {
    fn default() -> Self {
        Self {
            num_sampled_points: 512,
            pool_extra_width: [1.0, 1.0, 1.0],
            padding: PaddingPolicy::Cyclic,
        }
    }
}

/// The gathered points of every box.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiPointPoolOutput {
    /// Gathered `[x, y, z, features...]` records with shape `M x S x (3 + C)`.
    /// Boxes without interior points are zero filled.
    pub pooled_features: Vec<f32>,
    /// Index into the stacked point buffer of every gathered record, shape `M x S`.
    /// Meaningless for boxes flagged empty.
    pub pooled_idx: Vec<usize>,
    /// Whether each box contains no point at all.
    pub empty_flag: Vec<bool>,
    /// Number of distinct points gathered per box, at most `S`.
    pub valid_count: Vec<usize>,
    /// The number of samples per box.
    pub num_sampled_points: usize,
    /// The width `3 + C` of a gathered record.
    pub record_width: usize,
}

/// Gather a fixed number of the points lying inside every box.
///
/// The boxes are enlarged by `pool_extra_width` and the first `S` interior points in
/// source order are kept. Boxes with fewer interior points are padded following the
/// configured [`PaddingPolicy`]; boxes without any are zero filled and flagged empty.
///
/// # Arguments
///
/// * `ctx` - The execution context, one unit of work per box.
/// * `xyz` - Flat `N x 3` point coordinates of all frames.
/// * `features` - Flat `N x C` point features.
/// * `channels` - The number of feature channels `C`.
/// * `xyz_layout` - How the points are split into frames.
/// * `boxes` - Flat `M x 7` boxes of all frames.
/// * `boxes_layout` - How the boxes are split into frames.
/// * `config` - Sample count, box enlargement and padding policy.
///
/// # Errors
///
/// Returns an error on malformed buffers, mismatched layouts or a zero sample count.
#[allow(clippy::too_many_arguments)]
pub fn roipoint_pool3d(
    ctx: &ExecutionContext,
    xyz: &[f32],
    features: &[f32],
    channels: usize,
    xyz_layout: &BatchLayout,
    boxes: &[f32],
    boxes_layout: &BatchLayout,
    config: &RoiPointPoolConfig,
) -> Result<RoiPointPoolOutput, OpsError> {
    if config.num_sampled_points == 0 {
        return Err(OpsError::InvalidParameter {
            name: "num_sampled_points",
            reason: "must be > 0".to_string(),
        });
    }
    let points = points_from_slice("xyz", xyz)?;
    check_features("features", features, points.len(), channels)?;
    let boxes = boxes_from_slice("boxes", boxes)?;
    let (point_ranges, box_ranges) = paired_ranges(
        ("xyz", xyz_layout, points.len()),
        ("boxes", boxes_layout, boxes.len()),
    )?;

    let mut frame_of_box = vec![0usize; boxes.len()];
    for (frame, range) in box_ranges.iter().enumerate() {
        frame_of_box[range.clone()].fill(frame);
    }

    let samples = config.num_sampled_points;
    let width = 3 + channels;

    let selections: Vec<(Vec<usize>, usize)> = ctx.map(boxes.len(), |m| {
        let bbox = boxes[m].enlarged(config.pool_extra_width);
        let mut idx: Vec<usize> = point_ranges[frame_of_box[m]]
            .clone()
            .filter(|&n| point_in_box(points[n], &bbox))
            .take(samples)
            .collect();
        let count = idx.len();
        if count == 0 {
            return (vec![0; samples], 0);
        }
        for k in count..samples {
            let pad = match config.padding {
                PaddingPolicy::Cyclic => idx[k % count],
                PaddingPolicy::RepeatFirst => idx[0],
            };
            idx.push(pad);
        }
        (idx, count)
    });

    let mut pooled_features = vec![0.0f32; boxes.len() * samples * width];
    ctx.for_each_slab(&mut pooled_features, boxes.len(), samples * width, |m, out| {
        let (idx, count) = &selections[m];
        if *count == 0 {
            return;
        }
        for (record, &n) in out.chunks_exact_mut(width).zip(idx.iter()) {
            record[..3].copy_from_slice(&xyz[n * 3..n * 3 + 3]);
            record[3..].copy_from_slice(&features[n * channels..(n + 1) * channels]);
        }
    });

    let valid_count: Vec<usize> = selections.iter().map(|(_, count)| *count).collect();
    let pooled_idx: Vec<usize> = selections.into_iter().flat_map(|(idx, _)| idx).collect();
    let empty_flag: Vec<bool> = valid_count.iter().map(|&c| c == 0).collect();

    log::debug!(
        "roipoint pooled {} boxes, {} empty",
        boxes.len(),
        empty_flag.iter().filter(|&&e| e).count()
    );

    Ok(RoiPointPoolOutput {
        pooled_features,
        pooled_idx,
        empty_flag,
        valid_count,
        num_sampled_points: samples,
        record_width: width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(samples: usize, padding: PaddingPolicy) -> RoiPointPoolConfig {
        RoiPointPoolConfig {
            num_sampled_points: samples,
            pool_extra_width: [0.0; 3],
            padding,
        }
    }

    /// Pool a single frame.
    fn pool_single(
        xyz: &[f32],
        features: &[f32],
        channels: usize,
        boxes: &[f32],
        config: &RoiPointPoolConfig,
    ) -> Result<RoiPointPoolOutput, OpsError> {
        let single = BatchLayout::single();
        let ctx = ExecutionContext::serial();
        roipoint_pool3d(&ctx, xyz, features, channels, &single, boxes, &single, config)
    }

    #[test]
    fn test_empty_box() -> Result<(), OpsError> {
        let ctx = ExecutionContext::default();
        let xyz = [0.0, 0.0, 0.0];
        let features = [1.0];
        let boxes = [
            0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, //
            9.0, 9.0, 9.0, 1.0, 1.0, 1.0, 0.0,
        ];
        let single = BatchLayout::single();
        let cfg = config(2, PaddingPolicy::Cyclic);
        let out = roipoint_pool3d(&ctx, &xyz, &features, 1, &single, &boxes, &single, &cfg)?;
        assert_eq!(out.empty_flag, vec![false, true]);
        assert_eq!(out.valid_count, vec![1, 0]);
        assert_eq!(out.record_width, 4);
        // the single interior point is repeated, the empty box stays zero
        assert_eq!(
            out.pooled_features,
            vec![
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, //
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_no_points_keeps_record_width() -> Result<(), OpsError> {
        let boxes = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        let out = pool_single(&[], &[], 4, &boxes, &config(3, PaddingPolicy::Cyclic))?;
        assert_eq!(out.record_width, 7);
        assert_eq!(out.pooled_features, vec![0.0; 3 * 7]);
        assert_eq!(out.empty_flag, vec![true]);
        assert_eq!(out.valid_count, vec![0]);
        Ok(())
    }

    #[test]
    fn test_truncates_in_source_order() -> Result<(), OpsError> {
        let xyz: Vec<f32> = (0..6).flat_map(|i| [i as f32 * 0.1, 0.0, 0.0]).collect();
        let features: Vec<f32> = (0..6).map(|i| i as f32).collect();
        let boxes = [0.0, 0.0, 0.0, 4.0, 4.0, 4.0, 0.0];
        let out = pool_single(&xyz, &features, 1, &boxes, &config(4, PaddingPolicy::Cyclic))?;
        assert_eq!(out.pooled_idx, vec![0, 1, 2, 3]);
        assert_eq!(out.valid_count, vec![4]);
        let gathered: Vec<f32> = out.pooled_features.chunks(4).map(|r| r[3]).collect();
        assert_eq!(gathered, vec![0.0, 1.0, 2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_padding_policies() -> Result<(), OpsError> {
        let xyz = [
            0.0, 0.0, 0.0, //
            50.0, 0.0, 0.0, //
            0.2, 0.0, 0.0,
        ];
        let features = [1.0, 2.0, 3.0];
        let boxes = [0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 0.0];

        let cyclic = pool_single(&xyz, &features, 1, &boxes, &config(5, PaddingPolicy::Cyclic))?;
        assert_eq!(cyclic.pooled_idx, vec![0, 2, 0, 2, 0]);

        let cfg = config(5, PaddingPolicy::RepeatFirst);
        let first = pool_single(&xyz, &features, 1, &boxes, &cfg)?;
        assert_eq!(first.pooled_idx, vec![0, 2, 0, 0, 0]);
        assert_eq!(first.valid_count, vec![2]);
        Ok(())
    }

    #[test]
    fn test_extra_width() -> Result<(), OpsError> {
        let xyz = [1.4, 0.0, 0.0];
        let boxes = [0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 0.0];
        let tight = pool_single(&xyz, &[], 0, &boxes, &config(1, PaddingPolicy::Cyclic))?;
        assert_eq!(tight.empty_flag, vec![true]);

        let cfg = RoiPointPoolConfig {
            pool_extra_width: [1.0, 1.0, 1.0],
            ..config(1, PaddingPolicy::Cyclic)
        };
        let wide = pool_single(&xyz, &[], 0, &boxes, &cfg)?;
        assert_eq!(wide.empty_flag, vec![false]);
        assert_eq!(wide.record_width, 3);
        assert_eq!(wide.pooled_features, vec![1.4, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_batched_frames() -> Result<(), OpsError> {
        let ctx = ExecutionContext::default();
        // both frames have a point at the origin, the box of frame 1 must only see its own
        let xyz = [
            0.0, 0.0, 0.0, //
            0.1, 0.0, 0.0, //
            0.0, 0.0, 0.0,
        ];
        let features = [1.0, 2.0, 3.0];
        let boxes = [
            0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0,
        ];
        let out = roipoint_pool3d(
            &ctx,
            &xyz,
            &features,
            1,
            &BatchLayout::stacked(vec![2, 1]),
            &boxes,
            &BatchLayout::uniform(2),
            &config(2, PaddingPolicy::Cyclic),
        )?;
        assert_eq!(out.pooled_idx, vec![0, 1, 2, 2]);
        assert_eq!(out.valid_count, vec![2, 1]);
        Ok(())
    }

    #[test]
    fn test_invalid_inputs() {
        let boxes = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        let cyclic = |samples| config(samples, PaddingPolicy::Cyclic);
        assert!(pool_single(&[0.0; 3], &[], 0, &boxes, &cyclic(0)).is_err());
        assert!(pool_single(&[0.0; 3], &[1.0; 2], 2, &boxes[..6], &cyclic(1)).is_err());
        assert!(pool_single(&[0.0; 3], &[1.0; 2], 3, &boxes, &cyclic(1)).is_err());
        assert!(pool_single(&[], &[1.0; 2], 2, &boxes, &cyclic(1)).is_err());
        assert!(roipoint_pool3d(
            &ExecutionContext::default(),
            &[0.0; 3],
            &[],
            0,
            &BatchLayout::uniform(2),
            &boxes,
            &BatchLayout::single(),
            &cyclic(1)
        )
        .is_err());
    }

    #[test]
    fn test_config_from_json() -> Result<(), serde_json::Error> {
        let cfg: RoiPointPoolConfig = serde_json::from_str(r#"{"num_sampled_points": 64}"#)?;
        assert_eq!(cfg.num_sampled_points, 64);
        assert_eq!(cfg.pool_extra_width, [1.0, 1.0, 1.0]);
        assert_eq!(cfg.padding, PaddingPolicy::Cyclic);

        let cfg = RoiPointPoolConfig {
            pool_extra_width: [0.5, 0.25, 0.0],
            ..config(16, PaddingPolicy::RepeatFirst)
        };
        let json = serde_json::to_string(&cfg)?;
        assert_eq!(serde_json::from_str::<RoiPointPoolConfig>(&json)?, cfg);
        Ok(())
    }
}
