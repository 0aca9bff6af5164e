use serde::{Deserialize, Serialize};

use pcdet_core::{
    boxes_from_slice,
    classify::{voxel_index, voxel_offset},
    error::check_features,
    points_from_slice, ExecutionContext, OpsError,
};

/// How the features of the points in a voxel are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PoolMethod {
    /// Per channel maximum over the points of the voxel.
    #[default]
    Max,
    /// Per channel mean over the points of the voxel.
    Avg,
}

/// Configuration of the ROI-aware voxel pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiAwarePoolConfig {
    /// Number of voxels along the local x, y and z axes of every box.
    pub out_size: [usize; 3],
    /// Maximum number of points kept per voxel, later points are dropped.
    pub max_pts_per_voxel: usize,
    /// The aggregation applied per voxel.
    pub method: PoolMethod,
}

impl Default for RoiAwarePoolConfig {
    fn default() -> Self {
        Self {
            out_size: [6, 6, 6],
            max_pts_per_voxel: 128,
            method: PoolMethod::Max,
        }
    }
}

impl RoiAwarePoolConfig {
    /// Number of voxels in the grid of one box.
    pub fn num_voxels(&self) -> usize {
        self.out_size.iter().product()
    }

    fn validate(&self) -> Result<(), OpsError> {
        if self.out_size.contains(&0) {
            return Err(OpsError::InvalidParameter {
                name: "out_size",
                reason: format!("every axis must be > 0, got {:?}", self.out_size),
            });
        }
        if self.max_pts_per_voxel == 0 {
            return Err(OpsError::InvalidParameter {
                name: "max_pts_per_voxel",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// The pooled voxel grids and the data needed to route gradients back to the points.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiAwarePoolOutput {
    /// Pooled features with shape `M x gx x gy x gz x C`, zero in empty voxels.
    pub pooled_features: Vec<f32>,
    /// For [`PoolMethod::Max`], the point that supplied each pooled value, `-1` in empty
    /// voxels. Same shape as `pooled_features`, empty for [`PoolMethod::Avg`].
    pub argmax: Vec<i32>,
    /// Number of points retained in each voxel, shape `M x gx x gy x gz`.
    pub voxel_point_counts: Vec<usize>,
    /// For [`PoolMethod::Avg`], the indices of the retained points of each voxel in source
    /// order, shape `M x gx x gy x gz x max_pts_per_voxel`. Only the first `count` entries
    /// are valid. Empty for [`PoolMethod::Max`], whose gradient only needs `argmax`.
    pub voxel_point_idx: Vec<usize>,
    /// The number of boxes.
    pub num_rois: usize,
    /// The number of feature channels.
    pub num_channels: usize,
    /// The configuration that produced the output.
    pub config: RoiAwarePoolConfig,
}

/// Per box result of the pooling, concatenated into [`RoiAwarePoolOutput`].
struct RoiGrid {
    features: Vec<f32>,
    argmax: Vec<i32>,
    counts: Vec<usize>,
    idx: Vec<usize>,
}

/// Rasterize the points into the voxel grid of every box and aggregate their features.
///
/// Each point is assigned to the voxel of the box local frame that contains it; voxels keep
/// at most `max_pts_per_voxel` points in source order. Empty voxels are zero filled.
///
/// # Arguments
///
/// * `ctx` - The execution context, one unit of work per box.
/// * `rois` - Flat `M x 7` boxes.
/// * `xyz` - Flat `N x 3` point coordinates.
/// * `features` - Flat `N x C` point features.
/// * `channels` - The number of feature channels `C`.
/// * `config` - Grid size, voxel capacity and pooling method.
///
/// # Errors
///
/// Returns an error on malformed buffers or an empty grid or capacity.
///
/// # Example
///
/// ```
/// use pcdet_core::ExecutionContext;
/// use pcdet_roi::roiaware::{roiaware_pool3d, PoolMethod, RoiAwarePoolConfig};
///
/// let rois = [0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 0.0];
/// let xyz = [0.5, 0.5, 0.5];
/// let features = [3.0];
/// let config = RoiAwarePoolConfig {
///     out_size: [2, 2, 2],
///     max_pts_per_voxel: 4,
///     method: PoolMethod::Max,
/// };
/// let ctx = ExecutionContext::default();
/// let out = roiaware_pool3d(&ctx, &rois, &xyz, &features, 1, &config).unwrap();
/// assert_eq!(out.pooled_features, vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 3.0]);
/// ```
pub fn roiaware_pool3d(
    ctx: &ExecutionContext,
    rois: &[f32],
    xyz: &[f32],
    features: &[f32],
    channels: usize,
    config: &RoiAwarePoolConfig,
) -> Result<RoiAwarePoolOutput, OpsError> {
    config.validate()?;
    let rois = boxes_from_slice("rois", rois)?;
    let points = points_from_slice("xyz", xyz)?;
    check_features("features", features, points.len(), channels)?;

    let grid = config.out_size;
    let num_voxels = config.num_voxels();
    let cap = config.max_pts_per_voxel;

    let per_roi = ctx.map(rois.len(), |m| {
        let roi = &rois[m];
        let mut counts = vec![0usize; num_voxels];
        let mut pooled = vec![0.0f32; num_voxels * channels];
        let (mut argmax, mut idx) = match config.method {
            PoolMethod::Max => (vec![-1i32; num_voxels * channels], Vec::new()),
            PoolMethod::Avg => (Vec::new(), vec![0usize; num_voxels * cap]),
        };
        let mut dropped = 0usize;
        for (n, p) in points.iter().enumerate() {
            let Some(cell) = voxel_index(*p, roi, grid) else {
                continue;
            };
            let v = voxel_offset(cell, grid);
            if counts[v] >= cap {
                dropped += 1;
                continue;
            }
            let feat = &features[n * channels..(n + 1) * channels];
            let out = &mut pooled[v * channels..(v + 1) * channels];
            match config.method {
                PoolMethod::Max => {
                    let first = counts[v] == 0;
                    let arg = &mut argmax[v * channels..(v + 1) * channels];
                    for ((o, a), &f) in out.iter_mut().zip(arg.iter_mut()).zip(feat) {
                        // strict comparison keeps the first point on ties
                        if first || f > *o {
                            *o = f;
                            *a = n as i32;
                        }
                    }
                }
                PoolMethod::Avg => {
                    idx[v * cap + counts[v]] = n;
                    out.iter_mut().zip(feat).for_each(|(o, f)| *o += f);
                }
            }
            counts[v] += 1;
        }
        if dropped > 0 {
            log::trace!("roi {m}: dropped {dropped} points over the voxel capacity");
        }

        if config.method == PoolMethod::Avg {
            for (out, &count) in pooled.chunks_exact_mut(channels.max(1)).zip(&counts) {
                if count > 0 {
                    let inv = 1.0 / count as f32;
                    out.iter_mut().for_each(|o| *o *= inv);
                }
            }
        }

        RoiGrid {
            features: pooled,
            argmax,
            counts,
            idx,
        }
    });

    let mut output = RoiAwarePoolOutput {
        pooled_features: Vec::with_capacity(rois.len() * num_voxels * channels),
        argmax: Vec::new(),
        voxel_point_counts: Vec::with_capacity(rois.len() * num_voxels),
        voxel_point_idx: Vec::new(),
        num_rois: rois.len(),
        num_channels: channels,
        config: *config,
    };
    for grid in per_roi {
        output.pooled_features.extend(grid.features);
        output.argmax.extend(grid.argmax);
        output.voxel_point_counts.extend(grid.counts);
        output.voxel_point_idx.extend(grid.idx);
    }

    log::debug!(
        "roiaware pooled {} points into {} rois of {:?} voxels",
        points.len(),
        rois.len(),
        grid
    );
    Ok(output)
}

impl RoiAwarePoolOutput {
    /// Scatter a gradient of the pooled features back to the point features.
    ///
    /// With [`PoolMethod::Max`] every pooled value routes its gradient to the point in
    /// `argmax`. With [`PoolMethod::Avg`] it is split evenly over the retained points of
    /// the voxel.
    ///
    /// # Arguments
    ///
    /// * `grad_pooled` - Gradient with the shape of `pooled_features`.
    /// * `num_points` - The number of points of the forward call.
    ///
    /// # Returns
    ///
    /// The `N x C` gradient of the point features.
    ///
    /// # Errors
    ///
    /// Returns an error if the gradient shape differs from the pooled features or an
    /// index exceeds `num_points`.
    pub fn backward(&self, grad_pooled: &[f32], num_points: usize) -> Result<Vec<f32>, OpsError> {
        if grad_pooled.len() != self.pooled_features.len() {
            return Err(OpsError::LengthMismatch(
                "grad_pooled",
                grad_pooled.len(),
                "pooled_features",
                self.pooled_features.len(),
            ));
        }
        let channels = self.num_channels;
        let cap = self.config.max_pts_per_voxel;
        let mut grad_in = vec![0.0f32; num_points * channels];
        let check = |n: usize| {
            if n >= num_points {
                Err(OpsError::IndexOutOfBounds {
                    name: "grad_points",
                    index: n,
                    len: num_points,
                })
            } else {
                Ok(n)
            }
        };

        match self.config.method {
            PoolMethod::Max => {
                for (i, (&a, &g)) in self.argmax.iter().zip(grad_pooled).enumerate() {
                    if a < 0 {
                        continue;
                    }
                    let n = check(a as usize)?;
                    grad_in[n * channels + i % channels] += g;
                }
            }
            PoolMethod::Avg => {
                for (v, &count) in self.voxel_point_counts.iter().enumerate() {
                    if count == 0 {
                        continue;
                    }
                    let grad = &grad_pooled[v * channels..(v + 1) * channels];
                    let scale = 1.0 / count as f32;
                    for &n in &self.voxel_point_idx[v * cap..v * cap + count] {
                        let n = check(n)?;
                        grad_in[n * channels..(n + 1) * channels]
                            .iter_mut()
                            .zip(grad)
                            .for_each(|(gi, g)| *gi += g * scale);
                    }
                }
            }
        }
        Ok(grad_in)
    }
}
