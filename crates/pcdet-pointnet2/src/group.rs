use serde::{Deserialize, Serialize};

use pcdet_core::{
    error::{check_features, check_records},
    layout::paired_ranges,
    points_from_slice, BatchLayout, ExecutionContext, OpsError,
};

use crate::ball_query::{ball_query, BallQueryConfig, NeighborIndices};

/// Resolve every neighbor slot to an index into the stacked source buffer.
fn resolve_neighbors(
    neighbors: &NeighborIndices,
    source_layout: &BatchLayout,
    num_sources: usize,
) -> Result<Vec<usize>, OpsError> {
    let num_queries = check_records("idx", &neighbors.idx, neighbors.nsample)?;
    if num_queries != neighbors.empty_mask.len() {
        return Err(OpsError::LengthMismatch(
            "idx",
            num_queries,
            "empty_mask",
            neighbors.empty_mask.len(),
        ));
    }
    let (source_ranges, query_ranges) = paired_ranges(
        ("features", source_layout, num_sources),
        ("idx", &neighbors.layout, num_queries),
    )?;

    let mut resolved = vec![0usize; neighbors.idx.len()];
    for (range, sources) in query_ranges.iter().zip(source_ranges.iter()) {
        let slots = range.start * neighbors.nsample..range.end * neighbors.nsample;
        for s in slots {
            let local = neighbors.idx[s];
            // slots of empty balls are zero and may point into an empty cloud
            if local >= sources.len() && !neighbors.empty_mask[s / neighbors.nsample] {
                return Err(OpsError::IndexOutOfBounds {
                    name: "idx",
                    index: local,
                    len: sources.len(),
                });
            }
            resolved[s] = sources.start + local;
        }
    }
    Ok(resolved)
}

/// Gather the features of every neighbor slot.
///
/// # Arguments
///
/// * `ctx` - The execution context, one unit of work per query.
/// * `features` - Flat `N x C` source features of all clouds.
/// * `channels` - The number of channels `C`.
/// * `features_layout` - How the features are split into clouds.
/// * `neighbors` - Cloud-local neighbor indices, as returned by the ball query.
///
/// # Returns
///
/// Grouped features with shape `M x nsample x C`. Slots of empty balls are zero.
///
/// # Errors
///
/// Returns an error on mismatched layouts or a neighbor index outside its cloud.
pub fn group_points(
    ctx: &ExecutionContext,
    features: &[f32],
    channels: usize,
    features_layout: &BatchLayout,
    neighbors: &NeighborIndices,
) -> Result<Vec<f32>, OpsError> {
    let num_points = check_records("features", features, channels)?;
    let sources = resolve_neighbors(neighbors, features_layout, num_points)?;
    let nsample = neighbors.nsample;

    let mut out = vec![0.0f32; sources.len() * channels];
    ctx.for_each_slab(&mut out, neighbors.num_queries(), nsample * channels, |m, group| {
        if neighbors.empty_mask[m] {
            return;
        }
        for (record, &n) in group
            .chunks_exact_mut(channels)
            .zip(&sources[m * nsample..(m + 1) * nsample])
        {
            record.copy_from_slice(&features[n * channels..(n + 1) * channels]);
        }
    });
    Ok(out)
}

/// Scatter the gradient of [`group_points`] back onto the source features.
///
/// Every slot adds its gradient to the source record it was gathered from, so a point
/// shared by several slots receives the sum of their gradients.
///
/// # Arguments
///
/// * `ctx` - The execution context, one unit of work per cloud.
/// * `grad_grouped` - Gradient with shape `M x nsample x C`.
/// * `channels` - The number of channels `C`.
/// * `features_layout` - How the source features are split into clouds.
/// * `num_points` - The number of source points `N`.
/// * `neighbors` - The neighbor indices used in the forward pass.
///
/// # Returns
///
/// The gradient of the source features, shape `N x C`.
///
/// # Errors
///
/// Returns an error if the gradient does not match the neighbor indices.
pub fn group_points_backward(
    ctx: &ExecutionContext,
    grad_grouped: &[f32],
    channels: usize,
    features_layout: &BatchLayout,
    num_points: usize,
    neighbors: &NeighborIndices,
) -> Result<Vec<f32>, OpsError> {
    let expected = neighbors.idx.len() * channels;
    if grad_grouped.len() != expected {
        return Err(OpsError::LengthMismatch(
            "grad_grouped",
            grad_grouped.len(),
            "idx x channels",
            expected,
        ));
    }
    let sources = resolve_neighbors(neighbors, features_layout, num_points)?;
    let source_ranges = features_layout.ranges("features", num_points)?;
    let query_ranges = neighbors.layout.ranges("idx", neighbors.num_queries())?;
    let nsample = neighbors.nsample;

    // clouds own disjoint parts of the gradient and accumulate independently
    let per_cloud = ctx.map(source_ranges.len(), |b| {
        let start = source_ranges[b].start;
        let mut grad = vec![0.0f32; source_ranges[b].len() * channels];
        for m in query_ranges[b].clone() {
            if neighbors.empty_mask[m] {
                continue;
            }
            for s in m * nsample..(m + 1) * nsample {
                let n = sources[s] - start;
                let src = &grad_grouped[s * channels..(s + 1) * channels];
                grad[n * channels..(n + 1) * channels]
                    .iter_mut()
                    .zip(src)
                    .for_each(|(g, v)| *g += v);
            }
        }
        grad
    });
    Ok(per_cloud.into_iter().flatten().collect())
}

/// Configuration of the combined ball query and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryAndGroupConfig {
    /// The neighbor search.
    pub ball: BallQueryConfig,
    /// Prepend the neighbor coordinates relative to the query to every grouped record.
    pub use_xyz: bool,
}

impl Default for QueryAndGroupConfig {
    fn default() -> Self {
        Self {
            ball: BallQueryConfig::default(),
            use_xyz: true,
        }
    }
}

/// Output of [`query_and_group`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedPoints {
    /// Grouped records with shape `M x nsample x width`.
    pub features: Vec<f32>,
    /// The record width, `3 + C` with relative coordinates and `C` without.
    pub width: usize,
    /// The neighbor indices the records were gathered with.
    pub neighbors: NeighborIndices,
}

/// Find the neighbors of every query and group their relative coordinates and features.
///
/// Records of queries without neighbors are zero.
///
/// # Arguments
///
/// * `ctx` - The execution context.
/// * `xyz` - Flat `N x 3` source points of all clouds.
/// * `xyz_layout` - How the source points are split into clouds.
/// * `new_xyz` - Flat `M x 3` query points of all clouds.
/// * `new_xyz_layout` - How the query points are split into clouds.
/// * `features` - Optional flat `N x C` source features with their channel count `C`.
/// * `config` - The neighbor search and whether to include coordinates.
///
/// # Errors
///
/// Returns an error if there is nothing to group, or if the ball query or grouping fails.
pub fn query_and_group(
    ctx: &ExecutionContext,
    xyz: &[f32],
    xyz_layout: &BatchLayout,
    new_xyz: &[f32],
    new_xyz_layout: &BatchLayout,
    features: Option<(&[f32], usize)>,
    config: &QueryAndGroupConfig,
) -> Result<GroupedPoints, OpsError> {
    if features.is_none() && !config.use_xyz {
        return Err(OpsError::InvalidParameter {
            name: "use_xyz",
            reason: "must be set when no features are given".to_string(),
        });
    }
    let neighbors = ball_query(ctx, xyz, xyz_layout, new_xyz, new_xyz_layout, &config.ball)?;
    let num_points = points_from_slice("xyz", xyz)?.len();
    let queries = points_from_slice("new_xyz", new_xyz)?;

    let (channels, grouped_features) = match features {
        Some((f, c)) => {
            check_features("features", f, num_points, c)?;
            let grouped = if c == 0 {
                Vec::new()
            } else {
                group_points(ctx, f, c, xyz_layout, &neighbors)?
            };
            (c, grouped)
        }
        None => (0, Vec::new()),
    };
    let xyz_width = if config.use_xyz { 3 } else { 0 };
    let width = xyz_width + channels;
    let nsample = neighbors.nsample;

    let grouped_xyz = if config.use_xyz {
        let mut grouped = group_points(ctx, xyz, 3, xyz_layout, &neighbors)?;
        ctx.for_each_slab(&mut grouped, queries.len(), nsample * 3, |m, group| {
            let q = queries[m].to_array();
            for record in group.chunks_exact_mut(3) {
                record.iter_mut().zip(q).for_each(|(v, c)| *v -= c);
            }
        });
        grouped
    } else {
        Vec::new()
    };

    let mut out = vec![0.0f32; queries.len() * nsample * width];
    ctx.for_each_slab(&mut out, queries.len() * nsample, width, |s, record| {
        if neighbors.empty_mask[s / nsample] {
            return;
        }
        record[..xyz_width].copy_from_slice(&grouped_xyz[s * xyz_width..(s + 1) * xyz_width]);
        record[xyz_width..].copy_from_slice(&grouped_features[s * channels..(s + 1) * channels]);
    });

    Ok(GroupedPoints {
        features: out,
        width,
        neighbors,
    })
}
