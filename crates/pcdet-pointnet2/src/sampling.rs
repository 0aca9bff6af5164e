use glam::Vec3;
use serde::{Deserialize, Serialize};

use pcdet_core::{
    error::check_records, points_from_slice, BatchLayout, ExecutionContext, OpsError,
};

/// How many points to sample from each cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleCount {
    /// The same number of samples for every cloud.
    Fixed(usize),
    /// One sample count per cloud.
    PerCloud(Vec<usize>),
}

impl SampleCount {
    fn resolve(&self, num_clouds: usize) -> Result<Vec<usize>, OpsError> {
        match self {
            Self::Fixed(m) => Ok(vec![*m; num_clouds]),
            Self::PerCloud(counts) if counts.len() == num_clouds => Ok(counts.clone()),
            Self::PerCloud(counts) => Err(OpsError::BatchMismatch(format!(
                "{} sample counts given for {num_clouds} clouds",
                counts.len()
            ))),
        }
    }
}

/// Indices of sampled points together with the layout of the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledIndices {
    /// Sampled point indices, local to their cloud, in selection order.
    pub idx: Vec<usize>,
    /// How the samples are split into clouds.
    pub layout: BatchLayout,
}

fn sample_cloud(ctx: &ExecutionContext, points: &[Vec3], m: usize) -> Vec<usize> {
    if m == 0 {
        return Vec::new();
    }
    let mut dist = vec![f32::INFINITY; points.len()];
    let mut selected = Vec::with_capacity(m);
    let mut last = 0;
    dist[last] = f32::NEG_INFINITY;
    selected.push(last);
    while selected.len() < m {
        let anchor = points[last];
        ctx.for_each_mut(&mut dist, |k, d| {
            *d = d.min(points[k].distance_squared(anchor));
        });
        // selected points hold -inf and are never picked again
        let Some(best) = ctx.argmax(&dist) else {
            break;
        };
        dist[best] = f32::NEG_INFINITY;
        selected.push(best);
        last = best;
    }
    selected
}

/// Select points that greedily maximize their distance to the points already selected.
///
/// The first point of every cloud is selected first. Each following pick is the point
/// with the largest squared distance to its nearest selected point, the lowest index
/// winning ties.
///
/// # Arguments
///
/// * `ctx` - The execution context. Clouds and the distance updates of a round run on it.
/// * `xyz` - Flat `N x 3` points of all clouds.
/// * `layout` - How the points are split into clouds.
/// * `count` - The number of samples per cloud.
///
/// # Errors
///
/// Returns an error if a sample count exceeds the size of its cloud.
///
/// # Example
///
/// ```
/// use pcdet_core::{BatchLayout, ExecutionContext};
/// use pcdet_pointnet2::sampling::{furthest_point_sample, SampleCount};
///
/// let xyz = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 10.0, 0.0, 0.0, 4.0, 0.0, 0.0];
/// let ctx = ExecutionContext::default();
/// let single = BatchLayout::single();
/// let out = furthest_point_sample(&ctx, &xyz, &single, &SampleCount::Fixed(3)).unwrap();
/// assert_eq!(out.idx, vec![0, 2, 3]);
/// ```
pub fn furthest_point_sample(
    ctx: &ExecutionContext,
    xyz: &[f32],
    layout: &BatchLayout,
    count: &SampleCount,
) -> Result<SampledIndices, OpsError> {
    let points = points_from_slice("xyz", xyz)?;
    let ranges = layout.ranges("xyz", points.len())?;
    let counts = count.resolve(ranges.len())?;
    for (range, &m) in ranges.iter().zip(counts.iter()) {
        if m > range.len() {
            return Err(OpsError::InvalidParameter {
                name: "count",
                reason: format!("cannot sample {m} points from a cloud of {}", range.len()),
            });
        }
    }

    let per_cloud = ctx.map(ranges.len(), |b| {
        sample_cloud(ctx, &points[ranges[b].clone()], counts[b])
    });

    log::debug!(
        "furthest point sampling of {} clouds, {} samples",
        ranges.len(),
        counts.iter().sum::<usize>()
    );

    let layout = match count {
        SampleCount::Fixed(_) => BatchLayout::uniform(ranges.len()),
        SampleCount::PerCloud(_) => BatchLayout::stacked(counts),
    };
    Ok(SampledIndices {
        idx: per_cloud.into_iter().flatten().collect(),
        layout,
    })
}

/// Gather feature records by cloud-local indices.
///
/// # Arguments
///
/// * `ctx` - The execution context.
/// * `features` - Flat `N x C` features of all clouds.
/// * `channels` - The number of channels `C`.
/// * `features_layout` - How the features are split into clouds.
/// * `samples` - The indices to gather and their layout.
///
/// # Returns
///
/// The gathered `M x C` records.
///
/// # Errors
///
/// Returns an error on mismatched layouts or an index outside its cloud.
pub fn gather_points(
    ctx: &ExecutionContext,
    features: &[f32],
    channels: usize,
    features_layout: &BatchLayout,
    samples: &SampledIndices,
) -> Result<Vec<f32>, OpsError> {
    let num_points = check_records("features", features, channels)?;
    let ranges = features_layout.ranges("features", num_points)?;
    let sample_ranges = samples.layout.ranges("samples", samples.idx.len())?;
    if ranges.len() != sample_ranges.len() {
        return Err(OpsError::BatchMismatch(format!(
            "`features` has {} clouds but `samples` has {}",
            ranges.len(),
            sample_ranges.len()
        )));
    }

    let mut sources = vec![0usize; samples.idx.len()];
    for (b, range) in sample_ranges.iter().enumerate() {
        for m in range.clone() {
            let local = samples.idx[m];
            if local >= ranges[b].len() {
                return Err(OpsError::IndexOutOfBounds {
                    name: "samples",
                    index: local,
                    len: ranges[b].len(),
                });
            }
            sources[m] = ranges[b].start + local;
        }
    }

    let mut out = vec![0.0f32; sources.len() * channels];
    ctx.for_each_slab(&mut out, sources.len(), channels, |m, record| {
        let n = sources[m];
        record.copy_from_slice(&features[n * channels..(n + 1) * channels]);
    });
    Ok(out)
}
