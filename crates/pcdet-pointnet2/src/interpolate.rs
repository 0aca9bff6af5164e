use pcdet_core::{
    error::check_features, layout::paired_ranges, points_from_slice, BatchLayout,
    ExecutionContext, OpsError,
};

/// Number of neighbors used by the interpolation.
pub const NUM_NEIGHBORS: usize = 3;

/// Added to the neighbor distances before inverting them.
pub const INTERPOLATION_EPS: f32 = 1e-8;

/// The three nearest known points of every unknown point.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreeNn {
    /// Euclidean distances with shape `N x 3`, ascending per point.
    /// Missing neighbors, when a cloud has fewer than three known points, are infinite.
    pub dist: Vec<f32>,
    /// Neighbor indices with shape `N x 3`, local to the cloud of each point.
    pub idx: Vec<usize>,
}

impl ThreeNn {
    /// Inverse distance weights with shape `N x 3`, normalized to sum to one per point.
    ///
    /// Missing neighbors get a zero weight. A point without any neighbor gets all zeros.
    pub fn weights(&self) -> Vec<f32> {
        let mut weights: Vec<f32> = self
            .dist
            .iter()
            .map(|&d| if d.is_finite() { 1.0 / (d + INTERPOLATION_EPS) } else { 0.0 })
            .collect();
        for w in weights.chunks_exact_mut(NUM_NEIGHBORS) {
            let norm: f32 = w.iter().sum();
            if norm > 0.0 {
                w.iter_mut().for_each(|v| *v /= norm);
            }
        }
        weights
    }
}

/// Find the three nearest known points of every unknown point of the same cloud.
///
/// # Arguments
///
/// * `ctx` - The execution context, one unit of work per unknown point.
/// * `unknown` - Flat `N x 3` points to interpolate at.
/// * `unknown_layout` - How the unknown points are split into clouds.
/// * `known` - Flat `M x 3` points carrying features.
/// * `known_layout` - How the known points are split into clouds.
///
/// # Errors
///
/// Returns an error on malformed buffers or mismatched layouts.
pub fn three_nn(
    ctx: &ExecutionContext,
    unknown: &[f32],
    unknown_layout: &BatchLayout,
    known: &[f32],
    known_layout: &BatchLayout,
) -> Result<ThreeNn, OpsError> {
    let unknown = points_from_slice("unknown", unknown)?;
    let known = points_from_slice("known", known)?;
    let (unknown_ranges, known_ranges) = paired_ranges(
        ("unknown", unknown_layout, unknown.len()),
        ("known", known_layout, known.len()),
    )?;

    let mut cloud_of_point = vec![0usize; unknown.len()];
    for (cloud, range) in unknown_ranges.iter().enumerate() {
        cloud_of_point[range.clone()].fill(cloud);
    }

    let mut dist = vec![f32::INFINITY; unknown.len() * NUM_NEIGHBORS];
    let mut idx = vec![0usize; unknown.len() * NUM_NEIGHBORS];
    ctx.for_each_slab2(
        (&mut dist, NUM_NEIGHBORS),
        (&mut idx, NUM_NEIGHBORS),
        unknown.len(),
        |n, best_d, best_i| {
            let range = known_ranges[cloud_of_point[n]].clone();
            let start = range.start;
            for k in range {
                let d2 = unknown[n].distance_squared(known[k]);
                // strict comparisons keep the lower index among equal distances
                if d2 < best_d[0] {
                    best_d[2] = best_d[1];
                    best_i[2] = best_i[1];
                    best_d[1] = best_d[0];
                    best_i[1] = best_i[0];
                    best_d[0] = d2;
                    best_i[0] = k - start;
                } else if d2 < best_d[1] {
                    best_d[2] = best_d[1];
                    best_i[2] = best_i[1];
                    best_d[1] = d2;
                    best_i[1] = k - start;
                } else if d2 < best_d[2] {
                    best_d[2] = d2;
                    best_i[2] = k - start;
                }
            }
            best_d.iter_mut().for_each(|d| *d = d.sqrt());
        },
    );

    Ok(ThreeNn { dist, idx })
}

/// Features interpolated at the unknown points, with what is needed to route gradients back.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolated {
    /// Interpolated features with shape `N x C`.
    pub features: Vec<f32>,
    /// Neighbor indices into the stacked known buffer, shape `N x 3`.
    /// Slots with a zero weight hold a placeholder, which is still a valid known index
    /// whenever at least one known point exists.
    pub idx: Vec<usize>,
    /// Interpolation weights, shape `N x 3`.
    pub weight: Vec<f32>,
    /// The number of channels `C`.
    pub num_channels: usize,
}

impl Interpolated {
    /// Scatter the gradient of the interpolated features back onto the known features.
    ///
    /// # Arguments
    ///
    /// * `grad_features` - Gradient with shape `N x C`.
    /// * `num_known` - The number of known points `M`.
    ///
    /// # Returns
    ///
    /// The gradient of the known features, shape `M x C`.
    ///
    /// # Errors
    ///
    /// Returns an error if the gradient does not match the forward output.
    pub fn backward(&self, grad_features: &[f32], num_known: usize) -> Result<Vec<f32>, OpsError> {
        if grad_features.len() != self.features.len() {
            return Err(OpsError::LengthMismatch(
                "grad_features",
                grad_features.len(),
                "features",
                self.features.len(),
            ));
        }
        let c = self.num_channels;
        let mut grad = vec![0.0f32; num_known * c];
        let neighbors = self
            .idx
            .chunks_exact(NUM_NEIGHBORS)
            .zip(self.weight.chunks_exact(NUM_NEIGHBORS));
        for ((idx, weight), g) in neighbors.zip(grad_features.chunks_exact(c.max(1))) {
            for (&k, &w) in idx.iter().zip(weight) {
                if w == 0.0 {
                    continue;
                }
                if k >= num_known {
                    return Err(OpsError::IndexOutOfBounds {
                        name: "idx",
                        index: k,
                        len: num_known,
                    });
                }
                grad[k * c..(k + 1) * c]
                    .iter_mut()
                    .zip(g)
                    .for_each(|(dst, v)| *dst += w * v);
            }
        }
        Ok(grad)
    }
}

/// Interpolate known features at the unknown points from their three nearest known points.
///
/// Each output is the inverse distance weighted sum of the features of the three nearest
/// known points of the same cloud. An unknown point exactly on a known point reproduces
/// its features.
///
/// # Arguments
///
/// * `ctx` - The execution context.
/// * `unknown` - Flat `N x 3` points to interpolate at.
/// * `unknown_layout` - How the unknown points are split into clouds.
/// * `known` - Flat `M x 3` points carrying features.
/// * `known_layout` - How the known points are split into clouds.
/// * `known_features` - Flat `M x C` features of the known points.
/// * `channels` - The number of feature channels `C`.
///
/// # Errors
///
/// Returns an error on malformed buffers or mismatched layouts.
///
/// # Example
///
/// ```
/// use pcdet_core::{BatchLayout, ExecutionContext};
/// use pcdet_pointnet2::interpolate::three_interpolate;
///
/// let known = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
/// let features = [1.0, 2.0, 3.0];
/// let single = BatchLayout::single();
/// let ctx = ExecutionContext::default();
/// let query = [1.0, 0.0, 0.0];
/// let out = three_interpolate(&ctx, &query, &single, &known, &single, &features, 1).unwrap();
/// assert!((out.features[0] - 2.0).abs() < 1e-4);
/// ```
pub fn three_interpolate(
    ctx: &ExecutionContext,
    unknown: &[f32],
    unknown_layout: &BatchLayout,
    known: &[f32],
    known_layout: &BatchLayout,
    known_features: &[f32],
    channels: usize,
) -> Result<Interpolated, OpsError> {
    let nn = three_nn(ctx, unknown, unknown_layout, known, known_layout)?;
    let num_known = known.len() / 3;
    check_features("known_features", known_features, num_known, channels)?;
    let num_unknown = nn.dist.len() / NUM_NEIGHBORS;

    let known_ranges = known_layout.ranges("known", num_known)?;
    let unknown_ranges = unknown_layout.ranges("unknown", num_unknown)?;
    let weight = nn.weights();
    let mut idx = nn.idx;
    for (u, k) in unknown_ranges.iter().zip(known_ranges.iter()) {
        // an empty cloud ending the batch would otherwise point one past the buffer
        let offset = if k.is_empty() {
            k.start.min(num_known.saturating_sub(1))
        } else {
            k.start
        };
        idx[u.start * NUM_NEIGHBORS..u.end * NUM_NEIGHBORS]
            .iter_mut()
            .for_each(|i| *i += offset);
    }

    let mut features = vec![0.0f32; num_unknown * channels];
    ctx.for_each_slab(&mut features, num_unknown, channels, |n, out| {
        for j in 0..NUM_NEIGHBORS {
            let w = weight[n * NUM_NEIGHBORS + j];
            if w == 0.0 {
                continue;
            }
            let k = idx[n * NUM_NEIGHBORS + j];
            out.iter_mut()
                .zip(&known_features[k * channels..(k + 1) * channels])
                .for_each(|(dst, v)| *dst += w * v);
        }
    });

    log::trace!("interpolated {num_unknown} points from {num_known} known points");

    Ok(Interpolated {
        features,
        idx,
        weight,
        num_channels: channels,
    })
}
