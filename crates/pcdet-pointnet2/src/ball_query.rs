use serde::{Deserialize, Serialize};

use pcdet_core::{layout::paired_ranges, points_from_slice, BatchLayout, ExecutionContext, OpsError};

/// Configuration of the fixed radius neighbor search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallQueryConfig {
    /// Points strictly closer than this distance are neighbors.
    pub radius: f32,
    /// Number of neighbor slots per query point.
    pub nsample: usize,
}

impl Default for BallQueryConfig {
    fn default() -> Self {
        Self {
            radius: 0.8,
            nsample: 16,
        }
    }
}

impl BallQueryConfig {
    /// Create a configuration from a radius and a slot count.
    pub fn new(radius: f32, nsample: usize) -> Self {
        Self { radius, nsample }
    }

    pub(crate) fn validate(&self) -> Result<(), OpsError> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(OpsError::InvalidParameter {
                name: "radius",
                reason: format!("must be finite and >= 0, got {}", self.radius),
            });
        }
        if self.nsample == 0 {
            return Err(OpsError::InvalidParameter {
                name: "nsample",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Fixed width neighbor lists of a set of query points.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborIndices {
    /// Neighbor indices with shape `M x nsample`, local to the cloud of each query.
    pub idx: Vec<usize>,
    /// Whether each query found no neighbor; its slots are then all zero.
    pub empty_mask: Vec<bool>,
    /// Number of slots per query.
    pub nsample: usize,
    /// How the queries are split into clouds.
    pub layout: BatchLayout,
}

impl NeighborIndices {
    /// The number of query points.
    pub fn num_queries(&self) -> usize {
        self.empty_mask.len()
    }

    /// The neighbor slots of query `m`.
    pub fn neighbors(&self, m: usize) -> &[usize] {
        &self.idx[m * self.nsample..(m + 1) * self.nsample]
    }
}

/// Find up to `nsample` source points within `radius` of every query point.
///
/// Neighbors are reported in source order, not sorted by distance. Missing slots repeat
/// the first neighbor found; queries without any neighbor get zero slots and are flagged
/// in `empty_mask`.
///
/// # Arguments
///
/// * `ctx` - The execution context, one unit of work per query.
/// * `xyz` - Flat `N x 3` source points of all clouds.
/// * `xyz_layout` - How the source points are split into clouds.
/// * `new_xyz` - Flat `M x 3` query points of all clouds.
/// * `new_xyz_layout` - How the query points are split into clouds.
/// * `config` - Radius and slot count.
///
/// # Errors
///
/// Returns an error on malformed buffers, mismatched layouts or an invalid radius or slot count.
///
/// # Example
///
/// ```
/// use pcdet_core::{BatchLayout, ExecutionContext};
/// use pcdet_pointnet2::ball_query::{ball_query, BallQueryConfig};
///
/// let xyz = [0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.1, 0.0, 0.0];
/// let new_xyz = [0.0, 0.0, 0.0];
/// let single = BatchLayout::single();
/// let out = ball_query(
///     &ExecutionContext::default(), &xyz, &single, &new_xyz, &single,
///     &BallQueryConfig::new(0.5, 4),
/// ).unwrap();
/// assert_eq!(out.idx, vec![0, 2, 0, 0]);
/// ```
pub fn ball_query(
    ctx: &ExecutionContext,
    xyz: &[f32],
    xyz_layout: &BatchLayout,
    new_xyz: &[f32],
    new_xyz_layout: &BatchLayout,
    config: &BallQueryConfig,
) -> Result<NeighborIndices, OpsError> {
    config.validate()?;
    let points = points_from_slice("xyz", xyz)?;
    let queries = points_from_slice("new_xyz", new_xyz)?;
    let (point_ranges, query_ranges) = paired_ranges(
        ("xyz", xyz_layout, points.len()),
        ("new_xyz", new_xyz_layout, queries.len()),
    )?;

    let mut cloud_of_query = vec![0usize; queries.len()];
    for (cloud, range) in query_ranges.iter().enumerate() {
        cloud_of_query[range.clone()].fill(cloud);
    }

    let nsample = config.nsample;
    let radius2 = config.radius * config.radius;
    let mut idx = vec![0usize; queries.len() * nsample];
    let mut empty_mask = vec![false; queries.len()];

    ctx.for_each_slab2(
        (&mut idx, nsample),
        (&mut empty_mask, 1),
        queries.len(),
        |m, slots, empty| {
            let range = point_ranges[cloud_of_query[m]].clone();
            let start = range.start;
            let mut cnt = 0;
            for k in range {
                if points[k].distance_squared(queries[m]) < radius2 {
                    if cnt == 0 {
                        slots.fill(k - start);
                    }
                    slots[cnt] = k - start;
                    cnt += 1;
                    if cnt >= nsample {
                        break;
                    }
                }
            }
            empty[0] = cnt == 0;
        },
    );

    log::trace!(
        "ball query of {} points against {} sources, {} empty",
        queries.len(),
        points.len(),
        empty_mask.iter().filter(|&&e| e).count()
    );

    Ok(NeighborIndices {
        idx,
        empty_mask,
        nsample,
        layout: new_xyz_layout.clone(),
    })
}
