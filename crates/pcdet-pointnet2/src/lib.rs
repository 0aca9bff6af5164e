#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Fixed radius neighbor search.
pub mod ball_query;

/// Neighbor grouping and its gradient.
pub mod group;

/// Three nearest neighbor feature interpolation.
pub mod interpolate;

/// Furthest point sampling and index gathering.
pub mod sampling;

pub use ball_query::{ball_query, BallQueryConfig, NeighborIndices};
pub use group::{
    group_points, group_points_backward, query_and_group, GroupedPoints, QueryAndGroupConfig,
};
pub use interpolate::{three_interpolate, three_nn, Interpolated, ThreeNn};
pub use sampling::{furthest_point_sample, gather_points, SampleCount, SampledIndices};
