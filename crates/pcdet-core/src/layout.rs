use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::OpsError;

/// Describes how several point clouds are packed back to back in one flat buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchLayout {
    /// `batch_size` clouds with the same number of points each.
    Uniform {
        /// The number of clouds in the batch.
        batch_size: usize,
    },
    /// Clouds with a varying number of points, one count per cloud.
    Stacked(Vec<usize>),
}

impl Default for BatchLayout {
    fn default() -> Self {
        Self::single()
    }
}

impl BatchLayout {
    /// A batch holding a single cloud.
    pub fn single() -> Self {
        Self::Uniform { batch_size: 1 }
    }

    /// A uniform batch of `batch_size` clouds.
    pub fn uniform(batch_size: usize) -> Self {
        Self::Uniform { batch_size }
    }

    /// A stacked batch from per-cloud counts.
    pub fn stacked(counts: impl Into<Vec<usize>>) -> Self {
        Self::Stacked(counts.into())
    }

    /// A stacked batch from an offset table `[0, n0, n0 + n1, ...]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is empty, does not start at zero or decreases.
    pub fn from_offsets(offsets: &[usize]) -> Result<Self, OpsError> {
        let invalid = |reason: &str| OpsError::InvalidParameter {
            name: "offsets",
            reason: reason.to_string(),
        };
        match offsets.first() {
            None => return Err(invalid("offset table must not be empty")),
            Some(&first) if first != 0 => return Err(invalid("offset table must start at 0")),
            _ => {}
        }
        let counts = offsets
            .windows(2)
            .map(|w| w[1].checked_sub(w[0]))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid("offset table must be non-decreasing"))?;
        Ok(Self::Stacked(counts))
    }

    /// The number of clouds in the batch.
    pub fn num_clouds(&self) -> usize {
        match self {
            Self::Uniform { batch_size } => *batch_size,
            Self::Stacked(counts) => counts.len(),
        }
    }

    /// Resolve the record range of every cloud for a buffer of `total` records.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the buffer, used in error messages.
    /// * `total` - The number of records in the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout does not exactly cover `total` records.
    pub fn ranges(&self, name: &str, total: usize) -> Result<Vec<Range<usize>>, OpsError> {
        match self {
            Self::Uniform { batch_size: 0 } if total == 0 => Ok(Vec::new()),
            Self::Uniform { batch_size: 0 } => Err(OpsError::BatchMismatch(format!(
                "`{name}` has {total} records but the batch is empty"
            ))),
            Self::Uniform { batch_size } => {
                if total % batch_size != 0 {
                    return Err(OpsError::BatchMismatch(format!(
                        "`{name}` has {total} records, not divisible into {batch_size} clouds"
                    )));
                }
                let n = total / batch_size;
                Ok((0..*batch_size).map(|b| b * n..(b + 1) * n).collect())
            }
            Self::Stacked(counts) => {
                let sum: usize = counts.iter().sum();
                if sum != total {
                    return Err(OpsError::BatchMismatch(format!(
                        "`{name}` has {total} records but the cloud counts sum to {sum}"
                    )));
                }
                let mut start = 0;
                Ok(counts
                    .iter()
                    .map(|&n| {
                        let r = start..start + n;
                        start += n;
                        r
                    })
                    .collect())
            }
        }
    }
}

/// Resolve the ranges of two related buffers and check they describe the same clouds.
///
/// # Errors
///
/// Returns an error if either layout is invalid or the cloud counts differ.
#[allow(clippy::type_complexity)]
pub fn paired_ranges(
    (name_a, layout_a, total_a): (&str, &BatchLayout, usize),
    (name_b, layout_b, total_b): (&str, &BatchLayout, usize),
) -> Result<(Vec<Range<usize>>, Vec<Range<usize>>), OpsError> {
    let a = layout_a.ranges(name_a, total_a)?;
    let b = layout_b.ranges(name_b, total_b)?;
    if a.len() != b.len() {
        return Err(OpsError::BatchMismatch(format!(
            "`{name_a}` has {} clouds but `{name_b}` has {}",
            a.len(),
            b.len()
        )));
    }
    Ok((a, b))
}
