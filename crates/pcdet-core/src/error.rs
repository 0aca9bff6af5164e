use thiserror::Error;

/// An error type for the point cloud detection operators.
#[derive(Error, Debug, PartialEq)]
pub enum OpsError {
    /// A flat buffer length is not a multiple of its record width.
    #[error("Invalid shape for `{name}`: length {len} is not a multiple of {width}")]
    InvalidShape {
        /// The name of the buffer.
        name: &'static str,
        /// The length of the buffer.
        len: usize,
        /// The expected record width.
        width: usize,
    },

    /// Two buffers that describe the same elements have a different number of records.
    #[error("Length mismatch between `{0}` ({1}) and `{2}` ({3})")]
    LengthMismatch(&'static str, usize, &'static str, usize),

    /// The batch layouts of two related buffers disagree.
    #[error("Batch mismatch: {0}")]
    BatchMismatch(String),

    /// A scalar parameter is outside its valid domain.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// The parameter name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// An index refers past the end of the buffer it indexes.
    #[error("Index {index} out of bounds for `{name}` with {len} elements")]
    IndexOutOfBounds {
        /// The name of the indexed buffer.
        name: &'static str,
        /// The offending index.
        index: usize,
        /// The number of elements in the indexed buffer.
        len: usize,
    },

    /// A score used for ordering is NaN.
    #[error("Score at position {0} is not a number")]
    NonFiniteScore(usize),

    /// The execution context could not be built.
    #[error("Failed to build the thread pool: {0}")]
    Parallel(String),
}

/// Check that a flat buffer holds whole records of `width` elements and return the record count.
///
/// # Arguments
///
/// * `name` - The buffer name, used in the error message.
/// * `buf` - The flat buffer.
/// * `width` - The number of elements per record.
///
/// # Returns
///
/// The number of records in the buffer.
pub fn check_records<T>(name: &'static str, buf: &[T], width: usize) -> Result<usize, OpsError> {
    if width == 0 {
        return Err(OpsError::InvalidParameter {
            name,
            reason: "record width must be > 0".to_string(),
        });
    }
    if buf.len() % width != 0 {
        return Err(OpsError::InvalidShape {
            name,
            len: buf.len(),
            width,
        });
    }
    Ok(buf.len() / width)
}

/// Check that a feature buffer holds `channels` values for each of `num_points` points.
///
/// # Errors
///
/// Returns an error if the buffer length differs from `num_points * channels`.
pub fn check_features(
    name: &'static str,
    features: &[f32],
    num_points: usize,
    channels: usize,
) -> Result<(), OpsError> {
    let expected = num_points * channels;
    if features.len() != expected {
        return Err(OpsError::LengthMismatch(
            name,
            features.len(),
            "points x channels",
            expected,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_records() -> Result<(), OpsError> {
        assert_eq!(check_records("xyz", &[0.0f32; 9], 3)?, 3);
        assert_eq!(check_records("xyz", &[0.0f32; 0], 3)?, 0);
        assert_eq!(
            check_records("xyz", &[0.0f32; 4], 3),
            Err(OpsError::InvalidShape {
                name: "xyz",
                len: 4,
                width: 3
            })
        );
        Ok(())
    }

    #[test]
    fn test_check_features() -> Result<(), OpsError> {
        check_features("features", &[0.0; 8], 4, 2)?;
        // no points still carries the channel count
        check_features("features", &[], 0, 4)?;
        check_features("features", &[], 3, 0)?;
        assert!(check_features("features", &[0.0; 3], 0, 4).is_err());
        assert_eq!(
            check_features("features", &[0.0; 7], 4, 2),
            Err(OpsError::LengthMismatch(
                "features",
                7,
                "points x channels",
                8
            ))
        );
        Ok(())
    }

    #[test]
    fn test_error_message() {
        let err = OpsError::LengthMismatch("scores", 3, "boxes", 4);
        assert_eq!(
            err.to_string(),
            "Length mismatch between `scores` (3) and `boxes` (4)"
        );
    }
}
