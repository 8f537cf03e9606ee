//! Error type shared by all components.

use thiserror::Error;

/// Errors raised while planning an overlay.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The grid is empty, its shape disagrees with the transform, or a parameter is out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The coordinate transform could not resolve a pixel or world coordinate.
    #[error("coordinate transform failed: {0}")]
    TransformFailure(String),
    /// North and east could not be determined at the probed point.
    #[error("orientation is degenerate: probe vector length {length:.3e} px")]
    OrientationDegenerate {
        /// Length of the reprojected probe vector.
        length: f64,
    },
    /// A display range collapsed to a single value where a stretch was requested.
    #[error("display range collapsed to {value}")]
    NormalizationDegenerate {
        /// The value both ends of the range collapsed to.
        value: f64,
    },
}
