//! Error types for relief toolpath generation.

use thiserror::Error;

/// Errors that abort a generation request.
///
/// Degenerate geometry (vertical faces, parallel intersections, zero-length
/// edges) never surfaces here; it is skipped where it is found.
#[derive(Error, Debug)]
pub enum ReliefError {
    /// The mesh bytes could not be parsed.
    #[error("mesh load failed: {0}")]
    MeshLoadFailed(String),

    /// The raster bytes could not be decoded.
    #[error("image load failed: {0}")]
    ImageLoadFailed(String),

    /// A configuration value violates a precondition.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The selected strategy cannot consume this kind of source.
    #[error("unsupported source for {strategy}: {reason}")]
    UnsupportedSource {
        strategy: &'static str,
        reason: String,
    },

    /// Grid construction produced no cells.
    #[error("height grid is empty: {0}")]
    EmptyGrid(String),

    /// JSON (de)serialization failed at the interchange boundary.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for relief operations.
pub type Result<T> = std::result::Result<T, ReliefError>;
