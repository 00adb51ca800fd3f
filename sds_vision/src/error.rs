// THEORY:
// Every failure in this crate is a precondition violation by the caller, never a
// transient condition, so nothing here is retried. Errors are grouped by layer:
// `VisionError` for the image and micro-test core, `DatasetError` for decoding the
// IDX files, `SwarmError` for the search driver, and `ExperimentError` as the
// umbrella the orchestration layer returns.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by `Image` and `MicrotestSpace`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VisionError {
    /// An image was built from both a grid and dimensions, from neither, or from
    /// an empty grid / zero dimension.
    #[error("invalid image construction: {0}")]
    InvalidConstruction(String),

    /// A grid row has a different length from the first row.
    #[error("ragged grid: row {row} has {actual} columns, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// A hypothesis image does not share the reference image's dimensions.
    #[error("shape mismatch: expected {expected_width}x{expected_height}, got {actual_width}x{actual_height}")]
    ShapeMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("position ({x}, {y}) is outside a {width}x{height} image")]
    PositionOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    #[error("micro-test index {index} is outside [0, {size})")]
    TestIndexOutOfRange { index: usize, size: usize },
}

impl VisionError {
    pub fn invalid_construction(message: impl Into<String>) -> Self {
        Self::InvalidConstruction(message.into())
    }

    /// True for both shape-class variants.
    pub fn is_shape_error(&self) -> bool {
        matches!(self, Self::RaggedRow { .. } | Self::ShapeMismatch { .. })
    }

    /// True for both index-range-class variants.
    pub fn is_index_error(&self) -> bool {
        matches!(
            self,
            Self::PositionOutOfBounds { .. } | Self::TestIndexOutOfRange { .. }
        )
    }
}

/// Errors raised while decoding the IDX image and label files.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error while reading dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic number {actual:#010x}, expected {expected:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    /// The payload ended before the header's declared record count was read.
    #[error("truncated {what}: expected {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A header field is zero, overflows, or does not fit the on-disk width.
    #[error("bad {what}: {detail}")]
    BadHeader { what: &'static str, detail: String },

    #[error("image file holds {images} records but label file holds {labels}")]
    CountMismatch { images: usize, labels: usize },

    #[error(transparent)]
    Image(#[from] VisionError),
}

/// Errors raised by the stochastic diffusion search driver.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("swarm must have at least one agent")]
    NoAgents,

    #[error("hypothesis pool is empty")]
    NoHypotheses,

    #[error("micro-test space is empty")]
    NoMicrotests,

    #[error("micro-test failed: {0}")]
    Microtest(#[from] VisionError),
}

/// Errors surfaced by the example and experiment runners.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Swarm(#[from] SwarmError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("no test pictures were loaded")]
    NoTestPictures,

    #[error("swarm produced no hypothesis cluster")]
    NoCluster,

    #[error("failed to write results to {path}: {source}")]
    Results {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed results log: {0}")]
    Json(#[from] serde_json::Error),

    #[error("worker pool failure: {0}")]
    Worker(&'static str),
}
