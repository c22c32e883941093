use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("fps must be finite and positive, got {0}")]
    InvalidFps(f64),

    #[error("non-finite detection in frame {frame}")]
    InvalidDetection { frame: usize },

    #[error("frame index {index} does not follow {previous}")]
    NonMonotoneFrames { previous: usize, index: usize },

    #[error("invalid configuration field `{field}`")]
    InvalidConfig { field: &'static str },

    #[error("unsupported frame shape {height}x{width}x{channels}")]
    InvalidFrame {
        height: usize,
        width: usize,
        channels: usize,
    },

    #[error("cannot parse env override {name}={value:?}")]
    EnvParse { name: String, value: String },
}

impl Error {
    /// Stable reason code reported in result records.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidFps(_) => "invalid_fps",
            Error::InvalidDetection { .. } => "invalid_detection",
            Error::NonMonotoneFrames { .. } => "non_monotone_frames",
            Error::InvalidConfig { .. } => "invalid_config",
            Error::InvalidFrame { .. } => "invalid_frame",
            Error::EnvParse { .. } => "invalid_env",
        }
    }
}
