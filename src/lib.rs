pub mod calibration;
pub mod capture;
pub mod coach;
pub mod config;
pub mod detection;
pub mod diagnostics;
pub mod error;
pub mod explain;
pub mod frame;
pub mod math;
pub mod pipeline;
pub mod stabilizer;
pub mod track;

mod circular_queue;
mod ema;
mod predictor;

pub use calibration::{calibrate, CalibrationConfig, CalibrationResult, CalibrationStatus};
pub use capture::{CaptureReport, CaptureStats, Hud, HysteresisSnapshot, UxState};
pub use config::Config;
pub use detection::BallDetection;
pub use error::Error;
pub use frame::Frame;
pub use pipeline::{analyze, analyze_input, AnalyzeInput, ResultRecord};
pub use stabilizer::{stabilize, Stabilizer, StabilizerConfig};
pub use track::{StabilizedTrack, TrackMetrics, TrackPoint};
