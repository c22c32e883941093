use ndarray::ArrayView3;
use serde_derive::Serialize;
use serde_json::Value;

use crate::calibration::{calibrate, CalibrationResult};
use crate::capture::{
    analyze_capture_quality, collect_stats, effective_fps, hud_from_guardrails, CaptureReport,
    CaptureStats, GuardrailInputs, Guardrails, GuardrailsResult, Hud, HysteresisSnapshot,
};
use crate::coach::{micro_coach, MicroCoach};
use crate::config::Config;
use crate::diagnostics::{diagnose, Diagnostics, DiagnosticsInputs};
use crate::error::Error;
use crate::explain::{explain, Explain, ExplainInputs};
use crate::frame::Frame;
use crate::math::is_positive;
use crate::stabilizer::stabilize;
use crate::track::{StabilizedTrack, TrackMetrics};

/// Everything one analysis run looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeInput<'a> {
    pub detections: &'a [Frame],
    pub fps: f64,
    /// per-frame image statistics, when frames were supplied
    pub capture: Option<&'a CaptureStats>,
    pub frame_timestamps: Option<&'a [f64]>,
    /// snapshot returned by the previous run's HUD
    pub prior_hud: Option<&'a HysteresisSnapshot>,
}

/// The externally visible result of one run.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResultRecord {
    #[serde(flatten)]
    pub calibration: CalibrationResult,
    pub track: TrackMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureReport>,
    pub guardrails: GuardrailsResult,
    pub hud: Hud,
    pub explain: Explain,
    pub micro_coach: MicroCoach,
    pub diagnostics: Diagnostics,
}

impl ResultRecord {
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Snapshot to hand to the next run.
    #[inline]
    pub fn hud_snapshot(&self) -> &HysteresisSnapshot {
        self.hud.snapshot()
    }
}

/// Drops non-finite detections, clamps confidences and flags frames whose
/// index does not increase. The stabilizer skips those frames on its own.
fn sanitize_frames(frames: &[Frame], errors: &mut Vec<Error>) -> Vec<Frame> {
    let mut previous: Option<usize> = None;

    frames
        .iter()
        .map(|frame| {
            if let Some(prev) = previous.filter(|&p| frame.index <= p) {
                errors.push(Error::NonMonotoneFrames {
                    previous: prev,
                    index: frame.index,
                });
            } else {
                previous = Some(frame.index);
            }

            let detections = frame
                .iter()
                .filter_map(|det| match det.sanitized(frame.index) {
                    Ok(det) => Some(det),
                    Err(err) => {
                        errors.push(err);
                        None
                    }
                })
                .collect();

            Frame::new(frame.index, detections)
        })
        .collect()
}

/// Runs the whole pipeline. Never fails: invalid inputs are replaced by safe
/// defaults and their reason codes lead `quality.reasons`.
pub fn analyze_input(input: &AnalyzeInput<'_>, cfg: &Config) -> ResultRecord {
    let (cfg, mut errors) = cfg.clone().validated();

    let fps = if is_positive(input.fps) {
        input.fps
    } else {
        errors.push(Error::InvalidFps(input.fps));
        0.0
    };
    let declared_fps = Some(fps).filter(|&f| f > 0.0);

    let frames = sanitize_frames(input.detections, &mut errors);
    let track: StabilizedTrack = stabilize(&frames, &cfg.stabilizer);

    tracing::debug!(
        frames = frames.len(),
        points = track.len(),
        n_missing = track.n_missing,
        outliers = track.outliers_removed,
        "track stabilized"
    );

    let mut calibration = calibrate(&track.points, fps, &cfg.calibration);

    let capture = input.capture.filter(|s| !s.is_empty());
    if let Some(stats) = input.capture {
        errors.extend(stats.rejected.iter().cloned());
    }
    let capture_report =
        capture.map(|stats| analyze_capture_quality(stats, declared_fps, &cfg.capture_quality));

    let mut guard_inputs = match capture {
        Some(stats) => GuardrailInputs::from_stats(stats, declared_fps),
        None => GuardrailInputs {
            fps: declared_fps,
            ..Default::default()
        },
    }
    .with_track(&track.points);
    guard_inputs.frame_timestamps = input.frame_timestamps;

    let guardrails = Guardrails::new(cfg.guardrails.clone()).evaluate(&guard_inputs);
    let hud = hud_from_guardrails(&guardrails, &cfg.hysteresis, input.prior_hud, true);

    // validation codes lead, component reasons follow
    calibration
        .quality
        .reasons
        .prepend(errors.iter().map(Error::code));

    let explain = explain(
        &ExplainInputs {
            guardrails: Some(&guardrails),
            hud: Some(&hud),
            calibration: Some(&calibration),
            extra_flags: &[],
        },
        &cfg.calibration,
    );
    let micro_coach = micro_coach(Some(&explain), Some(&hud), true, &cfg.coach);

    let camera_fps = input
        .frame_timestamps
        .and_then(|ts| effective_fps(None, Some(ts)));
    let diagnostics = diagnose(&DiagnosticsInputs {
        track: Some(&track),
        fps: declared_fps,
        camera_fps,
        calibration: Some(&calibration),
    });

    tracing::info!(
        status = calibration.status.as_str(),
        hud = hud.state.as_str(),
        explain = explain.confidence.score,
        n_errors = errors.len(),
        "analysis finished"
    );

    ResultRecord {
        calibration,
        track: track.metrics(),
        capture: capture_report,
        guardrails,
        hud,
        explain,
        micro_coach,
        diagnostics,
    }
}

/// Reduces `frames` to capture statistics and runs [`analyze_input`].
/// An empty frame iterator means no capture section in the record.
pub fn analyze<'a, I>(
    frames: I,
    detections: &[Frame],
    fps: f64,
    cfg: &Config,
    prior_hud: Option<&HysteresisSnapshot>,
) -> ResultRecord
where
    I: IntoIterator<Item = ArrayView3<'a, u8>>,
{
    let stats = collect_stats(frames);
    let has_frames = !stats.is_empty() || !stats.rejected.is_empty();

    analyze_input(
        &AnalyzeInput {
            detections,
            fps,
            capture: has_frames.then_some(&stats),
            frame_timestamps: None,
            prior_hud,
        },
        cfg,
    )
}
