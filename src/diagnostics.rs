use serde_derive::Serialize;
use serde_json::{json, Value};

use crate::calibration::CalibrationResult;
use crate::capture::Severity;
use crate::math::round_to;
use crate::track::StabilizedTrack;

pub const TRACK_BREAKS_WARN: usize = 1;
pub const TRACK_BREAKS_ERROR: usize = 3;
pub const MAX_GAP_FRAMES_WARN: usize = 4;
pub const MAX_GAP_FRAMES_ERROR: usize = 8;
pub const AVG_CONFIDENCE_WARN: f64 = 0.35;
pub const AVG_CONFIDENCE_ERROR: f64 = 0.2;
pub const GAP_RATIO_WARN: f64 = 0.18;
pub const GAP_RATIO_ERROR: f64 = 0.32;
pub const JITTER_WARN_PX: f64 = 6.0;
pub const JITTER_ERROR_PX: f64 = 12.0;
pub const MISSING_RATIO_WARN: f64 = 0.2;
pub const MISSING_RATIO_ERROR: f64 = 0.4;
pub const MIN_BALL_POINTS: usize = 6;
pub const CALIBRATION_CONFIDENCE_WARN: f64 = 0.6;
pub const CALIBRATION_CONFIDENCE_ERROR: f64 = 0.4;
pub const LAUNCH_WINDOW_MIN: usize = 4;
pub const FPS_WARN: f64 = 60.0;
pub const FPS_ERROR: f64 = 45.0;
pub const FPS_MISMATCH_WARN: f64 = 5.0;
pub const FPS_MISMATCH_ERROR: f64 = 12.0;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DiagnosticIssue {
    pub code: &'static str,
    pub severity: Severity,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub confidence: f64,
    pub issues: Vec<DiagnosticIssue>,
    pub summary: String,
}

impl Diagnostics {
    pub fn has_issue(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsInputs<'a> {
    pub track: Option<&'a StabilizedTrack>,
    /// fps the analysis ran with
    pub fps: Option<f64>,
    /// fps measured from frame timestamps, if any
    pub camera_fps: Option<f64>,
    pub calibration: Option<&'a CalibrationResult>,
}

fn severity_high<T: PartialOrd>(value: T, warn: T, error: T) -> Option<Severity> {
    if value >= error {
        Some(Severity::Error)
    } else if value >= warn {
        Some(Severity::Warn)
    } else {
        None
    }
}

fn severity_low<T: PartialOrd>(value: T, warn: T, error: T) -> Option<Severity> {
    if value <= error {
        Some(Severity::Error)
    } else if value <= warn {
        Some(Severity::Warn)
    } else {
        None
    }
}

fn rank(severity: Severity) -> u8 {
    match severity {
        Severity::Error => 0,
        Severity::Warn => 1,
        Severity::Info => 2,
    }
}

#[derive(Default)]
struct Collector {
    issues: Vec<DiagnosticIssue>,
    penalty: f64,
}

impl Collector {
    fn add(&mut self, code: &'static str, severity: Severity, message: &'static str, details: Value, penalty: f64) {
        self.issues.push(DiagnosticIssue {
            code,
            severity,
            message,
            details,
        });
        self.penalty += penalty;
    }

    /// Adds with the error penalty when `severity` is `Error`, the warn one otherwise.
    fn graded(
        &mut self,
        code: &'static str,
        severity: Severity,
        message: &'static str,
        details: Value,
        (warn_penalty, error_penalty): (f64, f64),
    ) {
        let penalty = if severity == Severity::Error {
            error_penalty
        } else {
            warn_penalty
        };
        self.add(code, severity, message, details, penalty);
    }
}

fn track_issues(track: &StabilizedTrack, out: &mut Collector) {
    let breaks = track.debug.segments_total.saturating_sub(1);
    if let Some(sev) = severity_high(breaks, TRACK_BREAKS_WARN, TRACK_BREAKS_ERROR) {
        out.graded(
            "track_breaks_high",
            sev,
            "Tracking breaks were detected.",
            json!({"track_breaks": breaks, "warn_at": TRACK_BREAKS_WARN, "error_at": TRACK_BREAKS_ERROR}),
            (0.2, 0.35),
        );
    }

    if let Some(sev) = severity_high(track.max_gap, MAX_GAP_FRAMES_WARN, MAX_GAP_FRAMES_ERROR) {
        out.graded(
            "track_gaps_long",
            sev,
            "Extended gaps in ball tracking were found.",
            json!({"max_gap_frames": track.max_gap, "warn_at": MAX_GAP_FRAMES_WARN, "error_at": MAX_GAP_FRAMES_ERROR}),
            (0.1, 0.2),
        );
    }

    if let Some(sev) = severity_high(track.gap_ratio, GAP_RATIO_WARN, GAP_RATIO_ERROR) {
        out.graded(
            "ball_track_gappy",
            sev,
            "Ball tracking contains frequent gaps.",
            json!({"gap_ratio": round_to(track.gap_ratio, 3), "warn_at": GAP_RATIO_WARN, "error_at": GAP_RATIO_ERROR}),
            (0.1, 0.2),
        );
    }

    if let Some(sev) = severity_high(track.jitter_px, JITTER_WARN_PX, JITTER_ERROR_PX) {
        out.graded(
            "ball_track_unstable",
            sev,
            "Ball tracking jitter exceeded stability thresholds.",
            json!({"jitter_px": round_to(track.jitter_px, 3), "warn_at": JITTER_WARN_PX, "error_at": JITTER_ERROR_PX}),
            (0.1, 0.2),
        );
    }

    let avg_confidence = track.mean_confidence().unwrap_or(0.0);
    if let Some(sev) = severity_low(avg_confidence, AVG_CONFIDENCE_WARN, AVG_CONFIDENCE_ERROR) {
        out.graded(
            "low_detections",
            sev,
            "Ball detections were low confidence.",
            json!({
                "avg_confidence": round_to(avg_confidence, 3),
                "warn_below": AVG_CONFIDENCE_WARN,
                "error_below": AVG_CONFIDENCE_ERROR,
            }),
            (0.15, 0.25),
        );
    }

    if track.n_frames > 0 {
        let missing = track.n_frames.saturating_sub(track.n_detections);
        let ratio = missing as f64 / track.n_frames as f64;
        if let Some(sev) = severity_high(ratio, MISSING_RATIO_WARN, MISSING_RATIO_ERROR) {
            out.graded(
                "missing_ball_frames",
                sev,
                "Ball detections were missing across frames.",
                json!({"missing_frames": missing, "total_frames": track.n_frames, "missing_ratio": round_to(ratio, 3)}),
                (0.1, 0.2),
            );
        }
    }
}

fn fps_issues(fps: Option<f64>, camera_fps: Option<f64>, out: &mut Collector) {
    let fps = match fps {
        Some(fps) => fps,
        None => return,
    };

    if fps <= FPS_ERROR {
        out.add(
            "fps_low",
            Severity::Error,
            "Capture FPS is below the recommended minimum.",
            json!({"fps": fps, "error_below": FPS_ERROR}),
            0.25,
        );
    } else if fps < FPS_WARN {
        out.add(
            "fps_low",
            Severity::Warn,
            "Capture FPS is below the preferred range.",
            json!({"fps": fps, "warn_below": FPS_WARN}),
            0.15,
        );
    }

    if let Some(camera_fps) = camera_fps {
        let delta = (camera_fps - fps).abs();
        let details = json!({"fps": fps, "camera_fps": camera_fps, "delta": round_to(delta, 2)});
        if delta >= FPS_MISMATCH_ERROR {
            out.add(
                "fps_mismatch",
                Severity::Error,
                "Reported FPS does not match the camera settings.",
                details,
                0.2,
            );
        } else if delta >= FPS_MISMATCH_WARN {
            out.add(
                "fps_mismatch",
                Severity::Warn,
                "Reported FPS differs from the camera settings.",
                details,
                0.1,
            );
        }
    }
}

fn calibration_issues(result: &CalibrationResult, out: &mut Collector) {
    let reasons: Vec<&str> = result.quality.reasons.iter().collect();

    if !result.fit.calibrated {
        let details = json!({ "reason_codes": reasons });
        if result.quality.reasons.contains("missing_scale") || result.quality.reasons.contains("disabled") {
            out.add(
                "calibration_missing",
                Severity::Warn,
                "Calibration scale was not available.",
                details.clone(),
                0.1,
            );
        }
        if result.quality.reasons.contains("launch_window_too_short") {
            out.add(
                "launch_window_too_short",
                Severity::Warn,
                "Launch window did not contain enough frames.",
                details.clone(),
                0.1,
            );
        }
        if result.quality.reasons.contains("fit_failed") {
            out.add(
                "fit_low_confidence",
                Severity::Warn,
                "Trajectory fit did not converge cleanly.",
                details,
                0.15,
            );
        }
        return;
    }

    let confidence = result.quality.confidence_score_0_1;
    if let Some(sev) = severity_low(confidence, CALIBRATION_CONFIDENCE_WARN, CALIBRATION_CONFIDENCE_ERROR) {
        out.graded(
            "fit_unstable",
            sev,
            "Calibration fit confidence is low.",
            json!({
                "calibration_confidence": confidence,
                "warn_below": CALIBRATION_CONFIDENCE_WARN,
                "error_below": CALIBRATION_CONFIDENCE_ERROR,
                "reason_codes": reasons,
            }),
            (0.15, 0.25),
        );
    }

    if !reasons.is_empty() {
        out.add(
            "calibration_reasons",
            Severity::Info,
            "Calibration reported quality warnings.",
            json!({ "reason_codes": reasons }),
            0.05,
        );
    }

    let n = result.launch_window.n_points;
    if n > 0 && n < LAUNCH_WINDOW_MIN {
        out.add(
            "launch_window_short",
            Severity::Warn,
            "Launch window is shorter than expected.",
            json!({"launch_window_length": n, "min_required": LAUNCH_WINDOW_MIN}),
            0.1,
        );
    }
}

/// Grades how far the run's measurements can be trusted from the tracking
/// and calibration bookkeeping alone.
pub fn diagnose(inputs: &DiagnosticsInputs<'_>) -> Diagnostics {
    let mut out = Collector::default();

    if let Some(track) = inputs.track {
        track_issues(track, &mut out);
    }

    let ball_points = inputs.track.map_or(0, |t| t.n_detections);
    if ball_points < MIN_BALL_POINTS {
        out.add(
            "too_few_points",
            Severity::Warn,
            "Not enough ball points were tracked to stabilize the fit.",
            json!({"ball_points": ball_points, "min_required": MIN_BALL_POINTS}),
            0.2,
        );
    }

    fps_issues(inputs.fps, inputs.camera_fps, &mut out);

    if let Some(calibration) = inputs.calibration {
        calibration_issues(calibration, &mut out);
    }

    let Collector { mut issues, penalty } = out;
    // stable, so equal severities keep insertion order
    issues.sort_by_key(|i| rank(i.severity));

    let summary = if issues.is_empty() {
        "No issues detected.".to_string()
    } else {
        let top: Vec<&str> = issues.iter().take(2).map(|i| i.message).collect();
        format!("Confidence reduced: {}", top.join("; "))
    };

    Diagnostics {
        confidence: round_to(f64::clamp(1.0 - penalty, 0.0, 1.0), 3),
        issues,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackPoint;
    use nalgebra as na;

    fn track(n: usize, conf: f64) -> StabilizedTrack {
        StabilizedTrack {
            points: (0..n)
                .map(|i| TrackPoint::observed(i, na::Point2::new(i as f64 * 5.0, 100.0), conf))
                .collect(),
            n_frames: n,
            n_detections: n,
            debug: crate::track::StabilizerDebug {
                segments_total: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn clean_run_has_no_issues() {
        let t = track(20, 0.9);
        let out = diagnose(&DiagnosticsInputs {
            track: Some(&t),
            fps: Some(240.0),
            ..Default::default()
        });

        assert!(out.issues.is_empty(), "{:?}", out.issues);
        assert_eq!(out.confidence, 1.0);
        assert_eq!(out.summary, "No issues detected.");
    }

    #[test]
    fn errors_sort_before_warnings() {
        let mut t = track(4, 0.9);
        t.max_gap = 5;
        let out = diagnose(&DiagnosticsInputs {
            track: Some(&t),
            fps: Some(30.0),
            ..Default::default()
        });

        let codes: Vec<_> = out.issues.iter().map(|i| i.code).collect();
        assert_eq!(codes, vec!["fps_low", "track_gaps_long", "too_few_points"]);
        // 1 - 0.1 - 0.2 - 0.25
        assert_eq!(out.confidence, 0.45);
        assert!(out.summary.starts_with("Confidence reduced: Capture FPS"));
    }

    #[test]
    fn gappy_low_confidence_track() {
        let mut t = track(10, 0.25);
        t.n_frames = 20;
        t.gap_ratio = 0.5;
        t.debug.segments_total = 3;
        let out = diagnose(&DiagnosticsInputs {
            track: Some(&t),
            ..Default::default()
        });

        assert!(out.has_issue("ball_track_gappy"));
        assert!(out.has_issue("low_detections"));
        assert!(out.has_issue("missing_ball_frames"));
        assert!(out.has_issue("track_breaks_high"));
        assert_eq!(out.confidence, 0.25);
    }

    #[test]
    fn camera_fps_mismatch() {
        let t = track(20, 0.9);
        let out = diagnose(&DiagnosticsInputs {
            track: Some(&t),
            fps: Some(240.0),
            camera_fps: Some(232.0),
            ..Default::default()
        });

        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].code, "fps_mismatch");
        assert_eq!(out.issues[0].severity, Severity::Warn);
    }

    #[test]
    fn no_track_is_too_few_points() {
        let out = diagnose(&DiagnosticsInputs::default());
        assert!(out.has_issue("too_few_points"));
        assert_eq!(out.confidence, 0.8);
    }
}
