use serde_derive::{Deserialize, Serialize};

use super::config::CalibrationConfig;
use super::fit::{FitMetric, TrajectoryFit};
use super::scale::ScaleResult;
use crate::math::{self, is_positive};
use crate::track::TrackPoint;

pub const FALLBACK_PENALTY: f64 = 0.35;
pub const LOW_TRACK_CONFIDENCE_PENALTY: f64 = 0.2;
pub const GAPS_PENALTY: f64 = 0.2;
pub const FIT_PENALTY: f64 = 0.3;
pub const FEW_POINTS_PENALTY: f64 = 0.1;

/// Mean detection confidence below which the track is considered weak.
pub const MIN_TRACK_CONFIDENCE: f64 = 0.6;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    Ok,
    LowConfidence,
    InsufficientData,
}

impl CalibrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationStatus::Ok => "ok",
            CalibrationStatus::LowConfidence => "low_confidence",
            CalibrationStatus::InsufficientData => "insufficient_data",
        }
    }
}

/// Ordered reason list without repeats.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Reasons(Vec<String>);

impl Reasons {
    pub fn push<S: AsRef<str>>(&mut self, reason: S) {
        let reason = reason.as_ref();
        if !self.contains(reason) {
            self.0.push(reason.to_string());
        }
    }

    pub fn extend<I, S>(&mut self, reasons: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for r in reasons {
            self.push(r);
        }
    }

    /// Puts `reasons` in front, keeping first-seen order.
    pub fn prepend<I, S>(&mut self, reasons: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut merged = Reasons::default();
        merged.extend(reasons);
        merged.extend(self.0.drain(..));
        *self = merged;
    }

    #[inline]
    pub fn contains(&self, reason: &str) -> bool {
        self.0.iter().any(|r| r == reason)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Quality {
    pub confidence_score_0_1: f64,
    pub reasons: Reasons,
}

/// Largest frame step between consecutive window points.
fn max_frame_step(points: &[TrackPoint]) -> usize {
    points
        .windows(2)
        .map(|w| w[1].frame_idx.saturating_sub(w[0].frame_idx))
        .max()
        .unwrap_or(0)
}

/// Scores a calibration from the resolved scale, the window it was fitted on
/// and the fit itself. Returns the status, the 0..1 score and the reasons for
/// every penalty applied.
pub fn assess(
    scale: &ScaleResult,
    window: &[TrackPoint],
    fit: &TrajectoryFit,
    fps: f64,
    cfg: &CalibrationConfig,
) -> (CalibrationStatus, f64, Reasons) {
    let mut reasons = Reasons::default();
    let mut score = 1.0;

    if fit.n_fit_points < cfg.min_points {
        score = 0.0;
        reasons.push("insufficient_points");
    }

    if scale.used_fallback {
        score -= FALLBACK_PENALTY;
        reasons.push("fallback_scale");
    }

    let mean_confidence = math::mean(
        window
            .iter()
            .filter(|p| !p.is_interpolated)
            .filter_map(|p| p.confidence),
    );
    if mean_confidence.map_or(false, |c| c < MIN_TRACK_CONFIDENCE) {
        score -= LOW_TRACK_CONFIDENCE_PENALTY;
        reasons.push("low_track_confidence");
    }

    if max_frame_step(window) > cfg.max_gap_frames {
        score -= GAPS_PENALTY;
        reasons.push("gaps_in_window");
    }

    match fit.fit_metric {
        Some(FitMetric::R2) => {
            if fit.fit_r2.map_or(false, |r2| r2 < cfg.min_fit_r2) {
                score -= FIT_PENALTY;
                reasons.push("fit_r2_low");
            }
        }
        Some(FitMetric::Rmse) => {
            // lower is better, unlike r2
            if fit.fit_rmse_m.map_or(false, |rmse| rmse > cfg.max_fit_rmse_m) {
                score -= FIT_PENALTY;
                reasons.push("fit_rmse_high");
            }
        }
        None => {}
    }

    if fit.n_fit_points < cfg.min_points + 2 {
        score -= FEW_POINTS_PENALTY;
        reasons.push("few_points");
    }

    // no clock, nothing measured
    let score = if is_positive(fps) {
        f64::clamp(score, 0.0, 1.0)
    } else {
        0.0
    };

    let status = if fit.n_fit_points < cfg.min_points || !is_positive(fps) {
        CalibrationStatus::InsufficientData
    } else if score < cfg.min_confidence_score || scale.used_fallback || !fit.calibrated {
        CalibrationStatus::LowConfidence
    } else {
        CalibrationStatus::Ok
    };

    (status, score, reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::scale::resolve_scale;
    use approx::assert_relative_eq;
    use nalgebra as na;

    fn window(n: usize, conf: f64) -> Vec<TrackPoint> {
        (0..n)
            .map(|i| TrackPoint::observed(i, na::Point2::new(i as f64 * 10.0, 0.0), conf))
            .collect()
    }

    fn good_fit(n: usize) -> TrajectoryFit {
        TrajectoryFit {
            calibrated: true,
            fit_r2: Some(0.99),
            fit_rmse_m: Some(0.01),
            fit_metric: Some(FitMetric::R2),
            n_fit_points: n,
            ..Default::default()
        }
    }

    #[test]
    fn clean_calibration_is_ok() {
        let cfg = CalibrationConfig::with_scale(0.01);
        let (status, score, reasons) =
            assess(&resolve_scale(&cfg), &window(12, 0.9), &good_fit(12), 120.0, &cfg);

        assert_eq!(status, CalibrationStatus::Ok);
        assert_relative_eq!(score, 1.0);
        assert!(reasons.is_empty());
    }

    #[test]
    fn fallback_always_demotes() {
        let cfg = CalibrationConfig::default();
        let (status, score, reasons) =
            assess(&resolve_scale(&cfg), &window(12, 0.9), &good_fit(12), 120.0, &cfg);

        assert_eq!(status, CalibrationStatus::LowConfidence);
        assert_relative_eq!(score, 0.65);
        assert!(reasons.contains("fallback_scale"));
    }

    #[test]
    fn penalties_accumulate_and_clamp() {
        let cfg = CalibrationConfig::default();
        let fit = TrajectoryFit {
            fit_r2: Some(0.3),
            ..good_fit(7)
        };
        let (status, score, reasons) =
            assess(&resolve_scale(&cfg), &window(7, 0.4), &fit, 120.0, &cfg);

        // 1 - 0.35 - 0.2 - 0.3 - 0.1
        assert_relative_eq!(score, 0.05, epsilon = 1e-12);
        assert_eq!(status, CalibrationStatus::LowConfidence);
        assert_eq!(
            reasons.iter().collect::<Vec<_>>(),
            vec!["fallback_scale", "low_track_confidence", "fit_r2_low", "few_points"]
        );
    }

    #[test]
    fn interpolated_points_do_not_dilute_confidence() {
        let cfg = CalibrationConfig::with_scale(0.01);
        let mut points = window(10, 0.9);
        for p in points.iter_mut().skip(3).take(4) {
            *p = TrackPoint::interpolated(p.frame_idx, p.pos());
        }
        let (_, _, reasons) = assess(&resolve_scale(&cfg), &points, &good_fit(10), 120.0, &cfg);

        assert!(!reasons.contains("low_track_confidence"));
    }

    #[test]
    fn long_frame_step_is_penalized() {
        let cfg = CalibrationConfig::with_scale(0.01);
        let mut points = window(12, 0.9);
        for p in points.iter_mut().skip(6) {
            p.frame_idx += 3;
        }
        let (status, score, reasons) =
            assess(&resolve_scale(&cfg), &points, &good_fit(12), 120.0, &cfg);

        assert!(reasons.contains("gaps_in_window"));
        assert_relative_eq!(score, 1.0 - GAPS_PENALTY);
        assert_eq!(status, CalibrationStatus::Ok);
    }

    #[test]
    fn invalid_fps_has_zero_confidence() {
        let cfg = CalibrationConfig::with_scale(0.01);
        for &fps in &[0.0, -5.0, f64::NAN] {
            let (status, score, _) =
                assess(&resolve_scale(&cfg), &window(12, 0.9), &good_fit(12), fps, &cfg);

            assert_eq!(status, CalibrationStatus::InsufficientData);
            assert_eq!(score, 0.0);
        }
    }

    #[test]
    fn too_few_points_is_insufficient() {
        let cfg = CalibrationConfig::with_scale(0.01);
        let (status, score, reasons) =
            assess(&resolve_scale(&cfg), &window(4, 0.9), &good_fit(4), 120.0, &cfg);

        assert_eq!(status, CalibrationStatus::InsufficientData);
        assert_eq!(score, 0.0);
        assert!(reasons.contains("insufficient_points"));
    }

    #[test]
    fn rmse_metric_penalizes_large_residuals() {
        let cfg = CalibrationConfig::with_scale(0.01);
        let fit = TrajectoryFit {
            fit_metric: Some(FitMetric::Rmse),
            fit_rmse_m: Some(0.5),
            ..good_fit(12)
        };
        let (_, score, reasons) = assess(&resolve_scale(&cfg), &window(12, 0.9), &fit, 120.0, &cfg);

        assert!(reasons.contains("fit_rmse_high"));
        assert_relative_eq!(score, 0.7);
    }

    #[test]
    fn reasons_keep_first_seen_order() {
        let mut reasons = Reasons::default();
        reasons.extend(["b", "a", "b"]);
        reasons.prepend(["c", "a"]);

        assert_eq!(reasons.iter().collect::<Vec<_>>(), vec!["c", "a", "b"]);
        assert_eq!(serde_json::to_string(&reasons).unwrap(), r#"["c","a","b"]"#);
    }
}
