mod config;
mod confidence;
mod fit;
mod launch_window;
mod scale;

pub use config::CalibrationConfig;
pub use confidence::{assess, CalibrationStatus, Quality, Reasons};
pub use fit::{fit_trajectory, FitMetric, TrajectoryFit};
pub use launch_window::{detect_launch_window, LaunchWindow};
pub use scale::{meters_to_px, px_to_meters, resolve_scale, ScaleCode, ScaleResult};

use serde_derive::Serialize;

use crate::track::TrackPoint;

/// Metric launch estimate for one stabilized track.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub status: CalibrationStatus,
    pub used_m_per_px: Option<f64>,
    pub scale: ScaleResult,
    pub launch_window: LaunchWindow,
    pub fit: TrajectoryFit,
    pub quality: Quality,
}

impl CalibrationResult {
    fn insufficient(
        scale: ScaleResult,
        launch_window: LaunchWindow,
        n_fit_points: usize,
        reasons: Reasons,
    ) -> Self {
        Self {
            status: CalibrationStatus::InsufficientData,
            used_m_per_px: scale.meters_per_pixel,
            scale,
            launch_window,
            fit: TrajectoryFit {
                n_fit_points,
                ..Default::default()
            },
            quality: Quality {
                confidence_score_0_1: 0.0,
                reasons,
            },
        }
    }
}

/// Scale refusal codes worth surfacing next to the quality penalties.
fn scale_reasons(scale: &ScaleResult) -> impl Iterator<Item = &'static str> + '_ {
    scale
        .codes
        .iter()
        .filter(|c| !c.is_provenance())
        .map(ScaleCode::as_str)
}

/// Turns a stabilized track into metric launch estimates.
///
/// Never fails: missing data, a missing scale or a degenerate window all end
/// up as a status plus reason codes on the returned record.
pub fn calibrate(track: &[TrackPoint], fps: f64, cfg: &CalibrationConfig) -> CalibrationResult {
    let mut points = track.to_vec();
    points.sort_by_key(|p| p.frame_idx);

    let scale = resolve_scale(cfg);
    tracing::debug!(
        primary = scale.primary.as_str(),
        meters_per_pixel = ?scale.meters_per_pixel,
        "scale resolved"
    );

    if points.len() < cfg.min_points {
        let mut reasons = Reasons::default();
        reasons.push("insufficient_points");

        return CalibrationResult::insufficient(scale, LaunchWindow::default(), 0, reasons);
    }

    let launch_window = detect_launch_window(&points, cfg);
    if !launch_window.is_found() {
        let mut reasons = Reasons::default();
        reasons.extend(launch_window.reasons.iter());

        tracing::debug!(reasons = ?launch_window.reasons, "no launch window");
        return CalibrationResult::insufficient(scale, launch_window, 0, reasons);
    }

    let window = launch_window.slice(&points);
    let fit = fit_trajectory(window, fps, scale.meters_per_pixel, cfg);
    let (status, score, penalties) = assess(&scale, window, &fit, fps, cfg);

    let mut reasons = Reasons::default();
    reasons.extend(launch_window.reasons.iter());
    reasons.extend(scale_reasons(&scale));
    reasons.extend(fit.reasons.iter());
    reasons.extend(penalties.iter());

    tracing::info!(
        status = status.as_str(),
        confidence = score,
        n_fit_points = fit.n_fit_points,
        speed_mps = ?fit.speed_mps,
        "calibration finished"
    );

    CalibrationResult {
        status,
        used_m_per_px: scale.meters_per_pixel,
        scale,
        launch_window,
        fit,
        quality: Quality {
            confidence_score_0_1: score,
            reasons,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra as na;

    fn flight(n: usize, fps: f64, mpp: f64) -> Vec<TrackPoint> {
        (0..n)
            .map(|i| {
                let t = i as f64 / fps;
                let x = 30.0 * t;
                let y = 14.0 * t - 4.905 * t * t;
                TrackPoint::observed(i + 3, na::Point2::new(100.0 + x / mpp, 700.0 - y / mpp), 0.9)
            })
            .collect()
    }

    #[test]
    fn clean_flight_calibrates() {
        let mpp = 1.0 / 120.0;
        let result = calibrate(&flight(12, 120.0, mpp), 120.0, &CalibrationConfig::with_scale(mpp));

        assert_eq!(result.status, CalibrationStatus::Ok);
        assert!(result.quality.reasons.is_empty());
        assert_eq!(result.launch_window.start_frame, Some(3));
        assert_eq!(result.launch_window.n_points, 12);
        assert_relative_eq!(result.fit.speed_mps.unwrap(), 30f64.hypot(14.0), max_relative = 1e-3);
    }

    #[test]
    fn unsorted_input_is_ordered_first() {
        let mpp = 1.0 / 120.0;
        let mut points = flight(12, 120.0, mpp);
        points.reverse();

        let result = calibrate(&points, 120.0, &CalibrationConfig::with_scale(mpp));
        assert_eq!(result.status, CalibrationStatus::Ok);
    }

    #[test]
    fn fallback_scale_is_low_confidence() {
        let result = calibrate(&flight(8, 120.0, 0.0025), 120.0, &CalibrationConfig::default());

        assert_eq!(result.status, CalibrationStatus::LowConfidence);
        assert_eq!(result.used_m_per_px, Some(0.0025));
        assert!(result.quality.reasons.contains("fallback_scale"));
    }

    #[test]
    fn short_track_is_insufficient() {
        let result = calibrate(&flight(4, 120.0, 0.01), 120.0, &CalibrationConfig::with_scale(0.01));

        assert_eq!(result.status, CalibrationStatus::InsufficientData);
        assert_eq!(result.quality.confidence_score_0_1, 0.0);
        assert!(result.quality.reasons.contains("insufficient_points"));
        assert!(result.fit.speed_mps.is_none());
    }

    #[test]
    fn zero_fps_is_insufficient() {
        for &fps in &[0.0, -5.0, f64::NAN] {
            let result = calibrate(&flight(12, 120.0, 0.01), fps, &CalibrationConfig::with_scale(0.01));

            assert_eq!(result.status, CalibrationStatus::InsufficientData);
            assert_eq!(result.quality.confidence_score_0_1, 0.0);
            assert!(result.quality.reasons.contains("invalid_fps"));
            assert!(result.fit.speed_mps.is_none());
        }
    }

    #[test]
    fn skipped_frames_are_reported() {
        let mpp = 0.01;
        let points: Vec<TrackPoint> = flight(12, 60.0, mpp)
            .into_iter()
            .enumerate()
            .map(|(i, p)| TrackPoint { frame_idx: 3 + 2 * i, ..p })
            .collect();
        let result = calibrate(&points, 120.0, &CalibrationConfig::with_scale(mpp));

        assert_eq!(result.launch_window.n_points, 12);
        assert!(result.quality.reasons.contains("launch_window_gap"));
        assert!(!result.quality.reasons.contains("gaps_in_window"));
    }

    #[test]
    fn zero_window_size_is_refused() {
        let cfg = CalibrationConfig {
            max_window_points: 0,
            ..CalibrationConfig::with_scale(0.01)
        };
        let result = calibrate(&flight(12, 120.0, 0.01), 120.0, &cfg);

        assert_eq!(result.status, CalibrationStatus::InsufficientData);
        assert!(result.quality.reasons.contains("launch_window_too_short"));
    }

    #[test]
    fn disabled_scale_is_not_ok() {
        let cfg = CalibrationConfig {
            enabled: false,
            ..Default::default()
        };
        let result = calibrate(&flight(12, 120.0, 0.01), 120.0, &cfg);

        assert_eq!(result.status, CalibrationStatus::LowConfidence);
        assert!(!result.fit.calibrated);
        assert!(result.fit.speed_px_per_s.is_some());
        assert!(result.quality.reasons.contains("disabled"));
    }
}
