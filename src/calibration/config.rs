use serde_derive::{Deserialize, Serialize};

use super::fit::FitMetric;
use crate::config::{non_negative, sanitize_fields, unit_interval};
use crate::error::Error;

/// Scale hints and fit thresholds for one calibration run.
///
/// Scale hints are optional and tried in order: direct factor, reference
/// distance, ball diameter, fallback.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CalibrationConfig {
    pub enabled: bool,
    pub meters_per_pixel: Option<f64>,
    pub scale_px_per_meter: Option<f64>,
    pub reference_distance_m: Option<f64>,
    pub reference_pixels: Option<f64>,
    pub reference_points_px: Option<[[f64; 2]; 2]>,
    pub expected_ball_diameter_m: Option<f64>,
    pub observed_ball_diameter_px: Option<f64>,
    pub fallback_scale_m_per_px: f64,
    pub min_points: usize,
    pub min_motion_px_per_frame: f64,
    pub min_sustain_frames: usize,
    pub max_window_points: usize,
    pub max_gap_frames: usize,
    pub max_carry_m: f64,
    pub min_time_span_s: f64,
    pub min_confidence_score: f64,
    pub min_fit_r2: f64,
    pub max_fit_rmse_m: f64,
    pub fit_metric_override: Option<FitMetric>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            meters_per_pixel: None,
            scale_px_per_meter: None,
            reference_distance_m: None,
            reference_pixels: None,
            reference_points_px: None,
            expected_ball_diameter_m: None,
            observed_ball_diameter_px: None,
            fallback_scale_m_per_px: 0.0025,
            min_points: 6,
            min_motion_px_per_frame: 1.0,
            min_sustain_frames: 3,
            max_window_points: 20,
            max_gap_frames: 2,
            max_carry_m: 400.0,
            min_time_span_s: 0.01,
            min_confidence_score: 0.5,
            min_fit_r2: 0.8,
            max_fit_rmse_m: 0.1,
            fit_metric_override: None,
        }
    }
}

impl CalibrationConfig {
    /// Config with a known meters-per-pixel factor.
    pub fn with_scale(meters_per_pixel: f64) -> Self {
        Self {
            meters_per_pixel: Some(meters_per_pixel),
            ..Default::default()
        }
    }

    /// Replaces every invalid threshold by its default. Scale hints are left
    /// alone, the scale resolver reports them itself.
    pub fn validated(mut self) -> (Self, Vec<Error>) {
        let mut errors = Vec::new();

        sanitize_fields!(self, Self::default(), errors, "calibration", {
            min_points: |v: usize| v >= 2,
            min_sustain_frames: |v: usize| v >= 1,
            max_window_points: |v: usize| v >= 2,
            min_motion_px_per_frame: non_negative,
            max_carry_m: non_negative,
            min_time_span_s: non_negative,
            min_confidence_score: unit_interval,
            min_fit_r2: unit_interval,
            max_fit_rmse_m: non_negative,
        });

        (self, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_defaults() {
        let cfg = CalibrationConfig::default();
        assert_eq!(cfg.fallback_scale_m_per_px, 0.0025);
        assert_eq!(cfg.min_points, 6);
        assert_eq!(cfg.max_window_points, 20);
        assert_eq!(cfg.max_carry_m, 400.0);
        assert!(cfg.fit_metric_override.is_none());
    }

    #[test]
    fn invalid_thresholds_are_replaced() {
        let cfg = CalibrationConfig {
            min_points: 0,
            min_fit_r2: 1.5,
            ..Default::default()
        };
        let (cfg, errors) = cfg.validated();

        assert_eq!(cfg.min_points, 6);
        assert_eq!(cfg.min_fit_r2, 0.8);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.code() == "invalid_config"));
    }

    #[test]
    fn deserializes_partial_json() {
        let cfg: CalibrationConfig =
            serde_json::from_str(r#"{"meters_per_pixel": 0.01, "fit_metric_override": "rmse"}"#)
                .unwrap();

        assert_eq!(cfg.meters_per_pixel, Some(0.01));
        assert_eq!(cfg.fit_metric_override, Some(FitMetric::Rmse));
        assert_eq!(cfg.min_points, 6);
    }
}
