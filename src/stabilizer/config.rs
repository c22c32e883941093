use serde_derive::{Deserialize, Serialize};

use crate::config::{non_negative, sanitize_fields, unit_interval};
use crate::error::Error;
use crate::predictor::Gate;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StabilizerConfig {
    /// longest run of missing frames bridged by interpolation
    pub max_gap_frames: usize,
    pub max_px_per_frame: f64,
    pub base_gate: f64,
    pub gate_radius_px: f64,
    pub gate_speed_factor: f64,
    pub ema_alpha: f64,
    pub min_conf: f64,
    pub link_max_distance: f64,
    pub dist_weight: f64,
    /// pixels of score per unit of missing confidence
    pub conf_weight: f64,
    pub fallback_max_distance: f64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            max_gap_frames: 4,
            max_px_per_frame: 80.0,
            base_gate: 20.0,
            gate_radius_px: 90.0,
            gate_speed_factor: 1.5,
            ema_alpha: 0.45,
            min_conf: 0.35,
            link_max_distance: 120.0,
            dist_weight: 1.0,
            conf_weight: 25.0,
            fallback_max_distance: 140.0,
        }
    }
}

impl StabilizerConfig {
    #[inline]
    pub fn gate(&self) -> Gate<f64> {
        Gate {
            radius: self.gate_radius_px,
            base: self.base_gate,
            speed_factor: self.gate_speed_factor,
            max_step: self.max_px_per_frame,
        }
    }

    /// Largest distance between a raw point and the smoothed prediction `dt` frames ahead.
    #[inline]
    pub fn outlier_distance(&self, dt: usize) -> f64 {
        self.base_gate + self.max_px_per_frame * dt as f64
    }

    /// Replaces every invalid field by its default.
    pub fn validated(mut self) -> (Self, Vec<Error>) {
        let mut errors = Vec::new();

        sanitize_fields!(self, Self::default(), errors, "track", {
            max_px_per_frame: non_negative,
            base_gate: non_negative,
            gate_radius_px: non_negative,
            gate_speed_factor: non_negative,
            ema_alpha: |v: f64| unit_interval(v) && v > 0.0,
            min_conf: unit_interval,
            link_max_distance: non_negative,
            dist_weight: non_negative,
            conf_weight: non_negative,
            fallback_max_distance: non_negative,
        });

        (self, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let (cfg, errors) = StabilizerConfig::default().validated();
        assert!(errors.is_empty());
        assert_eq!(cfg, StabilizerConfig::default());
    }

    #[test]
    fn negative_and_nan_fields_fall_back() {
        let cfg = StabilizerConfig {
            base_gate: -1.0,
            ema_alpha: f64::NAN,
            ..Default::default()
        };
        let (cfg, errors) = cfg.validated();

        assert_eq!(cfg.base_gate, 20.0);
        assert_eq!(cfg.ema_alpha, 0.45);
        assert_eq!(
            errors,
            vec![
                Error::InvalidConfig { field: "track.base_gate" },
                Error::InvalidConfig { field: "track.ema_alpha" },
            ]
        );
    }
}
