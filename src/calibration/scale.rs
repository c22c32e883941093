use serde_derive::{Deserialize, Serialize};

use super::config::CalibrationConfig;
use crate::math::is_positive;
use nalgebra as na;

/// Where a meters-per-pixel factor came from, or why there is none.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScaleCode {
    ScaleProvided,
    ScaleReferencePoints,
    ScaleBallDiameter,
    FallbackScale,
    InvalidScale,
    MissingScale,
    Disabled,
    InvalidReference,
}

impl ScaleCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleCode::ScaleProvided => "scale_provided",
            ScaleCode::ScaleReferencePoints => "scale_reference_points",
            ScaleCode::ScaleBallDiameter => "scale_ball_diameter",
            ScaleCode::FallbackScale => "fallback_scale",
            ScaleCode::InvalidScale => "invalid_scale",
            ScaleCode::MissingScale => "missing_scale",
            ScaleCode::Disabled => "disabled",
            ScaleCode::InvalidReference => "invalid_reference",
        }
    }

    /// Codes that describe a usable measured scale.
    #[inline]
    pub fn is_provenance(&self) -> bool {
        matches!(
            self,
            ScaleCode::ScaleProvided | ScaleCode::ScaleReferencePoints | ScaleCode::ScaleBallDiameter
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScaleResult {
    pub meters_per_pixel: Option<f64>,
    pub px_per_meter: Option<f64>,
    pub used_fallback: bool,
    pub primary: ScaleCode,
    /// every code met on the way, `primary` last
    pub codes: Vec<ScaleCode>,
}

impl ScaleResult {
    fn resolved(meters_per_pixel: f64, primary: ScaleCode, mut codes: Vec<ScaleCode>) -> Self {
        codes.push(primary);

        Self {
            meters_per_pixel: Some(meters_per_pixel),
            px_per_meter: Some(1.0 / meters_per_pixel),
            used_fallback: primary == ScaleCode::FallbackScale,
            primary,
            codes,
        }
    }

    fn refused(primary: ScaleCode, mut codes: Vec<ScaleCode>) -> Self {
        codes.push(primary);

        Self {
            meters_per_pixel: None,
            px_per_meter: None,
            used_fallback: false,
            primary,
            codes,
        }
    }
}

fn reference_pixels(cfg: &CalibrationConfig) -> Option<f64> {
    cfg.reference_pixels.or_else(|| {
        cfg.reference_points_px.map(|[p1, p2]| {
            na::distance(&na::Point2::new(p1[0], p1[1]), &na::Point2::new(p2[0], p2[1]))
        })
    })
}

/// Picks meters-per-pixel from the first usable hint in `cfg`.
///
/// Never fails: unusable hints are recorded in `codes` and the next source is
/// tried, ending with the configured fallback.
pub fn resolve_scale(cfg: &CalibrationConfig) -> ScaleResult {
    let mut codes = Vec::new();

    if !cfg.enabled {
        return ScaleResult::refused(ScaleCode::Disabled, codes);
    }

    if let Some(mpp) = cfg.meters_per_pixel {
        if is_positive(mpp) {
            return ScaleResult::resolved(mpp, ScaleCode::ScaleProvided, codes);
        }
        codes.push(ScaleCode::InvalidScale);
    }

    if let Some(ppm) = cfg.scale_px_per_meter {
        if is_positive(ppm) && is_positive(1.0 / ppm) {
            return ScaleResult::resolved(1.0 / ppm, ScaleCode::ScaleProvided, codes);
        }
        codes.push(ScaleCode::InvalidScale);
    }

    if let Some(distance_m) = cfg.reference_distance_m {
        match reference_pixels(cfg) {
            Some(pixels) if is_positive(pixels) && is_positive(distance_m) => {
                return ScaleResult::resolved(
                    distance_m / pixels,
                    ScaleCode::ScaleReferencePoints,
                    codes,
                );
            }
            _ => codes.push(ScaleCode::InvalidReference),
        }
    }

    if let (Some(diameter_m), Some(diameter_px)) =
        (cfg.expected_ball_diameter_m, cfg.observed_ball_diameter_px)
    {
        if is_positive(diameter_m) && is_positive(diameter_px) {
            return ScaleResult::resolved(
                diameter_m / diameter_px,
                ScaleCode::ScaleBallDiameter,
                codes,
            );
        }
        codes.push(ScaleCode::InvalidScale);
    }

    if is_positive(cfg.fallback_scale_m_per_px) {
        ScaleResult::resolved(cfg.fallback_scale_m_per_px, ScaleCode::FallbackScale, codes)
    } else {
        ScaleResult::refused(ScaleCode::MissingScale, codes)
    }
}

#[inline]
pub fn px_to_meters(v: na::Vector2<f64>, meters_per_pixel: f64) -> na::Vector2<f64> {
    v * meters_per_pixel
}

#[inline]
pub fn meters_to_px(v: na::Vector2<f64>, meters_per_pixel: f64) -> na::Vector2<f64> {
    v / meters_per_pixel
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn direct_factor_wins() {
        let scale = resolve_scale(&CalibrationConfig {
            meters_per_pixel: Some(0.01),
            reference_distance_m: Some(1.0),
            reference_pixels: Some(50.0),
            ..Default::default()
        });

        assert_eq!(scale.meters_per_pixel, Some(0.01));
        assert_relative_eq!(scale.px_per_meter.unwrap(), 100.0);
        assert_eq!(scale.primary, ScaleCode::ScaleProvided);
        assert!(!scale.used_fallback);
    }

    #[test]
    fn px_per_meter_is_inverted() {
        let scale = resolve_scale(&CalibrationConfig {
            scale_px_per_meter: Some(120.0),
            ..Default::default()
        });
        assert_relative_eq!(scale.meters_per_pixel.unwrap(), 1.0 / 120.0);
    }

    #[test]
    fn reference_points_distance() {
        let scale = resolve_scale(&CalibrationConfig {
            reference_distance_m: Some(2.0),
            reference_points_px: Some([[0.0, 0.0], [300.0, 400.0]]),
            ..Default::default()
        });

        assert_eq!(scale.primary, ScaleCode::ScaleReferencePoints);
        assert_relative_eq!(scale.meters_per_pixel.unwrap(), 2.0 / 500.0);
    }

    #[test]
    fn coincident_reference_points_are_invalid() {
        let scale = resolve_scale(&CalibrationConfig {
            reference_distance_m: Some(2.0),
            reference_points_px: Some([[10.0, 10.0], [10.0, 10.0]]),
            ..Default::default()
        });

        assert_eq!(
            scale.codes,
            vec![ScaleCode::InvalidReference, ScaleCode::FallbackScale]
        );
        assert!(scale.used_fallback);
    }

    #[test]
    fn ball_diameter() {
        let scale = resolve_scale(&CalibrationConfig {
            expected_ball_diameter_m: Some(0.04267),
            observed_ball_diameter_px: Some(8.0),
            ..Default::default()
        });

        assert_eq!(scale.primary, ScaleCode::ScaleBallDiameter);
        assert_relative_eq!(scale.meters_per_pixel.unwrap(), 0.04267 / 8.0);
    }

    #[test]
    fn invalid_direct_factor_falls_through() {
        let scale = resolve_scale(&CalibrationConfig {
            meters_per_pixel: Some(f64::NAN),
            ..Default::default()
        });

        assert_eq!(scale.codes, vec![ScaleCode::InvalidScale, ScaleCode::FallbackScale]);
        assert_eq!(scale.meters_per_pixel, Some(0.0025));
    }

    #[test]
    fn no_fallback_means_missing() {
        let scale = resolve_scale(&CalibrationConfig {
            fallback_scale_m_per_px: 0.0,
            ..Default::default()
        });

        assert_eq!(scale.primary, ScaleCode::MissingScale);
        assert!(scale.meters_per_pixel.is_none());
        assert!(!scale.used_fallback);
    }

    #[test]
    fn disabled() {
        let scale = resolve_scale(&CalibrationConfig {
            enabled: false,
            meters_per_pixel: Some(0.01),
            ..Default::default()
        });
        assert_eq!(scale.primary, ScaleCode::Disabled);
        assert!(scale.meters_per_pixel.is_none());
    }

    #[test]
    fn pixel_meter_round_trip() {
        for &len in &[1.0, 17.5, 333.0, 1920.0] {
            for &mpp in &[1.0 / 120.0, 0.0025, 0.01] {
                let v = na::Vector2::new(len, 0.0);
                let back = meters_to_px(px_to_meters(v, mpp), mpp);

                assert_relative_eq!(back.x, len, max_relative = 1e-12);
                assert_eq!(back.y, 0.0);
            }
        }
    }

    #[test]
    fn codes_serialize_snake_case() {
        let json = serde_json::to_string(&ScaleCode::ScaleReferencePoints).unwrap();
        assert_eq!(json, "\"scale_reference_points\"");
        assert_eq!(ScaleCode::InvalidReference.as_str(), "invalid_reference");
    }
}
