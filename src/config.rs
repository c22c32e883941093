use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};

use crate::calibration::CalibrationConfig;
use crate::capture::{CaptureQualityConfig, GuardrailsConfig, HysteresisConfig};
use crate::coach::{CoachConfig, Locale};
use crate::error::Error;
use crate::stabilizer::StabilizerConfig;

/// Finite and `>= 0`.
#[inline]
pub(crate) fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Finite and within `[0, 1]`.
#[inline]
pub(crate) fn unit_interval(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

/// Checks each listed field against its predicate, restoring the default and
/// recording an `InvalidConfig` error on failure.
macro_rules! sanitize_fields {
    ($cfg:ident, $defaults:expr, $errors:ident, $prefix:literal, { $($field:ident : $pred:expr),* $(,)? }) => {{
        let defaults = $defaults;
        $(
            if !($pred)($cfg.$field) {
                let field = concat!($prefix, ".", stringify!($field));
                tracing::warn!(field, value = ?$cfg.$field, "invalid config value, using default");
                $cfg.$field = defaults.$field;
                $errors.push($crate::error::Error::InvalidConfig { field });
            }
        )*
    }};
}

pub(crate) use sanitize_fields;

/// Every tunable of the pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub stabilizer: StabilizerConfig,
    pub calibration: CalibrationConfig,
    pub capture_quality: CaptureQualityConfig,
    pub guardrails: GuardrailsConfig,
    pub hysteresis: HysteresisConfig,
    pub coach: CoachConfig,
}

struct EnvOverrides<F> {
    lookup: F,
    errors: Vec<Error>,
}

impl<F: Fn(&str) -> Option<String>> EnvOverrides<F> {
    /// First of `names` that is set wins. Unparseable values leave `slot` alone.
    fn apply_with<T, P>(&mut self, names: &[&str], slot: &mut T, parse: P)
    where
        P: Fn(&str) -> Option<T>,
    {
        let found = names
            .iter()
            .find_map(|&name| (self.lookup)(name).map(|value| (name, value)));

        if let Some((name, value)) = found {
            match parse(value.trim()) {
                Some(v) => *slot = v,
                None => {
                    tracing::warn!(name, value = %value, "cannot parse env override, keeping default");
                    self.errors.push(Error::EnvParse {
                        name: name.to_string(),
                        value,
                    });
                }
            }
        }
    }

    fn apply<T: FromStr>(&mut self, names: &[&str], slot: &mut T) {
        self.apply_with(names, slot, |s| s.parse().ok());
    }
}

impl Config {
    /// Reads overrides from the process environment.
    pub fn from_env() -> (Self, Vec<Error>) {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the defaults and applies every override `lookup` knows about.
    /// Returns one `EnvParse` error per value that did not parse.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<Error>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let mut env = EnvOverrides {
            lookup,
            errors: Vec::new(),
        };

        let s = &mut cfg.stabilizer;
        env.apply(&["TRACK_MAX_GAP_FRAMES"], &mut s.max_gap_frames);
        env.apply(&["TRACK_MAX_PX_PER_FRAME"], &mut s.max_px_per_frame);
        env.apply(&["TRACK_BASE_GATE_PX"], &mut s.base_gate);
        env.apply(&["TRACK_GATE_RADIUS_PX"], &mut s.gate_radius_px);
        env.apply(&["TRACK_GATE_SPEED_FACTOR"], &mut s.gate_speed_factor);
        env.apply(&["TRACK_EMA_ALPHA", "TRACK_SMOOTHING_ALPHA"], &mut s.ema_alpha);
        env.apply(&["TRACK_MIN_CONF"], &mut s.min_conf);
        env.apply(&["TRACK_LINK_MAX_DISTANCE_PX"], &mut s.link_max_distance);
        env.apply(&["TRACK_DIST_WEIGHT"], &mut s.dist_weight);
        env.apply(&["TRACK_CONF_WEIGHT"], &mut s.conf_weight);
        env.apply(
            &["TRACK_FALLBACK_MAX_DISTANCE_PX", "TRACK_OUTLIER_DISTANCE_PX"],
            &mut s.fallback_max_distance,
        );

        let q = &mut cfg.capture_quality;
        env.apply(&["CAPTURE_QUALITY_FPS_WARN"], &mut q.fps_warn);
        env.apply(&["CAPTURE_QUALITY_FPS_RECOMMENDED"], &mut q.fps_recommended);
        env.apply(&["CAPTURE_QUALITY_MIN_HEIGHT"], &mut q.min_height);
        env.apply(&["CAPTURE_QUALITY_RECOMMENDED_HEIGHT"], &mut q.recommended_height);
        env.apply(&["CAPTURE_QUALITY_UNDEREXPOSED_LUMA"], &mut q.underexposed_luma);
        env.apply(&["CAPTURE_QUALITY_OVEREXPOSED_LUMA"], &mut q.overexposed_luma);
        env.apply(&["CAPTURE_QUALITY_EXPOSURE_BAD_PCT"], &mut q.exposure_bad_pct);
        env.apply(&["CAPTURE_QUALITY_BLUR_VAR_THRESHOLD"], &mut q.blur_var_threshold);
        env.apply(&["CAPTURE_QUALITY_BLUR_BAD_PCT"], &mut q.blur_bad_pct);
        env.apply(&["CAPTURE_QUALITY_SHAKE_DIFF_THRESHOLD"], &mut q.shake_diff_threshold);
        env.apply(&["CAPTURE_QUALITY_SHAKE_BAD_PCT"], &mut q.shake_bad_pct);

        let g = &mut cfg.guardrails;
        env.apply(&["CAPTURE_GUARDRAILS_MIN_FPS"], &mut g.min_fps);
        env.apply(&["CAPTURE_GUARDRAILS_RECOMMENDED_FPS"], &mut g.recommended_fps);
        env.apply(&["CAPTURE_GUARDRAILS_BLUR_VAR_THRESHOLD"], &mut g.blur_variance_threshold);
        env.apply(&["CAPTURE_GUARDRAILS_BLUR_BAD_PCT"], &mut g.blur_bad_pct);
        env.apply(&["CAPTURE_GUARDRAILS_DARK_LUMA"], &mut g.dark_luma_threshold);
        env.apply(&["CAPTURE_GUARDRAILS_BRIGHT_LUMA"], &mut g.bright_luma_threshold);
        env.apply(&["CAPTURE_GUARDRAILS_EXPOSURE_BAD_PCT"], &mut g.exposure_bad_pct);
        env.apply(&["CAPTURE_GUARDRAILS_MIN_TRACK_LENGTH"], &mut g.min_track_length);
        env.apply(
            &["CAPTURE_GUARDRAILS_MAX_FIRST_DETECTION_FRAME"],
            &mut g.max_first_detection_frame,
        );
        env.apply(&["CAPTURE_GUARDRAILS_EDGE_MARGIN_PCT"], &mut g.edge_margin_pct);
        env.apply(&["CAPTURE_GUARDRAILS_EDGE_BAD_PCT"], &mut g.edge_bad_pct);

        let h = &mut cfg.hysteresis;
        env.apply(&["RANGE_MODE_READY_SCORE"], &mut h.ready_score);
        env.apply(&["RANGE_MODE_WARN_SCORE"], &mut h.warn_score);
        env.apply(&["RANGE_MODE_BLOCK_ENTER_FRAMES"], &mut h.block_enter_frames);
        env.apply(&["RANGE_MODE_READY_ENTER_FRAMES"], &mut h.ready_enter_frames);

        let c = &mut cfg.coach;
        env.apply(&["MICRO_COACH_MAX_TIPS"], &mut c.max_tips);
        env.apply_with(&["MICRO_COACH_LOCALE"], &mut c.locale, Locale::parse);

        (cfg, env.errors)
    }

    /// Replaces every invalid field by its default, one error per replacement.
    pub fn validated(self) -> (Self, Vec<Error>) {
        let (stabilizer, mut errors) = self.stabilizer.validated();

        let (calibration, e) = self.calibration.validated();
        errors.extend(e);
        let (capture_quality, e) = self.capture_quality.validated();
        errors.extend(e);
        let (guardrails, e) = self.guardrails.validated();
        errors.extend(e);
        let (hysteresis, e) = self.hysteresis.validated();
        errors.extend(e);

        (
            Self {
                stabilizer,
                calibration,
                capture_quality,
                guardrails,
                hysteresis,
                coach: self.coach,
            },
            errors,
        )
    }
}
