use serde_derive::{Deserialize, Serialize};

use super::stats::CaptureStats;
use crate::config::{non_negative, sanitize_fields, unit_interval};
use crate::error::Error;
use crate::math::{self, round_to};
use crate::track::TrackPoint;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GuardrailsConfig {
    pub min_fps: f64,
    pub recommended_fps: f64,
    pub blur_variance_threshold: f64,
    pub blur_bad_pct: f64,
    pub dark_luma_threshold: f64,
    pub bright_luma_threshold: f64,
    pub exposure_bad_pct: f64,
    pub min_track_length: usize,
    pub max_first_detection_frame: usize,
    /// fraction of `min(width, height)` counted as the edge band
    pub edge_margin_pct: f64,
    pub edge_bad_pct: f64,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            min_fps: 120.0,
            recommended_fps: 240.0,
            blur_variance_threshold: 200.0,
            blur_bad_pct: 0.3,
            dark_luma_threshold: 60.0,
            bright_luma_threshold: 200.0,
            exposure_bad_pct: 0.3,
            min_track_length: 8,
            max_first_detection_frame: 5,
            edge_margin_pct: 0.1,
            edge_bad_pct: 0.35,
        }
    }
}

impl GuardrailsConfig {
    pub fn validated(mut self) -> (Self, Vec<Error>) {
        let mut errors = Vec::new();

        sanitize_fields!(self, Self::default(), errors, "guardrails", {
            min_fps: non_negative,
            recommended_fps: non_negative,
            blur_variance_threshold: non_negative,
            blur_bad_pct: unit_interval,
            dark_luma_threshold: non_negative,
            bright_luma_threshold: non_negative,
            exposure_bad_pct: unit_interval,
            edge_margin_pct: |v: f64| unit_interval(v) && v < 0.5,
            edge_bad_pct: unit_interval,
        });

        (self, errors)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailFlag {
    FpsLow,
    BlurHigh,
    ExposureTooDark,
    ExposureTooBright,
    FramingUnstable,
    BallLostEarly,
}

impl GuardrailFlag {
    /// Display priority, most important first.
    pub const PRIORITY: [GuardrailFlag; 6] = [
        GuardrailFlag::FpsLow,
        GuardrailFlag::BlurHigh,
        GuardrailFlag::ExposureTooDark,
        GuardrailFlag::ExposureTooBright,
        GuardrailFlag::FramingUnstable,
        GuardrailFlag::BallLostEarly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailFlag::FpsLow => "fps_low",
            GuardrailFlag::BlurHigh => "blur_high",
            GuardrailFlag::ExposureTooDark => "exposure_too_dark",
            GuardrailFlag::ExposureTooBright => "exposure_too_bright",
            GuardrailFlag::FramingUnstable => "framing_unstable",
            GuardrailFlag::BallLostEarly => "ball_lost_early",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::PRIORITY.iter().copied().find(|f| f.as_str() == s)
    }

    pub fn penalty(&self) -> f64 {
        match self {
            GuardrailFlag::FpsLow | GuardrailFlag::BlurHigh | GuardrailFlag::BallLostEarly => 0.2,
            GuardrailFlag::ExposureTooDark
            | GuardrailFlag::ExposureTooBright
            | GuardrailFlag::FramingUnstable => 0.15,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            GuardrailFlag::FpsLow => "Record in slow-motion mode (120+ FPS minimum, 240 FPS ideal).",
            GuardrailFlag::BlurHigh => "Use faster shutter/lock exposure and stabilize the phone.",
            GuardrailFlag::ExposureTooDark => "Increase lighting or move to a brighter area.",
            GuardrailFlag::ExposureTooBright => "Reduce exposure or avoid harsh direct light.",
            GuardrailFlag::FramingUnstable => {
                "Keep the ball centered with extra margin so it stays in frame."
            }
            GuardrailFlag::BallLostEarly => {
                "Start recording earlier and keep the ball visible longer."
            }
        }
    }
}

/// Everything the guardrails look at. Precomputed per-frame statistics are
/// used as given; nothing here touches pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardrailInputs<'a> {
    pub fps: Option<f64>,
    pub frame_timestamps: Option<&'a [f64]>,
    /// `(width, height)`
    pub frame_size: Option<(usize, usize)>,
    pub track_points: Option<&'a [TrackPoint]>,
    pub brightness: Option<&'a [f64]>,
    pub sharpness: Option<&'a [f64]>,
}

impl<'a> GuardrailInputs<'a> {
    pub fn from_stats(stats: &'a CaptureStats, fps: Option<f64>) -> Self {
        Self {
            fps,
            frame_size: stats.frame_size(),
            brightness: Some(stats.luma_means.as_slice()),
            sharpness: Some(stats.blur_variances.as_slice()),
            ..Default::default()
        }
    }

    pub fn with_track(mut self, points: &'a [TrackPoint]) -> Self {
        self.track_points = Some(points);
        self
    }

    pub fn with_timestamps(mut self, timestamps: &'a [f64]) -> Self {
        self.frame_timestamps = Some(timestamps);
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GuardrailDiagnostics {
    pub effective_fps: Option<f64>,
    pub brightness_mean: Option<f64>,
    pub brightness_dark_pct: Option<f64>,
    pub brightness_bright_pct: Option<f64>,
    pub sharpness_mean: Option<f64>,
    pub sharpness_blur_pct: Option<f64>,
    pub track_length: Option<usize>,
    pub track_edge_pct: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GuardrailsResult {
    /// 0..1, higher is better
    pub score: f64,
    pub flags: Vec<GuardrailFlag>,
    pub recommendations: Vec<String>,
    pub diagnostics: GuardrailDiagnostics,
}

impl GuardrailsResult {
    #[inline]
    pub fn has_flag(&self, flag: GuardrailFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Frame rate implied by the timestamps when there are at least two with a
/// positive spacing, the declared rate otherwise.
pub fn effective_fps(fps: Option<f64>, timestamps: Option<&[f64]>) -> Option<f64> {
    let from_timestamps = timestamps.filter(|ts| ts.len() >= 2).and_then(|ts| {
        math::mean(ts.windows(2).map(|w| w[1] - w[0]).filter(|&d| d > 0.0))
    });

    match from_timestamps {
        Some(dt) => Some(1.0 / dt),
        None => fps,
    }
}

#[inline]
fn near_edge(p: &TrackPoint, width: f64, height: f64, margin: f64) -> bool {
    p.x_px <= margin || p.x_px >= width - margin || p.y_px <= margin || p.y_px >= height - margin
}

pub struct Guardrails {
    config: GuardrailsConfig,
}

impl Guardrails {
    pub fn new(config: GuardrailsConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, inputs: &GuardrailInputs<'_>) -> GuardrailsResult {
        let cfg = &self.config;
        let mut flags = Vec::new();
        let mut diagnostics = GuardrailDiagnostics::default();

        let fps = effective_fps(inputs.fps, inputs.frame_timestamps);
        diagnostics.effective_fps = fps.map(|f| round_to(f, 3));

        if fps.map_or(false, |f| f < cfg.min_fps) {
            flags.push(GuardrailFlag::FpsLow);
        }

        if let Some(brightness) = inputs.brightness.filter(|b| !b.is_empty()) {
            let dark = math::fraction(brightness, |l| l < cfg.dark_luma_threshold);
            let bright = math::fraction(brightness, |l| l > cfg.bright_luma_threshold);

            diagnostics.brightness_mean = math::mean(brightness.iter().copied()).map(|m| round_to(m, 3));
            diagnostics.brightness_dark_pct = Some(round_to(dark, 4));
            diagnostics.brightness_bright_pct = Some(round_to(bright, 4));

            if dark >= cfg.exposure_bad_pct {
                flags.push(GuardrailFlag::ExposureTooDark);
            }
            if bright >= cfg.exposure_bad_pct {
                flags.push(GuardrailFlag::ExposureTooBright);
            }
        }

        if let Some(sharpness) = inputs.sharpness.filter(|s| !s.is_empty()) {
            let blurry = math::fraction(sharpness, |v| v < cfg.blur_variance_threshold);

            diagnostics.sharpness_mean = math::mean(sharpness.iter().copied()).map(|m| round_to(m, 3));
            diagnostics.sharpness_blur_pct = Some(round_to(blurry, 4));

            if blurry >= cfg.blur_bad_pct {
                flags.push(GuardrailFlag::BlurHigh);
            }
        }

        if let Some(points) = inputs.track_points.filter(|p| !p.is_empty()) {
            self.framing_flags(points, inputs.frame_size, &mut flags, &mut diagnostics);
        }

        let mut recommendations = Vec::new();
        for flag in &flags {
            let rec = flag.recommendation().to_string();
            if !recommendations.contains(&rec) {
                recommendations.push(rec);
            }
        }

        let score = f64::clamp(1.0 - flags.iter().map(GuardrailFlag::penalty).sum::<f64>(), 0.0, 1.0);

        tracing::debug!(
            score,
            flags = ?flags,
            effective_fps = ?diagnostics.effective_fps,
            "guardrails evaluated"
        );

        GuardrailsResult {
            score: round_to(score, 4),
            flags,
            recommendations,
            diagnostics,
        }
    }

    fn framing_flags(
        &self,
        points: &[TrackPoint],
        frame_size: Option<(usize, usize)>,
        flags: &mut Vec<GuardrailFlag>,
        diagnostics: &mut GuardrailDiagnostics,
    ) {
        let cfg = &self.config;
        diagnostics.track_length = Some(points.len());

        let first_frame = points.iter().map(|p| p.frame_idx).min().unwrap_or(0);
        if points.len() < cfg.min_track_length || first_frame > cfg.max_first_detection_frame {
            flags.push(GuardrailFlag::BallLostEarly);
        }

        let (width, height) = match frame_size {
            Some((w, h)) if w > 0 && h > 0 => (w as f64, h as f64),
            _ => return,
        };

        let margin = width.min(height) * cfg.edge_margin_pct;
        let near = points
            .iter()
            .filter(|p| near_edge(p, width, height, margin))
            .count();
        let edge_pct = near as f64 / points.len() as f64;
        diagnostics.track_edge_pct = Some(round_to(edge_pct, 4));

        if edge_pct >= cfg.edge_bad_pct {
            flags.push(GuardrailFlag::FramingUnstable);
        }
    }
}

impl Default for Guardrails {
    fn default() -> Self {
        Self::new(GuardrailsConfig::default())
    }
}
