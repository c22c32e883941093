use serde_derive::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::stats::CaptureStats;
use crate::config::{non_negative, sanitize_fields, unit_interval};
use crate::error::Error;
use crate::math::{self, round_to};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CaptureQualityConfig {
    pub fps_warn: f64,
    pub fps_recommended: f64,
    pub min_height: usize,
    pub recommended_height: usize,
    pub underexposed_luma: f64,
    pub overexposed_luma: f64,
    pub exposure_bad_pct: f64,
    pub blur_var_threshold: f64,
    pub blur_bad_pct: f64,
    pub shake_diff_threshold: f64,
    pub shake_bad_pct: f64,
}

impl Default for CaptureQualityConfig {
    fn default() -> Self {
        Self {
            fps_warn: 60.0,
            fps_recommended: 120.0,
            min_height: 720,
            recommended_height: 1080,
            underexposed_luma: 60.0,
            overexposed_luma: 200.0,
            exposure_bad_pct: 0.3,
            blur_var_threshold: 200.0,
            blur_bad_pct: 0.3,
            shake_diff_threshold: 12.0,
            shake_bad_pct: 0.3,
        }
    }
}

impl CaptureQualityConfig {
    pub fn validated(mut self) -> (Self, Vec<Error>) {
        let mut errors = Vec::new();

        sanitize_fields!(self, Self::default(), errors, "capture_quality", {
            fps_warn: non_negative,
            fps_recommended: non_negative,
            underexposed_luma: non_negative,
            overexposed_luma: non_negative,
            exposure_bad_pct: unit_interval,
            blur_var_threshold: non_negative,
            blur_bad_pct: unit_interval,
            shake_diff_threshold: non_negative,
            shake_bad_pct: unit_interval,
        });

        (self, errors)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    #[inline]
    pub fn penalty(&self) -> i32 {
        match self {
            Severity::Info => 5,
            Severity::Warn => 15,
            Severity::Error => 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    LowFps,
    LowResolution,
    Underexposed,
    Overexposed,
    MotionBlur,
    CameraShake,
}

impl IssueCode {
    pub fn recommendation(&self) -> &'static str {
        match self {
            IssueCode::LowFps => {
                "Enable slow-motion mode or increase capture FPS (120+ recommended)."
            }
            IssueCode::LowResolution => "Increase capture resolution (1080p+ recommended).",
            IssueCode::Underexposed => "Improve lighting or move to a brighter area.",
            IssueCode::Overexposed => "Avoid harsh direct light; reduce exposure if possible.",
            IssueCode::MotionBlur => "Use a faster shutter or stabilize the camera to reduce blur.",
            IssueCode::CameraShake => "Use a tripod or stabilize the phone to reduce shake.",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CaptureIssue {
    pub code: IssueCode,
    pub severity: Severity,
    pub message: &'static str,
    pub details: Value,
}

impl CaptureIssue {
    fn warn(code: IssueCode, message: &'static str, details: Value) -> Self {
        Self {
            code,
            severity: Severity::Warn,
            message,
            details,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: usize,
    pub height: usize,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct CaptureSummary {
    pub frames: usize,
    pub fps: Option<f64>,
    pub resolution: Option<Resolution>,
    pub underexposed_pct: Option<f64>,
    pub overexposed_pct: Option<f64>,
    pub blurry_pct: Option<f64>,
    pub blur_variance_mean: Option<f64>,
    pub shaky_pct: Option<f64>,
    pub shake_diff_mean: Option<f64>,
    pub frames_rejected: usize,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct CaptureReport {
    pub score: i32,
    pub summary: CaptureSummary,
    pub issues: Vec<CaptureIssue>,
    pub recommendations: Vec<&'static str>,
}

impl CaptureReport {
    #[inline]
    pub fn has_issue(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// Grades a capture from its per-frame statistics.
///
/// Every metric is a fraction of frames past a threshold; an issue is raised
/// once that fraction reaches the matching `*_bad_pct`. An empty capture
/// scores zero with no issues.
pub fn analyze_capture_quality(
    stats: &CaptureStats,
    fps: Option<f64>,
    cfg: &CaptureQualityConfig,
) -> CaptureReport {
    let mut summary = CaptureSummary {
        frames: stats.n_frames(),
        fps,
        frames_rejected: stats.rejected.len(),
        ..Default::default()
    };

    let (width, height) = match stats.frame_size() {
        Some(size) if !stats.is_empty() => size,
        _ => {
            return CaptureReport {
                score: 0,
                summary,
                ..Default::default()
            }
        }
    };

    summary.resolution = Some(Resolution { width, height });

    let mut issues = Vec::new();

    if let Some(fps) = fps.filter(|&f| f < cfg.fps_warn) {
        issues.push(CaptureIssue::warn(
            IssueCode::LowFps,
            "Frame rate is too low for reliable tracking.",
            json!({
                "fps": fps,
                "warn_threshold": cfg.fps_warn,
                "recommended": cfg.fps_recommended,
            }),
        ));
    }

    if height < cfg.min_height {
        issues.push(CaptureIssue::warn(
            IssueCode::LowResolution,
            "Resolution is below the recommended minimum.",
            json!({
                "height": height,
                "min_height": cfg.min_height,
                "recommended_height": cfg.recommended_height,
            }),
        ));
    }

    let under = math::fraction(&stats.luma_means, |l| l < cfg.underexposed_luma);
    let over = math::fraction(&stats.luma_means, |l| l > cfg.overexposed_luma);
    summary.underexposed_pct = Some(round_to(under, 4));
    summary.overexposed_pct = Some(round_to(over, 4));

    if under >= cfg.exposure_bad_pct {
        issues.push(CaptureIssue::warn(
            IssueCode::Underexposed,
            "Video appears too dark for reliable tracking.",
            json!({
                "underexposed_pct": round_to(under, 4),
                "threshold": cfg.exposure_bad_pct,
                "luma_threshold": cfg.underexposed_luma,
            }),
        ));
    }

    if over >= cfg.exposure_bad_pct {
        issues.push(CaptureIssue::warn(
            IssueCode::Overexposed,
            "Video appears too bright for reliable tracking.",
            json!({
                "overexposed_pct": round_to(over, 4),
                "threshold": cfg.exposure_bad_pct,
                "luma_threshold": cfg.overexposed_luma,
            }),
        ));
    }

    let blurry = math::fraction(&stats.blur_variances, |v| v < cfg.blur_var_threshold);
    let blur_mean = math::mean(stats.blur_variances.iter().copied()).unwrap_or(0.0);
    summary.blurry_pct = Some(round_to(blurry, 4));
    summary.blur_variance_mean = Some(round_to(blur_mean, 4));

    if blurry >= cfg.blur_bad_pct {
        issues.push(CaptureIssue::warn(
            IssueCode::MotionBlur,
            "Video appears blurry; use a faster shutter or stabilize.",
            json!({
                "blurry_pct": round_to(blurry, 4),
                "threshold": cfg.blur_bad_pct,
                "laplacian_var_threshold": cfg.blur_var_threshold,
                "blur_variance_mean": round_to(blur_mean, 4),
            }),
        ));
    }

    match math::mean(stats.frame_diffs.iter().copied()) {
        Some(diff_mean) => {
            let shaky = math::fraction(&stats.frame_diffs, |d| d > cfg.shake_diff_threshold);
            summary.shaky_pct = Some(round_to(shaky, 4));
            summary.shake_diff_mean = Some(round_to(diff_mean, 4));

            if shaky >= cfg.shake_bad_pct {
                issues.push(CaptureIssue::warn(
                    IssueCode::CameraShake,
                    "Camera movement detected; stabilize for best results.",
                    json!({
                        "shaky_pct": round_to(shaky, 4),
                        "threshold": cfg.shake_bad_pct,
                        "diff_threshold": cfg.shake_diff_threshold,
                        "diff_mean": round_to(diff_mean, 4),
                    }),
                ));
            }
        }
        None => summary.shaky_pct = Some(0.0),
    }

    let score = (100 - issues.iter().map(|i| i.severity.penalty()).sum::<i32>()).clamp(0, 100);

    let mut recommendations: Vec<&'static str> = Vec::new();
    for issue in &issues {
        let rec = issue.code.recommendation();
        if !recommendations.contains(&rec) {
            recommendations.push(rec);
        }
    }

    tracing::debug!(score, n_issues = issues.len(), "capture quality analyzed");

    CaptureReport {
        score,
        summary,
        issues,
        recommendations,
    }
}
