use std::collections::BTreeSet;

use serde_derive::Serialize;

use crate::calibration::{CalibrationConfig, CalibrationResult, CalibrationStatus};
use crate::capture::{GuardrailsResult, Hud, UxState};

pub const EXPLAIN_VERSION: &str = "v1";

/// Calibration score under which the result is called out as unreliable.
pub const LOW_CALIBRATION_CONFIDENCE: f64 = 0.5;

const MAX_ITEMS: usize = 3;
const BASE_CONFIDENCE: i32 = 90;
const BLOCK_CONFIDENCE_CAP: i32 = 35;
const WARN_CONFIDENCE_CAP: i32 = 70;

/// Everything that can make a result less trustworthy, in display priority.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Issue {
    FpsLow,
    BlurHigh,
    ExposureTooDark,
    ExposureTooBright,
    FramingUnstable,
    BallLostEarly,
    CalibrationFitR2Low,
    CalibrationFitRmseHigh,
    CalibrationLowConfidence,
    CaptureWarning,
    CaptureBlocked,
}

/// One line of the explanation, either a reason or an action.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplainItem {
    pub id: &'static str,
    pub title: &'static str,
    pub detail: &'static str,
}

const fn item(id: &'static str, title: &'static str, detail: &'static str) -> ExplainItem {
    ExplainItem { id, title, detail }
}

const RECALIBRATE: ExplainItem = item(
    "recalibrate_scale",
    "Recalibrate scale",
    "Confirm reference distance and recalibrate.",
);

pub const RECORD_SWING: ExplainItem = item(
    "record_swing",
    "Record your swing",
    "Capture looks good. Go ahead and record swings.",
);

impl Issue {
    pub const ALL: [Issue; 11] = [
        Issue::FpsLow,
        Issue::BlurHigh,
        Issue::ExposureTooDark,
        Issue::ExposureTooBright,
        Issue::FramingUnstable,
        Issue::BallLostEarly,
        Issue::CalibrationFitR2Low,
        Issue::CalibrationFitRmseHigh,
        Issue::CalibrationLowConfidence,
        Issue::CaptureWarning,
        Issue::CaptureBlocked,
    ];

    pub fn as_str(&self) -> &'static str {
        self.reason().id
    }

    /// Canonical issue for a flag, following the legacy aliases.
    pub fn from_flag(flag: &str) -> Option<Self> {
        let canonical = match flag {
            "exposure" | "exposure_low" => "exposure_too_dark",
            "exposure_high" => "exposure_too_bright",
            "framing" | "framing_bad" => "framing_unstable",
            other => other,
        };

        Self::ALL.iter().copied().find(|i| i.as_str() == canonical)
    }

    pub fn penalty(&self) -> i32 {
        match self {
            Issue::FpsLow | Issue::BlurHigh | Issue::BallLostEarly => 20,
            Issue::CaptureBlocked => 40,
            _ => 15,
        }
    }

    pub fn reason(&self) -> ExplainItem {
        match self {
            Issue::FpsLow => item(
                "fps_low",
                "Low frame rate",
                "Low FPS can miss the ball after impact.",
            ),
            Issue::BlurHigh => item(
                "blur_high",
                "Too much blur",
                "Motion blur hides the ball in flight.",
            ),
            Issue::ExposureTooDark => item(
                "exposure_too_dark",
                "Too dark",
                "The ball blends into a dark background.",
            ),
            Issue::ExposureTooBright => item(
                "exposure_too_bright",
                "Too bright",
                "Glare makes the ball hard to track.",
            ),
            Issue::FramingUnstable => item(
                "framing_unstable",
                "Ball drifting out of frame",
                "Tracking drops when the ball leaves view.",
            ),
            Issue::BallLostEarly => item(
                "ball_lost_early",
                "Ball lost early",
                "The ball leaves frame too soon.",
            ),
            Issue::CalibrationFitR2Low => item(
                "calibration_fit_r2_low",
                "Calibration fit is weak",
                "Trajectory fit quality is low.",
            ),
            Issue::CalibrationFitRmseHigh => item(
                "calibration_fit_rmse_high",
                "Calibration error is high",
                "Trajectory error is above target.",
            ),
            Issue::CalibrationLowConfidence => item(
                "calibration_low_confidence",
                "Calibration confidence low",
                "Metric fit confidence is below target.",
            ),
            Issue::CaptureWarning => item(
                "capture_warning",
                "Capture needs attention",
                "Quality is below optimal for accuracy.",
            ),
            Issue::CaptureBlocked => item(
                "capture_blocked",
                "Capture blocked",
                "Quality is too low for reliable results.",
            ),
        }
    }

    pub fn action(&self) -> ExplainItem {
        match self {
            Issue::FpsLow => item(
                "increase_fps",
                "Increase frame rate",
                "Enable slow-mo capture (120–240 FPS).",
            ),
            Issue::BlurHigh => item(
                "reduce_blur",
                "Reduce blur",
                "Stabilize the phone or use faster shutter.",
            ),
            Issue::ExposureTooDark => item(
                "improve_lighting",
                "Add lighting",
                "Brighten the hitting area and ball.",
            ),
            Issue::ExposureTooBright => item(
                "reduce_glare",
                "Reduce glare",
                "Lower exposure or avoid direct glare.",
            ),
            Issue::FramingUnstable => item(
                "improve_framing",
                "Reframe the ball",
                "Center the ball and keep it in view.",
            ),
            Issue::BallLostEarly => item(
                "start_earlier",
                "Start recording earlier",
                "Begin before impact and keep the ball in frame.",
            ),
            Issue::CalibrationFitR2Low | Issue::CalibrationFitRmseHigh => RECALIBRATE,
            Issue::CalibrationLowConfidence => item(
                "recalibrate_scale",
                "Recalibrate scale",
                "Re-run calibration with clearer tracking.",
            ),
            Issue::CaptureWarning => item(
                "improve_setup",
                "Improve capture setup",
                "Address FPS, blur, and framing warnings.",
            ),
            Issue::CaptureBlocked => item(
                "fix_capture",
                "Fix capture quality",
                "Improve lighting, FPS, and framing before recording.",
            ),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLabel {
    High,
    Med,
    Low,
}

impl ConfidenceLabel {
    pub fn from_score(score: i32) -> Self {
        if score >= 75 {
            ConfidenceLabel::High
        } else if score >= 45 {
            ConfidenceLabel::Med
        } else {
            ConfidenceLabel::Low
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplainConfidence {
    pub score: i32,
    pub label: ConfidenceLabel,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputsPresent {
    pub range_mode_hud: bool,
    pub calibration: bool,
    pub guardrails: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ExplainDebug {
    pub signals_used: Vec<Issue>,
    pub inputs_present: InputsPresent,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Explain {
    pub version: &'static str,
    pub confidence: ExplainConfidence,
    pub why_may_be_wrong: Vec<ExplainItem>,
    pub what_to_do_now: Vec<ExplainItem>,
    pub debug: ExplainDebug,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainInputs<'a> {
    pub guardrails: Option<&'a GuardrailsResult>,
    pub hud: Option<&'a Hud>,
    pub calibration: Option<&'a CalibrationResult>,
    /// Flags coming from outside the guardrails, aliases allowed.
    pub extra_flags: &'a [String],
}

fn calibration_issues(result: &CalibrationResult, cfg: &CalibrationConfig) -> BTreeSet<Issue> {
    let mut issues = BTreeSet::new();

    if result.quality.confidence_score_0_1 < LOW_CALIBRATION_CONFIDENCE
        || result.status == CalibrationStatus::LowConfidence
    {
        issues.insert(Issue::CalibrationLowConfidence);
    }

    if result.quality.reasons.contains("fit_r2_low")
        || result.fit.fit_r2.map_or(false, |r2| r2 < cfg.min_fit_r2)
    {
        issues.insert(Issue::CalibrationFitR2Low);
    }

    if result.quality.reasons.contains("fit_rmse_high")
        || result.fit.fit_rmse_m.map_or(false, |e| e > cfg.max_fit_rmse_m)
    {
        issues.insert(Issue::CalibrationFitRmseHigh);
    }

    issues
}

/// Builds the "why this may be wrong / what to do now" payload.
///
/// Issues come from the guardrail and HUD flags plus whatever the
/// calibration record reveals. With no issue at all the UX state itself
/// becomes one (`capture_blocked` or `capture_warning`). Every issue costs
/// confidence, but only the first three by priority are shown.
pub fn explain(inputs: &ExplainInputs<'_>, cfg: &CalibrationConfig) -> Explain {
    let mut flags: Vec<&str> = Vec::new();
    if let Some(g) = inputs.guardrails {
        flags.extend(g.flags.iter().map(|f| f.as_str()));
    }
    if let Some(h) = inputs.hud {
        flags.extend(h.debug.flags.iter().map(|f| f.as_str()));
    }
    for flag in inputs.extra_flags {
        flags.push(flag);
    }

    let mut issues: BTreeSet<Issue> = flags.into_iter().filter_map(Issue::from_flag).collect();
    if let Some(calibration) = inputs.calibration {
        issues.extend(calibration_issues(calibration, cfg));
    }

    let state = inputs.hud.map(|h| h.state);
    if issues.is_empty() {
        match state {
            Some(UxState::Block) => {
                issues.insert(Issue::CaptureBlocked);
            }
            Some(UxState::Warn) => {
                issues.insert(Issue::CaptureWarning);
            }
            _ => {}
        }
    }

    let selected: Vec<Issue> = issues.iter().copied().take(MAX_ITEMS).collect();
    let reasons = selected.iter().map(Issue::reason).collect();

    let mut actions: Vec<ExplainItem> = Vec::new();
    for action in selected.iter().map(Issue::action) {
        if !actions.iter().any(|a| a.id == action.id) {
            actions.push(action);
        }
    }
    if selected.is_empty() && state == Some(UxState::Ready) {
        actions.push(RECORD_SWING);
    }

    let score_0_100 = inputs
        .hud
        .map(|h| h.score_0_100)
        .or_else(|| inputs.guardrails.map(|g| (g.score * 100.0).round() as i32));

    let mut base = score_0_100.map_or(BASE_CONFIDENCE, |s| s.min(BASE_CONFIDENCE));
    match state {
        Some(UxState::Block) => base = base.min(BLOCK_CONFIDENCE_CAP),
        Some(UxState::Warn) => base = base.min(WARN_CONFIDENCE_CAP),
        _ => {}
    }

    let score = (base - issues.iter().map(Issue::penalty).sum::<i32>()).clamp(0, 100);
    let label = ConfidenceLabel::from_score(score);

    tracing::debug!(score, ?label, n_issues = issues.len(), "explain built");

    Explain {
        version: EXPLAIN_VERSION,
        confidence: ExplainConfidence { score, label },
        why_may_be_wrong: reasons,
        what_to_do_now: actions,
        debug: ExplainDebug {
            signals_used: selected,
            inputs_present: InputsPresent {
                range_mode_hud: inputs.hud.is_some(),
                calibration: inputs.calibration.is_some(),
                guardrails: inputs.guardrails.is_some(),
            },
        },
    }
}
