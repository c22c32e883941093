use std::collections::BTreeSet;

use serde_derive::{Deserialize, Serialize};

use crate::capture::{Hud, UxState};
use crate::explain::{ConfidenceLabel, Explain};

pub const COACH_VERSION: &str = "v1";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Sv,
    En,
}

impl Locale {
    /// Accepts `sv`, `en` and region-tagged forms such as `en-US`.
    pub fn parse(s: &str) -> Option<Self> {
        let lang = s.split(|c| c == '-' || c == '_').next()?.trim();
        if lang.eq_ignore_ascii_case("sv") {
            Some(Locale::Sv)
        } else if lang.eq_ignore_ascii_case("en") {
            Some(Locale::En)
        } else {
            None
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CoachConfig {
    pub max_tips: usize,
    pub locale: Locale,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            max_tips: 3,
            locale: Locale::Sv,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TipScope {
    Capture,
    Calibration,
}

struct TipRule {
    id: &'static str,
    priority: u8,
    scope: TipScope,
    triggers: &'static [&'static str],
    sv: (&'static str, &'static str),
    en: (&'static str, &'static str),
}

impl TipRule {
    fn text(&self, locale: Locale) -> (&'static str, &'static str) {
        match locale {
            Locale::Sv => self.sv,
            Locale::En => self.en,
        }
    }
}

const TIP_RULES: &[TipRule] = &[
    TipRule {
        id: "tip_fps_light",
        priority: 1,
        scope: TipScope::Capture,
        triggers: &["fps_low", "increase_fps"],
        sv: (
            "Mer ljus för högre FPS",
            "Öka belysningen så kameran kan köra snabbare bildhastighet.",
        ),
        en: (
            "More light for higher FPS",
            "Add light so the camera can run a faster frame rate.",
        ),
    },
    TipRule {
        id: "tip_stabilize_phone",
        priority: 1,
        scope: TipScope::Capture,
        triggers: &["blur_high", "reduce_blur"],
        sv: (
            "Stabilisera kameran",
            "Stöd mobilen och undvik panorering så bollen blir skarp.",
        ),
        en: (
            "Stabilize the camera",
            "Support the phone and avoid panning so the ball stays sharp.",
        ),
    },
    TipRule {
        id: "tip_keep_ball_in_frame",
        priority: 1,
        scope: TipScope::Capture,
        triggers: &["framing_unstable", "framing", "framing_bad", "improve_framing"],
        sv: (
            "Håll bollbanan i bild",
            "Placera mobilen stabilt så hela bollflykten syns.",
        ),
        en: (
            "Keep the ball path in frame",
            "Place the phone steadily so the whole ball flight is visible.",
        ),
    },
    TipRule {
        id: "tip_capture_block",
        priority: 1,
        scope: TipScope::Capture,
        triggers: &["capture_blocked", "fix_capture"],
        sv: (
            "Fixa fångsten först",
            "Förbättra ljus, FPS och stabilitet innan du slår.",
        ),
        en: (
            "Fix the capture first",
            "Improve light, FPS and stability before you hit.",
        ),
    },
    TipRule {
        id: "tip_even_lighting",
        priority: 2,
        scope: TipScope::Capture,
        triggers: &["exposure_too_dark", "exposure_low", "exposure", "improve_lighting"],
        sv: (
            "Jämnare ljus",
            "Flytta till jämnare ljus så bollen syns tydligt.",
        ),
        en: (
            "More even light",
            "Move to more even light so the ball is clearly visible.",
        ),
    },
    TipRule {
        id: "tip_reduce_glare",
        priority: 2,
        scope: TipScope::Capture,
        triggers: &["exposure_too_bright", "exposure_high", "reduce_glare"],
        sv: (
            "Undvik motljus",
            "Vrid dig bort från starkt ljus och sänk exponeringen.",
        ),
        en: (
            "Avoid backlight",
            "Turn away from strong light and lower the exposure.",
        ),
    },
    TipRule {
        id: "tip_start_earlier",
        priority: 2,
        scope: TipScope::Capture,
        triggers: &["ball_lost_early", "start_earlier"],
        sv: (
            "Starta lite tidigare",
            "Börja inspelningen före träffen och följ bollen längre.",
        ),
        en: (
            "Start a little earlier",
            "Start recording before impact and follow the ball longer.",
        ),
    },
    TipRule {
        id: "tip_capture_setup",
        priority: 2,
        scope: TipScope::Capture,
        triggers: &["capture_warning", "improve_setup"],
        sv: (
            "Vässa inspelningen",
            "Justera ljus, stabilitet och inramning för säkrare data.",
        ),
        en: (
            "Sharpen the recording",
            "Adjust light, stability and framing for more reliable data.",
        ),
    },
    TipRule {
        id: "tip_redo_calibration",
        priority: 3,
        scope: TipScope::Calibration,
        triggers: &[
            "calibration_fit_r2_low",
            "calibration_fit_rmse_high",
            "calibration_low_confidence",
            "recalibrate_scale",
        ],
        sv: (
            "Gör om kalibreringen",
            "Använd tydliga markörer och rätt avstånd när du kalibrerar.",
        ),
        en: (
            "Redo the calibration",
            "Use clear markers and the right distance when you calibrate.",
        ),
    },
];

/// Which inputs a tip was matched on.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TipSource {
    pub reason_ids: Vec<&'static str>,
    pub action_ids: Vec<&'static str>,
    pub hud_flags: Vec<&'static str>,
    pub confidence_label: Option<ConfidenceLabel>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Tip {
    pub id: &'static str,
    pub title: &'static str,
    pub detail: &'static str,
    pub priority: u8,
    pub scope: TipScope,
    pub source: TipSource,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoachInputsPresent {
    pub explain_result: bool,
    pub range_mode_hud: bool,
    pub calibration: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CoachDebug {
    pub inputs_present: CoachInputsPresent,
    pub selected_rule_ids: Vec<&'static str>,
    pub deduped_tip_ids: Vec<&'static str>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MicroCoach {
    pub version: &'static str,
    pub enabled: bool,
    pub locale: Locale,
    pub tips: Vec<Tip>,
    pub debug: CoachDebug,
}

/// Matched trigger ids, sorted.
fn matched(ids: &BTreeSet<&'static str>, triggers: &[&'static str]) -> Vec<&'static str> {
    ids.iter().copied().filter(|id| triggers.contains(id)).collect()
}

/// Picks localized tips for the issues named in `explain` and the HUD flags.
///
/// Tips are ordered by `(priority, id)`. Coaching stays on for MED and HIGH
/// confidence. At LOW it only runs when the capture state is READY or WARN,
/// or, when BLOCK, with capture tips alone.
pub fn micro_coach(
    explain: Option<&Explain>,
    hud: Option<&Hud>,
    calibration_present: bool,
    cfg: &CoachConfig,
) -> MicroCoach {
    let label = explain.map(|e| e.confidence.label);
    let reason_ids: BTreeSet<&'static str> = explain
        .map(|e| e.why_may_be_wrong.iter().map(|r| r.id).collect())
        .unwrap_or_default();
    let action_ids: BTreeSet<&'static str> = explain
        .map(|e| e.what_to_do_now.iter().map(|a| a.id).collect())
        .unwrap_or_default();
    let hud_flags: BTreeSet<&'static str> = hud
        .map(|h| h.debug.flags.iter().map(|f| f.as_str()).collect())
        .unwrap_or_default();
    let state = hud.map(|h| h.state);

    let mut candidates = Vec::new();
    for rule in TIP_RULES {
        let source = TipSource {
            reason_ids: matched(&reason_ids, rule.triggers),
            action_ids: matched(&action_ids, rule.triggers),
            hud_flags: matched(&hud_flags, rule.triggers),
            confidence_label: label,
        };
        if source.reason_ids.is_empty() && source.action_ids.is_empty() && source.hud_flags.is_empty() {
            continue;
        }

        let (title, detail) = rule.text(cfg.locale);
        candidates.push(Tip {
            id: rule.id,
            title,
            detail,
            priority: rule.priority,
            scope: rule.scope,
            source,
        });
    }

    let selected_rule_ids: Vec<_> = candidates.iter().map(|t| t.id).collect();
    candidates.sort_by(|a, b| (a.priority, a.id).cmp(&(b.priority, b.id)));

    let (enabled, mut tips) = match (label, state) {
        (None, _) => (false, Vec::new()),
        (Some(ConfidenceLabel::Low), Some(UxState::Ready | UxState::Warn)) => {
            (!candidates.is_empty(), candidates)
        }
        (Some(ConfidenceLabel::Low), Some(UxState::Block)) => {
            let capture: Vec<Tip> = candidates
                .into_iter()
                .filter(|t| t.scope == TipScope::Capture)
                .collect();
            (!capture.is_empty(), capture)
        }
        (Some(ConfidenceLabel::Low), None) => (false, Vec::new()),
        (Some(_), _) => (true, candidates),
    };
    tips.truncate(cfg.max_tips);

    tracing::debug!(enabled, n_tips = tips.len(), "micro coach built");

    MicroCoach {
        version: COACH_VERSION,
        enabled,
        locale: cfg.locale,
        debug: CoachDebug {
            inputs_present: CoachInputsPresent {
                explain_result: explain.is_some(),
                range_mode_hud: hud.is_some(),
                calibration: calibration_present,
            },
            selected_rule_ids,
            deduped_tip_ids: tips.iter().map(|t| t.id).collect(),
        },
        tips,
    }
}
