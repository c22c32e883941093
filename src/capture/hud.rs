use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use super::guardrails::{GuardrailFlag, GuardrailsResult};
use crate::error::Error;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HysteresisConfig {
    pub ready_score: i32,
    pub warn_score: i32,
    /// consecutive BLOCK observations needed to enter BLOCK
    pub block_enter_frames: u32,
    /// consecutive READY observations needed to enter READY
    pub ready_enter_frames: u32,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            ready_score: 80,
            warn_score: 55,
            block_enter_frames: 2,
            ready_enter_frames: 2,
        }
    }
}

impl HysteresisConfig {
    /// Thresholds must satisfy `0 <= warn_score <= ready_score <= 100`.
    /// Each failing threshold is restored and reported under its own name.
    pub fn validated(mut self) -> (Self, Vec<Error>) {
        let defaults = Self::default();
        let mut errors = Vec::new();
        let in_range = |v: i32| (0..=100).contains(&v);

        if !in_range(self.ready_score) {
            self.ready_score = defaults.ready_score;
            errors.push(Error::InvalidConfig {
                field: "range_mode.ready_score",
            });
        }

        if !in_range(self.warn_score) || self.warn_score > self.ready_score {
            self.warn_score = defaults.warn_score;
            errors.push(Error::InvalidConfig {
                field: "range_mode.warn_score",
            });
        }

        // the default warn score can still sit above a low custom ready score
        if self.warn_score > self.ready_score {
            self.ready_score = defaults.ready_score;
            errors.push(Error::InvalidConfig {
                field: "range_mode.ready_score",
            });
        }

        if !errors.is_empty() {
            tracing::warn!(
                ready_score = self.ready_score,
                warn_score = self.warn_score,
                n_errors = errors.len(),
                "invalid range mode thresholds, defaults restored"
            );
        }

        (self, errors)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum UxState {
    Ready,
    Warn,
    Block,
}

impl UxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UxState::Ready => "READY",
            UxState::Warn => "WARN",
            UxState::Block => "BLOCK",
        }
    }

    /// Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        [UxState::Ready, UxState::Warn, UxState::Block]
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
    }

    pub fn from_score(score_0_100: i32, cfg: &HysteresisConfig) -> Self {
        if score_0_100 >= cfg.ready_score {
            UxState::Ready
        } else if score_0_100 >= cfg.warn_score {
            UxState::Warn
        } else {
            UxState::Block
        }
    }
}

/// Caller-owned state threaded from one HUD evaluation to the next.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HysteresisSnapshot {
    pub state: UxState,
    #[serde(default)]
    pub below_block_count: u32,
    #[serde(default)]
    pub above_ready_count: u32,
}

impl HysteresisSnapshot {
    pub fn new(state: UxState) -> Self {
        Self {
            state,
            below_block_count: 0,
            above_ready_count: 0,
        }
    }

    /// Reads a snapshot back from JSON. Accepts the snapshot map itself or a
    /// whole serialized HUD. A missing or unknown state yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value
            .pointer("/debug/hysteresis")
            .filter(|v| v.is_object())
            .unwrap_or(value);

        let state = map.get("state")?.as_str().and_then(UxState::parse)?;
        let count = |key: &str| {
            map.get(key)
                .and_then(Value::as_u64)
                .map_or(0, |c| u32::try_from(c).unwrap_or(u32::MAX))
        };

        Some(Self {
            state,
            below_block_count: count("below_block_count"),
            above_ready_count: count("above_ready_count"),
        })
    }

    /// Next state after one more raw observation.
    pub fn advance(prev: Option<&Self>, raw: UxState, cfg: &HysteresisConfig) -> Self {
        let prev = match prev {
            Some(prev) => prev,
            None => {
                let state = if raw == UxState::Block && cfg.block_enter_frames > 1 {
                    UxState::Warn
                } else {
                    raw
                };

                return Self {
                    state,
                    below_block_count: u32::from(raw == UxState::Block),
                    above_ready_count: u32::from(raw == UxState::Ready),
                };
            }
        };

        let below = if raw == UxState::Block {
            prev.below_block_count.saturating_add(1)
        } else {
            0
        };
        let above = if raw == UxState::Ready {
            prev.above_ready_count.saturating_add(1)
        } else {
            0
        };

        let state = match (prev.state, raw) {
            (_, UxState::Ready) if above >= cfg.ready_enter_frames => UxState::Ready,
            (_, UxState::Ready) => UxState::Warn,
            (_, UxState::Warn) => UxState::Warn,
            (UxState::Block, UxState::Block) => UxState::Block,
            (_, UxState::Block) if below >= cfg.block_enter_frames => UxState::Block,
            (_, UxState::Block) => UxState::Warn,
        };

        Self {
            state,
            below_block_count: below,
            above_ready_count: above,
        }
    }
}

/// Badge, headline and suggested action shown for a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagCopy {
    pub badge: &'static str,
    pub message: &'static str,
    pub action: &'static str,
}

pub fn flag_copy(flag: GuardrailFlag) -> FlagCopy {
    let (badge, message, action) = match flag {
        GuardrailFlag::FpsLow => ("FPS", "Low frame rate", "Switch to slow-mo (120–240 FPS)."),
        GuardrailFlag::BlurHigh => (
            "BLUR",
            "Too much motion blur",
            "Stabilize the phone or use faster shutter.",
        ),
        GuardrailFlag::ExposureTooDark => (
            "LIGHT",
            "Scene is too dark",
            "Increase light on the hitting area.",
        ),
        GuardrailFlag::ExposureTooBright => (
            "LIGHT",
            "Scene is too bright",
            "Reduce exposure or avoid glare.",
        ),
        GuardrailFlag::FramingUnstable => (
            "FRAME",
            "Ball drifting out of frame",
            "Move the phone lower and center the ball.",
        ),
        GuardrailFlag::BallLostEarly => (
            "TRACK",
            "Ball lost early",
            "Start recording earlier and keep the ball in frame.",
        ),
    };

    FlagCopy {
        badge,
        message,
        action,
    }
}

/// At most `limit` flags in display priority order.
pub fn top_flags(flags: &[GuardrailFlag], limit: usize) -> Vec<GuardrailFlag> {
    GuardrailFlag::PRIORITY
        .iter()
        .copied()
        .filter(|f| flags.contains(f))
        .take(limit)
        .collect()
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HudDebug {
    pub raw_state: UxState,
    pub score_0_100: i32,
    pub flags: Vec<GuardrailFlag>,
    pub hysteresis: HysteresisSnapshot,
    pub apply_hysteresis: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Hud {
    pub score_0_100: i32,
    pub state: UxState,
    pub primary_message: &'static str,
    pub secondary_message: Option<&'static str>,
    pub badges: Vec<&'static str>,
    pub recommended_actions: Vec<&'static str>,
    pub debug: HudDebug,
}

impl Hud {
    /// Snapshot to pass into the next evaluation.
    #[inline]
    pub fn snapshot(&self) -> &HysteresisSnapshot {
        &self.debug.hysteresis
    }
}

fn push_unique(items: &mut Vec<&'static str>, item: &'static str) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Maps a 0..1 capture score and its flags to the range-mode HUD.
pub fn build_hud(
    score_0_1: f64,
    flags: &[GuardrailFlag],
    cfg: &HysteresisConfig,
    prev: Option<&HysteresisSnapshot>,
    apply_hysteresis: bool,
) -> Hud {
    let score_0_100 = if score_0_1.is_nan() {
        0
    } else {
        (score_0_1.clamp(0.0, 1.0) * 100.0).round() as i32
    };
    let raw_state = UxState::from_score(score_0_100, cfg);

    let hysteresis = if apply_hysteresis {
        HysteresisSnapshot::advance(prev, raw_state, cfg)
    } else {
        HysteresisSnapshot::new(raw_state)
    };

    let top = top_flags(flags, 2);
    let mut badges = Vec::new();
    let mut actions = Vec::new();
    for copy in top.iter().map(|&f| flag_copy(f)) {
        push_unique(&mut badges, copy.badge);
        push_unique(&mut actions, copy.action);
    }

    let (primary_message, secondary_message) = match top.as_slice() {
        [] => ("Capture looks good", None),
        [first] => (flag_copy(*first).message, None),
        [first, second, ..] => (flag_copy(*first).message, Some(flag_copy(*second).message)),
    };

    tracing::debug!(
        raw = raw_state.as_str(),
        state = hysteresis.state.as_str(),
        score_0_100,
        "range mode state"
    );

    Hud {
        score_0_100,
        state: hysteresis.state,
        primary_message,
        secondary_message,
        badges,
        recommended_actions: actions,
        debug: HudDebug {
            raw_state,
            score_0_100,
            flags: flags.to_vec(),
            hysteresis,
            apply_hysteresis,
        },
    }
}

pub fn hud_from_guardrails(
    result: &GuardrailsResult,
    cfg: &HysteresisConfig,
    prev: Option<&HysteresisSnapshot>,
    apply_hysteresis: bool,
) -> Hud {
    build_hud(result.score, &result.flags, cfg, prev, apply_hysteresis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hud(score: f64, flags: &[GuardrailFlag], prev: Option<&HysteresisSnapshot>) -> Hud {
        build_hud(score, flags, &HysteresisConfig::default(), prev, true)
    }

    #[test]
    fn block_needs_two_observations() {
        let first = hud(0.4, &[GuardrailFlag::FpsLow], None);
        assert_eq!(first.debug.raw_state, UxState::Block);
        assert_eq!(first.state, UxState::Warn);

        let second = hud(0.4, &[GuardrailFlag::FpsLow], Some(first.snapshot()));
        assert_eq!(second.state, UxState::Block);
        assert_eq!(second.snapshot().below_block_count, 2);
    }

    #[test]
    fn single_block_after_ready_is_warn() {
        let ready = HysteresisSnapshot {
            state: UxState::Ready,
            below_block_count: 0,
            above_ready_count: 5,
        };
        let next = hud(0.1, &[], Some(&ready));

        assert_eq!(next.state, UxState::Warn);
    }

    #[test]
    fn leaving_block_needs_ready_streak() {
        let block = HysteresisSnapshot {
            state: UxState::Block,
            below_block_count: 3,
            above_ready_count: 0,
        };

        let one = hud(0.95, &[], Some(&block));
        assert_eq!(one.state, UxState::Warn);

        let two = hud(0.95, &[], Some(one.snapshot()));
        assert_eq!(two.state, UxState::Ready);
    }

    #[test]
    fn first_ready_is_ready() {
        let first = hud(0.9, &[], None);
        assert_eq!(first.state, UxState::Ready);
        assert_eq!(first.primary_message, "Capture looks good");
        assert_eq!(first.secondary_message, None);
        assert!(first.badges.is_empty());
    }

    #[test]
    fn bypass_reports_raw_state() {
        let out = build_hud(0.2, &[], &HysteresisConfig::default(), None, false);

        assert_eq!(out.state, UxState::Block);
        assert_eq!(*out.snapshot(), HysteresisSnapshot::new(UxState::Block));
    }

    #[test]
    fn top_two_flags_by_priority() {
        let flags = [
            GuardrailFlag::BallLostEarly,
            GuardrailFlag::ExposureTooDark,
            GuardrailFlag::ExposureTooBright,
            GuardrailFlag::BlurHigh,
        ];
        let out = hud(0.3, &flags, None);

        assert_eq!(out.primary_message, "Too much motion blur");
        assert_eq!(out.secondary_message, Some("Scene is too dark"));
        assert_eq!(out.badges, vec!["BLUR", "LIGHT"]);
        assert_eq!(out.recommended_actions.len(), 2);
        assert_eq!(out.debug.flags.len(), 4);
    }

    #[test]
    fn snapshot_parses_from_hud_json() {
        let first = hud(0.4, &[GuardrailFlag::FpsLow], None);
        let value = serde_json::to_value(&first).unwrap();

        assert_eq!(value["state"], "WARN");
        assert_eq!(HysteresisSnapshot::from_value(&value), Some(*first.snapshot()));
    }

    #[test]
    fn snapshot_parses_loose_maps() {
        let snap = HysteresisSnapshot::from_value(&json!({"state": "block", "below_block_count": 4}));
        assert_eq!(
            snap,
            Some(HysteresisSnapshot {
                state: UxState::Block,
                below_block_count: 4,
                above_ready_count: 0,
            })
        );

        assert_eq!(HysteresisSnapshot::from_value(&json!({"state": "purple"})), None);
        assert_eq!(HysteresisSnapshot::from_value(&json!({})), None);
    }

    #[test]
    fn inverted_thresholds_fall_back() {
        let (cfg, errors) = HysteresisConfig {
            ready_score: 40,
            warn_score: 60,
            ..Default::default()
        }
        .validated();

        assert_eq!(cfg, HysteresisConfig::default());
        assert_eq!(
            errors,
            vec![
                Error::InvalidConfig {
                    field: "range_mode.warn_score"
                },
                Error::InvalidConfig {
                    field: "range_mode.ready_score"
                },
            ]
        );
    }

    #[test]
    fn bad_warn_score_is_named() {
        let (cfg, errors) = HysteresisConfig {
            warn_score: -3,
            ..Default::default()
        }
        .validated();

        assert_eq!(cfg.warn_score, 55);
        assert_eq!(cfg.ready_score, 80);
        assert_eq!(
            errors,
            vec![Error::InvalidConfig {
                field: "range_mode.warn_score"
            }]
        );
    }

    #[test]
    fn bad_ready_score_is_named() {
        let (cfg, errors) = HysteresisConfig {
            ready_score: 150,
            warn_score: 70,
            ..Default::default()
        }
        .validated();

        assert_eq!(cfg.ready_score, 80);
        assert_eq!(cfg.warn_score, 70);
        assert_eq!(
            errors,
            vec![Error::InvalidConfig {
                field: "range_mode.ready_score"
            }]
        );
    }
}
