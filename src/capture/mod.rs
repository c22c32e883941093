mod guardrails;
mod hud;
mod quality;
mod stats;

pub use guardrails::{
    effective_fps, GuardrailDiagnostics, GuardrailFlag, GuardrailInputs, Guardrails,
    GuardrailsConfig, GuardrailsResult,
};
pub use hud::{
    build_hud, flag_copy, hud_from_guardrails, top_flags, FlagCopy, Hud, HudDebug,
    HysteresisConfig, HysteresisSnapshot, UxState,
};
pub use quality::{
    analyze_capture_quality, CaptureIssue, CaptureQualityConfig, CaptureReport, CaptureSummary,
    IssueCode, Resolution, Severity,
};
pub use stats::{collect_stats, frame_diff, laplacian_variance, luma, CaptureStats, StatsCollector};
