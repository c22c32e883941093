use serde_derive::Serialize;

use super::config::CalibrationConfig;
use crate::math;
use crate::track::TrackPoint;

/// Contiguous post-impact part of a track. Indices point into the track the
/// window was detected on, both inclusive.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct LaunchWindow {
    #[serde(skip)]
    pub start_index: Option<usize>,
    #[serde(skip)]
    pub end_index: Option<usize>,
    pub start_frame: Option<usize>,
    pub end_frame: Option<usize>,
    pub n_points: usize,
    #[serde(skip)]
    pub confidence: f64,
    #[serde(skip)]
    pub reasons: Vec<&'static str>,
}

impl LaunchWindow {
    fn rejected(reasons: Vec<&'static str>) -> Self {
        Self {
            reasons,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_found(&self) -> bool {
        self.start_index.is_some() && self.end_index.is_some()
    }

    /// Window points of `track`, empty when no window was found.
    pub fn slice<'a>(&self, track: &'a [TrackPoint]) -> &'a [TrackPoint] {
        match (self.start_index, self.end_index) {
            (Some(start), Some(end)) if start <= end && end < track.len() => &track[start..=end],
            _ => &[],
        }
    }
}

/// Index ranges of `points` split wherever the frame step exceeds `max_gap`.
fn split_segments(points: &[TrackPoint], max_gap: usize) -> Vec<std::ops::Range<usize>> {
    let mut segments = Vec::new();
    let mut start = 0;

    for (i, w) in points.windows(2).enumerate() {
        if w[1].frame_idx.saturating_sub(w[0].frame_idx) > max_gap {
            segments.push(start..i + 1);
            start = i + 1;
        }
    }

    if start < points.len() {
        segments.push(start..points.len());
    }

    segments
}

/// Locates ball flight in an ordered track: the run of steps whose per-frame
/// displacement sits in a band around the median step.
pub fn detect_launch_window(points: &[TrackPoint], cfg: &CalibrationConfig) -> LaunchWindow {
    if points.len() < 2 {
        return LaunchWindow::rejected(vec!["insufficient_points"]);
    }

    let segments = split_segments(points, cfg.max_gap_frames);

    let segment = match segments.iter().find(|s| s.len() >= cfg.min_points) {
        Some(s) => s.clone(),
        None => {
            let mut longest = 0..0;
            for s in &segments {
                if s.len() > longest.len() {
                    longest = s.clone();
                }
            }
            longest
        }
    };

    if segment.len() < cfg.min_points {
        return LaunchWindow::rejected(vec!["launch_window_too_short"]);
    }

    let seg = &points[segment.clone()];

    // steps[k - 1] is the step ending at seg[k]
    let steps: Vec<f64> = seg
        .windows(2)
        .map(|w| {
            let frames = w[1].frame_idx.saturating_sub(w[0].frame_idx).max(1) as f64;
            nalgebra::distance(&w[0].pos(), &w[1].pos()) / frames
        })
        .collect();

    let m = math::median(&steps).unwrap_or(0.0);
    let lo = f64::max(0.5 * m, 0.75);
    let hi = f64::max(f64::max(6.0 * m, 3.0 * cfg.min_motion_px_per_frame), 5.0);
    let moving: Vec<bool> = steps.iter().map(|&s| s >= lo && s <= hi).collect();

    let first = moving.iter().position(|&b| b);
    let last = moving.iter().rposition(|&b| b);

    let (first, last) = match (first, last) {
        (Some(first), Some(last)) => (first, last),
        _ => return LaunchWindow::rejected(vec!["launch_window_not_found", "insufficient_motion"]),
    };

    // prefer the first step that opens a sustained run of moving steps
    let sustain = cfg.min_sustain_frames.max(1);
    let first = (first..=last)
        .find(|&k| k + sustain <= moving.len() && moving[k..k + sustain].iter().all(|&b| b))
        .unwrap_or(first);

    // step k ends at seg[k + 1], the window opens one point before it
    let max_points = cfg.max_window_points.max(1);
    let start = first;
    let mut end = last + 1;

    if end - start + 1 > max_points {
        end = start + max_points - 1;
    }

    let n_points = end - start + 1;
    let start_frame = seg[start].frame_idx;
    let end_frame = seg[end].frame_idx;

    if n_points < cfg.min_points {
        return LaunchWindow::rejected(vec!["launch_window_too_short"]);
    }

    let mut reasons = Vec::new();
    if end_frame - start_frame + 1 > max_points {
        reasons.push("launch_window_gap");
    }

    let coverage = n_points as f64 / max_points as f64;

    LaunchWindow {
        start_index: Some(segment.start + start),
        end_index: Some(segment.start + end),
        start_frame: Some(start_frame),
        end_frame: Some(end_frame),
        n_points,
        confidence: coverage.clamp(0.2, 1.0),
        reasons,
    }
}
