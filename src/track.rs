use serde_derive::{Deserialize, Serialize};

use crate::math;
use nalgebra as na;

/// One sample of the ball track. `frame_idx` is the clock, wall time is `frame_idx / fps`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub frame_idx: usize,
    pub x_px: f64,
    pub y_px: f64,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub is_interpolated: bool,
}

impl TrackPoint {
    #[inline]
    pub fn observed(frame_idx: usize, pos: na::Point2<f64>, confidence: f64) -> Self {
        Self {
            frame_idx,
            x_px: pos.x,
            y_px: pos.y,
            confidence: Some(confidence),
            is_interpolated: false,
        }
    }

    #[inline]
    pub fn interpolated(frame_idx: usize, pos: na::Point2<f64>) -> Self {
        Self {
            frame_idx,
            x_px: pos.x,
            y_px: pos.y,
            confidence: Some(0.0),
            is_interpolated: true,
        }
    }

    #[inline(always)]
    pub fn pos(&self) -> na::Point2<f64> {
        na::Point2::new(self.x_px, self.y_px)
    }
}

/// Fills the frames strictly between `from` and `to` with points on the segment joining them.
pub fn fill_between(from: &TrackPoint, to: &TrackPoint) -> Vec<TrackPoint> {
    if to.frame_idx <= from.frame_idx + 1 {
        return Vec::new();
    }

    let span = (to.frame_idx - from.frame_idx) as f64;
    let (a, b) = (from.pos(), to.pos());

    (from.frame_idx + 1..to.frame_idx)
        .map(|frame_idx| {
            let t = (frame_idx - from.frame_idx) as f64 / span;
            TrackPoint::interpolated(frame_idx, a + (b - a) * t)
        })
        .collect()
}

/// Median absolute change of successive step lengths. Zero below three points.
pub fn compute_jitter_px<I>(points: I) -> f64
where
    I: IntoIterator<Item = na::Point2<f64>>,
{
    let points: Vec<_> = points.into_iter().collect();
    if points.len() < 3 {
        return 0.0;
    }

    let steps: Vec<f64> = points.windows(2).map(|w| na::distance(&w[0], &w[1])).collect();
    let accel: Vec<f64> = steps.windows(2).map(|w| (w[1] - w[0]).abs()).collect();

    math::median(&accel).unwrap_or(0.0)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackMetrics {
    pub n_frames: usize,
    pub n_detections: usize,
    pub n_missing: usize,
    pub max_gap: usize,
    pub gap_ratio: f64,
    pub jitter_px: f64,
    pub filled_frames: usize,
    pub outliers_removed: usize,
    pub segments_linked: usize,
    pub stabilized: bool,
}

/// Stabilizer bookkeeping that does not belong to the public metrics block.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StabilizerDebug {
    pub fallback_accepted: usize,
    pub fallback_rejected: usize,
    pub segments_total: usize,
    pub frames_out_of_order: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StabilizedTrack {
    pub points: Vec<TrackPoint>,
    pub n_frames: usize,
    pub n_detections: usize,
    pub n_missing: usize,
    pub max_gap: usize,
    pub gap_ratio: f64,
    pub jitter_px: f64,
    pub filled_frames: usize,
    pub outliers_removed: usize,
    pub segments_linked: usize,
    pub debug: StabilizerDebug,
}

impl StabilizedTrack {
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &TrackPoint> {
        self.points.iter()
    }

    pub fn point_at(&self, frame_idx: usize) -> Option<&TrackPoint> {
        self.points
            .binary_search_by_key(&frame_idx, |p| p.frame_idx)
            .ok()
            .map(|i| &self.points[i])
    }

    /// Mean confidence of observed (non-interpolated) points.
    pub fn mean_confidence(&self) -> Option<f64> {
        math::mean(
            self.points
                .iter()
                .filter(|p| !p.is_interpolated)
                .filter_map(|p| p.confidence),
        )
    }

    pub fn metrics(&self) -> TrackMetrics {
        TrackMetrics {
            n_frames: self.n_frames,
            n_detections: self.n_detections,
            n_missing: self.n_missing,
            max_gap: self.max_gap,
            gap_ratio: math::round_to(self.gap_ratio, 4),
            jitter_px: math::round_to(self.jitter_px, 3),
            filled_frames: self.filled_frames,
            outliers_removed: self.outliers_removed,
            segments_linked: self.segments_linked,
            stabilized: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn jitter_is_zero_for_short_tracks() {
        let pts = vec![na::Point2::new(0.0, 0.0), na::Point2::new(1.0, 0.0)];
        assert_eq!(compute_jitter_px(pts), 0.0);
    }

    #[test]
    fn jitter_is_zero_for_uniform_motion() {
        let pts = (0..10).map(|i| na::Point2::new(i as f64 * 4.0, i as f64 * 3.0));
        assert_abs_diff_eq!(compute_jitter_px(pts), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn jitter_tracks_step_changes() {
        // steps 1, 3, 1, 3 -> changes 2, 2, 2
        let xs = [0.0, 1.0, 4.0, 5.0, 8.0];
        let pts = xs.iter().map(|&x| na::Point2::new(x, 0.0));
        assert_abs_diff_eq!(compute_jitter_px(pts), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn fill_between_is_linear_and_flagged() {
        let a = TrackPoint::observed(2, na::Point2::new(0.0, 0.0), 0.9);
        let b = TrackPoint::observed(6, na::Point2::new(8.0, -4.0), 0.9);
        let filled = fill_between(&a, &b);

        assert_eq!(filled.len(), 3);
        assert_eq!(filled[0].frame_idx, 3);
        assert_abs_diff_eq!(filled[1].x_px, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(filled[1].y_px, -2.0, epsilon = 1e-12);
        assert!(filled.iter().all(|p| p.is_interpolated && p.confidence == Some(0.0)));
        assert!(fill_between(&a, &a).is_empty());
    }
}
