mod config;
mod link;
mod select;

pub use config::StabilizerConfig;
pub use link::{link_segments, longest, Segment};
pub use select::{CandidateSelector, Selection};

use crate::detection::BallDetection;
use crate::ema::Ema;
use crate::frame::Frame;
use crate::track::{compute_jitter_px, fill_between, StabilizedTrack, StabilizerDebug, TrackPoint};

/// Builds one stable ball track out of per-frame candidate lists.
///
/// Frames are processed in order; a frame whose index does not increase is
/// skipped and counted. Rejections never fail the run, they only show up in
/// the counters of the returned track.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    cfg: StabilizerConfig,
    selector: CandidateSelector,
    ema: Ema,
    segments: Vec<Segment>,
    current: Segment,
    observed_frames: Vec<usize>,
    first_frame: Option<usize>,
    last_frame: Option<usize>,
    outliers_removed: usize,
    debug: StabilizerDebug,
}

impl Stabilizer {
    pub fn new(cfg: StabilizerConfig) -> Self {
        Self {
            selector: CandidateSelector::new(&cfg),
            ema: Ema::new(cfg.ema_alpha),
            cfg,
            segments: Vec::new(),
            current: Vec::new(),
            observed_frames: Vec::new(),
            first_frame: None,
            last_frame: None,
            outliers_removed: 0,
            debug: StabilizerDebug::default(),
        }
    }

    fn close_segment(&mut self) {
        if !self.current.is_empty() {
            self.segments.push(std::mem::take(&mut self.current));
        }

        self.ema.reset();
        self.selector.reset();
    }

    fn start_segment(&mut self, frame_idx: usize, det: BallDetection) {
        let raw = det.pos();
        self.close_segment();

        let smoothed = self.ema.push(frame_idx, raw);
        self.current
            .push(TrackPoint::observed(frame_idx, smoothed, det.confidence));
        self.selector.accept(frame_idx, raw);
        self.observed_frames.push(frame_idx);
    }

    pub fn update(&mut self, frame: &Frame) {
        if let Some(last) = self.last_frame {
            if frame.index <= last {
                self.debug.frames_out_of_order += 1;
                tracing::debug!(index = frame.index, last, "frame out of order, skipped");
                return;
            }
        }

        self.first_frame.get_or_insert(frame.index);
        self.last_frame = Some(frame.index);

        // a stale prediction must not gate the start of a new segment
        if let Some((last_idx, _)) = self.ema.last() {
            let gap = frame.index - last_idx - 1;
            if gap > self.cfg.max_gap_frames {
                tracing::debug!(frame = frame.index, gap, "gap too long, closing segment");
                self.close_segment();
            }
        }

        let det = match self.selector.select(frame.index, &frame.detections) {
            None => return,
            Some(Selection::Rejected { distance }) => {
                self.debug.fallback_rejected += 1;
                self.outliers_removed += 1;
                tracing::debug!(frame = frame.index, distance, "no candidate near prediction");
                return;
            }
            Some(Selection::Fallback(det)) => {
                self.debug.fallback_accepted += 1;
                det
            }
            Some(Selection::Seed(det)) | Some(Selection::Gated(det)) => det,
        };

        let (last_idx, last_smoothed) = match self.ema.last() {
            Some(last) => last,
            None => return self.start_segment(frame.index, det),
        };

        let dt = frame.index - last_idx;
        let raw = det.pos();
        if let Some(predicted) = self.ema.predict(frame.index) {
            let distance = nalgebra::distance(&raw, &predicted);
            if distance > self.cfg.outlier_distance(dt) {
                self.outliers_removed += 1;
                tracing::debug!(frame = frame.index, distance, "outlier rejected");
                return;
            }
        }

        let smoothed = self.ema.push(frame.index, raw);
        let point = TrackPoint::observed(frame.index, smoothed, det.confidence);

        if dt > 1 {
            let from = self
                .current
                .last()
                .copied()
                .unwrap_or_else(|| TrackPoint::observed(last_idx, last_smoothed, 0.0));
            self.current.extend(fill_between(&from, &point));
        }

        self.current.push(point);
        self.selector.accept(frame.index, raw);
        self.observed_frames.push(frame.index);
    }

    /// Longest run of frames in `[first, last]` with no accepted observation.
    fn longest_miss(&self) -> usize {
        let (first, last) = match (self.first_frame, self.last_frame) {
            (Some(first), Some(last)) => (first, last),
            _ => return 0,
        };

        let mut longest = 0;
        let mut expected = first;
        for &idx in &self.observed_frames {
            longest = longest.max(idx - expected);
            expected = idx + 1;
        }

        longest.max((last + 1).saturating_sub(expected))
    }

    pub fn finish(mut self) -> StabilizedTrack {
        let max_gap = self.longest_miss();

        self.close_segment();

        let segments_total = self.segments.len();
        let (merged, segments_linked) = link_segments(std::mem::take(&mut self.segments), &self.cfg);
        let points = longest(merged);

        let n_frames = match (self.first_frame, self.last_frame) {
            (Some(first), Some(last)) => last - first + 1,
            _ => 0,
        };

        let n_detections = points.iter().filter(|p| !p.is_interpolated).count();
        let filled_frames = points.len() - n_detections;
        let n_missing = n_frames.saturating_sub(points.len());
        let gap_ratio = if n_frames > 0 {
            n_missing as f64 / n_frames as f64
        } else {
            0.0
        };
        let jitter_px = compute_jitter_px(points.iter().map(TrackPoint::pos));

        self.debug.segments_total = segments_total;

        tracing::debug!(
            n_frames,
            n_points = points.len(),
            n_detections,
            filled_frames,
            outliers_removed = self.outliers_removed,
            segments_total,
            segments_linked,
            "ball track stabilized"
        );

        StabilizedTrack {
            points,
            n_frames,
            n_detections,
            n_missing,
            max_gap,
            gap_ratio,
            jitter_px,
            filled_frames,
            outliers_removed: self.outliers_removed,
            segments_linked,
            debug: self.debug,
        }
    }
}

/// Runs a fresh [`Stabilizer`] over `frames`.
pub fn stabilize<'a, I>(frames: I, cfg: &StabilizerConfig) -> StabilizedTrack
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut stabilizer = Stabilizer::new(cfg.clone());
    for frame in frames {
        stabilizer.update(frame);
    }

    stabilizer.finish()
}
