use super::config::StabilizerConfig;
use crate::track::{fill_between, TrackPoint};
use nalgebra as na;

/// Run of consecutive accepted points, gaps inside already filled.
pub type Segment = Vec<TrackPoint>;

/// Whether `next` plausibly continues `prev` after a gap.
fn can_link(prev: &[TrackPoint], next: &[TrackPoint], cfg: &StabilizerConfig) -> bool {
    let (tail, head) = match (prev.last(), next.first()) {
        (Some(tail), Some(head)) => (tail, head),
        _ => return false,
    };

    if head.frame_idx <= tail.frame_idx {
        return false;
    }

    let gap = head.frame_idx - tail.frame_idx - 1;
    if gap > 2 * cfg.max_gap_frames {
        return false;
    }

    let jump = head.pos() - tail.pos();
    if jump.norm() > cfg.link_max_distance * (gap + 1) as f64 {
        return false;
    }

    if head.confidence.unwrap_or(0.0) < cfg.min_conf {
        return false;
    }

    match prev.len().checked_sub(2).map(|i| &prev[i]) {
        Some(before) => {
            let heading: na::Vector2<f64> = tail.pos() - before.pos();
            heading.dot(&jump) >= 0.0
        }
        None => true,
    }
}

/// Merges adjacent segments that continue each other. Returns the merged
/// segments in order and the number of links made.
pub fn link_segments(segments: Vec<Segment>, cfg: &StabilizerConfig) -> (Vec<Segment>, usize) {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    let mut links = 0;

    for segment in segments.into_iter().filter(|s| !s.is_empty()) {
        if let Some(prev) = merged.last_mut() {
            if can_link(prev, &segment, cfg) {
                if let (Some(tail), Some(head)) = (prev.last().copied(), segment.first()) {
                    prev.extend(fill_between(&tail, head));
                }
                prev.extend(segment);
                links += 1;
                continue;
            }
        }

        merged.push(segment);
    }

    (merged, links)
}

/// Longest segment, earliest start on ties.
pub fn longest(segments: Vec<Segment>) -> Segment {
    let mut best: Option<Segment> = None;

    for segment in segments {
        let better = match &best {
            Some(b) => segment.len() > b.len(),
            None => true,
        };

        if better {
            best = Some(segment);
        }
    }

    best.unwrap_or_default()
}
