use std::cmp::Ordering;

use super::config::StabilizerConfig;
use crate::detection::BallDetection;
use crate::predictor::{Gate, Predictor};
use nalgebra as na;

/// Outcome of choosing one candidate for a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    /// nothing to predict from yet, most confident candidate taken
    Seed(BallDetection),
    Gated(BallDetection),
    /// gate was empty, most confident candidate close enough to the prediction
    Fallback(BallDetection),
    /// gate was empty and the fallback candidate was too far away
    Rejected { distance: f64 },
}

/// Most confident first, then by position so that equal candidates resolve the same way every run.
fn by_confidence(a: &BallDetection, b: &BallDetection) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then(a.x.total_cmp(&b.x))
        .then(a.y.total_cmp(&b.y))
}

#[derive(Debug, Clone)]
pub struct CandidateSelector {
    predictor: Predictor<f64>,
    gate: Gate<f64>,
    dist_weight: f64,
    conf_weight: f64,
    fallback_max_distance: f64,
}

impl CandidateSelector {
    pub fn new(cfg: &StabilizerConfig) -> Self {
        Self {
            predictor: Predictor::new(),
            gate: cfg.gate(),
            dist_weight: cfg.dist_weight,
            conf_weight: cfg.conf_weight,
            fallback_max_distance: cfg.fallback_max_distance,
        }
    }

    pub fn reset(&mut self) {
        self.predictor.reset();
    }

    /// Records the raw position chosen for `frame_idx`.
    #[inline]
    pub fn accept(&mut self, frame_idx: usize, pos: na::Point2<f64>) {
        self.predictor.push(frame_idx, pos);
    }

    #[inline]
    fn score(&self, distance: f64, det: &BallDetection) -> f64 {
        self.dist_weight * distance + self.conf_weight * (1.0 - det.confidence)
    }

    /// `None` when the frame has no candidates.
    pub fn select(&self, frame_idx: usize, candidates: &[BallDetection]) -> Option<Selection> {
        let most_confident = candidates.iter().min_by(|a, b| by_confidence(a, b))?;

        let predicted = match self.predictor.predict(frame_idx) {
            Some(p) => p,
            None => return Some(Selection::Seed(*most_confident)),
        };

        let radius = self.predictor.gate_radius(frame_idx, &self.gate);

        let best = candidates
            .iter()
            .map(|det| (det.distance(&predicted), det))
            .filter(|(d, _)| *d <= radius)
            .min_by(|(da, a), (db, b)| {
                self.score(*da, a)
                    .total_cmp(&self.score(*db, b))
                    .then(da.total_cmp(db))
                    .then(b.confidence.total_cmp(&a.confidence))
                    .then(a.x.total_cmp(&b.x))
                    .then(a.y.total_cmp(&b.y))
            });

        if let Some((_, det)) = best {
            return Some(Selection::Gated(*det));
        }

        let distance = most_confident.distance(&predicted);
        if distance <= self.fallback_max_distance {
            Some(Selection::Fallback(*most_confident))
        } else {
            Some(Selection::Rejected { distance })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector_after(points: &[(usize, f64, f64)]) -> CandidateSelector {
        let mut sel = CandidateSelector::new(&StabilizerConfig::default());
        for &(idx, x, y) in points {
            sel.accept(idx, na::Point2::new(x, y));
        }
        sel
    }

    #[test]
    fn empty_frame_selects_nothing() {
        let sel = selector_after(&[]);
        assert_eq!(sel.select(0, &[]), None);
    }

    #[test]
    fn seed_takes_most_confident() {
        let sel = selector_after(&[]);
        let dets = [
            BallDetection::new(50.0, 50.0, 0.4),
            BallDetection::new(10.0, 10.0, 0.9),
        ];
        assert_eq!(sel.select(0, &dets), Some(Selection::Seed(dets[1])));
    }

    #[test]
    fn gated_prefers_close_candidate_over_confident_one() {
        let sel = selector_after(&[(0, 0.0, 0.0), (1, 5.0, 0.0)]);
        // prediction for frame 2 is (10, 0)
        let near = BallDetection::new(11.0, 0.0, 0.5);
        let far = BallDetection::new(60.0, 0.0, 0.99);

        assert_eq!(sel.select(2, &[far, near]), Some(Selection::Gated(near)));
    }

    #[test]
    fn low_confidence_is_penalized_not_excluded() {
        let sel = selector_after(&[(0, 0.0, 0.0), (1, 5.0, 0.0)]);
        let weak = BallDetection::new(10.0, 0.0, 0.1);
        assert_eq!(sel.select(2, &[weak]), Some(Selection::Gated(weak)));

        // 2 px further but much more confident wins on score
        let strong = BallDetection::new(12.0, 0.0, 0.9);
        assert_eq!(sel.select(2, &[weak, strong]), Some(Selection::Gated(strong)));
    }

    #[test]
    fn equal_scores_break_ties_by_position() {
        let sel = selector_after(&[(0, 0.0, 0.0), (1, 5.0, 0.0)]);
        let a = BallDetection::new(10.0, 3.0, 0.8);
        let b = BallDetection::new(10.0, -3.0, 0.8);

        assert_eq!(sel.select(2, &[a, b]), Some(Selection::Gated(b)));
        assert_eq!(sel.select(2, &[b, a]), Some(Selection::Gated(b)));
    }

    #[test]
    fn fallback_within_distance() {
        let sel = selector_after(&[(0, 0.0, 0.0), (1, 1.0, 0.0)]);
        // gate radius is 90 for a slow ball, 120 px away is outside the gate
        let det = BallDetection::new(122.0, 0.0, 0.7);
        assert_eq!(sel.select(2, &[det]), Some(Selection::Fallback(det)));
    }

    #[test]
    fn far_spike_is_rejected() {
        let sel = selector_after(&[(0, 0.0, 0.0), (1, 1.0, 0.0)]);
        let spike = BallDetection::new(2000.0, -1800.0, 0.1);

        match sel.select(2, &[spike]) {
            Some(Selection::Rejected { distance }) => assert!(distance > 140.0),
            other => panic!("unexpected selection {:?}", other),
        }
    }
}
