use crate::circular_queue::CircularQueue;
use nalgebra as na;
use num_traits::{Float, NumCast};

/// Selection gate parameters, all in pixels (per frame where noted).
#[derive(Debug, Clone, Copy)]
pub struct Gate<F> {
    /// lower bound once a velocity is known
    pub radius: F,
    pub base: F,
    pub speed_factor: F,
    /// per frame, used while no velocity is known
    pub max_step: F,
}

/// Constant-velocity predictor over the last two accepted positions.
#[derive(Debug, Clone)]
pub struct Predictor<F>
where
    F: na::RealField + Float,
{
    history: CircularQueue<(usize, na::Point2<F>)>,
}

#[inline]
fn frames<F: Float>(n: usize) -> F {
    <F as NumCast>::from(n).unwrap_or_else(F::max_value)
}

impl<F> Predictor<F>
where
    F: na::RealField + Float,
{
    pub fn new() -> Self {
        Self {
            history: CircularQueue::with_capacity(2),
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    #[inline]
    pub fn push(&mut self, frame_idx: usize, pos: na::Point2<F>) {
        self.history.push((frame_idx, pos));
    }

    #[inline]
    pub fn last(&self) -> Option<(usize, na::Point2<F>)> {
        self.history.top().copied()
    }

    /// Displacement per frame between the two newest positions.
    pub fn velocity(&self) -> Option<na::Vector2<F>> {
        let (top, prev) = self.history.latest_pair()?;

        let dt = top.0.checked_sub(prev.0).filter(|&dt| dt > 0)?;

        Some((top.1 - prev.1) / frames::<F>(dt))
    }

    pub fn predict(&self, frame_idx: usize) -> Option<na::Point2<F>> {
        let (last_idx, last_pos) = self.last()?;
        let dt = frames::<F>(frame_idx.saturating_sub(last_idx));

        Some(match self.velocity() {
            Some(vel) => last_pos + vel * dt,
            None => last_pos,
        })
    }

    /// Search radius around the prediction for `frame_idx`.
    pub fn gate_radius(&self, frame_idx: usize, gate: &Gate<F>) -> F {
        let dt = self
            .last()
            .map(|(last_idx, _)| frame_idx.saturating_sub(last_idx).max(1))
            .unwrap_or(1);
        let dt = frames::<F>(dt);

        match self.velocity() {
            Some(vel) => Float::max(gate.radius, gate.base + gate.speed_factor * vel.norm() * dt),
            None => gate.base + gate.max_step * dt,
        }
    }
}

impl<F> Default for Predictor<F>
where
    F: na::RealField + Float,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const GATE: Gate<f64> = Gate {
        radius: 90.0,
        base: 20.0,
        speed_factor: 1.5,
        max_step: 80.0,
    };

    #[test]
    fn empty_predictor_has_no_prediction() {
        let p = Predictor::<f64>::new();
        assert!(p.predict(3).is_none());
        assert!(p.velocity().is_none());
        assert_relative_eq!(p.gate_radius(3, &GATE), 100.0);
    }

    #[test]
    fn single_point_predicts_in_place() {
        let mut p = Predictor::new();
        p.push(4, na::Point2::new(10.0, 20.0));

        assert_eq!(p.predict(6), Some(na::Point2::new(10.0, 20.0)));
        assert_relative_eq!(p.gate_radius(6, &GATE), 20.0 + 80.0 * 2.0);
    }

    #[test]
    fn extrapolates_constant_velocity() {
        let mut p = Predictor::new();
        p.push(0, na::Point2::new(0.0, 0.0));
        p.push(2, na::Point2::new(8.0, -4.0));
        p.push(3, na::Point2::new(12.0, -6.0));

        let vel = p.velocity().unwrap();
        assert_relative_eq!(vel.x, 4.0);
        assert_relative_eq!(vel.y, -2.0);

        let next = p.predict(5).unwrap();
        assert_relative_eq!(next.x, 20.0);
        assert_relative_eq!(next.y, -10.0);
    }

    #[test]
    fn gate_grows_with_speed() {
        let mut p = Predictor::new();
        p.push(0, na::Point2::new(0.0, 0.0));
        p.push(1, na::Point2::new(2.0, 0.0));
        // slow ball: floor radius wins
        assert_relative_eq!(p.gate_radius(2, &GATE), 90.0);

        p.push(2, na::Point2::new(102.0, 0.0));
        assert_relative_eq!(p.gate_radius(3, &GATE), 20.0 + 1.5 * 100.0);
    }
}
