use nalgebra as na;

/// Exponential moving average over track positions with a per-frame velocity estimate.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    last: Option<(usize, na::Point2<f64>)>,
    velocity: na::Vector2<f64>,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            last: None,
            velocity: na::Vector2::zeros(),
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.velocity = na::Vector2::zeros();
    }

    #[inline]
    pub fn last(&self) -> Option<(usize, na::Point2<f64>)> {
        self.last
    }

    #[cfg(test)]
    #[inline]
    pub fn velocity(&self) -> na::Vector2<f64> {
        self.velocity
    }

    /// Last smoothed position carried forward by the current velocity.
    pub fn predict(&self, frame_idx: usize) -> Option<na::Point2<f64>> {
        let (last_idx, last_pos) = self.last?;
        let dt = frame_idx.saturating_sub(last_idx) as f64;

        Some(last_pos + self.velocity * dt)
    }

    /// Folds `raw` into the average and returns the smoothed position.
    /// Frames at or before the last one are ignored.
    pub fn push(&mut self, frame_idx: usize, raw: na::Point2<f64>) -> na::Point2<f64> {
        let (last_idx, last_pos) = match self.last {
            Some(last) => last,
            None => {
                self.last = Some((frame_idx, raw));
                return raw;
            }
        };

        if frame_idx <= last_idx {
            return last_pos;
        }

        let dt = (frame_idx - last_idx) as f64;
        let smoothed: na::Point2<f64> =
            (raw.coords * self.alpha + last_pos.coords * (1.0 - self.alpha)).into();

        self.velocity = (smoothed - last_pos) / dt;
        self.last = Some((frame_idx, smoothed));

        smoothed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_sample_passes_through() {
        let mut ema = Ema::new(0.45);
        let p = ema.push(3, na::Point2::new(5.0, 7.0));

        assert_eq!(p, na::Point2::new(5.0, 7.0));
        assert_eq!(ema.velocity(), na::Vector2::zeros());
    }

    #[test]
    fn blends_towards_raw() {
        let mut ema = Ema::new(0.45);
        ema.push(0, na::Point2::new(0.0, 0.0));
        let p = ema.push(1, na::Point2::new(10.0, -10.0));

        assert_relative_eq!(p.x, 4.5);
        assert_relative_eq!(p.y, -4.5);
        assert_relative_eq!(ema.velocity().x, 4.5);
    }

    #[test]
    fn velocity_is_per_frame_across_gaps() {
        let mut ema = Ema::new(1.0);
        ema.push(0, na::Point2::new(0.0, 0.0));
        ema.push(4, na::Point2::new(8.0, 4.0));

        assert_relative_eq!(ema.velocity().x, 2.0);
        assert_relative_eq!(ema.velocity().y, 1.0);

        let next = ema.predict(6).unwrap();
        assert_relative_eq!(next.x, 12.0);
        assert_relative_eq!(next.y, 6.0);
    }

    #[test]
    fn steady_motion_settles_to_constant_lag() {
        let alpha = 0.45;
        let mut ema = Ema::new(alpha);
        let mut last = na::Point2::origin();
        for i in 0..60 {
            last = ema.push(i, na::Point2::new(2.0 * i as f64, 0.0));
        }

        assert_relative_eq!(118.0 - last.x, 2.0 * (1.0 - alpha) / alpha, epsilon = 1e-6);
        assert_relative_eq!(ema.velocity().x, 2.0, epsilon = 1e-6);
    }
}
