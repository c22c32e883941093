use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use nalgebra as na;

/// Ball candidate center in image pixels
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BallDetection {
    pub x: f64,
    pub y: f64,
    #[serde(alias = "p")]
    pub confidence: f64,
}

impl BallDetection {
    #[inline]
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    #[inline(always)]
    pub fn pos(&self) -> na::Point2<f64> {
        na::Point2::new(self.x, self.y)
    }

    #[inline]
    pub fn distance(&self, p: &na::Point2<f64>) -> f64 {
        na::distance(&self.pos(), p)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Rejects non-finite coordinates and folds confidence into [0, 1].
    /// A NaN confidence is treated as zero.
    pub fn sanitized(&self, frame: usize) -> Result<Self, Error> {
        if !self.is_finite() {
            return Err(Error::InvalidDetection { frame });
        }

        let confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };

        Ok(Self::new(self.x, self.y, confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_confidence() {
        let det = BallDetection::new(1.0, 2.0, 1.7).sanitized(0).unwrap();
        assert_eq!(det.confidence, 1.0);

        let det = BallDetection::new(1.0, 2.0, f64::NAN).sanitized(0).unwrap();
        assert_eq!(det.confidence, 0.0);
    }

    #[test]
    fn sanitize_rejects_non_finite() {
        let err = BallDetection::new(f64::INFINITY, 2.0, 0.5)
            .sanitized(7)
            .unwrap_err();
        assert_eq!(err, Error::InvalidDetection { frame: 7 });
        assert_eq!(err.code(), "invalid_detection");
    }

    #[test]
    fn confidence_accepts_short_alias() {
        let det: BallDetection = serde_json::from_str(r#"{"x": 1, "y": 2, "p": 0.5}"#).unwrap();
        assert_eq!(det.confidence, 0.5);
    }
}
