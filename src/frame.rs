use crate::detection::BallDetection;

/// Ball candidates observed in one video frame.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub index: usize,
    pub detections: Vec<BallDetection>,
}

impl Frame {
    #[inline]
    pub fn new(index: usize, detections: Vec<BallDetection>) -> Self {
        Self { index, detections }
    }

    /// Numbers per-frame candidate lists by their position in the sequence.
    pub fn sequence<I>(detections_per_frame: I) -> Vec<Frame>
    where
        I: IntoIterator<Item = Vec<BallDetection>>,
    {
        detections_per_frame
            .into_iter()
            .enumerate()
            .map(|(index, detections)| Frame { index, detections })
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &BallDetection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
