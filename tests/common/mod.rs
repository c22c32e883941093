#![allow(dead_code)]

use ballmeter::{BallDetection, Frame, TrackPoint};
use nalgebra as na;
use ndarray::Array3;

pub const GRAVITY: f64 = 9.81;

/// Ballistic samples in image pixels (y down) starting at frame `first`.
pub fn ballistic_track(n: usize, fps: f64, mpp: f64, vx: f64, vy: f64, first: usize) -> Vec<TrackPoint> {
    (0..n)
        .map(|i| {
            let t = i as f64 / fps;
            let x = vx * t;
            let y = vy * t - 0.5 * GRAVITY * t * t;
            TrackPoint::observed(first + i, na::Point2::new(200.0 + x / mpp, 900.0 - y / mpp), 0.9)
        })
        .collect()
}

/// Same samples as per-frame detections, one candidate per frame.
pub fn ballistic_frames(n: usize, fps: f64, mpp: f64, vx: f64, vy: f64) -> Vec<Frame> {
    Frame::sequence(
        ballistic_track(n, fps, mpp, vx, vy, 0)
            .into_iter()
            .map(|p| vec![BallDetection::new(p.x_px, p.y_px, 0.9)]),
    )
}

/// A slow straight line with the listed frames left empty.
pub fn line_frames(n: usize, skip: &[usize]) -> Vec<Frame> {
    Frame::sequence((0..n).map(|i| {
        if skip.contains(&i) {
            Vec::new()
        } else {
            vec![BallDetection::new(100.0 + 2.0 * i as f64, 400.0 - i as f64, 0.9)]
        }
    }))
}

pub fn black_frames(n: usize, height: usize, width: usize) -> Vec<Array3<u8>> {
    vec![Array3::zeros((height, width, 3)); n]
}
