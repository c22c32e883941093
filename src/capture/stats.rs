use ndarray::{s, Array2, ArrayView3, Axis, Zip};

use crate::error::Error;

/// Rec.709 luma weights for R, G, B.
pub const REC709: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Luma plane of an `height x width x channels` frame. One channel is taken
/// as grayscale, three or four as RGB(A).
pub fn luma(frame: ArrayView3<'_, u8>) -> Result<Array2<f32>, Error> {
    let (height, width, channels) = frame.dim();
    if height == 0 || width == 0 {
        return Err(Error::InvalidFrame {
            height,
            width,
            channels,
        });
    }

    match channels {
        1 => Ok(frame.index_axis(Axis(2), 0).mapv(f32::from)),
        3 | 4 => {
            let r = frame.index_axis(Axis(2), 0);
            let g = frame.index_axis(Axis(2), 1);
            let b = frame.index_axis(Axis(2), 2);

            Ok(Zip::from(&r).and(&g).and(&b).map_collect(|&r, &g, &b| {
                REC709[0] * f32::from(r) + REC709[1] * f32::from(g) + REC709[2] * f32::from(b)
            }))
        }
        _ => Err(Error::InvalidFrame {
            height,
            width,
            channels,
        }),
    }
}

fn variance<'a, I: IntoIterator<Item = &'a f32>>(values: I) -> f64 {
    let values: Vec<f64> = values.into_iter().map(|&v| f64::from(v)).collect();
    if values.is_empty() {
        return 0.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// Variance of the 4-neighbour Laplacian with edge-replicated borders. Low values mean blur.
pub fn laplacian_variance(gray: &Array2<f32>) -> f64 {
    let (h, w) = gray.dim();
    if h == 0 || w == 0 {
        return 0.0;
    }

    let mut padded = Array2::<f32>::zeros((h + 2, w + 2));
    padded.slice_mut(s![1..h + 1, 1..w + 1]).assign(gray);
    padded.slice_mut(s![0, 1..w + 1]).assign(&gray.row(0));
    padded.slice_mut(s![h + 1, 1..w + 1]).assign(&gray.row(h - 1));

    let left = padded.column(1).to_owned();
    padded.column_mut(0).assign(&left);
    let right = padded.column(w).to_owned();
    padded.column_mut(w + 1).assign(&right);

    let laplacian = &padded.slice(s![1..h + 1, 0..w])
        + &padded.slice(s![1..h + 1, 2..w + 2])
        + &padded.slice(s![0..h, 1..w + 1])
        + &padded.slice(s![2..h + 2, 1..w + 1])
        - &(gray * 4.0);

    variance(laplacian.iter())
}

/// Mean absolute luma change between two frames, `None` when their shapes differ.
pub fn frame_diff(prev: &Array2<f32>, curr: &Array2<f32>) -> Option<f64> {
    if prev.dim() != curr.dim() || prev.is_empty() {
        return None;
    }

    let total = Zip::from(prev)
        .and(curr)
        .fold(0.0f64, |acc, &a, &b| acc + f64::from((a - b).abs()));

    Some(total / prev.len() as f64)
}

/// Per-frame scalar statistics of a capture. Frames themselves are not kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureStats {
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub luma_means: Vec<f64>,
    pub blur_variances: Vec<f64>,
    /// one entry per consecutive pair of same-shaped frames
    pub frame_diffs: Vec<f64>,
    pub rejected: Vec<Error>,
}

impl CaptureStats {
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.luma_means.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.luma_means.is_empty()
    }

    /// `(width, height)` of the first accepted frame.
    #[inline]
    pub fn frame_size(&self) -> Option<(usize, usize)> {
        self.width.zip(self.height)
    }
}

/// Reduces frames to [`CaptureStats`] one at a time.
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: CaptureStats,
    prev_luma: Option<Array2<f32>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: ArrayView3<'_, u8>) {
        let gray = match luma(frame) {
            Ok(gray) => gray,
            Err(err) => {
                tracing::warn!(%err, "frame skipped");
                self.stats.rejected.push(err);
                return;
            }
        };

        if self.stats.width.is_none() {
            let (h, w) = gray.dim();
            self.stats.width = Some(w);
            self.stats.height = Some(h);
        }

        let n = gray.len() as f64;
        self.stats
            .luma_means
            .push(gray.iter().map(|&v| f64::from(v)).sum::<f64>() / n);
        self.stats.blur_variances.push(laplacian_variance(&gray));

        if let Some(diff) = self.prev_luma.as_ref().and_then(|prev| frame_diff(prev, &gray)) {
            self.stats.frame_diffs.push(diff);
        }

        self.prev_luma = Some(gray);
    }

    pub fn finish(self) -> CaptureStats {
        self.stats
    }
}

pub fn collect_stats<'a, I>(frames: I) -> CaptureStats
where
    I: IntoIterator<Item = ArrayView3<'a, u8>>,
{
    let mut collector = StatsCollector::new();
    for frame in frames {
        collector.push(frame);
    }

    collector.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    #[test]
    fn rgb_luma_uses_rec709() {
        let mut frame = Array3::<u8>::zeros((2, 2, 3));
        frame.slice_mut(s![.., .., 1]).fill(100);

        let gray = luma(frame.view()).unwrap();
        assert_relative_eq!(gray[[0, 0]], 71.52, epsilon = 1e-3);
    }

    #[test]
    fn gray_frames_pass_through() {
        let frame = Array3::<u8>::from_elem((3, 4, 1), 42);
        let gray = luma(frame.view()).unwrap();

        assert_eq!(gray.dim(), (3, 4));
        assert!(gray.iter().all(|&v| v == 42.0));
    }

    #[test]
    fn two_channel_frames_are_rejected() {
        let frame = Array3::<u8>::zeros((3, 4, 2));
        assert_eq!(
            luma(frame.view()),
            Err(Error::InvalidFrame {
                height: 3,
                width: 4,
                channels: 2
            })
        );
    }

    #[test]
    fn flat_frame_has_no_laplacian_energy() {
        let gray = Array2::<f32>::from_elem((8, 8), 128.0);
        assert_eq!(laplacian_variance(&gray), 0.0);
    }

    #[test]
    fn checkerboard_is_sharp() {
        let gray = Array2::from_shape_fn((16, 16), |(y, x)| if (x + y) % 2 == 0 { 0.0 } else { 255.0 });
        assert!(laplacian_variance(&gray) > 200.0);
    }

    #[test]
    fn diff_of_shifted_frames() {
        let a = Array2::<f32>::from_elem((4, 4), 10.0);
        let b = Array2::<f32>::from_elem((4, 4), 25.0);

        assert_eq!(frame_diff(&a, &b), Some(15.0));
        assert_eq!(frame_diff(&a, &Array2::zeros((2, 2))), None);
    }

    #[test]
    fn collector_keeps_scalars_only() {
        let frames: Vec<Array3<u8>> = (0..3)
            .map(|i| Array3::from_elem((4, 6, 3), 50 * i as u8))
            .collect();
        let stats = collect_stats(frames.iter().map(|f| f.view()));

        assert_eq!(stats.n_frames(), 3);
        assert_eq!(stats.frame_size(), Some((6, 4)));
        assert_eq!(stats.frame_diffs.len(), 2);
        assert_relative_eq!(stats.frame_diffs[0], 50.0, epsilon = 1e-3);
    }
}
