use serde_derive::{Deserialize, Serialize};

use super::config::CalibrationConfig;
use crate::math::{self, is_positive};
use crate::track::TrackPoint;
use nalgebra as na;

const EPS: f64 = 1e-6;

/// Goodness-of-fit measure driving the fit penalty.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FitMetric {
    R2,
    Rmse,
}

/// Launch kinematics from a constant-gravity projectile fit.
///
/// The fit origin is the first window point, so the vertical intercept `c` is
/// close to zero and flight time is the largest positive root of the vertical
/// parabola. Carry is only meaningful when the ball lands at launch height.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct TrajectoryFit {
    pub calibrated: bool,
    pub vx_mps: Option<f64>,
    pub vy_mps: Option<f64>,
    #[serde(rename = "ball_speed_mps")]
    pub speed_mps: Option<f64>,
    pub launch_angle_deg: Option<f64>,
    pub azimuth_deg: Option<f64>,
    #[serde(rename = "carry_m_est")]
    pub carry_m: Option<f64>,
    #[serde(rename = "apex_m_est")]
    pub apex_m: Option<f64>,
    pub fit_r2: Option<f64>,
    #[serde(rename = "fit_rmse")]
    pub fit_rmse_m: Option<f64>,
    pub fit_metric: Option<FitMetric>,
    /// `fit_r2` or `fit_rmse` depending on `fit_metric`
    pub r2_or_residual: Option<f64>,
    pub n_fit_points: usize,
    pub speed_px_per_s: Option<f64>,
    #[serde(skip)]
    pub reasons: Vec<&'static str>,
}

/// Coefficients of `x(t) = vx * t + x0` and `y(t) = a * t^2 + b * t + c` plus residual stats of the y fit.
#[derive(Debug, Clone, Copy)]
struct Ballistic {
    vx: f64,
    a: f64,
    b: f64,
    c: f64,
    r2: Option<f64>,
    rmse: f64,
}

impl Ballistic {
    fn fit(t: &na::DVector<f64>, x: &na::DVector<f64>, y: &na::DVector<f64>) -> Option<Self> {
        let lin = math::linear_ls(t, x)?;
        let quad = math::quadratic_ls(t, y)?;
        let (a, b, c) = (quad[0], quad[1], quad[2]);

        let n = y.len() as f64;
        let y_mean = y.mean();
        let ss_res: f64 = t
            .iter()
            .zip(y.iter())
            .map(|(&ti, &yi)| {
                let r = yi - (a * ti * ti + b * ti + c);
                r * r
            })
            .sum();
        let ss_tot: f64 = y.iter().map(|&yi| (yi - y_mean) * (yi - y_mean)).sum();

        let r2 = if ss_tot > 1e-12 {
            Some((1.0 - ss_res / ss_tot).clamp(0.0, 1.0))
        } else {
            None
        };

        Some(Self {
            vx: lin[0],
            a,
            b,
            c,
            r2,
            rmse: (ss_res / n).sqrt(),
        })
    }

    #[inline]
    fn speed(&self) -> f64 {
        self.vx.hypot(self.b)
    }

    fn launch_angle_deg(&self) -> Option<f64> {
        if self.speed() > EPS {
            Some(self.b.atan2(self.vx).to_degrees())
        } else {
            None
        }
    }

    /// Time at which the vertical parabola comes back to launch height.
    fn flight_time(&self) -> Option<f64> {
        math::quadratic_roots(self.a, self.b, self.c, EPS)
            .into_iter()
            .filter(|&r| r > 0.0)
            .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |m| m.max(r))))
    }

    fn apex(&self) -> Option<f64> {
        if self.a >= 0.0 {
            return None;
        }

        let t_peak = -self.b / (2.0 * self.a);
        if t_peak <= 0.0 {
            return None;
        }

        let value = self.a * t_peak * t_peak + self.b * t_peak + self.c;
        if value >= 0.0 {
            Some(value)
        } else {
            None
        }
    }
}

/// Time and up-positive displacement series relative to the first point, scaled by `scale`.
fn series(
    points: &[TrackPoint],
    fps: f64,
    scale: f64,
) -> (na::DVector<f64>, na::DVector<f64>, na::DVector<f64>) {
    let origin = &points[0];
    let n = points.len();

    let t = na::DVector::from_iterator(
        n,
        points
            .iter()
            .map(|p| p.frame_idx.saturating_sub(origin.frame_idx) as f64 / fps),
    );
    let x = na::DVector::from_iterator(n, points.iter().map(|p| (p.x_px - origin.x_px) * scale));
    let y = na::DVector::from_iterator(n, points.iter().map(|p| -(p.y_px - origin.y_px) * scale));

    (t, x, y)
}

impl TrajectoryFit {
    fn uncalibrated(n_fit_points: usize, reasons: Vec<&'static str>) -> Self {
        Self {
            n_fit_points,
            reasons,
            ..Default::default()
        }
    }

    /// Pixel-space speed and angle, reported when the metric fit is not possible.
    fn with_pixel_kinematics(mut self, points: &[TrackPoint], fps: f64) -> Self {
        if points.len() < 3 || !is_positive(fps) {
            return self;
        }

        let (t, x, y) = series(points, fps, 1.0);
        if let Some(fit) = Ballistic::fit(&t, &x, &y) {
            self.speed_px_per_s = Some(fit.speed());
            self.launch_angle_deg = fit.launch_angle_deg();
        }

        self
    }
}

/// Fits the launch window in metric space.
///
/// `points` must be ordered by frame. Falls back to an uncalibrated result with
/// pixel-space speed and angle when there are too few points, the window is
/// too short in time, or no scale is available.
pub fn fit_trajectory(
    points: &[TrackPoint],
    fps: f64,
    meters_per_pixel: Option<f64>,
    cfg: &CalibrationConfig,
) -> TrajectoryFit {
    let n = points.len();

    if !is_positive(fps) {
        return TrajectoryFit::uncalibrated(n, vec!["invalid_fps"]);
    }

    if n < cfg.min_points.max(3) {
        return TrajectoryFit::uncalibrated(n, vec!["insufficient_points"])
            .with_pixel_kinematics(points, fps);
    }

    let span_s = points[n - 1].frame_idx.saturating_sub(points[0].frame_idx) as f64 / fps;
    if span_s < cfg.min_time_span_s {
        return TrajectoryFit::uncalibrated(n, vec!["time_span_too_short"])
            .with_pixel_kinematics(points, fps);
    }

    let mpp = match meters_per_pixel.filter(|&m| is_positive(m)) {
        Some(mpp) => mpp,
        None => {
            return TrajectoryFit::uncalibrated(n, vec!["missing_scale"])
                .with_pixel_kinematics(points, fps)
        }
    };

    let (t, x, y) = series(points, fps, mpp);
    let fit = match Ballistic::fit(&t, &x, &y) {
        Some(fit) => fit,
        None => {
            return TrajectoryFit::uncalibrated(n, vec!["fit_failed"])
                .with_pixel_kinematics(points, fps)
        }
    };

    let metric = cfg.fit_metric_override.unwrap_or(if fit.r2.is_some() {
        FitMetric::R2
    } else {
        FitMetric::Rmse
    });

    let carry = fit
        .flight_time()
        .map(|t_f| (fit.vx * t_f).max(0.0).min(cfg.max_carry_m));

    TrajectoryFit {
        calibrated: true,
        vx_mps: Some(fit.vx),
        vy_mps: Some(fit.b),
        speed_mps: Some(fit.speed()),
        launch_angle_deg: fit.launch_angle_deg(),
        azimuth_deg: Some(if fit.vx >= 0.0 { 0.0 } else { 180.0 }),
        carry_m: carry,
        apex_m: fit.apex(),
        fit_r2: fit.r2,
        fit_rmse_m: Some(fit.rmse),
        fit_metric: Some(metric),
        r2_or_residual: match metric {
            FitMetric::R2 => fit.r2,
            FitMetric::Rmse => Some(fit.rmse),
        },
        n_fit_points: n,
        speed_px_per_s: Some(fit.speed() / mpp),
        reasons: Vec::new(),
    }
}
