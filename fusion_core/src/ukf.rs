//! Unscented transform.
//!
//! Uses sigma points to propagate mean and covariance through non-linear functions.
//! More accurate than EKF for highly non-linear systems and doesn't require Jacobians.
//!
//! # Scaled sigma points (dimension n)
//! λ = α²(n + κ) − n
//! χ₀ = μ,  χᵢ = μ ± [√((n + λ) P)]ᵢ   (Cholesky column i)
//! W₀ᵐ = λ/(n + λ),  W₀ᶜ = W₀ᵐ + (1 − α² + β),  Wᵢ = 1/(2(n + λ))
//!
//! Components listed as angles are averaged on the circle and their
//! residuals are wrapped to (−π, π].

use crate::{
    error::{Result, TrackingError},
    types::{DMat, DVec},
    units::wrap_angle,
};
use serde::{Deserialize, Serialize};

/// Sigma-point spread parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UkfParams {
    /// Spread of the points around the mean
    pub alpha: f64,
    /// Prior knowledge of the distribution (2 is optimal for Gaussians)
    pub beta: f64,
    /// Secondary scaling
    pub kappa: f64,
}

impl Default for UkfParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 2.0,
            kappa: 0.0,
        }
    }
}

impl UkfParams {
    pub fn lambda(&self, n: usize) -> f64 {
        let n = n as f64;
        self.alpha * self.alpha * (n + self.kappa) - n
    }
}

/// 2n + 1 points with their mean and covariance weights.
#[derive(Clone, Debug)]
pub struct SigmaPoints {
    pub points: Vec<DVec>,
    pub weights_mean: Vec<f64>,
    pub weights_cov: Vec<f64>,
}

impl SigmaPoints {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Generate the scaled sigma-point set of (`mean`, `cov`).
pub fn generate_sigma_points(mean: &DVec, cov: &DMat, params: &UkfParams) -> Result<SigmaPoints> {
    let n = mean.len();
    let lambda = params.lambda(n);
    let scale = n as f64 + lambda;
    if n == 0 || scale <= 0.0 {
        return Err(TrackingError::NotPositiveDefinite("sigma-point scaling"));
    }

    let spread = (cov * scale)
        .cholesky()
        .ok_or(TrackingError::NotPositiveDefinite("sigma-point covariance"))?
        .l();

    let mut points = Vec::with_capacity(2 * n + 1);
    points.push(mean.clone());
    for i in 0..n {
        let col = spread.column(i);
        points.push(mean + col);
        points.push(mean - col);
    }

    let w_m0 = lambda / scale;
    let w_c0 = w_m0 + (1.0 - params.alpha * params.alpha + params.beta);
    let w_i = 1.0 / (2.0 * scale);

    let mut weights_mean = vec![w_i; 2 * n + 1];
    let mut weights_cov = vec![w_i; 2 * n + 1];
    weights_mean[0] = w_m0;
    weights_cov[0] = w_c0;

    Ok(SigmaPoints {
        points,
        weights_mean,
        weights_cov,
    })
}

/// Weighted mean; `angles` are averaged through their sine and cosine.
pub fn weighted_mean(points: &[DVec], weights: &[f64], angles: &[usize]) -> DVec {
    let dim = points.first().map_or(0, |p| p.len());
    let mut mean = DVec::zeros(dim);
    for (p, w) in points.iter().zip(weights) {
        mean += p * *w;
    }
    for &k in angles {
        let (s, c) = points
            .iter()
            .zip(weights)
            .fold((0.0, 0.0), |(s, c), (p, w)| (s + w * p[k].sin(), c + w * p[k].cos()));
        mean[k] = s.atan2(c);
    }
    mean
}

/// `a − b` with the `angles` components wrapped.
pub fn residual(a: &DVec, b: &DVec, angles: &[usize]) -> DVec {
    let mut d = a - b;
    for &k in angles {
        d[k] = wrap_angle(d[k]);
    }
    d
}

/// Σ Wᵢ (χᵢ − μ)(χᵢ − μ)ᵀ
pub fn weighted_covariance(points: &[DVec], mean: &DVec, weights: &[f64], angles: &[usize]) -> DMat {
    let dim = mean.len();
    let mut cov = DMat::zeros(dim, dim);
    for (p, w) in points.iter().zip(weights) {
        let d = residual(p, mean, angles);
        cov += &d * d.transpose() * *w;
    }
    cov
}

/// Σ Wᵢ (χᵢ − μₓ)(ζᵢ − μ_z)ᵀ
pub fn cross_covariance(
    x_points: &[DVec],
    x_mean: &DVec,
    z_points: &[DVec],
    z_mean: &DVec,
    weights: &[f64],
    angles: &[usize],
) -> DMat {
    let mut cross = DMat::zeros(x_mean.len(), z_mean.len());
    for ((x, z), w) in x_points.iter().zip(z_points).zip(weights) {
        let dx = residual(x, x_mean, angles);
        let dz = residual(z, z_mean, angles);
        cross += &dx * dz.transpose() * *w;
    }
    cross
}

/// (P + Pᵀ) / 2
pub fn symmetrize(p: &DMat) -> DMat {
    (p + p.transpose()) * 0.5
}
