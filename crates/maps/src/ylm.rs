//! Real orthonormal spherical harmonics.
//!
//! Harmonics are indexed `l² + l + m` for `m` in `-l..=l`, so coefficient
//! vectors for different `l_max` share a prefix. The real harmonics are
//!
//! - `Y_l0 = P̄_l0(cos θ)`
//! - `Y_lm = √2 P̄_lm(cos θ) cos(mφ)` for `m > 0`
//! - `Y_l,-m = √2 P̄_lm(cos θ) sin(mφ)` for `m > 0`
//!
//! where `P̄_lm` are the associated Legendre functions normalized over the unit
//! sphere, without the Condon-Shortley phase.

use std::{
    f64::consts::{PI, SQRT_2},
    sync::LazyLock,
};

use chronomap_core::{CacheRange, StaticCache};

use crate::MapError;

/// Largest `l_max` whose quadrature is memoized.
const MAX_CACHED_L: usize = 32;

type QuadratureCache = StaticCache<Quadrature, CacheRange, fn(usize) -> Quadrature>;

static QUADRATURES: LazyLock<QuadratureCache> = LazyLock::new(|| {
    StaticCache::new(
        CacheRange::new(0, MAX_CACHED_L + 1),
        Quadrature::new as fn(usize) -> Quadrature,
    )
});

/// The harmonics up to `l_max` and their angular derivatives at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct YlmValues {
    pub values: Vec<f64>,
    /// `∂Y/∂θ`.
    pub d_theta: Vec<f64>,
    /// `(1 / sin θ) ∂Y/∂φ`, which stays finite at the poles.
    pub d_phi_over_sin_theta: Vec<f64>,
}

/// Real spherical harmonics up to degree `l_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ylm {
    l_max: usize,
}

impl Ylm {
    pub fn new(l_max: usize) -> Self {
        Self { l_max }
    }

    pub fn l_max(&self) -> usize {
        self.l_max
    }

    /// Number of coefficients, `(l_max + 1)²`.
    pub fn spectral_size(&self) -> usize {
        (self.l_max + 1) * (self.l_max + 1)
    }

    /// Position of `(l, m)` in a coefficient vector.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn index(l: usize, m: i64) -> usize {
        ((l * l + l) as i64 + m) as usize
    }

    /// Evaluates every harmonic at `(theta, phi)`.
    pub fn values(&self, theta: f64, phi: f64) -> Vec<f64> {
        self.values_and_derivs(theta, phi).values
    }

    /// Evaluates every harmonic and its angular derivatives at `(theta, phi)`.
    #[allow(clippy::cast_precision_loss)]
    pub fn values_and_derivs(&self, theta: f64, phi: f64) -> YlmValues {
        let (sin_theta, cos_theta) = theta.sin_cos();
        let legendre = Legendre::new(self.l_max, cos_theta, sin_theta);

        let size = self.spectral_size();
        let mut values = Vec::with_capacity(size);
        let mut d_theta = Vec::with_capacity(size);
        let mut d_phi_over_sin_theta = Vec::with_capacity(size);

        for l in 0..=self.l_max {
            let lf = l as f64;
            for m in (1..=l).rev() {
                let (sin_m_phi, cos_m_phi) = (m as f64 * phi).sin_cos();
                let (p, q) = (legendre.p(l, m), legendre.q(l, m));
                let dp = legendre.d_theta(l, m, cos_theta);
                values.push(SQRT_2 * p * sin_m_phi);
                d_theta.push(SQRT_2 * dp * sin_m_phi);
                d_phi_over_sin_theta.push(SQRT_2 * m as f64 * q * cos_m_phi);
            }

            values.push(legendre.p(l, 0));
            d_theta.push(if l == 0 {
                0.0
            } else {
                -(lf * (lf + 1.0)).sqrt() * legendre.p(l, 1)
            });
            d_phi_over_sin_theta.push(0.0);

            for m in 1..=l {
                let (sin_m_phi, cos_m_phi) = (m as f64 * phi).sin_cos();
                let (p, q) = (legendre.p(l, m), legendre.q(l, m));
                let dp = legendre.d_theta(l, m, cos_theta);
                values.push(SQRT_2 * p * cos_m_phi);
                d_theta.push(SQRT_2 * dp * cos_m_phi);
                d_phi_over_sin_theta.push(-SQRT_2 * m as f64 * q * sin_m_phi);
            }
        }

        YlmValues {
            values,
            d_theta,
            d_phi_over_sin_theta,
        }
    }

    /// Sums `coefs` against the harmonics at `(theta, phi)`.
    pub fn evaluate(&self, coefs: &[f64], theta: f64, phi: f64) -> f64 {
        self.values(theta, phi)
            .iter()
            .zip(coefs)
            .map(|(y, c)| y * c)
            .sum()
    }

    /// The `(θ, φ)` collocation points used by [`Ylm::phys_to_spec`].
    ///
    /// Points are ordered with `φ` varying fastest.
    pub fn collocation_points(&self) -> Vec<(f64, f64)> {
        self.with_quadrature(|quadrature| {
            quadrature
                .thetas
                .iter()
                .flat_map(|&theta| quadrature.phis().map(move |phi| (theta, phi)))
                .collect()
        })
    }

    /// Projects values sampled at the collocation points onto the harmonics.
    ///
    /// The projection is exact for functions bandlimited to `l_max`.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of samples does not match the number of
    /// collocation points.
    #[allow(clippy::cast_precision_loss)]
    pub fn phys_to_spec(&self, samples: &[f64]) -> Result<Vec<f64>, MapError> {
        self.with_quadrature(|quadrature| {
            let n_phi = quadrature.n_phi;
            if samples.len() != quadrature.thetas.len() * n_phi {
                return Err(MapError::InvalidParameters {
                    reason: format!(
                        "expected {} samples for l_max {}, got {}",
                        quadrature.thetas.len() * n_phi,
                        self.l_max,
                        samples.len()
                    ),
                });
            }

            let phi_weight = 2.0 * PI / n_phi as f64;
            let mut coefs = vec![0.0; self.spectral_size()];
            let points = quadrature
                .thetas
                .iter()
                .zip(&quadrature.weights)
                .flat_map(|(&theta, &weight)| {
                    quadrature.phis().map(move |phi| (theta, phi, weight))
                });
            for ((theta, phi, weight), sample) in points.zip(samples) {
                for (coef, y) in coefs.iter_mut().zip(self.values(theta, phi)) {
                    *coef += weight * phi_weight * sample * y;
                }
            }
            Ok(coefs)
        })
    }

    /// Copies `coefs` into the layout of `target`, truncating or zero-padding.
    pub fn prolong_or_restrict(&self, coefs: &[f64], target: &Ylm) -> Vec<f64> {
        let mut result = vec![0.0; target.spectral_size()];
        let shared = result.len().min(coefs.len()).min(self.spectral_size());
        result[..shared].copy_from_slice(&coefs[..shared]);
        result
    }

    fn with_quadrature<R>(&self, f: impl FnOnce(&Quadrature) -> R) -> R {
        match QUADRATURES.get(self.l_max) {
            Ok(quadrature) => f(quadrature),
            Err(_) => f(&Quadrature::new(self.l_max)),
        }
    }
}

/// Normalized associated Legendre functions `P̄_lm` and `P̄_lm / sin θ`.
struct Legendre {
    p: Vec<f64>,
    q: Vec<f64>,
}

impl Legendre {
    #[allow(clippy::cast_precision_loss)]
    fn new(l_max: usize, x: f64, sin_theta: f64) -> Self {
        let size = tri(l_max, l_max) + 1;
        let mut p = vec![0.0; size];
        let mut q = vec![0.0; size];

        let mut diag = 1.0 / (4.0 * PI).sqrt();
        for m in 0..=l_max {
            let mf = m as f64;
            let diag_q = if m == 0 {
                0.0
            } else {
                diag * ((2.0 * mf + 1.0) / (2.0 * mf)).sqrt()
            };
            if m > 0 {
                diag = diag_q * sin_theta;
            }
            p[tri(m, m)] = diag;
            q[tri(m, m)] = diag_q;

            if m < l_max {
                let factor = (2.0 * mf + 3.0).sqrt();
                p[tri(m + 1, m)] = factor * x * diag;
                q[tri(m + 1, m)] = factor * x * diag_q;
            }
            for l in m + 2..=l_max {
                let lf = l as f64;
                let a = ((4.0 * lf * lf - 1.0) / (lf * lf - mf * mf)).sqrt();
                let b = (((lf - 1.0).powi(2) - mf * mf) / (4.0 * (lf - 1.0).powi(2) - 1.0)).sqrt();
                p[tri(l, m)] = a * (x * p[tri(l - 1, m)] - b * p[tri(l - 2, m)]);
                q[tri(l, m)] = a * (x * q[tri(l - 1, m)] - b * q[tri(l - 2, m)]);
            }
        }

        Self { p, q }
    }

    fn p(&self, l: usize, m: usize) -> f64 {
        if m > l { 0.0 } else { self.p[tri(l, m)] }
    }

    fn q(&self, l: usize, m: usize) -> f64 {
        if m > l { 0.0 } else { self.q[tri(l, m)] }
    }

    /// `∂P̄_lm/∂θ` for `m ≥ 1`, written in terms of `P̄/sin θ` to stay finite
    /// at the poles.
    #[allow(clippy::cast_precision_loss)]
    fn d_theta(&self, l: usize, m: usize, x: f64) -> f64 {
        let (lf, mf) = (l as f64, m as f64);
        let lower = if l > m {
            ((2.0 * lf + 1.0) / (2.0 * lf - 1.0) * (lf * lf - mf * mf)).sqrt() * self.q(l - 1, m)
        } else {
            0.0
        };
        lf * x * self.q(l, m) - lower
    }
}

fn tri(l: usize, m: usize) -> usize {
    l * (l + 1) / 2 + m
}

/// Gauss-Legendre nodes in `cos θ` and a uniform grid in `φ`.
#[derive(Debug, Clone, PartialEq)]
struct Quadrature {
    thetas: Vec<f64>,
    weights: Vec<f64>,
    n_phi: usize,
}

impl Quadrature {
    fn new(l_max: usize) -> Self {
        let (nodes, weights) = gauss_legendre(l_max + 1);
        Self {
            thetas: nodes.into_iter().map(f64::acos).collect(),
            weights,
            n_phi: 2 * l_max + 1,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn phis(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.n_phi).map(|k| 2.0 * PI * k as f64 / self.n_phi as f64)
    }
}

/// Nodes and weights of the `n`-point Gauss-Legendre rule on `[-1, 1]`.
#[allow(clippy::cast_precision_loss)]
fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for i in 0..n {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (value, derivative) = legendre_polynomial(n, x);
            let dx = value / derivative;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (_, slope) = legendre_polynomial(n, x);
        nodes.push(x);
        weights.push(2.0 / ((1.0 - x * x) * slope * slope));
    }
    (nodes, weights)
}

/// `P_n(x)` and `P_n'(x)`.
#[allow(clippy::cast_precision_loss)]
fn legendre_polynomial(n: usize, x: f64) -> (f64, f64) {
    let (mut prev, mut value) = (1.0, x);
    for k in 1..n {
        let kf = k as f64;
        let next = ((2.0 * kf + 1.0) * x * value - kf * prev) / (kf + 1.0);
        prev = value;
        value = next;
    }
    let derivative = n as f64 * (x * value - prev) / (x * x - 1.0);
    (value, derivative)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn low_order_harmonics_match_closed_forms() {
        let ylm = Ylm::new(2);
        let (theta, phi) = (0.7, 1.9);
        let values = ylm.values(theta, phi);

        let c = (3.0 / (4.0 * PI)).sqrt();
        assert_relative_eq!(values[Ylm::index(0, 0)], 0.5 / PI.sqrt(), epsilon = 1e-15);
        assert_relative_eq!(values[Ylm::index(1, 0)], c * theta.cos(), epsilon = 1e-15);
        assert_relative_eq!(
            values[Ylm::index(1, 1)],
            c * theta.sin() * phi.cos(),
            epsilon = 1e-15
        );
        assert_relative_eq!(
            values[Ylm::index(1, -1)],
            c * theta.sin() * phi.sin(),
            epsilon = 1e-15
        );
        assert_relative_eq!(
            values[Ylm::index(2, 0)],
            (5.0 / (16.0 * PI)).sqrt() * (3.0 * theta.cos().powi(2) - 1.0),
            epsilon = 1e-14
        );
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let ylm = Ylm::new(4);
        let (theta, phi) = (1.1, -0.4);
        let h = 1e-6;

        let derivs = ylm.values_and_derivs(theta, phi);
        let theta_plus = ylm.values(theta + h, phi);
        let theta_minus = ylm.values(theta - h, phi);
        let phi_plus = ylm.values(theta, phi + h);
        let phi_minus = ylm.values(theta, phi - h);

        for i in 0..ylm.spectral_size() {
            let d_theta = (theta_plus[i] - theta_minus[i]) / (2.0 * h);
            let d_phi = (phi_plus[i] - phi_minus[i]) / (2.0 * h);
            assert_relative_eq!(derivs.d_theta[i], d_theta, epsilon = 1e-8);
            assert_relative_eq!(
                derivs.d_phi_over_sin_theta[i],
                d_phi / theta.sin(),
                epsilon = 1e-8
            );
        }
    }

    #[test]
    fn phi_derivative_is_finite_at_the_pole() {
        let derivs = Ylm::new(3).values_and_derivs(0.0, 0.0);

        assert!(derivs.d_phi_over_sin_theta.iter().all(|d| d.is_finite()));
        let c = (3.0 / (4.0 * PI)).sqrt();
        assert_relative_eq!(derivs.d_theta[Ylm::index(1, 1)], c, epsilon = 1e-15);
        assert_relative_eq!(derivs.d_phi_over_sin_theta[Ylm::index(1, -1)], c, epsilon = 1e-15);
    }

    #[test]
    fn projection_recovers_coefficients() {
        let ylm = Ylm::new(4);
        let mut coefs = vec![0.0; ylm.spectral_size()];
        coefs[Ylm::index(0, 0)] = 1.5;
        coefs[Ylm::index(2, -1)] = -0.3;
        coefs[Ylm::index(3, 2)] = 0.7;
        coefs[Ylm::index(4, -4)] = 0.05;

        let samples: Vec<f64> = ylm
            .collocation_points()
            .into_iter()
            .map(|(theta, phi)| ylm.evaluate(&coefs, theta, phi))
            .collect();
        let projected = ylm.phys_to_spec(&samples).expect("sample count matches");

        for (actual, expected) in projected.iter().zip(&coefs) {
            assert_relative_eq!(actual, expected, epsilon = 1e-12);
        }
        assert!(ylm.phys_to_spec(&samples[1..]).is_err());
    }

    #[test]
    fn resizing_keeps_shared_coefficients() {
        let small = Ylm::new(1);
        let large = Ylm::new(2);
        let coefs = [1.0, 2.0, 3.0, 4.0];

        let prolonged = small.prolong_or_restrict(&coefs, &large);
        assert_eq!(prolonged.len(), 9);
        assert_eq!(&prolonged[..4], &coefs);
        assert!(prolonged[4..].iter().all(|&c| c == 0.0));

        let restricted = large.prolong_or_restrict(&prolonged, &Ylm::new(0));
        assert_eq!(restricted, vec![1.0]);
    }

    #[test]
    fn gauss_legendre_integrates_polynomials() {
        let (nodes, weights) = gauss_legendre(4);
        let integral: f64 = nodes
            .iter()
            .zip(&weights)
            .map(|(x, w)| w * x.powi(6))
            .sum();
        assert_relative_eq!(integral, 2.0 / 7.0, epsilon = 1e-14);
    }
}
