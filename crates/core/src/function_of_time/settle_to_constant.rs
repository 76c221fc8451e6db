use std::any::Any;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{FunctionOfTime, check_derivs, check_requested, check_timescale, dyn_eq_as};
use crate::Error;

/// Relaxes exponentially toward a constant.
///
/// With `u = t - t0` the function is `A + (B + C u) exp(-u / τ)`, where the
/// coefficients reproduce the given value and first two derivatives at `t0`.
/// It is valid on `[t0, ∞)` and never needs updating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleToConstant {
    coef_a: DVector<f64>,
    coef_b: DVector<f64>,
    coef_c: DVector<f64>,
    match_time: f64,
    decay_timescale: f64,
}

impl SettleToConstant {
    /// Creates a settling function matching `[f, f', f'']` at `match_time`.
    ///
    /// # Errors
    ///
    /// Returns an error if three equally sized vectors are not supplied or
    /// the timescale is not positive.
    pub fn new(
        initial_func_and_derivs: impl Into<Vec<DVector<f64>>>,
        match_time: f64,
        decay_timescale: f64,
    ) -> Result<Self, Error> {
        let derivs = initial_func_and_derivs.into();
        check_derivs(&derivs, 3)?;
        check_timescale(decay_timescale)?;
        let tau = decay_timescale;
        let (f, df, d2f) = (&derivs[0], &derivs[1], &derivs[2]);
        let coef_b = -(d2f * (tau * tau) + df * (2.0 * tau));
        let coef_c = -(df + d2f * tau);
        let coef_a = f - &coef_b;
        Ok(Self {
            coef_a,
            coef_b,
            coef_c,
            match_time,
            decay_timescale,
        })
    }

    /// The constant the function settles to.
    pub fn asymptotic_value(&self) -> &DVector<f64> {
        &self.coef_a
    }

    pub fn decay_timescale(&self) -> f64 {
        self.decay_timescale
    }

    pub fn match_time(&self) -> f64 {
        self.match_time
    }

    pub(crate) fn dimension(&self) -> usize {
        self.coef_a.len()
    }

    /// Checks a decoded function against the invariants `new` enforces.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        let dimension = self.dimension();
        if self.coef_b.len() != dimension || self.coef_c.len() != dimension {
            return Err(Error::Malformed {
                kind: "SettleToConstant",
                reason: "coefficients have different component counts".to_string(),
            });
        }
        check_timescale(self.decay_timescale)
    }
}

impl FunctionOfTime for SettleToConstant {
    fn time_bounds(&self) -> [f64; 2] {
        [self.match_time, f64::INFINITY]
    }

    fn expiration_after(&self, _time: f64) -> f64 {
        f64::INFINITY
    }

    fn max_deriv(&self) -> usize {
        2
    }

    fn func_and_n_derivs(&self, time: f64, n: usize) -> Result<Vec<DVector<f64>>, Error> {
        check_requested(n, 2)?;
        if time < self.match_time {
            return Err(Error::BeforeStart {
                time,
                start: self.match_time,
            });
        }
        let tau = self.decay_timescale;
        let u = time - self.match_time;
        let decay = (-u / tau).exp();
        let b_plus_cu = &self.coef_b + &self.coef_c * u;

        let mut result = vec![&self.coef_a + &b_plus_cu * decay];
        if n >= 1 {
            result.push((&self.coef_c - &b_plus_cu / tau) * decay);
        }
        if n >= 2 {
            result.push((&b_plus_cu / (tau * tau) - &self.coef_c * (2.0 / tau)) * decay);
        }
        Ok(result)
    }

    fn update(
        &mut self,
        _time: f64,
        _updated_max_deriv: DVector<f64>,
        _next_expiration: f64,
    ) -> Result<(), Error> {
        Err(Error::NotUpdatable {
            kind: "SettleToConstant",
        })
    }

    fn truncate_at_time(&mut self, _time: f64) {}

    fn get_clone(&self) -> Box<dyn FunctionOfTime> {
        Box::new(self.clone())
    }

    /// A settling function never expires, so the snapshot is a plain copy.
    fn create_at_time(
        &self,
        _time: f64,
        _expiration: f64,
    ) -> Result<Box<dyn FunctionOfTime>, Error> {
        Ok(self.get_clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn FunctionOfTime) -> bool {
        dyn_eq_as(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn settle() -> SettleToConstant {
        SettleToConstant::new(
            [
                DVector::from_row_slice(&[1.0, -2.0]),
                DVector::from_row_slice(&[0.5, 0.1]),
                DVector::from_row_slice(&[-0.2, 0.3]),
            ],
            1.5,
            2.0,
        )
        .expect("valid settle function")
    }

    #[test]
    fn matches_initial_derivatives() {
        let [f, df, d2f] = settle().func_and_2_derivs(1.5).expect("in bounds");
        assert_relative_eq!(f[0], 1.0, epsilon = 1e-14);
        assert_relative_eq!(f[1], -2.0, epsilon = 1e-14);
        assert_relative_eq!(df[0], 0.5, epsilon = 1e-14);
        assert_relative_eq!(df[1], 0.1, epsilon = 1e-14);
        assert_relative_eq!(d2f[0], -0.2, epsilon = 1e-14);
        assert_relative_eq!(d2f[1], 0.3, epsilon = 1e-14);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let f = settle();
        let (t, h) = (3.2, 1e-5);
        let [_, df, d2f] = f.func_and_2_derivs(t).expect("in bounds");
        let [plus, dplus] = f.func_and_deriv(t + h).expect("in bounds");
        let [minus, dminus] = f.func_and_deriv(t - h).expect("in bounds");
        for i in 0..2 {
            assert_relative_eq!(df[i], (plus[i] - minus[i]) / (2.0 * h), epsilon = 1e-8);
            assert_relative_eq!(d2f[i], (dplus[i] - dminus[i]) / (2.0 * h), epsilon = 1e-8);
        }
    }

    #[test]
    fn settles_to_the_asymptotic_value() {
        let f = settle();
        let [late] = f.func(1.5 + 200.0).expect("never expires");
        assert_relative_eq!(late, f.asymptotic_value().clone(), epsilon = 1e-12);
        assert_eq!(f.time_bounds(), [1.5, f64::INFINITY]);
    }

    #[test]
    fn cannot_be_updated() {
        let mut f = settle();
        assert!(matches!(
            f.update(2.0, DVector::zeros(2), 3.0),
            Err(Error::NotUpdatable { .. })
        ));
        assert!(matches!(
            SettleToConstant::new(
                [DVector::zeros(1), DVector::zeros(1), DVector::zeros(1)],
                0.0,
                0.0
            ),
            Err(Error::InvalidTimescale { .. })
        ));
    }
}
