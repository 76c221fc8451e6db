use std::any::Any;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{FunctionOfTime, check_requested, check_timescale, dyn_eq_as};
use crate::Error;

/// A scalar that starts at rest and approaches a fixed speed.
///
/// With `u = t - t0` the function is `f0 + v u³ / (τ² + u²)`, so its velocity
/// grows from zero and tends to `v` once `u ≫ τ`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedSpeedCubic {
    initial_function_value: f64,
    initial_time: f64,
    velocity: f64,
    decay_timescale: f64,
}

impl FixedSpeedCubic {
    /// # Errors
    ///
    /// Returns an error if `decay_timescale` is not positive.
    pub fn new(
        initial_function_value: f64,
        initial_time: f64,
        velocity: f64,
        decay_timescale: f64,
    ) -> Result<Self, Error> {
        check_timescale(decay_timescale)?;
        Ok(Self {
            initial_function_value,
            initial_time,
            velocity,
            decay_timescale,
        })
    }

    pub fn initial_function_value(&self) -> f64 {
        self.initial_function_value
    }

    pub fn initial_time(&self) -> f64 {
        self.initial_time
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn decay_timescale(&self) -> f64 {
        self.decay_timescale
    }

    /// Checks a decoded function against the invariants `new` enforces.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        check_timescale(self.decay_timescale)
    }
}

impl FunctionOfTime for FixedSpeedCubic {
    fn time_bounds(&self) -> [f64; 2] {
        [self.initial_time, f64::INFINITY]
    }

    fn expiration_after(&self, _time: f64) -> f64 {
        f64::INFINITY
    }

    fn max_deriv(&self) -> usize {
        2
    }

    fn func_and_n_derivs(&self, time: f64, n: usize) -> Result<Vec<DVector<f64>>, Error> {
        check_requested(n, 2)?;
        if time < self.initial_time {
            return Err(Error::BeforeStart {
                time,
                start: self.initial_time,
            });
        }
        let u = time - self.initial_time;
        let tau2 = self.decay_timescale * self.decay_timescale;
        let denom = tau2 + u * u;
        let v = self.velocity;

        let values = [
            self.initial_function_value + v * u.powi(3) / denom,
            v * u * u * (u * u + 3.0 * tau2) / (denom * denom),
            2.0 * v * tau2 * u * (3.0 * tau2 - u * u) / denom.powi(3),
        ];
        Ok(values[..=n]
            .iter()
            .map(|&value| DVector::from_element(1, value))
            .collect())
    }

    fn update(
        &mut self,
        _time: f64,
        _updated_max_deriv: DVector<f64>,
        _next_expiration: f64,
    ) -> Result<(), Error> {
        Err(Error::NotUpdatable {
            kind: "FixedSpeedCubic",
        })
    }

    fn truncate_at_time(&mut self, _time: f64) {}

    fn get_clone(&self) -> Box<dyn FunctionOfTime> {
        Box::new(self.clone())
    }

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

    #[test]
    fn starts_at_rest_and_reaches_the_asymptotic_speed() {
        let cubic = FixedSpeedCubic::new(1.0, 0.3, -1e-5, 50.0).expect("valid cubic");

        let [f, df, d2f] = cubic.func_and_2_derivs(0.3).expect("in bounds");
        assert_eq!(f[0], 1.0);
        assert_eq!(df[0], 0.0);
        assert_eq!(d2f[0], 0.0);

        let [_, late_speed] = cubic.func_and_deriv(0.3 + 1e6).expect("never expires");
        assert_relative_eq!(late_speed[0], -1e-5, max_relative = 1e-6);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let cubic = FixedSpeedCubic::new(2.0, 0.0, 3.0, 1.5).expect("valid cubic");
        let (t, h) = (1.1, 1e-5);
        let [_, df, d2f] = cubic.func_and_2_derivs(t).expect("in bounds");
        let [plus, dplus] = cubic.func_and_deriv(t + h).expect("in bounds");
        let [minus, dminus] = cubic.func_and_deriv(t - h).expect("in bounds");

        assert_relative_eq!(df[0], (plus[0] - minus[0]) / (2.0 * h), epsilon = 1e-7);
        assert_relative_eq!(d2f[0], (dplus[0] - dminus[0]) / (2.0 * h), epsilon = 1e-7);
    }

    #[test]
    fn rejects_updates_and_early_times() {
        let mut cubic = FixedSpeedCubic::new(1.0, 1.0, 0.1, 1.0).expect("valid cubic");
        assert!(cubic.func(0.5).is_err());
        assert!(cubic.update(2.0, DVector::zeros(1), 3.0).is_err());
    }
}
