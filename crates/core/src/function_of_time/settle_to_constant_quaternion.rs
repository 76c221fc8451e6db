use std::any::Any;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{FunctionOfTime, SettleToConstant, check_derivs, check_requested, dyn_eq_as};
use crate::Error;

const NORMALIZATION_TOL: f64 = 1e-12;

/// A unit quaternion that settles to a constant orientation.
///
/// The four components settle independently as a [`SettleToConstant`]; the
/// result and its derivatives are those of the normalized quaternion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleToConstantQuaternion {
    unnormalized: SettleToConstant,
}

impl SettleToConstantQuaternion {
    /// Creates a settling rotation matching `[q, q', q'']` at `match_time`.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs are not three 4-vectors, the initial
    /// quaternion is not normalized, or the timescale is not positive.
    pub fn new(
        initial_func_and_derivs: impl Into<Vec<DVector<f64>>>,
        match_time: f64,
        decay_timescale: f64,
    ) -> Result<Self, Error> {
        let derivs = initial_func_and_derivs.into();
        let dim = check_derivs(&derivs, 3)?;
        if dim != 4 {
            return Err(Error::WrongComponentCount {
                expected: 4,
                actual: dim,
            });
        }
        let norm = derivs[0].norm();
        if (norm - 1.0).abs() > NORMALIZATION_TOL {
            return Err(Error::NotNormalized { norm });
        }
        Ok(Self {
            unnormalized: SettleToConstant::new(derivs, match_time, decay_timescale)?,
        })
    }

    pub fn decay_timescale(&self) -> f64 {
        self.unnormalized.decay_timescale()
    }

    /// Checks a decoded rotation against the invariants `new` enforces.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        self.unnormalized.validate()?;
        match self.unnormalized.dimension() {
            4 => Ok(()),
            actual => Err(Error::WrongComponentCount {
                expected: 4,
                actual,
            }),
        }
    }
}

impl FunctionOfTime for SettleToConstantQuaternion {
    fn time_bounds(&self) -> [f64; 2] {
        self.unnormalized.time_bounds()
    }

    fn expiration_after(&self, time: f64) -> f64 {
        self.unnormalized.expiration_after(time)
    }

    fn max_deriv(&self) -> usize {
        2
    }

    fn func_and_n_derivs(&self, time: f64, n: usize) -> Result<Vec<DVector<f64>>, Error> {
        check_requested(n, 2)?;
        let f = self.unnormalized.func_and_n_derivs(time, n)?;
        let norm = f[0].norm();
        let q = &f[0] / norm;
        let mut result = vec![q.clone()];
        if n == 0 {
            return Ok(result);
        }

        // With g = f' - q (q·f'), the normalized derivative is q' = g / |f|.
        let q_dot_df = q.dot(&f[1]);
        let g = &f[1] - &q * q_dot_df;
        let dq = &g / norm;
        result.push(dq.clone());
        if n == 1 {
            return Ok(result);
        }

        let dnorm = q_dot_df;
        let dg = &f[2] - &dq * q_dot_df - &q * (dq.dot(&f[1]) + q.dot(&f[2]));
        result.push(dg / norm - g * (dnorm / (norm * norm)));
        Ok(result)
    }

    fn update(
        &mut self,
        _time: f64,
        _updated_max_deriv: DVector<f64>,
        _next_expiration: f64,
    ) -> Result<(), Error> {
        Err(Error::NotUpdatable {
            kind: "SettleToConstantQuaternion",
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
