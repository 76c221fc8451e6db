use std::any::Any;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{
    FunctionOfTime, check_requested, dyn_eq_as,
    backlog::{PendingUpdate, UpdateBacklog},
};
use crate::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Step {
    time: f64,
    value: DVector<f64>,
    rate: DVector<f64>,
}

impl Step {
    fn value_at(&self, time: f64) -> DVector<f64> {
        &self.value + &self.rate * (time - self.time)
    }
}

/// A value integrated forward from rates supplied by an external controller.
///
/// Each update provides the rate that holds from its time until the next
/// update; the value at the update time is obtained by integrating the
/// previous rate across the preceding step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedFunctionOfTime {
    steps: Vec<Step>,
    expiration: f64,
    backlog: UpdateBacklog,
}

impl IntegratedFunctionOfTime {
    /// # Errors
    ///
    /// Returns an error if `value` and `rate` differ in length or the
    /// expiration is before `time`.
    pub fn new(
        time: f64,
        value: DVector<f64>,
        rate: DVector<f64>,
        expiration: f64,
    ) -> Result<Self, Error> {
        if value.len() != rate.len() {
            return Err(Error::WrongComponentCount {
                expected: value.len(),
                actual: rate.len(),
            });
        }
        if expiration < time {
            return Err(Error::InvalidExpiration { time, expiration });
        }
        Ok(Self {
            steps: vec![Step { time, value, rate }],
            expiration,
            backlog: UpdateBacklog::default(),
        })
    }

    /// Checks a decoded function against the invariants `new` and `update`
    /// maintain.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        const KIND: &str = "IntegratedFunctionOfTime";
        let Some(first) = self.steps.first() else {
            return Err(Error::Malformed {
                kind: KIND,
                reason: "no steps".to_string(),
            });
        };
        let dimension = first.value.len();
        if let Some(bad) = self
            .steps
            .iter()
            .find(|s| s.value.len() != dimension || s.rate.len() != dimension)
        {
            return Err(Error::Malformed {
                kind: KIND,
                reason: format!("step at time {} has mismatched component counts", bad.time),
            });
        }
        let ordered = self.steps.windows(2).all(|w| w[0].time <= w[1].time);
        let expires_after_last = self.expiration >= self.last().time;
        if !ordered || !expires_after_last {
            return Err(Error::Malformed {
                kind: KIND,
                reason: format!(
                    "step times are not ordered up to the expiration {}",
                    self.expiration
                ),
            });
        }
        self.backlog.validate(dimension, KIND)
    }

    fn last(&self) -> &Step {
        &self.steps[self.steps.len() - 1]
    }

    fn apply_update(&mut self, update: PendingUpdate) -> Result<f64, Error> {
        let value = self.last().value_at(update.time);
        trace!(time = update.time, "integrated value across step");
        self.steps.push(Step {
            time: update.time,
            value,
            rate: update.value,
        });
        self.expiration = update.expiration;
        Ok(update.expiration)
    }
}

impl FunctionOfTime for IntegratedFunctionOfTime {
    fn time_bounds(&self) -> [f64; 2] {
        [self.steps[0].time, self.expiration]
    }

    fn expiration_after(&self, time: f64) -> f64 {
        let idx = self.steps.partition_point(|s| s.time <= time);
        self.steps.get(idx).map_or(self.expiration, |next| next.time)
    }

    fn max_deriv(&self) -> usize {
        1
    }

    fn func_and_n_derivs(&self, time: f64, n: usize) -> Result<Vec<DVector<f64>>, Error> {
        check_requested(n, 1)?;
        if time > self.expiration {
            return Err(Error::ExpiredEvaluation {
                time,
                expiration: self.expiration,
            });
        }
        let idx = self.steps.partition_point(|s| s.time <= time);
        let Some(step) = idx.checked_sub(1).map(|i| &self.steps[i]) else {
            return Err(Error::BeforeStart {
                time,
                start: self.steps[0].time,
            });
        };
        let mut result = vec![step.value_at(time)];
        if n == 1 {
            result.push(step.rate.clone());
        }
        Ok(result)
    }

    /// Supplies the rate that holds from `time` onward.
    fn update(
        &mut self,
        time: f64,
        updated_max_deriv: DVector<f64>,
        next_expiration: f64,
    ) -> Result<(), Error> {
        let dim = self.last().value.len();
        if updated_max_deriv.len() != dim {
            return Err(Error::WrongComponentCount {
                expected: dim,
                actual: updated_max_deriv.len(),
            });
        }
        let update = PendingUpdate {
            time,
            value: updated_max_deriv,
            expiration: next_expiration,
        };
        let mut backlog = std::mem::take(&mut self.backlog);
        let result = backlog.process(self.expiration, update, |u| self.apply_update(u));
        self.backlog = backlog;
        result
    }

    fn truncate_at_time(&mut self, time: f64) {
        let idx = self.steps.partition_point(|s| s.time <= time);
        if idx > 1 {
            self.steps.drain(..idx - 1);
        }
    }

    fn get_clone(&self) -> Box<dyn FunctionOfTime> {
        Box::new(self.clone())
    }

    fn create_at_time(
        &self,
        time: f64,
        expiration: f64,
    ) -> Result<Box<dyn FunctionOfTime>, Error> {
        let mut derivs = self.func_and_n_derivs(time, 1)?.into_iter();
        let (Some(value), Some(rate)) = (derivs.next(), derivs.next()) else {
            return Err(Error::WrongDerivativeCount {
                expected: 2,
                actual: 0,
            });
        };
        Ok(Box::new(Self::new(time, value, rate, expiration)?))
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

    fn dv(value: f64) -> DVector<f64> {
        DVector::from_element(1, value)
    }

    #[test]
    fn integrates_piecewise_constant_rates() {
        let mut f = IntegratedFunctionOfTime::new(0.0, dv(1.0), dv(2.0), 0.5).expect("valid");
        f.update(0.5, dv(-1.0), 1.0).expect("update");
        f.update(1.0, dv(4.0), 2.0).expect("update");

        let [value, rate] = f.func_and_deriv(0.5).expect("in bounds");
        assert_relative_eq!(value[0], 2.0);
        assert_relative_eq!(rate[0], -1.0);

        let [value, rate] = f.func_and_deriv(1.5).expect("in bounds");
        assert_relative_eq!(value[0], 1.5 + 4.0 * 0.5);
        assert_relative_eq!(rate[0], 4.0);
        assert_eq!(f.time_bounds(), [0.0, 2.0]);
    }

    #[test]
    fn respects_expiration_and_derivative_limits() {
        let f = IntegratedFunctionOfTime::new(0.0, dv(1.0), dv(2.0), 0.5).expect("valid");
        assert!(matches!(f.func(0.6), Err(Error::ExpiredEvaluation { .. })));
        assert!(matches!(
            f.func_and_2_derivs(0.2),
            Err(Error::InsufficientDerivatives { .. })
        ));
    }

    #[test]
    fn snapshot_continues_from_the_current_state() {
        let mut f = IntegratedFunctionOfTime::new(0.0, dv(1.0), dv(2.0), 0.5).expect("valid");
        f.update(0.5, dv(-1.0), 1.0).expect("update");
        let snapshot = f.create_at_time(0.75, 3.0).expect("valid time");
        assert_eq!(snapshot.time_bounds(), [0.75, 3.0]);
        assert_eq!(
            snapshot.func_and_deriv(0.75).expect("in bounds"),
            f.func_and_deriv(0.75).expect("in bounds")
        );
    }

    #[test]
    fn update_may_expire_at_its_own_time() {
        let mut f = IntegratedFunctionOfTime::new(0.0, dv(1.0), dv(2.0), 0.5).expect("valid");
        f.update(0.5, dv(-1.0), 0.5).expect("expiration at the update time");
        assert_eq!(f.time_bounds(), [0.0, 0.5]);
        assert!(matches!(
            f.update(0.5, dv(1.0), 0.25),
            Err(Error::InvalidExpiration { .. })
        ));
    }

    #[test]
    fn validation_rejects_mismatched_steps() {
        let mut f = IntegratedFunctionOfTime::new(0.0, dv(1.0), dv(2.0), 0.5).expect("valid");
        assert!(f.validate().is_ok());

        f.steps[0].rate = DVector::zeros(2);
        assert!(matches!(f.validate(), Err(Error::Malformed { .. })));

        f.steps.clear();
        assert!(matches!(f.validate(), Err(Error::Malformed { .. })));
    }
}
