use std::any::Any;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{
    FunctionOfTime, check_derivs, check_requested, dyn_eq_as,
    backlog::{PendingUpdate, UpdateBacklog},
};
use crate::Error;

/// One polynomial piece: the value and derivatives at the piece's start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Segment {
    time: f64,
    derivs: Vec<DVector<f64>>,
}

impl Segment {
    /// Evaluates the `order`-th derivative as a Taylor series about the start.
    fn taylor(&self, time: f64, order: usize) -> DVector<f64> {
        let dt = time - self.time;
        let dim = self.derivs.first().map_or(0, DVector::len);
        let mut result = DVector::zeros(dim);
        let mut factor = 1.0;
        for (power, coef) in self.derivs.iter().skip(order).enumerate() {
            if power > 0 {
                factor *= dt / power as f64;
            }
            result.axpy(factor, coef, 1.0);
        }
        result
    }
}

/// A piecewise polynomial of degree `MAX_DERIV`.
///
/// Each update fixes the highest derivative on a new piece; the lower
/// derivatives at the update time are carried over from the previous piece,
/// so the function and its first `MAX_DERIV - 1` derivatives stay continuous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewisePolynomial<const MAX_DERIV: usize> {
    segments: Vec<Segment>,
    expiration: f64,
    backlog: UpdateBacklog,
}

impl<const MAX_DERIV: usize> PiecewisePolynomial<MAX_DERIV> {
    /// Creates a polynomial from the value and `MAX_DERIV` derivatives at `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of derivatives is not `MAX_DERIV + 1`,
    /// their lengths differ, or `expiration` is before `time`.
    pub fn new(
        time: f64,
        initial_derivs: impl Into<Vec<DVector<f64>>>,
        expiration: f64,
    ) -> Result<Self, Error> {
        let derivs = initial_derivs.into();
        check_derivs(&derivs, MAX_DERIV + 1)?;
        if expiration < time {
            return Err(Error::InvalidExpiration { time, expiration });
        }
        Ok(Self {
            segments: vec![Segment { time, derivs }],
            expiration,
            backlog: UpdateBacklog::default(),
        })
    }

    /// Number of components of the function value.
    pub fn dimension(&self) -> usize {
        self.segments
            .first()
            .and_then(|segment| segment.derivs.first())
            .map_or(0, DVector::len)
    }

    /// Checks a decoded polynomial against the invariants `new` and `update`
    /// maintain.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        const KIND: &str = "PiecewisePolynomial";
        if self.segments.is_empty() {
            return Err(Error::Malformed {
                kind: KIND,
                reason: "no segments".to_string(),
            });
        }
        let dimension = self.dimension();
        for segment in &self.segments {
            let dim = check_derivs(&segment.derivs, MAX_DERIV + 1)?;
            if dim != dimension {
                return Err(Error::WrongComponentCount {
                    expected: dimension,
                    actual: dim,
                });
            }
        }
        let ordered = self.segments.windows(2).all(|w| w[0].time <= w[1].time);
        let last = self.segments[self.segments.len() - 1].time;
        let expires_after_last = self.expiration >= last;
        if !ordered || !expires_after_last {
            return Err(Error::Malformed {
                kind: KIND,
                reason: format!(
                    "segment times are not ordered up to the expiration {}",
                    self.expiration
                ),
            });
        }
        self.backlog.validate(dimension, KIND)
    }

    /// Number of updates received early and not yet applied.
    pub fn pending_update_count(&self) -> usize {
        self.backlog.len()
    }

    pub(crate) fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn segment_time(&self, index: usize) -> f64 {
        self.segments[index].time
    }

    /// Returns the index of the segment used to evaluate at `time`.
    pub(crate) fn segment_index(&self, time: f64) -> Result<usize, Error> {
        if time > self.expiration {
            return Err(Error::ExpiredEvaluation {
                time,
                expiration: self.expiration,
            });
        }
        match self.segments.partition_point(|s| s.time <= time) {
            0 => Err(Error::BeforeStart {
                time,
                start: self.segments[0].time,
            }),
            idx => Ok(idx - 1),
        }
    }

    /// Evaluates a derivative using a specific segment, without bounds checks.
    pub(crate) fn evaluate_segment(&self, index: usize, time: f64, order: usize) -> DVector<f64> {
        self.segments[index].taylor(time, order)
    }

    fn apply_update(&mut self, update: PendingUpdate) -> Result<f64, Error> {
        let last = &self.segments[self.segments.len() - 1];
        let mut derivs: Vec<_> = (0..=MAX_DERIV)
            .map(|order| last.taylor(update.time, order))
            .collect();
        derivs[MAX_DERIV] = update.value;
        self.segments.push(Segment {
            time: update.time,
            derivs,
        });
        self.expiration = update.expiration;
        Ok(update.expiration)
    }
}

impl<const MAX_DERIV: usize> FunctionOfTime for PiecewisePolynomial<MAX_DERIV> {
    fn time_bounds(&self) -> [f64; 2] {
        [self.segments[0].time, self.expiration]
    }

    fn expiration_after(&self, time: f64) -> f64 {
        let idx = self.segments.partition_point(|s| s.time <= time);
        self.segments
            .get(idx)
            .map_or(self.expiration, |next| next.time)
    }

    fn max_deriv(&self) -> usize {
        MAX_DERIV
    }

    fn func_and_n_derivs(&self, time: f64, n: usize) -> Result<Vec<DVector<f64>>, Error> {
        check_requested(n, MAX_DERIV)?;
        let idx = self.segment_index(time)?;
        Ok((0..=n)
            .map(|order| self.segments[idx].taylor(time, order))
            .collect())
    }

    fn update(
        &mut self,
        time: f64,
        updated_max_deriv: DVector<f64>,
        next_expiration: f64,
    ) -> Result<(), Error> {
        if updated_max_deriv.len() != self.dimension() {
            return Err(Error::WrongComponentCount {
                expected: self.dimension(),
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
        let idx = self.segments.partition_point(|s| s.time <= time);
        if idx > 1 {
            self.segments.drain(..idx - 1);
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
        let derivs = self.func_and_n_derivs(time, MAX_DERIV)?;
        Ok(Box::new(Self::new(time, derivs, expiration)?))
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

    fn dv(values: &[f64]) -> DVector<f64> {
        DVector::from_row_slice(values)
    }

    /// f(t) = 1 + 2t + 1.5t² on the first piece.
    fn quadratic() -> PiecewisePolynomial<2> {
        PiecewisePolynomial::new(0.0, [dv(&[1.0]), dv(&[2.0]), dv(&[3.0])], 1.0)
            .expect("valid polynomial")
    }

    #[test]
    fn evaluates_taylor_series_about_segment_start() {
        let f = quadratic();
        let [value, first, second] = f.func_and_2_derivs(0.5).expect("in bounds");

        assert_relative_eq!(value[0], 1.0 + 1.0 + 1.5 * 0.25);
        assert_relative_eq!(first[0], 2.0 + 3.0 * 0.5);
        assert_relative_eq!(second[0], 3.0);
    }

    #[test]
    fn update_keeps_lower_derivatives_continuous() {
        let mut f = quadratic();
        f.update(1.0, dv(&[-4.0]), 2.0).expect("update at expiration");

        let [value, first, second] = f.func_and_2_derivs(1.0).expect("in bounds");
        assert_relative_eq!(value[0], 4.5);
        assert_relative_eq!(first[0], 5.0);
        assert_relative_eq!(second[0], -4.0);

        let [value] = f.func(1.5).expect("in bounds");
        assert_relative_eq!(value[0], 4.5 + 5.0 * 0.5 - 2.0 * 0.25);
        assert_eq!(f.time_bounds(), [0.0, 2.0]);
    }

    #[test]
    fn evaluation_is_bounded_by_the_validity_window() {
        let f = quadratic();

        assert!(f.func(1.0).is_ok());
        let err = f.func(1.25).expect_err("past expiration");
        assert_eq!(
            err.to_string(),
            "Attempt to evaluate at time 1.25, which is after the expiration time 1"
        );
        assert!(matches!(
            f.func(-0.5),
            Err(Error::BeforeStart { start, .. }) if start == 0.0
        ));
    }

    #[test]
    fn rejects_requests_for_more_derivatives_than_stored() {
        let f = PiecewisePolynomial::<1>::new(0.0, [dv(&[1.0]), dv(&[0.0])], 1.0)
            .expect("valid polynomial");
        assert!(matches!(
            f.func_and_2_derivs(0.5),
            Err(Error::InsufficientDerivatives {
                requested: 2,
                available: 1
            })
        ));
    }

    #[test]
    fn rejects_updates_before_the_current_expiration() {
        let mut f = quadratic();
        assert!(matches!(
            f.update(0.5, dv(&[0.0]), 2.0),
            Err(Error::UpdateBeforeExpiration { .. })
        ));
        assert!(matches!(
            f.update(1.0, dv(&[0.0]), 0.5),
            Err(Error::InvalidExpiration { .. })
        ));
        assert!(matches!(
            f.update(1.0, dv(&[0.0, 1.0]), 2.0),
            Err(Error::WrongComponentCount { .. })
        ));
    }

    #[test]
    fn highest_derivative_matches_the_update_at_its_time() {
        let mut f = quadratic();
        let updates = [(1.0, 7.5, 1.3), (1.3, -2.0, 2.0), (2.0, 0.25, 4.0)];
        for (time, deriv, expiration) in updates {
            f.update(time, dv(&[deriv]), expiration)
                .expect("update at expiration");
            let derivs = f.func_and_2_derivs(time).expect("in bounds");
            assert_relative_eq!(derivs[2][0], deriv);
            assert_eq!(f.time_bounds()[1], expiration);
        }
    }

    #[test]
    fn buffers_early_updates_until_the_expiration_reaches_them() {
        let mut f = quadratic();
        f.update(2.0, dv(&[1.0]), 3.0).expect("buffered");
        assert_eq!(f.pending_update_count(), 1);
        assert!(f.func(1.5).is_err());

        f.update(1.0, dv(&[0.0]), 2.0).expect("applied");
        assert_eq!(f.pending_update_count(), 0);
        assert_eq!(f.time_bounds(), [0.0, 3.0]);
        assert_relative_eq!(f.func_and_2_derivs(2.5).expect("in bounds")[2][0], 1.0);
    }

    #[test]
    fn expiration_after_reports_the_segment_end() {
        let mut f = quadratic();
        f.update(1.0, dv(&[0.0]), 2.0).expect("update");
        f.update(2.0, dv(&[0.0]), 3.0).expect("update");

        assert_eq!(f.expiration_after(0.0), 1.0);
        assert_eq!(f.expiration_after(0.5), 1.0);
        assert_eq!(f.expiration_after(1.0), 2.0);
        assert_eq!(f.expiration_after(2.5), 3.0);
    }

    #[test]
    fn truncation_keeps_the_segment_containing_the_time() {
        let mut f = quadratic();
        f.update(1.0, dv(&[0.0]), 2.0).expect("update");
        f.update(2.0, dv(&[0.0]), 3.0).expect("update");
        let expected = f.func_and_2_derivs(2.5).expect("in bounds");

        f.truncate_at_time(2.2);
        assert_eq!(f.time_bounds(), [2.0, 3.0]);
        assert_eq!(f.func_and_2_derivs(2.5).expect("in bounds"), expected);
    }

    #[test]
    fn clones_and_snapshots_evaluate_identically() {
        let mut f = quadratic();
        f.update(1.0, dv(&[-1.0]), 2.0).expect("update");

        let clone = f.get_clone();
        assert!(clone.dyn_eq(&f));
        for time in [0.0, 0.4, 1.0, 1.7] {
            assert_eq!(
                clone.func_and_2_derivs(time).expect("in bounds"),
                f.func_and_2_derivs(time).expect("in bounds")
            );
        }

        let snapshot = f.create_at_time(1.5, 5.0).expect("valid time");
        assert_eq!(snapshot.time_bounds(), [1.5, 5.0]);
        let expected = f.func_and_2_derivs(1.5).expect("in bounds");
        let actual = snapshot.func_and_2_derivs(1.5).expect("in bounds");
        for (a, e) in actual.iter().zip(&expected) {
            assert_relative_eq!(a[0], e[0], epsilon = 1e-14);
        }
    }

    #[test]
    fn accepts_an_expiration_equal_to_the_update_time() {
        let f = PiecewisePolynomial::<1>::new(0.0, [dv(&[1.0]), dv(&[0.0])], 0.0)
            .expect("expiration at the start time");
        assert_eq!(f.time_bounds(), [0.0, 0.0]);

        let mut f = PiecewisePolynomial::<1>::new(0.0, [dv(&[1.0]), dv(&[0.0])], 1.0)
            .expect("valid polynomial");
        f.update(1.0, dv(&[2.0]), 1.0)
            .expect("expiration at the update time");
        assert_eq!(f.time_bounds(), [0.0, 1.0]);
        assert_relative_eq!(f.func_and_deriv(1.0).expect("in bounds")[1][0], 2.0);

        f.update(1.0, dv(&[3.0]), 2.0).expect("extends the window");
        assert_relative_eq!(f.func(2.0).expect("in bounds")[0][0], 4.0);
    }

    #[test]
    fn discards_buffered_updates_passed_by_an_earlier_one() {
        let mut f = quadratic();
        f.update(2.0, dv(&[1.0]), 3.0).expect("buffered");
        f.update(1.0, dv(&[0.0]), 2.5).expect("applied");
        assert_eq!(f.pending_update_count(), 0);
        assert_eq!(f.time_bounds(), [0.0, 2.5]);
        assert!(f.func(2.7).is_err());

        f.update(2.5, dv(&[-1.0]), 4.0).expect("fills the gap");
        assert_eq!(f.time_bounds(), [0.0, 4.0]);
        assert_relative_eq!(f.func_and_2_derivs(3.0).expect("in bounds")[2][0], -1.0);
    }

    #[test]
    fn validation_rejects_a_polynomial_without_segments() {
        let mut f = quadratic();
        assert!(f.validate().is_ok());

        f.segments.clear();
        assert_eq!(f.dimension(), 0);
        assert!(matches!(f.validate(), Err(Error::Malformed { .. })));
    }
}
