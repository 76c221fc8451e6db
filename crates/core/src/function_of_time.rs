//! Time-bounded parameters consumed by time-dependent coordinate maps.
//!
//! Every function stores a fixed number of derivatives and may only be
//! evaluated inside its validity window `[earliest retained time, expiration]`.

use std::{any::Any, fmt};

use nalgebra::DVector;

use crate::Error;

mod backlog;
mod fixed_speed_cubic;
mod integrated;
mod piecewise_polynomial;
mod quaternion;
mod settle_to_constant;
mod settle_to_constant_quaternion;

pub use fixed_speed_cubic::FixedSpeedCubic;
pub use integrated::IntegratedFunctionOfTime;
pub use piecewise_polynomial::PiecewisePolynomial;
pub use quaternion::QuaternionFunctionOfTime;
pub use settle_to_constant::SettleToConstant;
pub use settle_to_constant_quaternion::SettleToConstantQuaternion;

/// A vector-valued function of time with stored derivatives.
///
/// Evaluation is only permitted inside [`time_bounds`](Self::time_bounds).
/// Updatable variants extend the window through [`update`](Self::update);
/// closed-form variants are valid forever and reject updates.
pub trait FunctionOfTime: fmt::Debug + Send + Sync + Any {
    /// Returns `[earliest valid time, current expiration]`.
    fn time_bounds(&self) -> [f64; 2];

    /// Returns the expiration of the segment that contains `time`.
    ///
    /// For the most recent segment this is the current expiration.
    fn expiration_after(&self, time: f64) -> f64;

    /// Returns the number of derivatives above the value this function provides.
    fn max_deriv(&self) -> usize;

    /// Returns the value followed by the first `n` derivatives at `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if `time` is outside the validity window or if more
    /// derivatives are requested than the function provides.
    fn func_and_n_derivs(&self, time: f64, n: usize) -> Result<Vec<DVector<f64>>, Error>;

    /// Replaces the highest stored derivative at `time` and extends the
    /// validity window to `next_expiration`.
    ///
    /// An update whose time lies past the current expiration is buffered and
    /// applied once the expiration reaches it.
    ///
    /// # Errors
    ///
    /// Returns an error if the update is inconsistent with the current state
    /// or if the function cannot be updated.
    fn update(
        &mut self,
        time: f64,
        updated_max_deriv: DVector<f64>,
        next_expiration: f64,
    ) -> Result<(), Error>;

    /// Drops retained history that ends before `time`.
    fn truncate_at_time(&mut self, time: f64);

    /// Returns an independent copy of this function.
    fn get_clone(&self) -> Box<dyn FunctionOfTime>;

    /// Returns a new function that starts from this function's state at
    /// `time` and expires at `expiration`.
    ///
    /// # Errors
    ///
    /// Returns an error if this function cannot be evaluated at `time`.
    fn create_at_time(&self, time: f64, expiration: f64)
    -> Result<Box<dyn FunctionOfTime>, Error>;

    fn as_any(&self) -> &dyn Any;

    /// Compares against another function of the same concrete type.
    fn dyn_eq(&self, other: &dyn FunctionOfTime) -> bool;

    /// Returns the value at `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if `time` is outside the validity window.
    fn func(&self, time: f64) -> Result<[DVector<f64>; 1], Error> {
        into_array(self.func_and_n_derivs(time, 0)?)
    }

    /// Returns the value and first derivative at `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if `time` is outside the validity window or the
    /// function stores no derivatives.
    fn func_and_deriv(&self, time: f64) -> Result<[DVector<f64>; 2], Error> {
        into_array(self.func_and_n_derivs(time, 1)?)
    }

    /// Returns the value and first two derivatives at `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if `time` is outside the validity window or the
    /// function stores fewer than two derivatives.
    fn func_and_2_derivs(&self, time: f64) -> Result<[DVector<f64>; 3], Error> {
        into_array(self.func_and_n_derivs(time, 2)?)
    }
}

impl Clone for Box<dyn FunctionOfTime> {
    fn clone(&self) -> Self {
        self.get_clone()
    }
}

impl PartialEq for dyn FunctionOfTime {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

/// Shared [`FunctionOfTime::dyn_eq`] implementation for concrete types.
fn dyn_eq_as<T: FunctionOfTime + PartialEq>(this: &T, other: &dyn FunctionOfTime) -> bool {
    other
        .as_any()
        .downcast_ref::<T>()
        .is_some_and(|other| other == this)
}

fn into_array<const N: usize>(derivs: Vec<DVector<f64>>) -> Result<[DVector<f64>; N], Error> {
    let actual = derivs.len();
    derivs
        .try_into()
        .map_err(|_| Error::WrongDerivativeCount {
            expected: N,
            actual,
        })
}

/// Checks that an explicit list of initial derivatives is usable.
fn check_derivs(derivs: &[DVector<f64>], expected: usize) -> Result<usize, Error> {
    if derivs.len() != expected {
        return Err(Error::WrongDerivativeCount {
            expected,
            actual: derivs.len(),
        });
    }
    let dim = derivs.first().map_or(0, DVector::len);
    if let Some(bad) = derivs.iter().find(|d| d.len() != dim) {
        return Err(Error::WrongComponentCount {
            expected: dim,
            actual: bad.len(),
        });
    }
    Ok(dim)
}

fn check_timescale(timescale: f64) -> Result<(), Error> {
    if timescale.is_nan() || timescale <= 0.0 {
        return Err(Error::InvalidTimescale { timescale });
    }
    Ok(())
}

fn check_requested(requested: usize, available: usize) -> Result<(), Error> {
    if requested > available {
        return Err(Error::InsufficientDerivatives {
            requested,
            available,
        });
    }
    Ok(())
}
