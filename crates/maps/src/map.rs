//! Elementary coordinate maps.
//!
//! Each map transforms points between two frames and supplies its own
//! Jacobian, inverse Jacobian, and frame velocity. Maps never hold
//! time-dependent state: time-varying parameters are read by name from the
//! [`FunctionsOfTime`] passed into every evaluation.

mod areal_radius;
mod chain;
mod identity;
mod rot_scale_trans;
mod shape;
mod translation;

pub use areal_radius::ArealRadius;
pub use chain::Chain;
pub use identity::Identity;
pub use rot_scale_trans::{BlockRegion, RotScaleTrans};
pub use shape::Shape;
pub use translation::Translation;

use std::{collections::BTreeSet, fmt};

use chronomap_core::FunctionsOfTime;
use nalgebra::{DVector, Matrix3, SMatrix, SVector, Vector3};

use crate::MapError;

/// One geometric transformation in `D` dimensions.
pub trait ElementaryMap<const D: usize>: fmt::Debug + Clone + PartialEq + Send + Sync + 'static {
    /// Maps a source point to the target frame.
    ///
    /// # Errors
    ///
    /// Returns an error if a function of time cannot be evaluated at `time`.
    fn call(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError>;

    /// Maps a target point back to the source frame.
    ///
    /// Returns `Ok(None)` when no source point maps to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if a function of time cannot be evaluated at `time`.
    fn inverse(
        &self,
        target: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Option<SVector<f64, D>>, MapError>;

    /// `∂x̃ⁱ/∂xʲ` at a source point.
    ///
    /// # Errors
    ///
    /// Returns an error if a function of time cannot be evaluated at `time`.
    fn jacobian(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError>;

    /// `∂xⁱ/∂x̃ʲ` at a source point.
    ///
    /// # Errors
    ///
    /// Returns an error if a function of time cannot be evaluated at `time`
    /// or the Jacobian is singular.
    fn inv_jacobian(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError>;

    /// `∂x̃/∂t` holding the source point fixed.
    ///
    /// # Errors
    ///
    /// Returns an error if a function of time cannot be evaluated at `time`.
    fn frame_velocity(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError>;

    fn is_identity(&self) -> bool;

    fn jacobian_is_time_dependent(&self) -> bool;

    fn inv_jacobian_is_time_dependent(&self) -> bool {
        self.jacobian_is_time_dependent()
    }

    /// Names of the functions of time this map reads.
    fn function_of_time_names(&self) -> BTreeSet<String>;
}

/// Evaluates a function of time and its first derivative, checking its size.
pub(crate) fn value_and_rate(
    functions_of_time: &FunctionsOfTime,
    name: &str,
    time: f64,
    components: usize,
) -> Result<[DVector<f64>; 2], MapError> {
    let [value, rate] = functions_of_time.get(name)?.func_and_deriv(time)?;
    if let Some(bad) = [&value, &rate].into_iter().find(|v| v.len() != components) {
        return Err(MapError::ComponentCount {
            name: name.to_string(),
            expected: components,
            actual: bad.len(),
        });
    }
    Ok([value, rate])
}

/// Jacobian of the radial map `x ↦ g(r) x`.
pub(crate) fn radial_jacobian(point: &Vector3<f64>, g: f64, dg_dr: f64) -> Matrix3<f64> {
    let r = point.norm();
    let coupling = if r == 0.0 { 0.0 } else { dg_dr / r };
    Matrix3::identity() * g + point * point.transpose() * coupling
}

/// Inverse Jacobian of the radial map `x ↦ g(r) x`, by Sherman-Morrison.
pub(crate) fn radial_inv_jacobian(
    point: &Vector3<f64>,
    g: f64,
    dg_dr: f64,
) -> Result<Matrix3<f64>, MapError> {
    let r = point.norm();
    let coupling = if r == 0.0 { 0.0 } else { dg_dr / r };
    let denom = g + coupling * r * r;
    if g == 0.0 || denom == 0.0 {
        return Err(MapError::SingularJacobian {
            point: point.iter().copied().collect(),
        });
    }
    Ok((Matrix3::identity() - point * point.transpose() * (coupling / denom)) / g)
}

/// Inverts a small Jacobian numerically.
pub(crate) fn invert<const D: usize>(
    jacobian: SMatrix<f64, D, D>,
    point: &SVector<f64, D>,
) -> Result<SMatrix<f64, D, D>, MapError> {
    jacobian
        .try_inverse()
        .ok_or_else(|| MapError::SingularJacobian {
            point: point.iter().copied().collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn radial_inverse_matches_numerical_inverse() {
        let point = Vector3::new(0.3, -1.2, 0.8);

        let jacobian = radial_jacobian(&point, 1.7, -0.4);
        let analytic = radial_inv_jacobian(&point, 1.7, -0.4).expect("invertible");
        let numerical = invert(jacobian, &point).expect("invertible");

        assert_relative_eq!(analytic, numerical, epsilon = 1e-13);
    }

    #[test]
    fn singular_radial_map_is_an_error() {
        let point = Vector3::new(1.0, 0.0, 0.0);

        assert!(matches!(
            radial_inv_jacobian(&point, 0.0, 1.0),
            Err(MapError::SingularJacobian { .. })
        ));
    }
}
