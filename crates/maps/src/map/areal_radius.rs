use std::collections::BTreeSet;

use chronomap_core::FunctionsOfTime;
use chronomap_solvers::equation::toms748::{self, Config};
use nalgebra::{Matrix3, Vector3};

use super::{ElementaryMap, radial_inv_jacobian, radial_jacobian};
use crate::MapError;

/// Maps isotropic radius to areal radius on a Kerr-Schild slice of
/// Schwarzschild.
///
/// The isotropic radius is known in closed form as a function of the areal
/// radius `R`,
///
/// `r̄ = ¼ R (1 + L)² exp(2 - 2L)`, with `L = √(1 + 2M/R)`,
///
/// so the forward map inverts it numerically and the inverse map is explicit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArealRadius {
    center: Vector3<f64>,
    mass: f64,
}

impl ArealRadius {
    /// # Errors
    ///
    /// Returns an error unless `mass` is positive and finite.
    pub fn new(center: Vector3<f64>, mass: f64) -> Result<Self, MapError> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(MapError::InvalidParameters {
                reason: format!("mass must be positive, got {mass}"),
            });
        }
        Ok(Self { center, mass })
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Isotropic radius at areal radius `areal`.
    pub fn isotropic_from_areal(&self, areal: f64) -> f64 {
        let l = (1.0 + 2.0 * self.mass / areal).sqrt();
        0.25 * areal * (1.0 + l).powi(2) * (2.0 - 2.0 * l).exp()
    }

    /// `dr̄/dR` at areal radius `areal`.
    fn isotropic_from_areal_deriv(&self, areal: f64) -> f64 {
        let l = (1.0 + 2.0 * self.mass / areal).sqrt();
        self.isotropic_from_areal(areal) / areal * l
    }

    /// Areal radius at isotropic radius `isotropic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root finder fails or does not converge.
    pub fn areal_from_isotropic(&self, isotropic: f64) -> Result<f64, MapError> {
        let solution = toms748::find_root(
            |areal| self.isotropic_from_areal(areal) - isotropic,
            [isotropic, isotropic + self.mass],
            &Config::default(),
        )?;
        if !solution.is_converged() {
            return Err(MapError::NotConverged {
                iters: solution.iters,
                x: solution.x,
            });
        }
        Ok(solution.x)
    }

    /// The radial factor `g = R / r̄`, its radial derivative, and the offset
    /// from the center.
    fn radial_factor(&self, source: &Vector3<f64>) -> Result<(Vector3<f64>, f64, f64), MapError> {
        let offset = source - self.center;
        let isotropic = offset.norm();
        if isotropic == 0.0 {
            return Err(MapError::AtCenter {
                point: source.iter().copied().collect(),
            });
        }
        let areal = self.areal_from_isotropic(isotropic)?;
        let g = areal / isotropic;
        let d_areal = 1.0 / self.isotropic_from_areal_deriv(areal);
        Ok((offset, g, (d_areal - g) / isotropic))
    }
}

impl ElementaryMap<3> for ArealRadius {
    fn call(
        &self,
        source: &Vector3<f64>,
        _time: f64,
        _functions_of_time: &FunctionsOfTime,
    ) -> Result<Vector3<f64>, MapError> {
        let (offset, g, _) = self.radial_factor(source)?;
        Ok(self.center + offset * g)
    }

    fn inverse(
        &self,
        target: &Vector3<f64>,
        _time: f64,
        _functions_of_time: &FunctionsOfTime,
    ) -> Result<Option<Vector3<f64>>, MapError> {
        let offset = target - self.center;
        let areal = offset.norm();
        if areal == 0.0 {
            return Ok(None);
        }
        Ok(Some(self.center + offset * (self.isotropic_from_areal(areal) / areal)))
    }

    fn jacobian(
        &self,
        source: &Vector3<f64>,
        _time: f64,
        _functions_of_time: &FunctionsOfTime,
    ) -> Result<Matrix3<f64>, MapError> {
        let (offset, g, dg) = self.radial_factor(source)?;
        Ok(radial_jacobian(&offset, g, dg))
    }

    fn inv_jacobian(
        &self,
        source: &Vector3<f64>,
        _time: f64,
        _functions_of_time: &FunctionsOfTime,
    ) -> Result<Matrix3<f64>, MapError> {
        let (offset, g, dg) = self.radial_factor(source)?;
        radial_inv_jacobian(&offset, g, dg)
    }

    fn frame_velocity(
        &self,
        _source: &Vector3<f64>,
        _time: f64,
        _functions_of_time: &FunctionsOfTime,
    ) -> Result<Vector3<f64>, MapError> {
        Ok(Vector3::zeros())
    }

    fn is_identity(&self) -> bool {
        false
    }

    fn jacobian_is_time_dependent(&self) -> bool {
        false
    }

    fn function_of_time_names(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn horizon_maps_to_twice_the_mass() {
        let map = ArealRadius::new(Vector3::zeros(), 1.0).expect("positive mass");
        let horizon = map.isotropic_from_areal(2.0);

        let areal = map.areal_from_isotropic(horizon).expect("converges");

        assert_relative_eq!(areal, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn forward_and_inverse_round_trip() {
        let center = Vector3::new(1.0, 2.0, -0.5);
        let map = ArealRadius::new(center, 0.8).expect("positive mass");
        let functions_of_time = FunctionsOfTime::new();

        for offset in [
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(1.0, -2.0, 0.3),
            Vector3::new(20.0, 5.0, 7.0),
        ] {
            let source = center + offset;
            let mapped = map.call(&source, 0.0, &functions_of_time).expect("converges");
            assert!((mapped - center).norm() > offset.norm());

            let back = map
                .inverse(&mapped, 0.0, &functions_of_time)
                .expect("explicit")
                .expect("away from the center");
            assert_relative_eq!(back, source, epsilon = 1e-10);
        }
    }

    #[test]
    fn jacobians_match_finite_differences() {
        let map = ArealRadius::new(Vector3::zeros(), 1.0).expect("positive mass");
        let functions_of_time = FunctionsOfTime::new();
        let point = Vector3::new(1.5, -0.7, 2.2);
        let h = 1e-5;

        let jacobian = map.jacobian(&point, 0.0, &functions_of_time).expect("converges");
        for j in 0..3 {
            let step = Vector3::ith(j, h);
            let plus = map.call(&(point + step), 0.0, &functions_of_time).expect("converges");
            let minus = map.call(&(point - step), 0.0, &functions_of_time).expect("converges");
            assert_relative_eq!(
                jacobian.column(j).into_owned(),
                (plus - minus) / (2.0 * h),
                epsilon = 1e-6
            );
        }

        let inv_jacobian = map.inv_jacobian(&point, 0.0, &functions_of_time).expect("converges");
        assert_relative_eq!(inv_jacobian * jacobian, Matrix3::identity(), epsilon = 1e-12);
        assert!(!map.jacobian_is_time_dependent());
    }

    #[test]
    fn rejects_non_positive_mass() {
        assert!(ArealRadius::new(Vector3::zeros(), 0.0).is_err());
        assert!(ArealRadius::new(Vector3::zeros(), f64::NAN).is_err());
    }
}
