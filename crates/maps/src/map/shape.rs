use std::collections::BTreeSet;

use chronomap_core::FunctionsOfTime;
use nalgebra::{DVector, Matrix3, Vector3};

use super::{ElementaryMap, invert, value_and_rate};
use crate::{MapError, transition::TransitionFunction, ylm::Ylm};

/// A spherical-harmonic deformation confined by a transition function.
///
/// Relative to the center, a point `x` at radius `r` in direction `x̂` maps to
///
/// `x̃ = x - x̂ f(x) Σ(x̂)`, with `Σ(x̂) = Σ λ_lm(t) Y_lm(x̂)`,
///
/// where `f` is the transition function. The coefficients `λ_lm` come from
/// the shape function of time; when a size function is named, it supplies
/// `λ_00` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    center: Vector3<f64>,
    ylm: Ylm,
    transition: Box<dyn TransitionFunction>,
    shape_name: String,
    size_name: Option<String>,
}

/// Quantities shared by the forward map and its derivatives.
struct Local {
    offset: Vector3<f64>,
    radius: f64,
    theta: f64,
    phi: f64,
}

impl Local {
    fn new(offset: Vector3<f64>) -> Self {
        let radius = offset.norm();
        Self {
            offset,
            radius,
            theta: (offset.z / radius).clamp(-1.0, 1.0).acos(),
            phi: offset.y.atan2(offset.x),
        }
    }
}

impl Shape {
    pub fn new(
        center: Vector3<f64>,
        l_max: usize,
        transition: Box<dyn TransitionFunction>,
        shape_name: impl Into<String>,
        size_name: Option<String>,
    ) -> Self {
        Self {
            center,
            ylm: Ylm::new(l_max),
            transition,
            shape_name: shape_name.into(),
            size_name,
        }
    }

    pub fn center(&self) -> Vector3<f64> {
        self.center
    }

    pub fn l_max(&self) -> usize {
        self.ylm.l_max()
    }

    pub fn transition(&self) -> &dyn TransitionFunction {
        self.transition.as_ref()
    }

    /// The coefficients `λ_lm` and their time derivatives.
    fn coefficients(
        &self,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<[DVector<f64>; 2], MapError> {
        let [mut coefs, mut rates] = value_and_rate(
            functions_of_time,
            &self.shape_name,
            time,
            self.ylm.spectral_size(),
        )?;
        if let Some(size_name) = &self.size_name {
            let [size, size_rate] = value_and_rate(functions_of_time, size_name, time, 1)?;
            coefs[0] = size[0];
            rates[0] = size_rate[0];
        }
        Ok([coefs, rates])
    }

    fn local(&self, source: &Vector3<f64>) -> Result<Local, MapError> {
        let offset = source - self.center;
        if offset.norm() == 0.0 {
            return Err(MapError::AtCenter {
                point: source.iter().copied().collect(),
            });
        }
        Ok(Local::new(offset))
    }

    /// `Σ` and its Cartesian gradient at a point.
    fn distortion_and_gradient(&self, coefs: &DVector<f64>, local: &Local) -> (f64, Vector3<f64>) {
        let derivs = self.ylm.values_and_derivs(local.theta, local.phi);
        let dot = |values: &[f64]| -> f64 {
            values.iter().zip(coefs.iter()).map(|(y, c)| y * c).sum()
        };

        let distortion = dot(&derivs.values);
        let d_theta = dot(&derivs.d_theta);
        let d_phi = dot(&derivs.d_phi_over_sin_theta);

        let (sin_theta, cos_theta) = local.theta.sin_cos();
        let (sin_phi, cos_phi) = local.phi.sin_cos();
        let theta_hat = Vector3::new(cos_theta * cos_phi, cos_theta * sin_phi, -sin_theta);
        let phi_hat = Vector3::new(-sin_phi, cos_phi, 0.0);

        (distortion, (theta_hat * d_theta + phi_hat * d_phi) / local.radius)
    }

    /// The transition value and its gradient, which vanishes where the value
    /// is clamped.
    fn transition_and_gradient(&self, offset: &Vector3<f64>) -> (f64, Vector3<f64>) {
        let value = self.transition.call(offset);
        let gradient = if value > 0.0 && value < 1.0 {
            self.transition.gradient(offset)
        } else {
            Vector3::zeros()
        };
        (value, gradient)
    }
}

impl ElementaryMap<3> for Shape {
    fn call(
        &self,
        source: &Vector3<f64>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Vector3<f64>, MapError> {
        let [coefs, _] = self.coefficients(time, functions_of_time)?;
        let local = self.local(source)?;
        let distortion = self.ylm.evaluate(coefs.as_slice(), local.theta, local.phi);
        let falloff = self.transition.call(&local.offset);
        Ok(source - local.offset * (falloff * distortion / local.radius))
    }

    fn inverse(
        &self,
        target: &Vector3<f64>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Option<Vector3<f64>>, MapError> {
        let offset = target - self.center;
        if offset.norm() == 0.0 {
            return Ok(None);
        }
        let [coefs, _] = self.coefficients(time, functions_of_time)?;
        let local = Local::new(offset);
        let distortion = self.ylm.evaluate(coefs.as_slice(), local.theta, local.phi);
        Ok(self
            .transition
            .original_radius_over_radius(&offset, distortion)
            .map(|ratio| self.center + offset * ratio))
    }

    fn jacobian(
        &self,
        source: &Vector3<f64>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Matrix3<f64>, MapError> {
        let [coefs, _] = self.coefficients(time, functions_of_time)?;
        let local = self.local(source)?;
        let (distortion, distortion_gradient) = self.distortion_and_gradient(&coefs, &local);
        let (falloff, falloff_gradient) = self.transition_and_gradient(&local.offset);

        let r = local.radius;
        let g = falloff * distortion / r;
        let g_gradient = (falloff_gradient * distortion + distortion_gradient * falloff) / r
            - local.offset * (falloff * distortion / (r * r * r));

        Ok(Matrix3::identity() * (1.0 - g) - local.offset * g_gradient.transpose())
    }

    fn inv_jacobian(
        &self,
        source: &Vector3<f64>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Matrix3<f64>, MapError> {
        invert(self.jacobian(source, time, functions_of_time)?, source)
    }

    fn frame_velocity(
        &self,
        source: &Vector3<f64>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Vector3<f64>, MapError> {
        let [_, rates] = self.coefficients(time, functions_of_time)?;
        let local = self.local(source)?;
        let distortion_rate = self.ylm.evaluate(rates.as_slice(), local.theta, local.phi);
        let falloff = self.transition.call(&local.offset);
        Ok(-local.offset * (falloff * distortion_rate / local.radius))
    }

    fn is_identity(&self) -> bool {
        false
    }

    fn jacobian_is_time_dependent(&self) -> bool {
        true
    }

    fn function_of_time_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::from([self.shape_name.clone()]);
        names.extend(self.size_name.iter().cloned());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::f64::consts::PI;

    use approx::assert_relative_eq;

    use crate::{
        testing::polynomial,
        transition::{Axis, SphereTransition, Wedge},
    };

    fn center() -> Vector3<f64> {
        Vector3::new(0.5, -0.2, 0.1)
    }

    fn registry() -> FunctionsOfTime {
        let mut coefs = [0.0; 9];
        let mut rates = [0.0; 9];
        coefs[Ylm::index(1, 1)] = 0.05;
        coefs[Ylm::index(2, 0)] = -0.1;
        coefs[Ylm::index(2, -2)] = 0.07;
        rates[Ylm::index(2, 0)] = 0.02;
        rates[Ylm::index(1, -1)] = -0.01;

        let mut functions_of_time = FunctionsOfTime::new();
        functions_of_time
            .insert("Shape", Box::new(polynomial(&[&coefs, &rates, &[0.0; 9]])))
            .expect("unique name");
        functions_of_time
            .insert("Size", Box::new(polynomial(&[&[0.3], &[-0.05], &[0.0]])))
            .expect("unique name");
        functions_of_time
    }

    fn sphere_map() -> Shape {
        Shape::new(
            center(),
            2,
            Box::new(SphereTransition::new(1.0, 3.0)),
            "Shape",
            Some("Size".to_string()),
        )
    }

    fn sample_points() -> Vec<Vector3<f64>> {
        [
            Vector3::new(0.2, 0.3, 0.1),
            Vector3::new(1.2, -0.8, 0.9),
            Vector3::new(-0.7, 1.9, -0.4),
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::new(2.6, 2.1, -1.0),
        ]
        .into_iter()
        .map(|offset| center() + offset)
        .collect()
    }

    #[test]
    fn size_alone_shrinks_the_inner_sphere_uniformly() {
        let map = sphere_map();
        let mut functions_of_time = FunctionsOfTime::new();
        functions_of_time
            .insert("Shape", Box::new(polynomial(&[&[0.0; 9], &[0.0; 9], &[0.0; 9]])))
            .expect("unique name");
        functions_of_time
            .insert("Size", Box::new(polynomial(&[&[0.4], &[0.0], &[0.0]])))
            .expect("unique name");

        let source = center() + Vector3::new(0.0, 1.0, 0.0);
        let mapped = map.call(&source, 0.0, &functions_of_time).expect("valid time");

        let expected_radius = 1.0 - 0.4 / (2.0 * PI.sqrt());
        assert_relative_eq!(
            mapped,
            center() + Vector3::new(0.0, expected_radius, 0.0),
            epsilon = 1e-14
        );
    }

    #[test]
    fn inverse_round_trips() {
        let functions_of_time = registry();
        let wedge_map = Shape::new(
            center(),
            2,
            Box::new(Wedge::new(1.0, 1.0, 4.0, 0.0, Axis::PlusZ, false)),
            "Shape",
            None,
        );
        for map in [sphere_map(), wedge_map] {
            for point in sample_points() {
                let mapped = map.call(&point, 1.5, &functions_of_time).expect("valid time");
                let back = map
                    .inverse(&mapped, 1.5, &functions_of_time)
                    .expect("valid time")
                    .expect("point should invert");
                assert_relative_eq!(back, point, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let map = sphere_map();
        let functions_of_time = registry();
        let h = 1e-6;

        for point in sample_points() {
            let jacobian = map.jacobian(&point, 0.8, &functions_of_time).expect("valid");
            for j in 0..3 {
                let step = Vector3::ith(j, h);
                let plus = map.call(&(point + step), 0.8, &functions_of_time).expect("valid");
                let minus = map.call(&(point - step), 0.8, &functions_of_time).expect("valid");
                let column = (plus - minus) / (2.0 * h);
                assert_relative_eq!(jacobian.column(j).into_owned(), column, epsilon = 1e-7);
            }

            let inv_jacobian = map.inv_jacobian(&point, 0.8, &functions_of_time).expect("valid");
            assert_relative_eq!(inv_jacobian * jacobian, Matrix3::identity(), epsilon = 1e-12);
        }
    }

    #[test]
    fn frame_velocity_matches_time_derivative() {
        let map = sphere_map();
        let functions_of_time = registry();
        let (time, h) = (1.0, 1e-5);

        for point in sample_points() {
            let plus = map.call(&point, time + h, &functions_of_time).expect("valid");
            let minus = map.call(&point, time - h, &functions_of_time).expect("valid");
            let velocity = map.frame_velocity(&point, time, &functions_of_time).expect("valid");
            assert_relative_eq!(velocity, (plus - minus) / (2.0 * h), epsilon = 1e-9);
        }
    }

    #[test]
    fn center_is_rejected() {
        let map = sphere_map();
        let functions_of_time = registry();

        assert!(matches!(
            map.call(&center(), 0.0, &functions_of_time),
            Err(MapError::AtCenter { .. })
        ));
        assert!(map.inverse(&center(), 0.0, &functions_of_time).expect("valid").is_none());
        assert_eq!(map.function_of_time_names().len(), 2);
    }

    #[test]
    fn equality_compares_transitions() {
        let map = sphere_map();
        let mut other = sphere_map();
        assert_eq!(map, other);

        other.transition = Box::new(SphereTransition::reversed(1.0, 3.0));
        assert_ne!(map, other);
    }
}
