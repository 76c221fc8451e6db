use std::any::Any;

use nalgebra::Vector3;

use super::{LinearFalloff, TransitionFunction, dyn_eq_as};

/// A transition that falls off linearly in radius, `f(r) = a r + b`.
///
/// The value is 1 at `r_min` and 0 at `r_max`, clamped to those values inside
/// and outside the shell. A reversed transition rises from 0 to 1 instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereTransition {
    falloff: LinearFalloff,
}

impl SphereTransition {
    pub fn new(r_min: f64, r_max: f64) -> Self {
        Self::with_direction(r_min, r_max, false)
    }

    pub fn reversed(r_min: f64, r_max: f64) -> Self {
        Self::with_direction(r_min, r_max, true)
    }

    fn with_direction(r_min: f64, r_max: f64, reverse: bool) -> Self {
        Self {
            falloff: LinearFalloff::new(r_min, r_max, reverse),
        }
    }

    pub fn r_min(&self) -> f64 {
        self.falloff.r_min
    }

    pub fn r_max(&self) -> f64 {
        self.falloff.r_max
    }

    pub fn is_reversed(&self) -> bool {
        self.falloff.reverse
    }
}

impl TransitionFunction for SphereTransition {
    fn call(&self, point: &Vector3<f64>) -> f64 {
        self.falloff.value(point.norm())
    }

    fn gradient(&self, point: &Vector3<f64>) -> Vector3<f64> {
        point * (self.falloff.a / point.norm())
    }

    fn original_radius_over_radius(
        &self,
        point: &Vector3<f64>,
        distortion: f64,
    ) -> Option<f64> {
        let mapped_radius = point.norm();
        if mapped_radius == 0.0 {
            return None;
        }
        self.falloff
            .original_radius(mapped_radius, distortion)
            .map(|radius| radius / mapped_radius)
    }

    fn get_clone(&self) -> Box<dyn TransitionFunction> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn TransitionFunction) -> bool {
        dyn_eq_as(self, other)
    }
}
