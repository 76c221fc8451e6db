use std::any::Any;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::{LinearFalloff, TransitionFunction, dyn_eq_as};

/// The axis a wedge opens along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    PlusX,
    MinusX,
    PlusY,
    MinusY,
    PlusZ,
    MinusZ,
}

impl Axis {
    /// Index of the Cartesian component along this axis.
    pub fn component(self) -> usize {
        match self {
            Self::PlusX | Self::MinusX => 0,
            Self::PlusY | Self::MinusY => 1,
            Self::PlusZ | Self::MinusZ => 2,
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Self::PlusX | Self::PlusY | Self::PlusZ => 1.0,
            Self::MinusX | Self::MinusY | Self::MinusZ => -1.0,
        }
    }
}

/// A transition between two surfaces that blend from cubical to spherical.
///
/// Each surface is described by a radius `R` and a sphericity `s`. Along the
/// direction `x̂`, the surface lies at distance
/// `D(x̂) = R [(1 - s) / (√3 |x̂ₐ|) + s]`, where `x̂ₐ` is the component along the
/// wedge axis: a sphericity of 1 gives a sphere of radius `R`, and a sphericity
/// of 0 gives the face of the cube inscribed in that sphere. The value falls
/// linearly from 1 on the inner surface to 0 on the outer one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wedge {
    inner_radius: f64,
    inner_sphericity: f64,
    outer_radius: f64,
    outer_sphericity: f64,
    axis: Axis,
    reverse: bool,
}

impl Wedge {
    pub fn new(
        inner_radius: f64,
        inner_sphericity: f64,
        outer_radius: f64,
        outer_sphericity: f64,
        axis: Axis,
        reverse: bool,
    ) -> Self {
        Self {
            inner_radius,
            inner_sphericity,
            outer_radius,
            outer_sphericity,
            axis,
            reverse,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    /// The falloff along the ray through `point`.
    fn falloff(&self, point: &Vector3<f64>) -> LinearFalloff {
        let direction_ratio = point.norm() / point[self.axis.component()].abs();
        LinearFalloff::new(
            surface_distance(self.inner_radius, self.inner_sphericity, direction_ratio),
            surface_distance(self.outer_radius, self.outer_sphericity, direction_ratio),
            self.reverse,
        )
    }

    /// Gradient of the surface distance with respect to `point`.
    fn surface_gradient(&self, radius: f64, sphericity: f64, point: &Vector3<f64>) -> Vector3<f64> {
        let idx = self.axis.component();
        let r = point.norm();
        let along = point[idx];
        let mut ratio_gradient = point / (r * along.abs());
        ratio_gradient[idx] -= r * along.signum() / (along * along);
        ratio_gradient * (radius * (1.0 - sphericity) / 3.0_f64.sqrt())
    }
}

/// Distance to a surface of the given radius and sphericity along a ray whose
/// `|x| / |xₐ|` ratio is `direction_ratio`.
fn surface_distance(radius: f64, sphericity: f64, direction_ratio: f64) -> f64 {
    radius * ((1.0 - sphericity) * direction_ratio / 3.0_f64.sqrt() + sphericity)
}

impl TransitionFunction for Wedge {
    fn call(&self, point: &Vector3<f64>) -> f64 {
        self.falloff(point).value(point.norm())
    }

    fn gradient(&self, point: &Vector3<f64>) -> Vector3<f64> {
        let falloff = self.falloff(point);
        let (inner, outer) = (falloff.r_min, falloff.r_max);
        let width = outer - inner;
        let r = point.norm();

        let inner_gradient = self.surface_gradient(self.inner_radius, self.inner_sphericity, point);
        let outer_gradient = self.surface_gradient(self.outer_radius, self.outer_sphericity, point);

        let gradient = (outer_gradient - point / r) / width
            - (outer_gradient - inner_gradient) * ((outer - r) / (width * width));
        if self.reverse { -gradient } else { gradient }
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
        self.falloff(point)
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
