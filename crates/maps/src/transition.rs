//! Radial falloff profiles that confine a shape deformation to a shell.
//!
//! A transition function is 1 where the deformation applies in full and 0
//! where it vanishes (or the reverse). Points passed to a transition function
//! are relative to the center of the shape map that owns it.

mod sphere;
mod wedge;

pub use sphere::SphereTransition;
pub use wedge::{Axis, Wedge};

use std::{any::Any, fmt};

use nalgebra::Vector3;

/// A radial falloff function with its gradient and radial inverse.
pub trait TransitionFunction: fmt::Debug + Send + Sync + Any {
    /// Returns the falloff value at `point`.
    fn call(&self, point: &Vector3<f64>) -> f64;

    /// Returns the falloff value at each of `points`.
    fn call_batch(&self, points: &[Vector3<f64>]) -> Vec<f64> {
        points.iter().map(|point| self.call(point)).collect()
    }

    /// Returns the gradient of the falloff at `point`.
    ///
    /// Only meaningful strictly inside the falloff shell; the bounds are not
    /// checked.
    fn gradient(&self, point: &Vector3<f64>) -> Vector3<f64>;

    /// Returns the gradient at each of `points`.
    fn gradient_batch(&self, points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        points.iter().map(|point| self.gradient(point)).collect()
    }

    /// Inverts the radial relation `r̃ = r - f(r) Σ` for a mapped point.
    ///
    /// Given a mapped point at radius `r̃` and the angular distortion `Σ` in
    /// its direction, returns `r / r̃`, or `None` if no source radius maps
    /// there.
    fn original_radius_over_radius(&self, point: &Vector3<f64>, distortion: f64)
    -> Option<f64>;

    fn get_clone(&self) -> Box<dyn TransitionFunction>;

    fn as_any(&self) -> &dyn Any;

    fn dyn_eq(&self, other: &dyn TransitionFunction) -> bool;
}

impl Clone for Box<dyn TransitionFunction> {
    fn clone(&self) -> Self {
        self.get_clone()
    }
}

impl PartialEq for dyn TransitionFunction {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

// Lets `#[derive(PartialEq)]` compare `Box<dyn TransitionFunction>` fields
// without moving them (rust-lang/rust#31740).
impl PartialEq<&Self> for Box<dyn TransitionFunction> {
    fn eq(&self, other: &&Self) -> bool {
        self.dyn_eq(other.as_ref())
    }
}

fn dyn_eq_as<T: TransitionFunction + PartialEq>(this: &T, other: &dyn TransitionFunction) -> bool {
    other
        .as_any()
        .downcast_ref::<T>()
        .is_some_and(|other| this == other)
}

/// Tolerance on the radial bounds when accepting an inverted radius.
const RADIUS_EPS: f64 = f64::EPSILON * 100.0;

/// The linear falloff `f(r) = a r + b` between two radii, clamped outside.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LinearFalloff {
    r_min: f64,
    r_max: f64,
    a: f64,
    b: f64,
    reverse: bool,
}

impl LinearFalloff {
    fn new(r_min: f64, r_max: f64, reverse: bool) -> Self {
        let a = -1.0 / (r_max - r_min);
        let b = -a * r_max;
        if reverse {
            Self {
                r_min,
                r_max,
                a: -a,
                b: 1.0 - b,
                reverse,
            }
        } else {
            Self {
                r_min,
                r_max,
                a,
                b,
                reverse,
            }
        }
    }

    fn inner_value(&self) -> f64 {
        if self.reverse { 0.0 } else { 1.0 }
    }

    fn outer_value(&self) -> f64 {
        if self.reverse { 1.0 } else { 0.0 }
    }

    fn value(&self, radius: f64) -> f64 {
        if radius <= self.r_min {
            self.inner_value()
        } else if radius >= self.r_max {
            self.outer_value()
        } else {
            self.a * radius + self.b
        }
    }

    /// Solves `r̃ = r - f(r) Σ` for `r`, checking each of the three regions.
    fn original_radius(&self, mapped_radius: f64, distortion: f64) -> Option<f64> {
        let inside = mapped_radius + self.inner_value() * distortion;
        if inside <= self.r_min {
            return Some(inside);
        }
        let outside = mapped_radius + self.outer_value() * distortion;
        if outside >= self.r_max {
            return Some(outside);
        }
        let denom = 1.0 - self.a * distortion;
        if denom == 0.0 {
            return None;
        }
        let radius = (mapped_radius + self.b * distortion) / denom;
        let lower = self.r_min * (1.0 - RADIUS_EPS);
        let upper = self.r_max * (1.0 + RADIUS_EPS);
        (lower..=upper).contains(&radius).then_some(radius)
    }
}
