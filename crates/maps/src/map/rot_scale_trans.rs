use std::collections::BTreeSet;

use chronomap_core::FunctionsOfTime;
use chronomap_solvers::equation::toms748::{self, Config};
use nalgebra::{DVector, Matrix3, Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{ElementaryMap, invert, radial_inv_jacobian, radial_jacobian, value_and_rate};
use crate::MapError;

/// How a [`RotScaleTrans`] map treats rotation and translation in its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockRegion {
    /// Rotation and translation apply in full at every radius.
    Inner,
    /// Rotation and translation fall off linearly to zero between the inner
    /// and outer radius.
    Transition,
}

/// Rotation, two-level expansion, and translation in three dimensions.
///
/// With scale factor `E(r)`, weight `w(r)`, rotation `R(t)`, and offset
/// `T(t)`, a point `x` at radius `r` maps to
///
/// `x̃ = E x + w (R E x - E x + T)`
///
/// The scale is the inner expansion `a(t)` inside `inner_radius`, the outer
/// expansion `b(t)` outside `outer_radius`, and between them is chosen so the
/// mapped radius `E(r) r` is linear in `r`. The weight is 1 in the
/// [`BlockRegion::Inner`] region; in the [`BlockRegion::Transition`] region it
/// falls linearly from 1 at `inner_radius` to 0 at `outer_radius`.
#[derive(Debug, Clone, PartialEq)]
pub struct RotScaleTrans {
    expansion: Option<(String, String)>,
    rotation: Option<String>,
    translation: Option<String>,
    inner_radius: f64,
    outer_radius: f64,
    region: BlockRegion,
}

/// The map parameters and their time derivatives at one time.
struct State {
    a: f64,
    a_dot: f64,
    b: f64,
    b_dot: f64,
    rotation: Matrix3<f64>,
    rotation_dot: Matrix3<f64>,
    offset: Vector3<f64>,
    offset_dot: Vector3<f64>,
}

impl RotScaleTrans {
    /// Creates the map from the names of its functions of time.
    ///
    /// `expansion` names the inner and outer expansion factors. Any component
    /// left as `None` is omitted from the map.
    ///
    /// # Errors
    ///
    /// Returns an error unless `0 < inner_radius < outer_radius`.
    pub fn new(
        expansion: Option<(String, String)>,
        rotation: Option<String>,
        translation: Option<String>,
        inner_radius: f64,
        outer_radius: f64,
        region: BlockRegion,
    ) -> Result<Self, MapError> {
        let ordered = inner_radius > 0.0 && outer_radius > inner_radius;
        if !ordered || !outer_radius.is_finite() {
            return Err(MapError::InvalidParameters {
                reason: format!(
                    "RotScaleTrans radii must satisfy 0 < inner < outer, got {inner_radius} and {outer_radius}"
                ),
            });
        }
        Ok(Self {
            expansion,
            rotation,
            translation,
            inner_radius,
            outer_radius,
            region,
        })
    }

    pub fn region(&self) -> BlockRegion {
        self.region
    }

    pub fn radii(&self) -> [f64; 2] {
        [self.inner_radius, self.outer_radius]
    }

    fn state(&self, time: f64, functions_of_time: &FunctionsOfTime) -> Result<State, MapError> {
        let (a, a_dot, b, b_dot) = match &self.expansion {
            Some((inner, outer)) => {
                let [a, a_dot] = value_and_rate(functions_of_time, inner, time, 1)?;
                let [b, b_dot] = value_and_rate(functions_of_time, outer, time, 1)?;
                (a[0], a_dot[0], b[0], b_dot[0])
            }
            None => (1.0, 0.0, 1.0, 0.0),
        };

        let (rotation, rotation_dot) = match &self.rotation {
            Some(name) => {
                let [q, q_dot] = value_and_rate(functions_of_time, name, time, 4)?;
                rotation_matrices(&q, &q_dot)
            }
            None => (Matrix3::identity(), Matrix3::zeros()),
        };

        let (offset, offset_dot) = match &self.translation {
            Some(name) => {
                let [t, t_dot] = value_and_rate(functions_of_time, name, time, 3)?;
                (
                    Vector3::from_column_slice(t.as_slice()),
                    Vector3::from_column_slice(t_dot.as_slice()),
                )
            }
            None => (Vector3::zeros(), Vector3::zeros()),
        };

        Ok(State {
            a,
            a_dot,
            b,
            b_dot,
            rotation,
            rotation_dot,
            offset,
            offset_dot,
        })
    }

    /// The scale factor `E(r)` for expansions `a` and `b`, and `dE/dr`.
    ///
    /// `E` is linear in `(a, b)`, so passing the expansion rates gives `dE/dt`.
    fn scale(&self, r: f64, a: f64, b: f64) -> (f64, f64) {
        let (r_in, r_out) = (self.inner_radius, self.outer_radius);
        if r <= r_in {
            (a, 0.0)
        } else if r >= r_out {
            (b, 0.0)
        } else {
            let width = r_out - r_in;
            let slope = (b * r_out - a * r_in) / width;
            let intercept = (a - b) * r_in * r_out / width;
            (slope + intercept / r, -intercept / (r * r))
        }
    }

    /// The rotation and translation weight `w(r)` and `dw/dr`.
    fn weight(&self, r: f64) -> (f64, f64) {
        let (r_in, r_out) = (self.inner_radius, self.outer_radius);
        match self.region {
            BlockRegion::Inner => (1.0, 0.0),
            BlockRegion::Transition if r <= r_in => (1.0, 0.0),
            BlockRegion::Transition if r >= r_out => (0.0, 0.0),
            BlockRegion::Transition => ((r_out - r) / (r_out - r_in), -1.0 / (r_out - r_in)),
        }
    }

    /// Solves `E(r) r = mapped_radius` for `r`.
    fn radial_inverse(&self, mapped_radius: f64, a: f64, b: f64) -> Option<f64> {
        let (r_in, r_out) = (self.inner_radius, self.outer_radius);
        if a > 0.0 && mapped_radius / a <= r_in {
            return Some(mapped_radius / a);
        }
        if b > 0.0 && mapped_radius / b >= r_out {
            return Some(mapped_radius / b);
        }
        let width = r_out - r_in;
        let slope = (b * r_out - a * r_in) / width;
        let intercept = (a - b) * r_in * r_out / width;
        if slope == 0.0 {
            return None;
        }
        let r = (mapped_radius - intercept) / slope;
        (r_in..=r_out).contains(&r).then_some(r)
    }

    /// Inverts the full rotation and translation, then the radial scaling.
    fn inverse_full_weight(&self, target: &Vector3<f64>, state: &State) -> Option<Vector3<f64>> {
        let scaled = state.rotation.transpose() * (target - state.offset);
        let mapped_radius = scaled.norm();
        if mapped_radius == 0.0 {
            return Some(Vector3::zeros());
        }
        self.radial_inverse(mapped_radius, state.a, state.b)
            .map(|r| scaled * (r / mapped_radius))
    }

    /// Inverts the transition region, where the weight depends on the unknown
    /// source radius.
    fn inverse_transition(
        &self,
        target: &Vector3<f64>,
        state: &State,
    ) -> Result<Option<Vector3<f64>>, MapError> {
        let (r_in, r_out) = (self.inner_radius, self.outer_radius);

        if state.a > 0.0 {
            let inside = state.rotation.transpose() * (target - state.offset) / state.a;
            if inside.norm() <= r_in {
                return Ok(Some(inside));
            }
        }
        if state.b > 0.0 {
            let outside = target / state.b;
            if outside.norm() >= r_out {
                return Ok(Some(outside));
            }
        }

        let source_at = |r: f64| -> Option<Vector3<f64>> {
            let (scale, _) = self.scale(r, state.a, state.b);
            let (w, _) = self.weight(r);
            let blend = Matrix3::identity() + (state.rotation - Matrix3::identity()) * w;
            blend
                .try_inverse()
                .map(|inv| inv * (target - state.offset * w) / scale)
        };
        let residual = |r: f64| source_at(r).map_or(f64::NAN, |source| source.norm() - r);

        let (lower, upper) = (residual(r_in), residual(r_out));
        if !lower.is_finite() || !upper.is_finite() || lower.signum() == upper.signum() {
            return Ok(None);
        }

        let solution = toms748::find_root(residual, [r_in, r_out], &Config::default())?;
        if !solution.is_converged() {
            return Err(MapError::NotConverged {
                iters: solution.iters,
                x: solution.x,
            });
        }
        trace!(radius = solution.x, iters = solution.iters, "inverted RotScaleTrans transition");
        Ok(source_at(solution.x))
    }
}

/// Rotation matrix of a quaternion `[w, x, y, z]` and its time derivative.
fn rotation_matrices(q: &DVector<f64>, q_dot: &DVector<f64>) -> (Matrix3<f64>, Matrix3<f64>) {
    let unit = UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3]));
    let q_dot = Quaternion::new(q_dot[0], q_dot[1], q_dot[2], q_dot[3]);
    let rotation = unit.to_rotation_matrix().into_inner();
    let q = unit.into_inner();

    let mut rotation_dot = Matrix3::zeros();
    for i in 0..3 {
        let basis = Quaternion::from_imag(Vector3::ith(i, 1.0));
        let column = (q_dot * basis * q.conjugate() + q * basis * q_dot.conjugate()).imag();
        rotation_dot.set_column(i, &column);
    }
    (rotation, rotation_dot)
}

impl ElementaryMap<3> for RotScaleTrans {
    fn call(
        &self,
        source: &Vector3<f64>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Vector3<f64>, MapError> {
        let state = self.state(time, functions_of_time)?;
        let r = source.norm();
        let (scale, _) = self.scale(r, state.a, state.b);
        let (w, _) = self.weight(r);
        let scaled = source * scale;
        Ok(scaled + (state.rotation * scaled - scaled + state.offset) * w)
    }

    fn inverse(
        &self,
        target: &Vector3<f64>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Option<Vector3<f64>>, MapError> {
        let state = self.state(time, functions_of_time)?;
        match self.region {
            BlockRegion::Inner => Ok(self.inverse_full_weight(target, &state)),
            BlockRegion::Transition => self.inverse_transition(target, &state),
        }
    }

    fn jacobian(
        &self,
        source: &Vector3<f64>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Matrix3<f64>, MapError> {
        let state = self.state(time, functions_of_time)?;
        let r = source.norm();
        let (scale, d_scale) = self.scale(r, state.a, state.b);
        let (w, dw) = self.weight(r);

        let blend = Matrix3::identity() + (state.rotation - Matrix3::identity()) * w;
        let mut jacobian = blend * radial_jacobian(source, scale, d_scale);
        if dw != 0.0 {
            let scaled = source * scale;
            let shift = state.rotation * scaled - scaled + state.offset;
            jacobian += shift * (source / r).transpose() * dw;
        }
        Ok(jacobian)
    }

    fn inv_jacobian(
        &self,
        source: &Vector3<f64>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Matrix3<f64>, MapError> {
        let state = self.state(time, functions_of_time)?;
        let r = source.norm();
        let (scale, d_scale) = self.scale(r, state.a, state.b);
        match self.weight(r) {
            (w, dw) if dw == 0.0 && w == 1.0 => {
                Ok(radial_inv_jacobian(source, scale, d_scale)? * state.rotation.transpose())
            }
            (w, dw) if dw == 0.0 && w == 0.0 => radial_inv_jacobian(source, scale, d_scale),
            _ => invert(self.jacobian(source, time, functions_of_time)?, source),
        }
    }

    fn frame_velocity(
        &self,
        source: &Vector3<f64>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Vector3<f64>, MapError> {
        let state = self.state(time, functions_of_time)?;
        let r = source.norm();
        let (scale, _) = self.scale(r, state.a, state.b);
        let (scale_dot, _) = self.scale(r, state.a_dot, state.b_dot);
        let (w, _) = self.weight(r);

        let scaled = source * scale;
        let scaled_dot = source * scale_dot;
        let rotated_dot = state.rotation_dot * scaled + state.rotation * scaled_dot;
        Ok(scaled_dot + (rotated_dot - scaled_dot + state.offset_dot) * w)
    }

    fn is_identity(&self) -> bool {
        self.expansion.is_none() && self.rotation.is_none() && self.translation.is_none()
    }

    fn jacobian_is_time_dependent(&self) -> bool {
        self.expansion.is_some()
            || self.rotation.is_some()
            || (self.region == BlockRegion::Transition && self.translation.is_some())
    }

    fn function_of_time_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        if let Some((inner, outer)) = &self.expansion {
            names.insert(inner.clone());
            names.insert(outer.clone());
        }
        names.extend(self.rotation.iter().cloned());
        names.extend(self.translation.iter().cloned());
        names
    }
}
