use std::any::Any;

use nalgebra::{DVector, Quaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::{FunctionOfTime, PiecewisePolynomial, dyn_eq_as};
use crate::Error;

/// Largest rotation angle covered by a single integration substep.
const MAX_STEP_ANGLE: f64 = 0.01;
const MAX_STEPS: usize = 100_000;

/// A unit quaternion driven by a piecewise polynomial rotation angle.
///
/// The angle polynomial stores the rotation angle vector and its derivatives;
/// its first derivative is the angular velocity `ω`. The quaternion obeys
/// `dq/dt = ½ q ω` and is integrated from the quaternion stored at the start
/// of each angle segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuaternionFunctionOfTime<const MAX_DERIV: usize> {
    angle: PiecewisePolynomial<MAX_DERIV>,
    stored_quaternions: Vec<Quaternion<f64>>,
}

impl<const MAX_DERIV: usize> QuaternionFunctionOfTime<MAX_DERIV> {
    /// Creates a rotation from an initial quaternion `[w, x, y, z]` and the
    /// initial angle and its `MAX_DERIV` derivatives.
    ///
    /// # Errors
    ///
    /// Returns an error if the quaternion does not have four components, the
    /// angles are not 3-vectors, or the angle polynomial is invalid.
    pub fn new(
        time: f64,
        initial_quaternion: DVector<f64>,
        initial_angles: impl Into<Vec<DVector<f64>>>,
        expiration: f64,
    ) -> Result<Self, Error> {
        if initial_quaternion.len() != 4 {
            return Err(Error::WrongComponentCount {
                expected: 4,
                actual: initial_quaternion.len(),
            });
        }
        let angle = PiecewisePolynomial::new(time, initial_angles, expiration)?;
        if angle.dimension() != 3 {
            return Err(Error::WrongComponentCount {
                expected: 3,
                actual: angle.dimension(),
            });
        }
        Ok(Self {
            angle,
            stored_quaternions: vec![to_quaternion(&initial_quaternion)],
        })
    }

    /// Returns the rotation angle at `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if `time` is outside the validity window.
    pub fn angle_func(&self, time: f64) -> Result<[DVector<f64>; 1], Error> {
        self.angle.func(time)
    }

    /// Returns the rotation angle and angular velocity at `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if `time` is outside the validity window.
    pub fn angle_func_and_deriv(&self, time: f64) -> Result<[DVector<f64>; 2], Error> {
        self.angle.func_and_deriv(time)
    }

    /// Returns the rotation angle and its first two derivatives at `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if `time` is outside the validity window.
    pub fn angle_func_and_2_derivs(&self, time: f64) -> Result<[DVector<f64>; 3], Error> {
        self.angle.func_and_2_derivs(time)
    }

    /// Returns the quaternion at `time` as a nalgebra quaternion.
    ///
    /// # Errors
    ///
    /// Returns an error if `time` is outside the validity window.
    pub fn quaternion(&self, time: f64) -> Result<Quaternion<f64>, Error> {
        let idx = self.angle.segment_index(time)?;
        Ok(self.propagate(idx, time))
    }

    /// Checks a decoded rotation against the invariants `new` and `update`
    /// maintain.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        self.angle.validate()?;
        if self.angle.dimension() != 3 {
            return Err(Error::WrongComponentCount {
                expected: 3,
                actual: self.angle.dimension(),
            });
        }
        if self.stored_quaternions.len() != self.angle.segment_count() {
            return Err(Error::Malformed {
                kind: "QuaternionFunctionOfTime",
                reason: format!(
                    "{} stored quaternions for {} angle segments",
                    self.stored_quaternions.len(),
                    self.angle.segment_count()
                ),
            });
        }
        Ok(())
    }

    /// Integrates stored quaternions for angle segments applied since the last call.
    fn sync_quaternions(&mut self) {
        while self.stored_quaternions.len() < self.angle.segment_count() {
            let prev = self.stored_quaternions.len() - 1;
            let end = self.angle.segment_time(prev + 1);
            let q = self.propagate(prev, end);
            self.stored_quaternions.push(q);
        }
    }

    /// Advances the quaternion stored at the start of `segment` to `time`.
    ///
    /// Each substep applies the fourth-order Magnus exponential for
    /// `dq/dt = ½ q ω` using the exact angle increment over the step plus the
    /// commutator correction from the two Gauss points.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn propagate(&self, segment: usize, time: f64) -> Quaternion<f64> {
        let start = self.angle.segment_time(segment);
        let mut q = self.stored_quaternions[segment];
        let span = time - start;
        if span <= 0.0 {
            return q;
        }

        let omega = |t: f64| to_vector3(&self.angle.evaluate_segment(segment, t, 1));
        let theta = |t: f64| to_vector3(&self.angle.evaluate_segment(segment, t, 0));

        let rate = omega(start).norm().max(omega(time).norm());
        let steps = ((span * rate / MAX_STEP_ANGLE).ceil() as usize).clamp(1, MAX_STEPS);
        let h = span / steps as f64;
        let offset = 3.0_f64.sqrt() / 6.0;
        let commutator_factor = 3.0_f64.sqrt() / 24.0 * h * h;

        let mut a = start;
        let mut theta_a = theta(a);
        for step in 1..=steps {
            let b = if step == steps {
                time
            } else {
                start + h * step as f64
            };
            let theta_b = theta(b);
            let w1 = omega(a + h * (0.5 - offset));
            let w2 = omega(a + h * (0.5 + offset));
            let exponent = 0.5 * (theta_b - theta_a) + commutator_factor * w1.cross(&w2);
            q *= Quaternion::from_imag(exponent).exp();
            a = b;
            theta_a = theta_b;
        }
        q.normalize()
    }
}

impl<const MAX_DERIV: usize> FunctionOfTime for QuaternionFunctionOfTime<MAX_DERIV> {
    fn time_bounds(&self) -> [f64; 2] {
        self.angle.time_bounds()
    }

    fn expiration_after(&self, time: f64) -> f64 {
        self.angle.expiration_after(time)
    }

    fn max_deriv(&self) -> usize {
        MAX_DERIV.min(3)
    }

    /// Returns the quaternion `[w, x, y, z]` and up to three derivatives.
    fn func_and_n_derivs(&self, time: f64, n: usize) -> Result<Vec<DVector<f64>>, Error> {
        if n > MAX_DERIV {
            return Err(Error::InsufficientAngleDerivatives {
                ordinal: ordinal(n),
                available: MAX_DERIV,
            });
        }
        if n > 3 {
            return Err(Error::InsufficientDerivatives {
                requested: n,
                available: 3,
            });
        }

        let angles = self.angle.func_and_n_derivs(time, n)?;
        let idx = self.angle.segment_index(time)?;
        let q = self.propagate(idx, time);
        let w: Vec<_> = angles
            .iter()
            .skip(1)
            .map(|a| Quaternion::from_imag(to_vector3(a)))
            .collect();

        let mut result = vec![q];
        if n >= 1 {
            let dq = q * w[0] * 0.5;
            result.push(dq);
            if n >= 2 {
                let d2q = (dq * w[0] + q * w[1]) * 0.5;
                result.push(d2q);
                if n >= 3 {
                    result.push((d2q * w[0] + dq * w[1] * 2.0 + q * w[2]) * 0.5);
                }
            }
        }
        Ok(result.iter().map(from_quaternion).collect())
    }

    /// Forwards the new highest angle derivative to the angle polynomial.
    fn update(
        &mut self,
        time: f64,
        updated_max_deriv: DVector<f64>,
        next_expiration: f64,
    ) -> Result<(), Error> {
        let result = self.angle.update(time, updated_max_deriv, next_expiration);
        self.sync_quaternions();
        result
    }

    fn truncate_at_time(&mut self, time: f64) {
        let before = self.angle.segment_count();
        self.angle.truncate_at_time(time);
        let removed = before - self.angle.segment_count();
        self.stored_quaternions.drain(..removed);
    }

    fn get_clone(&self) -> Box<dyn FunctionOfTime> {
        Box::new(self.clone())
    }

    fn create_at_time(
        &self,
        time: f64,
        expiration: f64,
    ) -> Result<Box<dyn FunctionOfTime>, Error> {
        let angles = self.angle.func_and_n_derivs(time, MAX_DERIV)?;
        let q = from_quaternion(&self.quaternion(time)?);
        Ok(Box::new(Self::new(time, q, angles, expiration)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn FunctionOfTime) -> bool {
        dyn_eq_as(self, other)
    }
}

fn ordinal(n: usize) -> &'static str {
    match n {
        1 => "first",
        2 => "second",
        3 => "third",
        _ => "requested",
    }
}

fn to_vector3(v: &DVector<f64>) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

fn to_quaternion(v: &DVector<f64>) -> Quaternion<f64> {
    Quaternion::new(v[0], v[1], v[2], v[3])
}

fn from_quaternion(q: &Quaternion<f64>) -> DVector<f64> {
    DVector::from_vec(vec![q.w, q.i, q.j, q.k])
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn dv(values: &[f64]) -> DVector<f64> {
        DVector::from_row_slice(values)
    }

    fn identity() -> DVector<f64> {
        dv(&[1.0, 0.0, 0.0, 0.0])
    }

    #[test]
    fn constant_angular_velocity_matches_closed_form() {
        let omega_z = 1.3333;
        let mut qfot = QuaternionFunctionOfTime::<2>::new(
            0.0,
            identity(),
            [dv(&[0.0; 3]), dv(&[0.0, 0.0, omega_z]), dv(&[0.0; 3])],
            0.5,
        )
        .expect("valid rotation");

        let mut time = 0.0;
        let mut expiration = 0.5;
        for _ in 0..15 {
            time += 0.5;
            expiration += 0.5;
            qfot.update(time, dv(&[0.0; 3]), expiration)
                .expect("update at expiration");
            assert_eq!(qfot.expiration_after(time), expiration);
            assert_eq!(qfot.expiration_after(time - 0.25), time);
        }

        let check_time = 5.398;
        let [q, dq, d2q] = qfot.func_and_2_derivs(check_time).expect("in bounds");
        let half_angle = 0.5 * omega_z * check_time;
        assert_relative_eq!(q[0], half_angle.cos(), max_relative = 1e-12);
        assert_relative_eq!(q[3], half_angle.sin(), max_relative = 1e-12);
        assert_relative_eq!(q[1], 0.0, epsilon = 1e-14);
        assert_relative_eq!(dq[0], -0.5 * omega_z * half_angle.sin(), max_relative = 1e-12);
        assert_relative_eq!(dq[3], 0.5 * omega_z * half_angle.cos(), max_relative = 1e-12);
        assert_relative_eq!(
            d2q[0],
            -0.25 * omega_z * omega_z * half_angle.cos(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn linear_angular_velocity_about_a_fixed_axis() {
        // ω(t) = 0.5 + 0.5 t about z, so the angle is 0.5 t + 0.25 t².
        let mut qfot = QuaternionFunctionOfTime::<3>::new(
            0.0,
            identity(),
            [
                dv(&[0.0; 3]),
                dv(&[0.0, 0.0, 0.5]),
                dv(&[0.0, 0.0, 0.5]),
                dv(&[0.0; 3]),
            ],
            0.5,
        )
        .expect("valid rotation");
        for step in 1..=6 {
            let time = 0.5 * f64::from(step);
            qfot.update(time, dv(&[0.0; 3]), time + 0.5)
                .expect("update at expiration");
        }

        let t: f64 = 2.7;
        let phi = 0.5 * t + 0.25 * t * t;
        let omega = 0.5 + 0.5 * t;
        let derivs = qfot.func_and_n_derivs(t, 3).expect("in bounds");

        assert_relative_eq!(derivs[0][0], (0.5 * phi).cos(), max_relative = 1e-12);
        assert_relative_eq!(derivs[0][3], (0.5 * phi).sin(), max_relative = 1e-12);
        assert_relative_eq!(
            derivs[1][3],
            0.5 * omega * (0.5 * phi).cos(),
            max_relative = 1e-12
        );
        assert_relative_eq!(
            derivs[2][3],
            0.25 * (-omega * omega * (0.5 * phi).sin() + 2.0 * 0.25 * 2.0 * (0.5 * phi).cos()),
            max_relative = 1e-12
        );
    }

    #[test]
    fn values_and_derivatives_at_time_two() {
        let qfot = QuaternionFunctionOfTime::<2>::new(
            0.0,
            identity(),
            [dv(&[0.0; 3]), dv(&[0.0, 0.0, 1.0]), dv(&[0.0; 3])],
            2.5,
        )
        .expect("valid rotation");
        fn check(f: &dyn FunctionOfTime) {
            let expected_q = [1.0_f64.cos(), 0.0, 0.0, 1.0_f64.sin()];
            let expected_dq = [-0.5 * 1.0_f64.sin(), 0.0, 0.0, 0.5 * 1.0_f64.cos()];
            let [q, dq] = f.func_and_deriv(2.0).expect("in bounds");
            for i in 0..4 {
                assert_relative_eq!(q[i], expected_q[i], epsilon = 1e-13);
                assert_relative_eq!(dq[i], expected_dq[i], epsilon = 1e-13);
            }
        }
        check(&qfot);
        check(qfot.get_clone().as_ref());
        check(qfot.create_at_time(0.7, 2.8).expect("valid time").as_ref());

        let err = qfot
            .func_and_n_derivs(2.0, 3)
            .expect_err("only two angle derivatives");
        assert_eq!(
            err.to_string(),
            "Need more angle derivs to compute the third derivative of the quaternion. \
             Currently only have 2"
        );
    }

    #[test]
    fn angle_functions_match_the_angle_polynomial() {
        let angles = [dv(&[0.1, 0.2, 0.3]), dv(&[0.0, 0.5, 1.0]), dv(&[0.2; 3])];
        let mut qfot = QuaternionFunctionOfTime::<2>::new(0.0, identity(), angles.clone(), 0.5)
            .expect("valid rotation");
        let mut pp = PiecewisePolynomial::<2>::new(0.0, angles, 0.5).expect("valid polynomial");
        qfot.update(0.5, dv(&[0.0; 3]), 1.0).expect("update");
        pp.update(0.5, dv(&[0.0; 3]), 1.0).expect("update");

        assert_eq!(
            qfot.angle_func_and_2_derivs(0.4).expect("in bounds"),
            pp.func_and_2_derivs(0.4).expect("in bounds")
        );
        assert_eq!(
            qfot.angle_func(0.8).expect("in bounds"),
            pp.func(0.8).expect("in bounds")
        );
    }

    #[test]
    fn out_of_order_updates_replay_once_the_gap_is_filled() {
        let zero = dv(&[0.0; 3]);
        let mut qfot = QuaternionFunctionOfTime::<2>::new(
            0.0,
            identity(),
            [zero.clone(), zero.clone(), zero.clone()],
            0.5,
        )
        .expect("valid rotation");

        qfot.update(2.5, zero.clone(), 3.0).expect("buffered");
        qfot.update(1.5, zero.clone(), 2.0).expect("buffered");
        let err = qfot.func(0.7).expect_err("past expiration");
        assert!(
            err.to_string()
                .contains(", which is after the expiration time 0.5")
        );

        qfot.update(0.5, zero.clone(), 1.0).expect("applied");
        assert_eq!(qfot.func(0.7).expect("in bounds"), [identity()]);
        assert!(qfot.func(1.3).is_err());
        assert!(qfot.func(1.9).is_err());

        qfot.update(2.0, zero.clone(), 2.5).expect("buffered");
        assert!(qfot.func(1.3).is_err());
        assert!(qfot.func(1.9).is_err());

        qfot.update(1.0, zero, 1.5).expect("applied with replay");
        for time in [1.3, 1.9, 2.2, 2.8] {
            assert_eq!(qfot.func(time).expect("in bounds"), [identity()]);
        }
        assert_eq!(qfot.time_bounds(), [0.0, 3.0]);
    }

    #[test]
    fn truncation_keeps_quaternions_aligned_with_segments() {
        let mut qfot = QuaternionFunctionOfTime::<2>::new(
            0.0,
            identity(),
            [dv(&[0.0; 3]), dv(&[0.3, 0.0, 1.0]), dv(&[0.0; 3])],
            1.0,
        )
        .expect("valid rotation");
        qfot.update(1.0, dv(&[0.0, 0.1, 0.0]), 2.0).expect("update");
        qfot.update(2.0, dv(&[0.0; 3]), 3.0).expect("update");
        let expected = qfot.func_and_2_derivs(2.5).expect("in bounds");

        qfot.truncate_at_time(2.1);
        assert_eq!(qfot.time_bounds(), [2.0, 3.0]);
        assert_eq!(qfot.func_and_2_derivs(2.5).expect("in bounds"), expected);
    }

    #[test]
    fn quaternions_follow_segments_after_a_superseded_update() {
        let mut qfot = QuaternionFunctionOfTime::<2>::new(
            0.0,
            identity(),
            [dv(&[0.0; 3]), dv(&[0.0, 0.0, 1.0]), dv(&[0.0; 3])],
            1.0,
        )
        .expect("valid rotation");

        qfot.update(2.0, dv(&[0.0; 3]), 3.0).expect("buffered");
        qfot.update(1.0, dv(&[0.0; 3]), 2.5).expect("applied");
        assert!(matches!(
            qfot.update(0.5, dv(&[0.0; 3]), 3.0),
            Err(Error::UpdateBeforeExpiration { .. })
        ));
        assert!(qfot.validate().is_ok());

        let [q] = qfot.func(1.5).expect("in bounds");
        assert_relative_eq!(q[0], 0.75_f64.cos(), epsilon = 1e-12);
        assert_relative_eq!(q[3], 0.75_f64.sin(), epsilon = 1e-12);

        qfot.update(2.5, dv(&[0.0; 3]), 4.0).expect("fills the gap");
        let [q] = qfot.func(3.5).expect("in bounds");
        assert_relative_eq!(q[0], 1.75_f64.cos(), epsilon = 1e-12);
        assert_relative_eq!(q[3], 1.75_f64.sin(), epsilon = 1e-12);
    }

    #[test]
    fn validation_requires_one_quaternion_per_segment() {
        let mut qfot = QuaternionFunctionOfTime::<2>::new(
            0.0,
            identity(),
            [dv(&[0.0; 3]), dv(&[0.0, 0.0, 1.0]), dv(&[0.0; 3])],
            1.0,
        )
        .expect("valid rotation");
        qfot.stored_quaternions.clear();
        assert!(matches!(qfot.validate(), Err(Error::Malformed { .. })));
    }
}
