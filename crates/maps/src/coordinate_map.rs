//! Frame-tagged compositions of elementary maps.

use std::{any::Any, collections::BTreeSet, fmt, marker::PhantomData};

use chronomap_core::FunctionsOfTime;
use nalgebra::{SMatrix, SVector};

use crate::{MapError, frame::Frame, map::ElementaryMap};

/// The mapped point together with both Jacobians and the frame velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordsFrameVelocityJacobians<const D: usize> {
    pub coords: SVector<f64, D>,
    pub inv_jacobian: SMatrix<f64, D, D>,
    pub jacobian: SMatrix<f64, D, D>,
    pub frame_velocity: SVector<f64, D>,
}

/// A map from frame `Src` to frame `Tgt`.
///
/// The composition itself is a single [`ElementaryMap`], usually a nest of
/// [`Chain`](crate::map::Chain)s, so the stages are fixed by the type and
/// dispatched statically.
pub struct CoordinateMap<Src, Tgt, M, const D: usize> {
    map: M,
    frames: PhantomData<(Src, Tgt)>,
}

impl<Src, Tgt, M: fmt::Debug, const D: usize> fmt::Debug for CoordinateMap<Src, Tgt, M, D>
where
    Src: Frame,
    Tgt: Frame,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinateMap")
            .field("source", &Src::NAME)
            .field("target", &Tgt::NAME)
            .field("map", &self.map)
            .finish()
    }
}

impl<Src, Tgt, M: Clone, const D: usize> Clone for CoordinateMap<Src, Tgt, M, D> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            frames: PhantomData,
        }
    }
}

impl<Src, Tgt, M: PartialEq, const D: usize> PartialEq for CoordinateMap<Src, Tgt, M, D> {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<Src, Tgt, M, const D: usize> CoordinateMap<Src, Tgt, M, D>
where
    Src: Frame,
    Tgt: Frame,
    M: ElementaryMap<D>,
{
    pub fn new(map: M) -> Self {
        Self {
            map,
            frames: PhantomData,
        }
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    /// Maps a source point into the target frame.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails to evaluate.
    pub fn call(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError> {
        self.map.call(source, time, functions_of_time)
    }

    /// Maps every point in `sources`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any point.
    pub fn call_batch(
        &self,
        sources: &[SVector<f64, D>],
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Vec<SVector<f64, D>>, MapError> {
        sources
            .iter()
            .map(|source| self.map.call(source, time, functions_of_time))
            .collect()
    }

    /// Maps a target point back into the source frame.
    ///
    /// Returns `Ok(None)` if some stage has no preimage for the point. There
    /// is no batched inverse.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails to evaluate.
    pub fn inverse(
        &self,
        target: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Option<SVector<f64, D>>, MapError> {
        self.map.inverse(target, time, functions_of_time)
    }

    /// # Errors
    ///
    /// Returns an error if any stage fails to evaluate.
    pub fn jacobian(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError> {
        self.map.jacobian(source, time, functions_of_time)
    }

    /// # Errors
    ///
    /// Returns the first error raised by any point.
    pub fn jacobian_batch(
        &self,
        sources: &[SVector<f64, D>],
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Vec<SMatrix<f64, D, D>>, MapError> {
        sources
            .iter()
            .map(|source| self.map.jacobian(source, time, functions_of_time))
            .collect()
    }

    /// Composes the analytic inverse Jacobians of every stage.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails to evaluate.
    pub fn inv_jacobian(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError> {
        self.map.inv_jacobian(source, time, functions_of_time)
    }

    /// Evaluates the mapped point, both Jacobians, and the frame velocity.
    ///
    /// The inverse Jacobian is the numerical inverse of the forward one.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails to evaluate or the Jacobian is
    /// singular.
    pub fn coords_frame_velocity_jacobians(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<CoordsFrameVelocityJacobians<D>, MapError> {
        let coords = self.map.call(source, time, functions_of_time)?;
        let jacobian = self.map.jacobian(source, time, functions_of_time)?;
        let frame_velocity = self.map.frame_velocity(source, time, functions_of_time)?;
        let inv_jacobian = jacobian
            .try_inverse()
            .ok_or_else(|| MapError::SingularJacobian {
                point: source.iter().copied().collect(),
            })?;
        Ok(CoordsFrameVelocityJacobians {
            coords,
            inv_jacobian,
            jacobian,
            frame_velocity,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.map.is_identity()
    }

    pub fn jacobian_is_time_dependent(&self) -> bool {
        self.map.jacobian_is_time_dependent()
    }

    pub fn inv_jacobian_is_time_dependent(&self) -> bool {
        self.map.inv_jacobian_is_time_dependent()
    }

    pub fn function_of_time_names(&self) -> BTreeSet<String> {
        self.map.function_of_time_names()
    }

    /// Reuses the same stages between a different pair of frames.
    pub fn retarget<NewSrc: Frame, NewTgt: Frame>(self) -> CoordinateMap<NewSrc, NewTgt, M, D> {
        CoordinateMap::new(self.map)
    }
}

/// An object-safe view of a [`CoordinateMap`] with its stages erased.
///
/// Blocks that use different compositions between the same two frames are
/// stored side by side as `Box<dyn CoordinateMapBase<Src, Tgt, D>>`.
pub trait CoordinateMapBase<Src: Frame, Tgt: Frame, const D: usize>:
    fmt::Debug + Send + Sync + Any
{
    /// # Errors
    ///
    /// Returns an error if any stage fails to evaluate.
    fn call(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError>;

    /// # Errors
    ///
    /// Returns an error if any stage fails to evaluate.
    fn inverse(
        &self,
        target: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Option<SVector<f64, D>>, MapError>;

    /// # Errors
    ///
    /// Returns an error if any stage fails to evaluate.
    fn jacobian(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError>;

    /// # Errors
    ///
    /// Returns an error if any stage fails to evaluate.
    fn inv_jacobian(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError>;

    /// # Errors
    ///
    /// Returns an error if any stage fails to evaluate or the Jacobian is
    /// singular.
    fn coords_frame_velocity_jacobians(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<CoordsFrameVelocityJacobians<D>, MapError>;

    fn is_identity(&self) -> bool;

    fn jacobian_is_time_dependent(&self) -> bool;

    fn inv_jacobian_is_time_dependent(&self) -> bool;

    fn function_of_time_names(&self) -> BTreeSet<String>;

    fn get_clone(&self) -> Box<dyn CoordinateMapBase<Src, Tgt, D>>;

    fn as_any(&self) -> &dyn Any;

    fn dyn_eq(&self, other: &dyn CoordinateMapBase<Src, Tgt, D>) -> bool;
}

impl<Src, Tgt, M, const D: usize> CoordinateMapBase<Src, Tgt, D> for CoordinateMap<Src, Tgt, M, D>
where
    Src: Frame,
    Tgt: Frame,
    M: ElementaryMap<D>,
{
    fn call(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError> {
        CoordinateMap::call(self, source, time, functions_of_time)
    }

    fn inverse(
        &self,
        target: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Option<SVector<f64, D>>, MapError> {
        CoordinateMap::inverse(self, target, time, functions_of_time)
    }

    fn jacobian(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError> {
        CoordinateMap::jacobian(self, source, time, functions_of_time)
    }

    fn inv_jacobian(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError> {
        CoordinateMap::inv_jacobian(self, source, time, functions_of_time)
    }

    fn coords_frame_velocity_jacobians(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<CoordsFrameVelocityJacobians<D>, MapError> {
        CoordinateMap::coords_frame_velocity_jacobians(self, source, time, functions_of_time)
    }

    fn is_identity(&self) -> bool {
        CoordinateMap::is_identity(self)
    }

    fn jacobian_is_time_dependent(&self) -> bool {
        CoordinateMap::jacobian_is_time_dependent(self)
    }

    fn inv_jacobian_is_time_dependent(&self) -> bool {
        CoordinateMap::inv_jacobian_is_time_dependent(self)
    }

    fn function_of_time_names(&self) -> BTreeSet<String> {
        CoordinateMap::function_of_time_names(self)
    }

    fn get_clone(&self) -> Box<dyn CoordinateMapBase<Src, Tgt, D>> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn CoordinateMapBase<Src, Tgt, D>) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }
}

impl<Src: Frame, Tgt: Frame, const D: usize> Clone for Box<dyn CoordinateMapBase<Src, Tgt, D>> {
    fn clone(&self) -> Self {
        self.get_clone()
    }
}

impl<Src: Frame, Tgt: Frame, const D: usize> PartialEq for dyn CoordinateMapBase<Src, Tgt, D> {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    use crate::{
        frame::{Distorted, Grid, Inertial},
        map::{BlockRegion, Chain, Identity, RotScaleTrans, Shape, Translation},
        testing::{dv, polynomial, rot_scale_trans_registry, rotation_about},
        transition::SphereTransition,
    };

    fn rotation_only() -> RotScaleTrans {
        RotScaleTrans::new(
            None,
            Some("Rotation".to_string()),
            None,
            1.0,
            10.0,
            BlockRegion::Inner,
        )
        .expect("valid radii")
    }

    #[test]
    fn chain_of_identities_is_the_identity() {
        let map = CoordinateMap::<Grid, Grid, _, 3>::new(Chain::new(
            Identity::<3>,
            Chain::new(Identity::<3>, Identity::<3>),
        ));
        let functions_of_time = FunctionsOfTime::new();

        for (point, time) in [
            (Vector3::new(1.0, -2.0, 3.0), 0.0),
            (Vector3::new(-0.3, 0.0, 7.5), 12.0),
        ] {
            let mapped = map.call(&point, time, &functions_of_time).expect("identity");
            let jacobian = map.jacobian(&point, time, &functions_of_time).expect("identity");
            assert_eq!(mapped, point);
            assert_eq!(jacobian, Matrix3::identity());
        }
        assert!(map.is_identity());
        assert!(!map.jacobian_is_time_dependent());
        assert!(map.function_of_time_names().is_empty());
    }

    #[test]
    fn non_identity_stages_are_never_the_identity() {
        let map = CoordinateMap::<Grid, Inertial, _, 3>::new(Chain::new(
            Identity::<3>,
            Translation::<3>::new("Translation"),
        ));

        assert!(!map.is_identity());
        assert!(!map.jacobian_is_time_dependent());
        assert_eq!(
            map.function_of_time_names(),
            BTreeSet::from(["Translation".to_string()])
        );
    }

    #[test]
    fn rotation_matches_closed_form() {
        let omega_z = 0.7;
        let mut functions_of_time = FunctionsOfTime::new();
        functions_of_time
            .insert("Rotation", Box::new(rotation_about([0.0, 0.0, omega_z])))
            .expect("unique name");
        let map = CoordinateMap::<Grid, Inertial, _, 3>::new(rotation_only());

        for time in [0.5, 2.0, 6.3] {
            let quaternion = functions_of_time
                .get("Rotation")
                .expect("present")
                .func(time)
                .expect("valid time");
            let half = 0.5 * omega_z * time;
            assert_relative_eq!(
                quaternion[0],
                dv(&[half.cos(), 0.0, 0.0, half.sin()]),
                max_relative = 1e-12
            );

            let mapped = map
                .call(&Vector3::new(2.0, 0.0, 0.0), time, &functions_of_time)
                .expect("valid time");
            let angle = omega_z * time;
            assert_relative_eq!(
                mapped,
                Vector3::new(2.0 * angle.cos(), 2.0 * angle.sin(), 0.0),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn numerical_and_analytic_inverse_jacobians_agree() {
        let mut functions_of_time = rot_scale_trans_registry();
        functions_of_time
            .insert(
                "Shape",
                Box::new(polynomial(&[
                    &[0.0, 0.01, -0.02, 0.03, 0.0, 0.01, 0.0, -0.01, 0.02],
                    &[0.0; 9],
                    &[0.0; 9],
                ])),
            )
            .expect("unique name");
        let shape = Shape::new(
            Vector3::zeros(),
            2,
            Box::new(SphereTransition::new(0.5, 4.0)),
            "Shape",
            None,
        );
        let rot_scale_trans = RotScaleTrans::new(
            Some(("Expansion".to_string(), "ExpansionOuterBoundary".to_string())),
            Some("Rotation".to_string()),
            Some("Translation".to_string()),
            1.0,
            3.0,
            BlockRegion::Transition,
        )
        .expect("valid radii");
        let map = CoordinateMap::<Grid, Inertial, _, 3>::new(Chain::new(shape, rot_scale_trans));

        for point in [
            Vector3::new(0.7, 0.2, -0.4),
            Vector3::new(1.5, -1.0, 0.6),
            Vector3::new(-2.0, 1.2, 1.1),
        ] {
            let analytic = map.inv_jacobian(&point, 1.3, &functions_of_time).expect("valid");
            let combined = map
                .coords_frame_velocity_jacobians(&point, 1.3, &functions_of_time)
                .expect("valid");
            assert_relative_eq!(analytic, combined.inv_jacobian, epsilon = 1e-10);
            assert_relative_eq!(
                combined.coords,
                map.call(&point, 1.3, &functions_of_time).expect("valid")
            );
        }
    }

    #[test]
    fn boxed_maps_clone_and_compare() {
        let boxed: Box<dyn CoordinateMapBase<Grid, Distorted, 3>> = Box::new(
            CoordinateMap::<Grid, Distorted, _, 3>::new(Translation::<3>::new("Translation")),
        );
        let same = boxed.clone();
        let other: Box<dyn CoordinateMapBase<Grid, Distorted, 3>> =
            Box::new(CoordinateMap::<Grid, Distorted, _, 3>::new(Identity::<3>));

        assert!(*boxed == *same);
        assert!(*boxed != *other);
    }

    #[test]
    fn retarget_keeps_the_stages() {
        let map = CoordinateMap::<Grid, Distorted, _, 3>::new(rotation_only());

        let retargeted: CoordinateMap<Distorted, Inertial, _, 3> = map.clone().retarget();

        assert_eq!(retargeted.map(), map.map());
    }
}
