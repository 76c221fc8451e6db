use std::collections::BTreeSet;

use chronomap_core::FunctionsOfTime;
use nalgebra::{SMatrix, SVector};

use super::ElementaryMap;
use crate::MapError;

/// The map that leaves every point where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Identity<const D: usize>;

impl<const D: usize> ElementaryMap<D> for Identity<D> {
    fn call(
        &self,
        source: &SVector<f64, D>,
        _time: f64,
        _functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError> {
        Ok(*source)
    }

    fn inverse(
        &self,
        target: &SVector<f64, D>,
        _time: f64,
        _functions_of_time: &FunctionsOfTime,
    ) -> Result<Option<SVector<f64, D>>, MapError> {
        Ok(Some(*target))
    }

    fn jacobian(
        &self,
        _source: &SVector<f64, D>,
        _time: f64,
        _functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError> {
        Ok(SMatrix::identity())
    }

    fn inv_jacobian(
        &self,
        _source: &SVector<f64, D>,
        _time: f64,
        _functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError> {
        Ok(SMatrix::identity())
    }

    fn frame_velocity(
        &self,
        _source: &SVector<f64, D>,
        _time: f64,
        _functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError> {
        Ok(SVector::zeros())
    }

    fn is_identity(&self) -> bool {
        true
    }

    fn jacobian_is_time_dependent(&self) -> bool {
        false
    }

    fn function_of_time_names(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}
