use std::collections::BTreeSet;

use chronomap_core::FunctionsOfTime;
use nalgebra::{SMatrix, SVector};

use super::{ElementaryMap, value_and_rate};
use crate::MapError;

/// Shifts every point by a time-dependent vector, `x̃ = x + T(t)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation<const D: usize> {
    function_of_time_name: String,
}

impl<const D: usize> Translation<D> {
    pub fn new(function_of_time_name: impl Into<String>) -> Self {
        Self {
            function_of_time_name: function_of_time_name.into(),
        }
    }

    fn offset_and_rate(
        &self,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<[SVector<f64, D>; 2], MapError> {
        let [value, rate] =
            value_and_rate(functions_of_time, &self.function_of_time_name, time, D)?;
        Ok([
            SVector::from_column_slice(value.as_slice()),
            SVector::from_column_slice(rate.as_slice()),
        ])
    }
}

impl<const D: usize> ElementaryMap<D> for Translation<D> {
    fn call(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError> {
        let [offset, _] = self.offset_and_rate(time, functions_of_time)?;
        Ok(source + offset)
    }

    fn inverse(
        &self,
        target: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Option<SVector<f64, D>>, MapError> {
        let [offset, _] = self.offset_and_rate(time, functions_of_time)?;
        Ok(Some(target - offset))
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
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError> {
        let [_, rate] = self.offset_and_rate(time, functions_of_time)?;
        Ok(rate)
    }

    fn is_identity(&self) -> bool {
        false
    }

    fn jacobian_is_time_dependent(&self) -> bool {
        false
    }

    fn function_of_time_names(&self) -> BTreeSet<String> {
        BTreeSet::from([self.function_of_time_name.clone()])
    }
}
