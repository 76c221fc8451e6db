use std::collections::BTreeSet;

use chronomap_core::FunctionsOfTime;
use nalgebra::{SMatrix, SVector};

use super::ElementaryMap;
use crate::MapError;

/// Applies `first`, then `second`.
///
/// Longer compositions nest: `Chain<A, Chain<B, C>>` applies `A`, `B`, `C` in
/// order. Every stage shares the dimension `D`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> Chain<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B, const D: usize> ElementaryMap<D> for Chain<A, B>
where
    A: ElementaryMap<D>,
    B: ElementaryMap<D>,
{
    fn call(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError> {
        let mid = self.first.call(source, time, functions_of_time)?;
        self.second.call(&mid, time, functions_of_time)
    }

    fn inverse(
        &self,
        target: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<Option<SVector<f64, D>>, MapError> {
        match self.second.inverse(target, time, functions_of_time)? {
            Some(mid) => self.first.inverse(&mid, time, functions_of_time),
            None => Ok(None),
        }
    }

    fn jacobian(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError> {
        let mid = self.first.call(source, time, functions_of_time)?;
        let inner = self.first.jacobian(source, time, functions_of_time)?;
        let outer = self.second.jacobian(&mid, time, functions_of_time)?;
        Ok(outer * inner)
    }

    fn inv_jacobian(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SMatrix<f64, D, D>, MapError> {
        let mid = self.first.call(source, time, functions_of_time)?;
        let inner = self.first.inv_jacobian(source, time, functions_of_time)?;
        let outer = self.second.inv_jacobian(&mid, time, functions_of_time)?;
        Ok(inner * outer)
    }

    fn frame_velocity(
        &self,
        source: &SVector<f64, D>,
        time: f64,
        functions_of_time: &FunctionsOfTime,
    ) -> Result<SVector<f64, D>, MapError> {
        let mid = self.first.call(source, time, functions_of_time)?;
        let inner_velocity = self.first.frame_velocity(source, time, functions_of_time)?;
        let outer_jacobian = self.second.jacobian(&mid, time, functions_of_time)?;
        let outer_velocity = self.second.frame_velocity(&mid, time, functions_of_time)?;
        Ok(outer_jacobian * inner_velocity + outer_velocity)
    }

    fn is_identity(&self) -> bool {
        self.first.is_identity() && self.second.is_identity()
    }

    fn jacobian_is_time_dependent(&self) -> bool {
        self.first.jacobian_is_time_dependent() || self.second.jacobian_is_time_dependent()
    }

    fn inv_jacobian_is_time_dependent(&self) -> bool {
        self.first.inv_jacobian_is_time_dependent()
            || self.second.inv_jacobian_is_time_dependent()
    }

    fn function_of_time_names(&self) -> BTreeSet<String> {
        let mut names = self.first.function_of_time_names();
        names.extend(self.second.function_of_time_names());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use crate::map::{Identity, Translation};

    #[test]
    fn identities_compose_to_identity() {
        let map = Chain::new(Identity::<3>, Chain::new(Identity::<3>, Identity::<3>));
        let functions_of_time = FunctionsOfTime::new();
        let point = Vector3::new(0.4, -2.0, 7.5);

        assert!(map.is_identity());
        assert!(!map.jacobian_is_time_dependent());
        assert_eq!(
            map.call(&point, 3.0, &functions_of_time).expect("identity"),
            point
        );
        assert_eq!(
            map.jacobian(&point, 3.0, &functions_of_time).expect("identity"),
            SMatrix::<f64, 3, 3>::identity()
        );
        assert!(map.function_of_time_names().is_empty());
    }

    #[test]
    fn mixed_chain_is_not_identity() {
        let map = Chain::new(Identity::<3>, Translation::<3>::new("Translation"));

        assert!(!map.is_identity());
        assert_eq!(map.function_of_time_names().len(), 1);
        assert!(matches!(
            map.call(&Vector3::zeros(), 0.0, &FunctionsOfTime::new()),
            Err(MapError::FunctionOfTime(_))
        ));
        let velocity = Identity::<3>
            .frame_velocity(&Vector3::zeros(), 0.0, &FunctionsOfTime::new())
            .expect("identity");
        assert_relative_eq!(velocity, Vector3::zeros());
    }
}
