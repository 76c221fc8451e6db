//! The name-ordered collection of functions of time shared by all maps.

use std::{any::type_name, collections::BTreeMap};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Error, FixedSpeedCubic, FunctionOfTime, IntegratedFunctionOfTime, PiecewisePolynomial,
    QuaternionFunctionOfTime, SettleToConstant, SettleToConstantQuaternion,
};

/// Functions of time keyed by name.
///
/// Maps look up their parameters here on every evaluation; the registry owns
/// each function exclusively and hands out shared references.
#[derive(Debug, Clone, Default)]
pub struct FunctionsOfTime {
    functions: BTreeMap<String, Box<dyn FunctionOfTime>>,
}

impl FunctionsOfTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is already registered.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        function: Box<dyn FunctionOfTime>,
    ) -> Result<(), Error> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(Error::DuplicateName { name });
        }
        self.functions.insert(name, function);
        Ok(())
    }

    /// Moves every function from `other` into this registry.
    ///
    /// # Errors
    ///
    /// Returns an error on the first name present in both registries.
    pub fn merge(&mut self, other: FunctionsOfTime) -> Result<(), Error> {
        for (name, function) in other.functions {
            self.insert(name, function)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if no function is registered under `name`.
    pub fn get(&self, name: &str) -> Result<&dyn FunctionOfTime, Error> {
        self.functions
            .get(name)
            .map(|function| function.as_ref())
            .ok_or_else(|| Error::MissingFunction {
                name: name.to_string(),
            })
    }

    /// Returns the function under `name` as a concrete type.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is missing or the function is not a `T`.
    pub fn get_as<T: FunctionOfTime>(&self, name: &str) -> Result<&T, Error> {
        self.get(name)?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| Error::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Removes and returns the function under `name`.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn FunctionOfTime>> {
        self.functions.remove(name)
    }

    /// Forwards an update to the function under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is missing or the update is rejected.
    pub fn update(
        &mut self,
        name: &str,
        time: f64,
        updated_max_deriv: DVector<f64>,
        next_expiration: f64,
    ) -> Result<(), Error> {
        let function = self
            .functions
            .get_mut(name)
            .ok_or_else(|| Error::MissingFunction {
                name: name.to_string(),
            })?;
        function.update(time, updated_max_deriv, next_expiration)?;
        debug!(name, time, next_expiration, "updated function of time");
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn FunctionOfTime)> {
        self.functions
            .iter()
            .map(|(name, function)| (name.as_str(), function.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Returns true if every named function exists and is valid at `time`.
    pub fn are_ready<'a>(&self, names: impl IntoIterator<Item = &'a str>, time: f64) -> bool {
        names.into_iter().all(|name| {
            self.functions
                .get(name)
                .is_some_and(|function| time <= function.time_bounds()[1])
        })
    }

    /// Returns the earliest expiration among the named functions.
    ///
    /// # Errors
    ///
    /// Returns an error if any name is missing.
    pub fn min_expiration<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<f64, Error> {
        names.into_iter().try_fold(f64::INFINITY, |min, name| {
            Ok(min.min(self.get(name)?.time_bounds()[1]))
        })
    }

    /// Encodes the registry as a binary blob.
    ///
    /// # Errors
    ///
    /// Returns an error if a function has no serialized form or encoding fails.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let stored = self
            .iter()
            .map(|(name, function)| {
                StoredFunctionOfTime::from_function(function)
                    .map(|stored| (name.to_string(), stored))
                    .ok_or_else(|| Error::Unserializable {
                        name: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bincode::serialize(&stored)?)
    }

    /// Decodes a registry produced by [`FunctionsOfTime::serialize`].
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails, a decoded function breaks the
    /// invariants its constructor enforces, or the blob repeats a name.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let stored: Vec<(String, StoredFunctionOfTime)> = bincode::deserialize(bytes)?;
        let mut registry = Self::new();
        for (name, function) in stored {
            registry.insert(name, function.into_function()?)?;
        }
        Ok(registry)
    }
}

impl PartialEq for FunctionsOfTime {
    fn eq(&self, other: &Self) -> bool {
        self.functions.len() == other.functions.len()
            && self
                .functions
                .iter()
                .zip(&other.functions)
                .all(|((a_name, a), (b_name, b))| a_name == b_name && a.dyn_eq(b.as_ref()))
    }
}

macro_rules! stored_functions {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        /// A function of time tagged with its concrete type for serialization.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum StoredFunctionOfTime {
            $($variant($ty)),+
        }

        impl StoredFunctionOfTime {
            /// Captures a function as its tagged concrete type, if it has one.
            pub fn from_function(function: &dyn FunctionOfTime) -> Option<Self> {
                let any = function.as_any();
                $(
                    if let Some(function) = any.downcast_ref::<$ty>() {
                        return Some(Self::$variant(function.clone()));
                    }
                )+
                None
            }

            /// Unwraps the concrete function after checking its invariants.
            ///
            /// # Errors
            ///
            /// Returns an error if the function could not have been built
            /// through its constructor and updates.
            pub fn into_function(self) -> Result<Box<dyn FunctionOfTime>, Error> {
                match self {
                    $(Self::$variant(function) => {
                        function.validate()?;
                        Ok(Box::new(function))
                    }),+
                }
            }
        }
    };
}

stored_functions!(
    PiecewisePolynomial0 => PiecewisePolynomial<0>,
    PiecewisePolynomial1 => PiecewisePolynomial<1>,
    PiecewisePolynomial2 => PiecewisePolynomial<2>,
    PiecewisePolynomial3 => PiecewisePolynomial<3>,
    PiecewisePolynomial4 => PiecewisePolynomial<4>,
    Quaternion2 => QuaternionFunctionOfTime<2>,
    Quaternion3 => QuaternionFunctionOfTime<3>,
    SettleToConstant => SettleToConstant,
    SettleToConstantQuaternion => SettleToConstantQuaternion,
    FixedSpeedCubic => FixedSpeedCubic,
    Integrated => IntegratedFunctionOfTime,
);

#[cfg(test)]
mod tests {
    use super::*;

    fn dv(values: &[f64]) -> DVector<f64> {
        DVector::from_row_slice(values)
    }

    fn registry() -> FunctionsOfTime {
        let mut registry = FunctionsOfTime::new();
        registry
            .insert(
                "Expansion",
                Box::new(
                    PiecewisePolynomial::<2>::new(0.0, [dv(&[1.0]), dv(&[0.0]), dv(&[0.0])], 1.0)
                        .expect("valid polynomial"),
                ),
            )
            .expect("unique name");
        registry
            .insert(
                "ExpansionOuterBoundary",
                Box::new(FixedSpeedCubic::new(1.0, 0.0, -1e-5, 50.0).expect("valid cubic")),
            )
            .expect("unique name");
        registry
            .insert(
                "Rotation",
                Box::new(
                    QuaternionFunctionOfTime::<3>::new(
                        0.0,
                        dv(&[1.0, 0.0, 0.0, 0.0]),
                        [dv(&[0.0; 3]), dv(&[0.0, 0.0, 0.2]), dv(&[0.0; 3]), dv(&[0.0; 3])],
                        2.0,
                    )
                    .expect("valid rotation"),
                ),
            )
            .expect("unique name");
        registry
    }

    #[test]
    fn keeps_names_ordered_and_unique() {
        let mut registry = registry();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, ["Expansion", "ExpansionOuterBoundary", "Rotation"]);

        let duplicate = FixedSpeedCubic::new(0.0, 0.0, 0.0, 1.0).expect("valid cubic");
        assert!(matches!(
            registry.insert("Rotation", Box::new(duplicate)),
            Err(Error::DuplicateName { .. })
        ));
    }

    #[test]
    fn typed_lookup_checks_the_concrete_type() {
        let registry = registry();
        let cubic = registry
            .get_as::<FixedSpeedCubic>("ExpansionOuterBoundary")
            .expect("is a cubic");
        assert_eq!(cubic.velocity(), -1e-5);

        assert!(matches!(
            registry.get_as::<SettleToConstant>("Expansion"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            registry.get("Translation"),
            Err(Error::MissingFunction { .. })
        ));
    }

    #[test]
    fn readiness_follows_expirations() {
        let mut registry = registry();
        assert!(registry.are_ready(["Expansion", "Rotation"], 1.0));
        assert!(!registry.are_ready(["Expansion", "Rotation"], 1.5));
        assert!(!registry.are_ready(["Translation"], 0.0));
        assert_eq!(
            registry
                .min_expiration(["Expansion", "Rotation", "ExpansionOuterBoundary"])
                .expect("all present"),
            1.0
        );

        registry
            .update("Expansion", 1.0, dv(&[0.1]), 3.0)
            .expect("valid update");
        assert!(registry.are_ready(["Expansion", "Rotation"], 1.5));
    }

    #[test]
    fn binary_blob_restores_concrete_types() {
        let registry = registry();
        let bytes = registry.serialize().expect("serializable");
        let restored = FunctionsOfTime::deserialize(&bytes).expect("valid blob");

        assert_eq!(restored, registry);
        assert!(
            restored
                .get_as::<QuaternionFunctionOfTime<3>>("Rotation")
                .is_ok()
        );
        assert_eq!(
            restored
                .get("Rotation")
                .and_then(|f| f.func_and_deriv(1.5))
                .expect("in bounds"),
            registry
                .get("Rotation")
                .and_then(|f| f.func_and_deriv(1.5))
                .expect("in bounds")
        );
    }

    #[test]
    fn clone_is_independent() {
        let registry = registry();
        let mut copy = registry.clone();
        copy.update("Expansion", 1.0, dv(&[2.0]), 4.0)
            .expect("valid update");

        assert_eq!(registry.get("Expansion").expect("present").time_bounds()[1], 1.0);
        assert_eq!(copy.get("Expansion").expect("present").time_bounds()[1], 4.0);
        assert_ne!(copy, registry);
    }

    #[test]
    fn rejects_blobs_that_break_function_invariants() {
        #[derive(Serialize)]
        struct EmptyPolynomial {
            segments: Vec<()>,
            expiration: f64,
            pending: Vec<()>,
        }

        #[derive(Serialize)]
        enum Tagged {
            PiecewisePolynomial0(EmptyPolynomial),
        }

        let blob = bincode::serialize(&vec![(
            "Expansion".to_string(),
            Tagged::PiecewisePolynomial0(EmptyPolynomial {
                segments: Vec::new(),
                expiration: 1.0,
                pending: Vec::new(),
            }),
        )])
        .expect("encodable");

        assert!(matches!(
            FunctionsOfTime::deserialize(&blob),
            Err(Error::Malformed { .. })
        ));
    }
}
