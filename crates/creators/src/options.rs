//! Option blocks for each family of time-dependent maps.
//!
//! Every block either carries hard-coded initial values or points at a
//! volume file written by an earlier run ([`MapSource`]). Blocks deserialize
//! from the PascalCase field names used in input files and are validated on
//! construction.

mod expansion;
mod rotation;
mod shape;
mod translation;
mod volume_file;

pub use expansion::{ExpansionMapOptions, expansion_functions_of_time};
pub use rotation::{RotationMapOptions, rotation_function_of_time};
pub use shape::{
    FromVolumeFileShapeSize, ShapeInitialValues, ShapeMapOptions, ShapeMapSource, YlmsFromSpEC,
    shape_and_size_functions_of_time,
};
pub use translation::{TranslationMapOptions, translation_function_of_time};
pub use volume_file::{FromVolumeFile, Observation, VolumeFile};

use chronomap_core::FunctionOfTime;
use serde::{Deserialize, Serialize};

use crate::OptionsError;

pub const EXPANSION_NAME: &str = "Expansion";
pub const EXPANSION_OUTER_BOUNDARY_NAME: &str = "ExpansionOuterBoundary";
pub const ROTATION_NAME: &str = "Rotation";
pub const TRANSLATION_NAME: &str = "Translation";
pub const SHAPE_NAME: &str = "Shape";
pub const SIZE_NAME: &str = "Size";

/// Where a map family takes its initial functions of time from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapSource<T> {
    Options(T),
    FromVolumeFile(FromVolumeFile),
}

impl<T> From<T> for MapSource<T> {
    fn from(options: T) -> Self {
        Self::Options(options)
    }
}

/// Pads up to three initial derivatives with zeros.
fn pad_derivs<const N: usize>(
    what: &str,
    values: &[[f64; N]],
    fill: [f64; N],
) -> Result<[[f64; N]; 3], OptionsError> {
    if values.is_empty() || values.len() > 3 {
        return Err(OptionsError::InvalidOptions {
            reason: format!(
                "Must specify at least the value of the {what}, and optionally up to 2 time \
                 derivatives, got {} values",
                values.len()
            ),
        });
    }
    let mut padded = [[0.0; N]; 3];
    padded[0] = fill;
    padded[..values.len()].copy_from_slice(values);
    Ok(padded)
}

fn check_positive(name: &str, value: f64) -> Result<(), OptionsError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(OptionsError::InvalidOptions {
            reason: format!("{name} must be positive, got {value}"),
        })
    }
}

/// Fails unless `function` is one of the accepted concrete types.
fn check_type(
    name: &str,
    function: &dyn FunctionOfTime,
    accepted: &[fn(&dyn FunctionOfTime) -> bool],
    expected: &'static str,
) -> Result<(), OptionsError> {
    if accepted.iter().any(|is| is(function)) {
        Ok(())
    } else {
        Err(OptionsError::WrongFunctionType {
            name: name.to_string(),
            expected,
        })
    }
}

fn is<T: FunctionOfTime>(function: &dyn FunctionOfTime) -> bool {
    function.as_any().is::<T>()
}
