use chronomap_core::{
    FixedSpeedCubic, FunctionOfTime, FunctionsOfTime, PiecewisePolynomial, SettleToConstant,
};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{
    EXPANSION_NAME, EXPANSION_OUTER_BOUNDARY_NAME, MapSource, check_positive, check_type, is,
};
use crate::OptionsError;

/// Initial values for the expansion map and its outer boundary.
///
/// The outer boundary either drifts with a fixed asymptotic velocity or
/// settles to a constant alongside the expansion factor itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExpansionMapOptions", into = "RawExpansionMapOptions")]
pub enum ExpansionMapOptions {
    FixedSpeedCubic {
        initial_values: [f64; 3],
        decay_timescale_outer_boundary: f64,
        asymptotic_velocity_outer_boundary: f64,
    },
    SettleToConstant {
        initial_values: [f64; 3],
        initial_values_outer_boundary: [f64; 3],
        decay_timescale_outer_boundary: f64,
        decay_timescale: f64,
    },
}

impl ExpansionMapOptions {
    /// # Errors
    ///
    /// Returns an error if the decay timescale is not positive.
    pub fn fixed_speed_cubic(
        initial_values: [f64; 3],
        decay_timescale_outer_boundary: f64,
        asymptotic_velocity_outer_boundary: f64,
    ) -> Result<Self, OptionsError> {
        check_positive("DecayTimescaleOuterBoundary", decay_timescale_outer_boundary)?;
        Ok(Self::FixedSpeedCubic {
            initial_values,
            decay_timescale_outer_boundary,
            asymptotic_velocity_outer_boundary,
        })
    }

    /// # Errors
    ///
    /// Returns an error if either decay timescale is not positive.
    pub fn settle_to_constant(
        initial_values: [f64; 3],
        initial_values_outer_boundary: [f64; 3],
        decay_timescale_outer_boundary: f64,
        decay_timescale: f64,
    ) -> Result<Self, OptionsError> {
        check_positive("DecayTimescaleOuterBoundary", decay_timescale_outer_boundary)?;
        check_positive("DecayTimescale", decay_timescale)?;
        Ok(Self::SettleToConstant {
            initial_values,
            initial_values_outer_boundary,
            decay_timescale_outer_boundary,
            decay_timescale,
        })
    }

    pub fn initial_values(&self) -> [f64; 3] {
        match *self {
            Self::FixedSpeedCubic { initial_values, .. }
            | Self::SettleToConstant { initial_values, .. } => initial_values,
        }
    }

    /// The outer boundary starts at 1 with no motion unless it settles.
    pub fn initial_values_outer_boundary(&self) -> [f64; 3] {
        match *self {
            Self::FixedSpeedCubic { .. } => [1.0, 0.0, 0.0],
            Self::SettleToConstant {
                initial_values_outer_boundary,
                ..
            } => initial_values_outer_boundary,
        }
    }

    pub fn decay_timescale_outer_boundary(&self) -> f64 {
        match *self {
            Self::FixedSpeedCubic {
                decay_timescale_outer_boundary,
                ..
            }
            | Self::SettleToConstant {
                decay_timescale_outer_boundary,
                ..
            } => decay_timescale_outer_boundary,
        }
    }

    pub fn asymptotic_velocity_outer_boundary(&self) -> Option<f64> {
        match *self {
            Self::FixedSpeedCubic {
                asymptotic_velocity_outer_boundary,
                ..
            } => Some(asymptotic_velocity_outer_boundary),
            Self::SettleToConstant { .. } => None,
        }
    }

    pub fn decay_timescale(&self) -> Option<f64> {
        match *self {
            Self::FixedSpeedCubic { .. } => None,
            Self::SettleToConstant {
                decay_timescale, ..
            } => Some(decay_timescale),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct RawExpansionMapOptions {
    initial_values: [f64; 3],
    decay_timescale_outer_boundary: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    asymptotic_velocity_outer_boundary: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial_values_outer_boundary: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    decay_timescale: Option<f64>,
}

impl TryFrom<RawExpansionMapOptions> for ExpansionMapOptions {
    type Error = OptionsError;

    fn try_from(raw: RawExpansionMapOptions) -> Result<Self, Self::Error> {
        match (
            raw.asymptotic_velocity_outer_boundary,
            raw.initial_values_outer_boundary,
            raw.decay_timescale,
        ) {
            (Some(velocity), None, None) => Self::fixed_speed_cubic(
                raw.initial_values,
                raw.decay_timescale_outer_boundary,
                velocity,
            ),
            (None, Some(outer_values), Some(decay_timescale)) => Self::settle_to_constant(
                raw.initial_values,
                outer_values,
                raw.decay_timescale_outer_boundary,
                decay_timescale,
            ),
            _ => Err(OptionsError::InvalidOptions {
                reason: "ExpansionMap needs either AsymptoticVelocityOuterBoundary, or both \
                         InitialValuesOuterBoundary and DecayTimescale"
                    .to_string(),
            }),
        }
    }
}

impl From<ExpansionMapOptions> for RawExpansionMapOptions {
    fn from(options: ExpansionMapOptions) -> Self {
        let settles = options.decay_timescale().is_some();
        Self {
            initial_values: options.initial_values(),
            decay_timescale_outer_boundary: options.decay_timescale_outer_boundary(),
            asymptotic_velocity_outer_boundary: options.asymptotic_velocity_outer_boundary(),
            initial_values_outer_boundary: settles
                .then(|| options.initial_values_outer_boundary()),
            decay_timescale: options.decay_timescale(),
        }
    }
}

fn scalar_derivs(values: [f64; 3]) -> Vec<DVector<f64>> {
    values
        .iter()
        .map(|&value| DVector::from_element(1, value))
        .collect()
}

/// Builds `Expansion` and `ExpansionOuterBoundary`.
///
/// # Errors
///
/// Returns an error if the volume file cannot supply the functions, they have
/// unexpected types, or the initial values are invalid.
pub fn expansion_functions_of_time(
    source: &MapSource<ExpansionMapOptions>,
    initial_time: f64,
    expiration: f64,
) -> Result<FunctionsOfTime, OptionsError> {
    let mut result = FunctionsOfTime::new();
    match source {
        MapSource::FromVolumeFile(file) => {
            let stored = file.retrieve_function_of_time(
                &[EXPANSION_NAME, EXPANSION_OUTER_BOUNDARY_NAME],
                Some(initial_time),
            )?;

            let expansion = stored.get(EXPANSION_NAME)?;
            check_type(
                EXPANSION_NAME,
                expansion,
                &[is::<PiecewisePolynomial<2>>, is::<SettleToConstant>],
                "PiecewisePolynomial<2> or a SettleToConstant",
            )?;
            result.insert(
                EXPANSION_NAME,
                expansion.create_at_time(initial_time, expiration)?,
            )?;

            let outer = stored.get(EXPANSION_OUTER_BOUNDARY_NAME)?;
            check_type(
                EXPANSION_OUTER_BOUNDARY_NAME,
                outer,
                &[is::<FixedSpeedCubic>, is::<SettleToConstant>],
                "FixedSpeedCubic or a SettleToConstant",
            )?;
            result.insert(EXPANSION_OUTER_BOUNDARY_NAME, outer.get_clone())?;
        }
        MapSource::Options(ExpansionMapOptions::FixedSpeedCubic {
            initial_values,
            decay_timescale_outer_boundary,
            asymptotic_velocity_outer_boundary,
        }) => {
            result.insert(
                EXPANSION_NAME,
                Box::new(PiecewisePolynomial::<2>::new(
                    initial_time,
                    scalar_derivs(*initial_values),
                    expiration,
                )?),
            )?;
            result.insert(
                EXPANSION_OUTER_BOUNDARY_NAME,
                Box::new(FixedSpeedCubic::new(
                    1.0,
                    initial_time,
                    *asymptotic_velocity_outer_boundary,
                    *decay_timescale_outer_boundary,
                )?),
            )?;
        }
        MapSource::Options(ExpansionMapOptions::SettleToConstant {
            initial_values,
            initial_values_outer_boundary,
            decay_timescale_outer_boundary,
            decay_timescale,
        }) => {
            result.insert(
                EXPANSION_NAME,
                Box::new(SettleToConstant::new(
                    scalar_derivs(*initial_values),
                    initial_time,
                    *decay_timescale,
                )?),
            )?;
            result.insert(
                EXPANSION_OUTER_BOUNDARY_NAME,
                Box::new(SettleToConstant::new(
                    scalar_derivs(*initial_values_outer_boundary),
                    initial_time,
                    *decay_timescale_outer_boundary,
                )?),
            )?;
        }
    }
    Ok(result)
}
