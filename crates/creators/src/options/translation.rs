use chronomap_core::{FunctionOfTime, PiecewisePolynomial};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{MapSource, TRANSLATION_NAME, check_type, is, pad_derivs};
use crate::OptionsError;

/// The initial translation and up to two of its time derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTranslationMapOptions", into = "RawTranslationMapOptions")]
pub struct TranslationMapOptions {
    initial_values: [[f64; 3]; 3],
}

impl TranslationMapOptions {
    /// # Errors
    ///
    /// Returns an error unless one to three vectors are given.
    pub fn new(initial_values: &[[f64; 3]]) -> Result<Self, OptionsError> {
        Ok(Self {
            initial_values: pad_derivs("translation", initial_values, [0.0; 3])?,
        })
    }

    pub fn initial_values(&self) -> [[f64; 3]; 3] {
        self.initial_values
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct RawTranslationMapOptions {
    initial_values: Vec<[f64; 3]>,
}

impl TryFrom<RawTranslationMapOptions> for TranslationMapOptions {
    type Error = OptionsError;

    fn try_from(raw: RawTranslationMapOptions) -> Result<Self, Self::Error> {
        Self::new(&raw.initial_values)
    }
}

impl From<TranslationMapOptions> for RawTranslationMapOptions {
    fn from(options: TranslationMapOptions) -> Self {
        Self {
            initial_values: options.initial_values.to_vec(),
        }
    }
}

/// Builds the `Translation` function of time.
///
/// # Errors
///
/// Returns an error if the volume file cannot supply the function, it has an
/// unexpected type, or the initial values are invalid.
pub fn translation_function_of_time(
    source: &MapSource<TranslationMapOptions>,
    initial_time: f64,
    expiration: f64,
) -> Result<Box<dyn FunctionOfTime>, OptionsError> {
    match source {
        MapSource::FromVolumeFile(file) => {
            let stored = file.retrieve_function_of_time(&[TRANSLATION_NAME], Some(initial_time))?;
            let translation = stored.get(TRANSLATION_NAME)?;
            check_type(
                TRANSLATION_NAME,
                translation,
                &[is::<PiecewisePolynomial<2>>],
                "PiecewisePolynomial<2>",
            )?;
            Ok(translation.create_at_time(initial_time, expiration)?)
        }
        MapSource::Options(options) => Ok(Box::new(PiecewisePolynomial::<2>::new(
            initial_time,
            options
                .initial_values
                .map(|values| DVector::from_row_slice(&values)),
            expiration,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::testing::dv;

    #[test]
    fn missing_derivatives_are_zero() {
        let options: TranslationMapOptions =
            serde_yaml::from_str("InitialValues: [[1.0, 2.0, 3.0], [0.1, 0.0, -0.1]]\n")
                .expect("valid yaml");
        assert_eq!(options.initial_values()[2], [0.0; 3]);

        let translation =
            translation_function_of_time(&options.into(), 0.5, 4.0).expect("valid");

        let [value, rate, accel] = translation.func_and_2_derivs(2.5).expect("valid time");
        assert_relative_eq!(value, dv(&[1.2, 2.0, 2.8]), epsilon = 1e-14);
        assert_relative_eq!(rate, dv(&[0.1, 0.0, -0.1]));
        assert_relative_eq!(accel, dv(&[0.0; 3]));
        assert_eq!(translation.time_bounds(), [0.5, 4.0]);
    }

    #[test]
    fn rejects_too_many_derivatives() {
        assert!(TranslationMapOptions::new(&[[0.0; 3]; 4]).is_err());
        assert!(TranslationMapOptions::new(&[]).is_err());
    }
}
