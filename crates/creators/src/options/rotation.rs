use chronomap_core::{FunctionOfTime, QuaternionFunctionOfTime, SettleToConstantQuaternion};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{MapSource, ROTATION_NAME, check_positive, check_type, is, pad_derivs};
use crate::OptionsError;

const IDENTITY_QUATERNION: [f64; 4] = [1.0, 0.0, 0.0, 0.0];

/// Initial state of the rotation map.
///
/// Either the frame starts at the identity with a given angular velocity, or
/// a quaternion and up to two of its derivatives are given. Quaternions with
/// a decay timescale settle to a constant orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRotationMapOptions", into = "RawRotationMapOptions")]
pub enum RotationMapOptions {
    AngularVelocity([f64; 3]),
    Quaternions {
        quaternions: [[f64; 4]; 3],
        given: usize,
        decay_timescale: Option<f64>,
    },
}

impl RotationMapOptions {
    pub fn from_angular_velocity(angular_velocity: [f64; 3]) -> Self {
        Self::AngularVelocity(angular_velocity)
    }

    /// # Errors
    ///
    /// Returns an error unless one to three quaternions are given, or if the
    /// decay timescale is not positive.
    pub fn from_quaternions(
        quaternions: &[[f64; 4]],
        decay_timescale: Option<f64>,
    ) -> Result<Self, OptionsError> {
        if let Some(decay_timescale) = decay_timescale {
            check_positive("DecayTimescale", decay_timescale)?;
        }
        Ok(Self::Quaternions {
            quaternions: pad_derivs("quaternion", quaternions, IDENTITY_QUATERNION)?,
            given: quaternions.len(),
            decay_timescale,
        })
    }

    /// The quaternion and its first two derivatives.
    pub fn quaternions(&self) -> [[f64; 4]; 3] {
        match *self {
            Self::AngularVelocity(_) => [IDENTITY_QUATERNION, [0.0; 4], [0.0; 4]],
            Self::Quaternions { quaternions, .. } => quaternions,
        }
    }

    /// The rotation angle and its first three derivatives.
    pub fn angles(&self) -> [[f64; 3]; 4] {
        let mut angles = [[0.0; 3]; 4];
        if let Self::AngularVelocity(angular_velocity) = *self {
            angles[1] = angular_velocity;
        }
        angles
    }

    pub fn decay_timescale(&self) -> Option<f64> {
        match *self {
            Self::AngularVelocity(_) => None,
            Self::Quaternions {
                decay_timescale, ..
            } => decay_timescale,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct RawRotationMapOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial_angular_velocity: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial_quaternions: Option<Vec<[f64; 4]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    decay_timescale: Option<f64>,
}

impl TryFrom<RawRotationMapOptions> for RotationMapOptions {
    type Error = OptionsError;

    fn try_from(raw: RawRotationMapOptions) -> Result<Self, Self::Error> {
        match (raw.initial_angular_velocity, raw.initial_quaternions) {
            (Some(angular_velocity), None) if raw.decay_timescale.is_none() => {
                Ok(Self::from_angular_velocity(angular_velocity))
            }
            (None, Some(quaternions)) => Self::from_quaternions(&quaternions, raw.decay_timescale),
            _ => Err(OptionsError::InvalidOptions {
                reason: "RotationMap needs either InitialAngularVelocity, or InitialQuaternions \
                         with an optional DecayTimescale"
                    .to_string(),
            }),
        }
    }
}

impl From<RotationMapOptions> for RawRotationMapOptions {
    fn from(options: RotationMapOptions) -> Self {
        match options {
            RotationMapOptions::AngularVelocity(angular_velocity) => Self {
                initial_angular_velocity: Some(angular_velocity),
                initial_quaternions: None,
                decay_timescale: None,
            },
            RotationMapOptions::Quaternions {
                quaternions,
                given,
                decay_timescale,
            } => Self {
                initial_angular_velocity: None,
                initial_quaternions: Some(quaternions[..given].to_vec()),
                decay_timescale,
            },
        }
    }
}

/// Builds the `Rotation` function of time.
///
/// # Errors
///
/// Returns an error if the volume file cannot supply the function, it has an
/// unexpected type, or the initial values are invalid.
pub fn rotation_function_of_time(
    source: &MapSource<RotationMapOptions>,
    initial_time: f64,
    expiration: f64,
) -> Result<Box<dyn FunctionOfTime>, OptionsError> {
    match source {
        MapSource::FromVolumeFile(file) => {
            let stored = file.retrieve_function_of_time(&[ROTATION_NAME], Some(initial_time))?;
            let rotation = stored.get(ROTATION_NAME)?;
            check_type(
                ROTATION_NAME,
                rotation,
                &[
                    is::<QuaternionFunctionOfTime<3>>,
                    is::<SettleToConstantQuaternion>,
                ],
                "QuaternionFunctionOfTime<3> or a SettleToConstantQuaternion",
            )?;
            Ok(rotation.create_at_time(initial_time, expiration)?)
        }
        MapSource::Options(options) => {
            let quaternions = options.quaternions().map(|q| DVector::from_row_slice(&q));
            match options.decay_timescale() {
                Some(decay_timescale) => Ok(Box::new(SettleToConstantQuaternion::new(
                    quaternions,
                    initial_time,
                    decay_timescale,
                )?)),
                None => {
                    let [quaternion, _, _] = quaternions;
                    Ok(Box::new(QuaternionFunctionOfTime::<3>::new(
                        initial_time,
                        quaternion,
                        options.angles().map(|angle| DVector::from_row_slice(&angle)),
                        expiration,
                    )?))
                }
            }
        }
    }
}
