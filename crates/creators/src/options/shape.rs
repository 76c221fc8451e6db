use std::{
    f64::consts::PI,
    fs,
    path::{Path, PathBuf},
};

use chronomap_core::{FunctionsOfTime, PiecewisePolynomial};
use chronomap_maps::Ylm;
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FromVolumeFile, SHAPE_NAME, SIZE_NAME, check_type, is};
use crate::OptionsError;

const DEFAULT_MATCH_TIME_EPSILON: f64 = 1e-12;

/// How the shape coefficients start out.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ShapeInitialValues {
    /// No deformation.
    #[default]
    Spherical,
    /// The Kerr-Schild shape of a constant Boyer-Lindquist radius surface.
    KerrSchild {
        #[serde(rename = "Mass")]
        mass: f64,
        #[serde(rename = "Spin")]
        spin: [f64; 3],
    },
    /// Coefficients read from a text file of surface expansions.
    YlmsFromSpEC(YlmsFromSpEC),
}

/// A text file with one surface per row.
///
/// Lines starting with `#` are comments. Each row holds the time, the
/// surface center, and the real spherical harmonic coefficients ordered by
/// `l` then `m = -l..=l`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct YlmsFromSpEC {
    #[serde(rename = "DatFilename")]
    pub path: PathBuf,
    pub match_time: f64,
    #[serde(default)]
    pub match_time_epsilon: Option<f64>,
    #[serde(default, rename = "SetL1CoefsToZero")]
    pub set_l1_coefs_to_zero: bool,
}

/// Hard-coded options for the shape map and its size function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ShapeMapOptions {
    #[serde(rename = "LMax")]
    pub l_max: usize,
    #[serde(default)]
    pub initial_values: ShapeInitialValues,
    /// Size and its first two derivatives, overriding the value implied by
    /// `initial_values`.
    #[serde(default)]
    pub size_initial_values: Option<[f64; 3]>,
    #[serde(default)]
    pub transition_ends_at_cube: bool,
}

impl ShapeMapOptions {
    pub fn new(l_max: usize, initial_values: ShapeInitialValues) -> Self {
        Self {
            l_max,
            initial_values,
            size_initial_values: None,
            transition_ends_at_cube: false,
        }
    }

    #[must_use]
    pub fn with_size_initial_values(mut self, values: [f64; 3]) -> Self {
        self.size_initial_values = Some(values);
        self
    }

    #[must_use]
    pub fn with_transition_ends_at_cube(mut self, transition_ends_at_cube: bool) -> Self {
        self.transition_ends_at_cube = transition_ends_at_cube;
        self
    }
}

/// Seeds `Shape` and `Size` from a volume file, taking `l_max` from the
/// stored shape function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFromVolumeFileShapeSize", into = "RawFromVolumeFileShapeSize")]
pub struct FromVolumeFileShapeSize {
    file: FromVolumeFile,
    transition_ends_at_cube: bool,
    l_max: usize,
}

impl FromVolumeFileShapeSize {
    /// # Errors
    ///
    /// Returns an error if the file has no usable `Shape` function or its
    /// component count is not a square.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn new(transition_ends_at_cube: bool, file: FromVolumeFile) -> Result<Self, OptionsError> {
        let stored = file.retrieve_function_of_time(&[SHAPE_NAME], None)?;
        let shape = stored.get(SHAPE_NAME)?;
        let [coefs] = shape.func(shape.time_bounds()[0])?;

        let n = coefs.len();
        let root = (n as f64).sqrt().round() as usize;
        if root == 0 || root * root != n {
            return Err(OptionsError::InvalidOptions {
                reason: format!("stored Shape function has {n} components, not (l_max + 1)²"),
            });
        }
        Ok(Self {
            file,
            transition_ends_at_cube,
            l_max: root - 1,
        })
    }

    pub fn file(&self) -> &FromVolumeFile {
        &self.file
    }

    pub fn l_max(&self) -> usize {
        self.l_max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct RawFromVolumeFileShapeSize {
    transition_ends_at_cube: bool,
    #[serde(rename = "H5Filename")]
    path: PathBuf,
    #[serde(rename = "SubfileName")]
    subfile: String,
}

impl TryFrom<RawFromVolumeFileShapeSize> for FromVolumeFileShapeSize {
    type Error = OptionsError;

    fn try_from(raw: RawFromVolumeFileShapeSize) -> Result<Self, Self::Error> {
        Self::new(
            raw.transition_ends_at_cube,
            FromVolumeFile::new(raw.path, raw.subfile),
        )
    }
}

impl From<FromVolumeFileShapeSize> for RawFromVolumeFileShapeSize {
    fn from(options: FromVolumeFileShapeSize) -> Self {
        Self {
            transition_ends_at_cube: options.transition_ends_at_cube,
            path: options.file.path,
            subfile: options.file.subfile,
        }
    }
}

/// Where the shape map takes its initial functions of time from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShapeMapSource {
    Options(ShapeMapOptions),
    FromVolumeFile(FromVolumeFileShapeSize),
}

impl ShapeMapSource {
    pub fn l_max(&self) -> usize {
        match self {
            Self::Options(options) => options.l_max,
            Self::FromVolumeFile(file) => file.l_max,
        }
    }

    pub fn transition_ends_at_cube(&self) -> bool {
        match self {
            Self::Options(options) => options.transition_ends_at_cube,
            Self::FromVolumeFile(file) => file.transition_ends_at_cube,
        }
    }
}

impl From<ShapeMapOptions> for ShapeMapSource {
    fn from(options: ShapeMapOptions) -> Self {
        Self::Options(options)
    }
}

/// Builds `Shape` and `Size`.
///
/// `deformed_radius` is the radius of the sphere the shape map deforms; the
/// size function measures deformations from it.
///
/// # Errors
///
/// Returns an error if a file cannot supply the coefficients, a stored
/// function has an unexpected type, or the initial values are invalid.
pub fn shape_and_size_functions_of_time(
    source: &ShapeMapSource,
    initial_time: f64,
    shape_expiration: f64,
    size_expiration: f64,
    deformed_radius: f64,
) -> Result<FunctionsOfTime, OptionsError> {
    let mut result = FunctionsOfTime::new();

    let options = match source {
        ShapeMapSource::FromVolumeFile(from_file) => {
            let stored = from_file
                .file
                .retrieve_function_of_time(&[SHAPE_NAME, SIZE_NAME], Some(initial_time))?;
            let shape = stored.get(SHAPE_NAME)?;
            let size = stored.get(SIZE_NAME)?;
            check_type(
                SHAPE_NAME,
                shape,
                &[is::<PiecewisePolynomial<2>>],
                "PiecewisePolynomial<2>",
            )?;
            check_type(
                SIZE_NAME,
                size,
                &[is::<PiecewisePolynomial<3>>],
                "PiecewisePolynomial<3>",
            )?;
            result.insert(
                SHAPE_NAME,
                shape.create_at_time(initial_time, shape_expiration)?,
            )?;
            result.insert(SIZE_NAME, size.create_at_time(initial_time, size_expiration)?)?;
            return Ok(result);
        }
        ShapeMapSource::Options(options) => options,
    };

    let ylm = Ylm::new(options.l_max);
    let mut shape = vec![0.0; ylm.spectral_size()];
    let mut size = [0.0; 4];

    match &options.initial_values {
        ShapeInitialValues::Spherical => {}
        ShapeInitialValues::KerrSchild { mass, spin } => {
            shape = kerr_schild_distortion(&ylm, deformed_radius, *mass, spin)?;
            size[0] = shape[0];
            shape[0] = 0.0;
        }
        ShapeInitialValues::YlmsFromSpEC(file) => {
            let surface = read_ylm_file(
                &file.path,
                file.match_time,
                file.match_time_epsilon.unwrap_or(DEFAULT_MATCH_TIME_EPSILON),
            )?;
            shape = surface
                .ylm
                .prolong_or_restrict(&surface.coefs, &ylm)
                .iter()
                .map(|coef| -coef)
                .collect();
            // 2√π is 1 / Y₀₀, so the size carries the undeformed sphere.
            size[0] = shape[0] + deformed_radius * 2.0 * PI.sqrt();
            shape[0] = 0.0;
            if file.set_l1_coefs_to_zero {
                for m in -1..=1 {
                    shape[Ylm::index(1, m)] = 0.0;
                }
            }
        }
    }

    if let Some(size_values) = options.size_initial_values {
        size[..3].copy_from_slice(&size_values);
    }

    let zeros = DVector::zeros(shape.len());
    result.insert(
        SHAPE_NAME,
        Box::new(PiecewisePolynomial::<2>::new(
            initial_time,
            [DVector::from_vec(shape), zeros.clone(), zeros],
            shape_expiration,
        )?),
    )?;
    result.insert(
        SIZE_NAME,
        Box::new(PiecewisePolynomial::<3>::new(
            initial_time,
            size.map(|value| DVector::from_element(1, value)),
            size_expiration,
        )?),
    )?;
    Ok(result)
}

/// Projects `R - r_KS(θ, φ)` onto the harmonics, where `r_KS` is the
/// Kerr-Schild radius of the Boyer-Lindquist sphere of radius `R`.
fn kerr_schild_distortion(
    ylm: &Ylm,
    radius: f64,
    mass: f64,
    spin: &[f64; 3],
) -> Result<Vec<f64>, OptionsError> {
    let spin = Vector3::from_row_slice(spin);
    let a = mass * spin.norm();
    let spin_axis = if a == 0.0 {
        Vector3::z()
    } else {
        spin.normalize()
    };

    let samples: Vec<f64> = ylm
        .collocation_points()
        .into_iter()
        .map(|(theta, phi)| {
            let direction = Vector3::new(
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            );
            let mu = direction.dot(&spin_axis);
            let r2 = radius * radius;
            let kerr_schild = radius * ((r2 + a * a) / (r2 + a * a * mu * mu)).sqrt();
            radius - kerr_schild
        })
        .collect();
    Ok(ylm.phys_to_spec(&samples)?)
}

/// One surface read from a coefficient file.
struct Surface {
    ylm: Ylm,
    coefs: Vec<f64>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn read_ylm_file(path: &Path, match_time: f64, epsilon: f64) -> Result<Surface, OptionsError> {
    let contents = fs::read_to_string(path).map_err(|source| OptionsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let malformed = |line: usize, reason: String| OptionsError::MalformedYlmFile {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut found: Option<Surface> = None;
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let columns = line
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| malformed(index + 1, err.to_string()))?;

        let Some(&time) = columns.first() else {
            continue;
        };
        let scale = time.abs().max(match_time.abs()).max(1.0);
        if (time - match_time).abs() > epsilon * scale {
            continue;
        }
        if found.is_some() {
            return Err(OptionsError::AmbiguousMatchTime {
                path: path.to_path_buf(),
                time: match_time,
                epsilon,
            });
        }

        // Time and the three center components precede the coefficients.
        let n = columns.len().saturating_sub(4);
        let root = (n as f64).sqrt().round() as usize;
        if root == 0 || root * root != n {
            return Err(malformed(
                index + 1,
                format!("{n} coefficients do not fill a triangle up to some l_max"),
            ));
        }
        debug!(path = %path.display(), time, l_max = root - 1, "read surface coefficients");
        found = Some(Surface {
            ylm: Ylm::new(root - 1),
            coefs: columns[4..].to_vec(),
        });
    }

    found.ok_or_else(|| OptionsError::MatchTimeNotFound {
        path: path.to_path_buf(),
        time: match_time,
        epsilon,
    })
}
