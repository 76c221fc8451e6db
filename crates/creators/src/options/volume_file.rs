use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chronomap_core::FunctionsOfTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::OptionsError;

/// One observation written to a volume subfile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: u64,
    /// Simulation time of the observation.
    pub value: f64,
    /// Serialized [`FunctionsOfTime`], when the writer stored them.
    pub functions_of_time: Option<Vec<u8>>,
}

/// Volume data grouped into named subfiles, stored as a bincode blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeFile {
    subfiles: BTreeMap<String, Vec<Observation>>,
}

impl VolumeFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observation, creating the subfile if needed.
    pub fn push(&mut self, subfile: impl Into<String>, observation: Observation) {
        self.subfiles
            .entry(subfile.into())
            .or_default()
            .push(observation);
    }

    pub fn observations(&self, subfile: &str) -> Option<&[Observation]> {
        self.subfiles.get(subfile).map(Vec::as_slice)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn read(path: &Path) -> Result<Self, OptionsError> {
        let bytes = fs::read(path).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be encoded or written.
    pub fn write(&self, path: &Path) -> Result<(), OptionsError> {
        let bytes = bincode::serialize(self)?;
        fs::write(path, bytes).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Seeds functions of time from the last observation of a volume subfile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct FromVolumeFile {
    #[serde(rename = "H5Filename")]
    pub path: PathBuf,
    #[serde(rename = "SubfileName")]
    pub subfile: String,
}

impl FromVolumeFile {
    pub fn new(path: impl Into<PathBuf>, subfile: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            subfile: subfile.into(),
        }
    }

    /// Returns clones of the named functions from the last observation.
    ///
    /// When `time` is given, each function must be valid there.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the subfile has no
    /// observations or no functions of time, a name is missing, or `time`
    /// lies outside a function's bounds.
    pub fn retrieve_function_of_time(
        &self,
        names: &[&str],
        time: Option<f64>,
    ) -> Result<FunctionsOfTime, OptionsError> {
        let file = VolumeFile::read(&self.path)?;
        let describe = || names.join(", ");

        let observations = file
            .observations(&self.subfile)
            .ok_or_else(|| OptionsError::MissingSubfile {
                path: self.path.clone(),
                subfile: self.subfile.clone(),
            })?;
        let last = observations
            .iter()
            .max_by_key(|observation| observation.id)
            .ok_or_else(|| OptionsError::NoObservations {
                name: describe(),
                path: self.path.clone(),
                subfile: self.subfile.clone(),
            })?;
        let blob = last
            .functions_of_time
            .as_deref()
            .ok_or_else(|| OptionsError::NoFunctionsOfTime {
                name: describe(),
                path: self.path.clone(),
                subfile: self.subfile.clone(),
            })?;
        debug!(
            path = %self.path.display(),
            subfile = %self.subfile,
            observation = last.id,
            "reading functions of time"
        );
        let stored = FunctionsOfTime::deserialize(blob)?;

        let mut result = FunctionsOfTime::new();
        for &name in names {
            let function = stored
                .get(name)
                .map_err(|_| OptionsError::MissingFunction {
                    name: name.to_string(),
                    path: self.path.clone(),
                    subfile: self.subfile.clone(),
                })?;
            let bounds = function.time_bounds();
            if let Some(time) = time {
                if time < bounds[0] || time > bounds[1] {
                    return Err(OptionsError::TimeOutOfBounds {
                        name: name.to_string(),
                        time,
                        bounds,
                    });
                }
            }
            result.insert(name, function.get_clone())?;
        }
        Ok(result)
    }
}
