use std::{io, path::PathBuf};

use chronomap_maps::MapError;
use thiserror::Error;

/// Errors raised while validating options or building maps and functions of time.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// Every map family was left unspecified.
    #[error(
        "Time dependent map options were specified, but all options were 'None'. \
         Specify options for at least one map."
    )]
    NoMapOptions,

    /// An option block is internally inconsistent.
    #[error("invalid options: {reason}")]
    InvalidOptions { reason: String },

    /// The shape map resolution is too low to be useful.
    #[error("Initial LMax must be 2 or greater but is {l_max} instead")]
    LMaxTooSmall { l_max: usize },

    /// A filled object's shape deformation must stop at its enclosing cube.
    #[error("a filled sphere requires the shape map transition to end at the inner cube")]
    TransitionMustEndAtCube,

    /// Not enough radial partitions for the requested map layout.
    #[error("at least {required} radial partitions are required to {purpose}, got {actual}")]
    RadialPartitions {
        required: usize,
        actual: usize,
        purpose: &'static str,
    },

    /// Block maps were requested before `build_maps` ran.
    #[error("maps have not been built yet")]
    MapsNotBuilt,

    /// A block index lies outside the layout.
    #[error("block {block} is outside the {blocks} blocks that carry shape maps")]
    InvalidBlock { block: usize, blocks: usize },

    /// A function of time read from a file has an unexpected concrete type.
    #[error(
        "{name} function of time read from volume data is not a {expected}. \
         Cannot use it to initialize the {name} map."
    )]
    WrongFunctionType { name: String, expected: &'static str },

    /// The volume file could not be opened or read.
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The volume file contents could not be decoded.
    #[error("failed to decode volume data")]
    Decode(#[from] bincode::Error),

    /// The volume file has no subfile with the requested name.
    #[error("no subfile {subfile} in {path}")]
    MissingSubfile { path: PathBuf, subfile: String },

    #[error("{name}: There are no observation IDs in the subfile {subfile} of {path}")]
    NoObservations {
        name: String,
        path: PathBuf,
        subfile: String,
    },

    #[error(
        "{name}: There are no functions of time in the subfile {subfile} of {path}. \
         Choose a different subfile or file."
    )]
    NoFunctionsOfTime {
        name: String,
        path: PathBuf,
        subfile: String,
    },

    #[error("No function of time named {name} in the subfile {subfile} of {path}")]
    MissingFunction {
        name: String,
        path: PathBuf,
        subfile: String,
    },

    /// The query time lies outside the stored function's validity window.
    #[error("{name}: The requested time {time} is out of the range of the function of time {bounds:?}")]
    TimeOutOfBounds {
        name: String,
        time: f64,
        bounds: [f64; 2],
    },

    /// A coefficient file has no row at the requested time.
    #[error("Unable to find requested time {time} within an epsilon of {epsilon} in {path}")]
    MatchTimeNotFound {
        path: PathBuf,
        time: f64,
        epsilon: f64,
    },

    /// A coefficient file has several rows at the requested time.
    #[error("Found more than one time in {path} that is within {epsilon} of the time requested {time}")]
    AmbiguousMatchTime {
        path: PathBuf,
        time: f64,
        epsilon: f64,
    },

    /// A coefficient file row could not be parsed.
    #[error("malformed line {line} in {path}: {reason}")]
    MalformedYlmFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    FunctionOfTime(#[from] chronomap_core::Error),

    #[error(transparent)]
    Map(#[from] MapError),
}
