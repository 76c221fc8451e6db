use thiserror::Error;

use chronomap_solvers::equation::toms748;

/// Errors raised while evaluating a coordinate map.
#[derive(Debug, Error)]
pub enum MapError {
    /// A function of time the map depends on failed to evaluate.
    #[error(transparent)]
    FunctionOfTime(#[from] chronomap_core::Error),

    /// A function of time returned a value with the wrong number of components.
    #[error("function of time `{name}` has {actual} components, expected {expected}")]
    ComponentCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// The root finder used to invert a radial relation failed.
    #[error("root finding failed")]
    RootFinding(#[from] toms748::Error),

    /// The root finder stopped before reaching its tolerance.
    #[error("root finding did not converge after {iters} iterations near {x}")]
    NotConverged { iters: usize, x: f64 },

    /// A Jacobian could not be inverted.
    #[error("Jacobian is singular at {point:?}")]
    SingularJacobian { point: Vec<f64> },

    /// The point is at the map center, where the map has no direction.
    #[error("point {point:?} coincides with the map center")]
    AtCenter { point: Vec<f64> },

    /// The map parameters are inconsistent.
    #[error("invalid map parameters: {reason}")]
    InvalidParameters { reason: String },
}
