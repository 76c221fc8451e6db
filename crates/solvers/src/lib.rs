//! Root finders for chronomap.
//!
//! - [`Model`]: a callable evaluated at each trial point, with
//!   [`ScalarFunction`] adapting plain closures
//! - [`equation::EquationProblem`]: adapts solver variables to model inputs
//!   and extracts residuals from outputs
//! - [`equation::toms748`]: bracketing root finder with superlinear
//!   convergence, used to invert radial relations

pub mod equation;
mod model;

pub use model::{Model, ScalarFunction, Snapshot};
