//! Solvers for equation problems, finding roots of residual functions.
//!
//! An [`EquationProblem`] maps solver variables `x: [f64; N]` to model inputs,
//! calls the model, and computes residuals. Solvers in this module drive those
//! residuals toward zero.
//!
//! # Solvers
//!
//! - [`toms748`]: bracketed root finding by interpolation with bisection safeguards

mod evaluate;
mod observe;
mod problem;

pub use evaluate::{EvalError, EvaluateResult, Evaluation, evaluate};
pub use observe::Observer;
pub use problem::{EquationProblem, ScalarRoot};

pub mod toms748;
