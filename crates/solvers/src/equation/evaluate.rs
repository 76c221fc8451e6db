use thiserror::Error;

use crate::model::{Model, Snapshot};

use super::EquationProblem;

/// One trial point: the solver variables, their residuals, and the model call.
#[derive(Debug, Clone)]
pub struct Evaluation<I, O, const N: usize> {
    pub x: [f64; N],
    pub residuals: [f64; N],
    pub snapshot: Snapshot<I, O>,
}

impl<I, O> Evaluation<I, O, 1> {
    /// The scalar trial point.
    pub fn point(&self) -> f64 {
        self.x[0]
    }

    /// The scalar residual.
    pub fn residual(&self) -> f64 {
        self.residuals[0]
    }
}

/// Failure in one of the three stages of [`evaluate`].
#[derive(Debug, Error)]
pub enum EvalError<IE, ME, RE> {
    #[error("failed to compute input")]
    Input(#[source] IE),
    #[error("model call failed")]
    Model(#[source] ME),
    #[error("failed to compute residuals")]
    Residual(#[source] RE),
}

/// Result of [`evaluate`] for a model and problem pair.
pub type EvaluateResult<M, P, const N: usize> = Result<
    Evaluation<<M as Model>::Input, <M as Model>::Output, N>,
    EvalError<
        <P as EquationProblem<N>>::InputError,
        <M as Model>::Error,
        <P as EquationProblem<N>>::ResidualError,
    >,
>;

/// Builds the input for `x`, calls the model, and computes the residuals.
///
/// # Errors
///
/// Returns the first stage that fails.
pub fn evaluate<M, P, const N: usize>(
    model: &M,
    problem: &P,
    x: [f64; N],
) -> EvaluateResult<M, P, N>
where
    M: Model,
    P: EquationProblem<N, Input = M::Input, Output = M::Output>,
{
    let input = problem.input(&x).map_err(EvalError::Input)?;
    let output = model.call(&input).map_err(EvalError::Model)?;
    let residuals = problem
        .residuals(&input, &output)
        .map_err(EvalError::Residual)?;

    Ok(Evaluation {
        x,
        residuals,
        snapshot: Snapshot::new(input, output),
    })
}
