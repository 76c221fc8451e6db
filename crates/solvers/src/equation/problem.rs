use std::convert::Infallible;

/// Adapts solver variables to a model's input and its output to residuals.
pub trait EquationProblem<const N: usize> {
    type Input;
    type Output;
    type InputError: std::error::Error + Send + Sync + 'static;
    type ResidualError: std::error::Error + Send + Sync + 'static;

    /// Builds the model input for the solver variables `x`.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` does not correspond to a valid input.
    fn input(&self, x: &[f64; N]) -> Result<Self::Input, Self::InputError>;

    /// Computes the residuals for a model call.
    ///
    /// # Errors
    ///
    /// Returns an error if the residuals cannot be computed.
    fn residuals(
        &self,
        input: &Self::Input,
        output: &Self::Output,
    ) -> Result<[f64; N], Self::ResidualError>;
}

/// Solves `f(x) = target` for a scalar model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarRoot {
    pub target: f64,
}

impl ScalarRoot {
    /// The problem `f(x) = 0`.
    pub const ZERO: Self = Self { target: 0.0 };
}

impl EquationProblem<1> for ScalarRoot {
    type Input = f64;
    type Output = f64;
    type InputError = Infallible;
    type ResidualError = Infallible;

    fn input(&self, x: &[f64; 1]) -> Result<f64, Infallible> {
        Ok(x[0])
    }

    fn residuals(&self, _input: &f64, output: &f64) -> Result<[f64; 1], Infallible> {
        Ok([output - self.target])
    }
}
