use std::convert::Infallible;

/// A callable that the solvers evaluate at each trial point.
pub trait Model {
    type Input;
    type Output;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Evaluates the model.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be evaluated at `input`.
    fn call(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// The input and output of one model call.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<I, O> {
    pub input: I,
    pub output: O,
}

impl<I, O> Snapshot<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self { input, output }
    }
}

/// Wraps an infallible scalar function `f(x)` as a [`Model`].
///
/// Radial relations inverted by the coordinate maps are closed-form
/// expressions of one variable, so they are supplied as plain closures.
#[derive(Debug, Clone, Copy)]
pub struct ScalarFunction<F>(pub F);

impl<F: Fn(f64) -> f64> Model for ScalarFunction<F> {
    type Input = f64;
    type Output = f64;
    type Error = Infallible;

    fn call(&self, input: &f64) -> Result<f64, Infallible> {
        Ok((self.0)(*input))
    }
}
