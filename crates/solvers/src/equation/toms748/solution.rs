use crate::{equation::Evaluation, model::Snapshot};

/// Indicates whether the solver converged or hit the iteration limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Converged according to the configured tolerances.
    Converged,
    /// Reached the iteration limit without converging.
    MaxIters,
    /// Stopped early due to an observer decision.
    StoppedByObserver,
}

/// The result of a TOMS748 solve.
#[derive(Debug, Clone)]
pub struct Solution<I, O> {
    pub status: Status,
    /// Best estimate of the root.
    pub x: f64,
    /// Residual at `x`.
    pub residual: f64,
    /// Final bracket `[a, b]` around the root.
    pub bracket: [f64; 2],
    /// Snapshot at `x`.
    pub snapshot: Snapshot<I, O>,
    /// Number of evaluations made after the two endpoints.
    pub iters: usize,
}

impl<I, O> Solution<I, O> {
    pub(super) fn from_eval(
        eval: Evaluation<I, O, 1>,
        bracket: [f64; 2],
        status: Status,
        iters: usize,
    ) -> Self {
        Self {
            status,
            x: eval.x[0],
            residual: eval.residuals[0],
            bracket,
            snapshot: eval.snapshot,
            iters,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.status == Status::Converged
    }
}
