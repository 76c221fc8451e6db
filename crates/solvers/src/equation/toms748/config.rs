/// Configuration for the TOMS748 solver.
///
/// The search stops once the bracket width falls below
/// `x_abs_tol + x_rel_tol * min(|a|, |b|)` or a residual magnitude is at most
/// `residual_tol`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub max_iters: usize,
    pub x_abs_tol: f64,
    pub x_rel_tol: f64,
    pub residual_tol: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iters: 100,
            x_abs_tol: 1e-12,
            x_rel_tol: 1e-15,
            residual_tol: 0.0,
        }
    }
}

impl Config {
    /// Validates that all tolerances are finite and non-negative.
    ///
    /// # Errors
    ///
    /// Returns an error if any tolerance is negative or non-finite.
    pub fn validate(&self) -> Result<(), &'static str> {
        for (tol, reason) in [
            (self.x_abs_tol, "x_abs_tol must be finite and non-negative"),
            (self.x_rel_tol, "x_rel_tol must be finite and non-negative"),
            (self.residual_tol, "residual_tol must be finite and non-negative"),
        ] {
            if !tol.is_finite() || tol < 0.0 {
                return Err(reason);
            }
        }
        Ok(())
    }

    pub(super) fn width_converged(&self, a: f64, b: f64) -> bool {
        (b - a).abs() <= self.x_abs_tol + self.x_rel_tol * a.abs().min(b.abs())
    }
}
