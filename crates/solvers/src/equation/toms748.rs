//! Alefeld, Potra and Shi's algorithm 748 for bracketed roots.
//!
//! Each iteration takes two inverse-cubic (or Newton-quadratic) steps, a
//! double-length secant step, and a bisection step whenever the bracket failed
//! to shrink by half. The bracket always contains a sign change, so the method
//! cannot diverge, and on smooth functions it converges superlinearly.

mod config;
mod error;
mod solution;

pub use config::Config;
pub use error::Error;
pub use solution::{Solution, Status};

use std::convert::Infallible;

use tracing::{debug, trace};

use crate::{
    equation::{EquationProblem, Evaluation, Observer, ScalarRoot, evaluate},
    model::{Model, ScalarFunction},
};

/// Required shrink factor of the bracket per iteration before bisecting.
const MU: f64 = 0.5;

/// Placeholder for the interpolation points before they are first set.
const UNSET_POINT: (f64, f64) = (1e5, 1e5);

/// Control actions supported by the TOMS748 solver.
pub enum Action {
    /// Stop the solver and report the best point found so far.
    StopEarly,
}

/// Event emitted after each trial evaluation.
pub struct Event<'a, I, O> {
    /// Evaluation counter, starting at 1 after the two endpoints.
    pub iter: usize,
    /// Bracket before the trial point is incorporated.
    pub bracket: [f64; 2],
    /// Evaluation at the trial point.
    pub eval: &'a Evaluation<I, O, 1>,
}

/// Finds a root of the equation inside `bracket` using TOMS748.
///
/// # Errors
///
/// Returns an error if the bracket or config is invalid, the residuals at the
/// bracket ends have the same sign, or the model or problem fails during
/// evaluation.
pub fn solve<M, P, Obs>(
    model: &M,
    problem: &P,
    bracket: [f64; 2],
    config: &Config,
    observer: Obs,
) -> Result<Solution<M::Input, M::Output>, Error>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
    Obs: for<'a> Observer<Event<'a, M::Input, M::Output>, Action>,
{
    config
        .validate()
        .map_err(|reason| Error::InvalidConfig { reason })?;

    let (left, right) = validate_bracket(bracket)?;
    let a = evaluate_finite(model, problem, left)?;
    if a.residual().abs() <= config.residual_tol {
        return Ok(Solution::from_eval(a, [left, left], Status::Converged, 0));
    }
    let b = evaluate_finite(model, problem, right)?;
    if b.residual().abs() <= config.residual_tol {
        return Ok(Solution::from_eval(b, [right, right], Status::Converged, 0));
    }

    if a.residual().signum() == b.residual().signum() {
        return Err(Error::NoBracket {
            left,
            right,
            left_residual: a.residual(),
            right_residual: b.residual(),
        });
    }

    let mut search = Search {
        model,
        problem,
        config,
        observer,
        iters: 0,
        a,
        b,
        d: UNSET_POINT,
        e: UNSET_POINT,
    };
    let status = match search.run() {
        Ok(never) => match never {},
        Err(Halt::Finished(status)) => status,
        Err(Halt::Failed(err)) => return Err(err),
    };
    if status == Status::MaxIters {
        debug!(
            iters = search.iters,
            left = search.a.point(),
            right = search.b.point(),
            "toms748 reached the iteration limit"
        );
    }
    Ok(search.into_solution(status))
}

/// Runs TOMS748 without observation.
///
/// # Errors
///
/// Returns an error if the bracket or config is invalid, or the model or
/// problem fails during evaluation.
pub fn solve_unobserved<M, P>(
    model: &M,
    problem: &P,
    bracket: [f64; 2],
    config: &Config,
) -> Result<Solution<M::Input, M::Output>, Error>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
{
    solve(model, problem, bracket, config, ())
}

/// Finds a root of the scalar function `f` inside `bracket`.
///
/// # Errors
///
/// Returns an error if the bracket or config is invalid, `f` does not change
/// sign across the bracket, or `f` returns a non-finite value.
pub fn find_root(
    f: impl Fn(f64) -> f64,
    bracket: [f64; 2],
    config: &Config,
) -> Result<Solution<f64, f64>, Error> {
    solve(&ScalarFunction(f), &ScalarRoot::ZERO, bracket, config, ())
}

/// Why the search loop stopped.
enum Halt {
    Finished(Status),
    Failed(Error),
}

impl From<Error> for Halt {
    fn from(err: Error) -> Self {
        Self::Failed(err)
    }
}

/// Search state: the bracket `[a, b]` plus the two previous points `d` and `e`
/// (as `(x, f(x))` pairs) that feed the interpolation steps.
struct Search<'a, M: Model, P, Obs> {
    model: &'a M,
    problem: &'a P,
    config: &'a Config,
    observer: Obs,
    iters: usize,
    a: Evaluation<M::Input, M::Output, 1>,
    b: Evaluation<M::Input, M::Output, 1>,
    d: (f64, f64),
    e: (f64, f64),
}

impl<M, P, Obs> Search<'_, M, P, Obs>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
    Obs: for<'e> Observer<Event<'e, M::Input, M::Output>, Action>,
{
    fn run(&mut self) -> Result<Infallible, Halt> {
        self.check()?;

        let (a, b, fa, fb) = self.ends();
        self.step(secant_interpolate(a, b, fa, fb))?;

        let (a, b, fa, fb) = self.ends();
        let (d, fd) = self.d;
        let c = quadratic_interpolate(a, b, d, fa, fb, fd, 2);
        self.e = self.d;
        self.step(c)?;

        loop {
            let (a0, b0) = (self.a.point(), self.b.point());

            let c = self.interpolate(2);
            self.e = self.d;
            self.step(c)?;

            let c = self.interpolate(3);
            self.step(c)?;

            let (a, b, fa, fb) = self.ends();
            let (u, fu) = if fa.abs() < fb.abs() { (a, fa) } else { (b, fb) };
            let mut c = u - 2.0 * (fu / (fb - fa)) * (b - a);
            if (c - u).abs() > 0.5 * (b - a) {
                c = a + 0.5 * (b - a);
            }
            self.e = self.d;
            self.step(c)?;

            if self.b.point() - self.a.point() < MU * (b0 - a0) {
                continue;
            }
            trace!(iter = self.iters, "toms748 bisection step");
            let (a, b, ..) = self.ends();
            self.e = self.d;
            self.step(a + 0.5 * (b - a))?;
        }
    }

    fn ends(&self) -> (f64, f64, f64, f64) {
        (
            self.a.point(),
            self.b.point(),
            self.a.residual(),
            self.b.residual(),
        )
    }

    /// Chooses an inverse-cubic step, or a Newton-quadratic step when the
    /// residuals are too close together for the cubic to be well defined.
    fn interpolate(&self, newton_steps: usize) -> f64 {
        let (a, b, fa, fb) = self.ends();
        let (d, fd) = self.d;
        let (e, fe) = self.e;
        let min_diff = f64::MIN_POSITIVE * 32.0;
        let degenerate = [fa - fb, fa - fd, fa - fe, fb - fd, fb - fe, fd - fe]
            .iter()
            .any(|diff| diff.abs() < min_diff);
        if degenerate {
            quadratic_interpolate(a, b, d, fa, fb, fd, newton_steps)
        } else {
            cubic_interpolate(a, b, d, e, fa, fb, fd, fe)
        }
    }

    /// Evaluates a trial point and shrinks the bracket around the sign change.
    fn step(&mut self, c: f64) -> Result<(), Halt> {
        let c = self.keep_inside(c);
        let eval = evaluate_finite(self.model, self.problem, c)?;
        self.iters += 1;

        let event = Event {
            iter: self.iters,
            bracket: [self.a.point(), self.b.point()],
            eval: &eval,
        };
        let action = self.observer.observe(&event);

        let fc = eval.residual();
        if fc == 0.0 {
            self.d = (0.0, 0.0);
            self.a = eval;
        } else if (self.a.residual() < 0.0) != (fc < 0.0) {
            self.d = (self.b.point(), self.b.residual());
            self.b = eval;
        } else {
            self.d = (self.a.point(), self.a.residual());
            self.a = eval;
        }

        if let Some(Action::StopEarly) = action {
            return Err(Halt::Finished(Status::StoppedByObserver));
        }
        self.check()
    }

    /// Moves `c` strictly inside the bracket by a few ulps.
    fn keep_inside(&self, c: f64) -> f64 {
        let (a, b) = (self.a.point(), self.b.point());
        let tol = 2.0 * f64::EPSILON;
        if !c.is_finite() || (b - a) < 2.0 * tol * a.abs() {
            a + 0.5 * (b - a)
        } else if c <= a + a.abs() * tol {
            a + a.abs() * tol
        } else if c >= b - b.abs() * tol {
            b - b.abs() * tol
        } else {
            c
        }
    }

    fn check(&self) -> Result<(), Halt> {
        let tol = self.config.residual_tol;
        let converged = self.a.residual().abs() <= tol
            || self.b.residual().abs() <= tol
            || self.config.width_converged(self.a.point(), self.b.point());
        if converged {
            Err(Halt::Finished(Status::Converged))
        } else if self.iters >= self.config.max_iters {
            Err(Halt::Finished(Status::MaxIters))
        } else {
            Ok(())
        }
    }

    fn into_solution(self, status: Status) -> Solution<M::Input, M::Output> {
        let bracket = [self.a.point(), self.b.point()];
        let best = if self.a.residual().abs() <= self.b.residual().abs() {
            self.a
        } else {
            self.b
        };
        Solution::from_eval(best, bracket, status, self.iters)
    }
}

fn evaluate_finite<M, P>(
    model: &M,
    problem: &P,
    x: f64,
) -> Result<Evaluation<M::Input, M::Output, 1>, Error>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
{
    let eval = evaluate(model, problem, [x])?;
    if !eval.residual().is_finite() {
        return Err(Error::NonFiniteResidual {
            x,
            residual: eval.residual(),
        });
    }
    Ok(eval)
}

/// Validates bracket values and returns them in normalized (left < right) order.
fn validate_bracket(bracket: [f64; 2]) -> Result<(f64, f64), Error> {
    let [left, right] = bracket;

    if let Some(value) = [left, right].into_iter().find(|v| !v.is_finite()) {
        return Err(Error::NonFiniteBracket { value });
    }

    #[allow(clippy::float_cmp)]
    if left == right {
        return Err(Error::ZeroWidthBracket { value: left });
    }

    Ok((left.min(right), left.max(right)))
}

/// Divides, returning `fallback` when the quotient would overflow.
fn safe_div(num: f64, denom: f64, fallback: f64) -> f64 {
    if denom.abs() < 1.0 && (denom * f64::MAX).abs() <= num.abs() {
        fallback
    } else {
        num / denom
    }
}

fn secant_interpolate(a: f64, b: f64, fa: f64, fb: f64) -> f64 {
    let tol = 5.0 * f64::EPSILON;
    let c = a - (fa / (fb - fa)) * (b - a);
    if c <= a + a.abs() * tol || c >= b - b.abs() * tol {
        0.5 * (a + b)
    } else {
        c
    }
}

/// Root of the quadratic through `(a, fa)`, `(b, fb)`, `(d, fd)` found by
/// `newton_steps` Newton iterations, falling back to the secant step.
fn quadratic_interpolate(
    a: f64,
    b: f64,
    d: f64,
    fa: f64,
    fb: f64,
    fd: f64,
    newton_steps: usize,
) -> f64 {
    let slope = safe_div(fb - fa, b - a, f64::MAX);
    let curvature = safe_div(
        safe_div(fd - fb, d - b, f64::MAX) - slope,
        d - a,
        0.0,
    );
    if curvature == 0.0 {
        return secant_interpolate(a, b, fa, fb);
    }

    let mut c = if curvature.signum() * fa.signum() > 0.0 {
        a
    } else {
        b
    };
    for _ in 0..newton_steps {
        c -= safe_div(
            fa + (slope + curvature * (c - b)) * (c - a),
            slope + curvature * (2.0 * c - a - b),
            1.0 + c - a,
        );
    }
    if c <= a || c >= b {
        secant_interpolate(a, b, fa, fb)
    } else {
        c
    }
}

/// Inverse cubic interpolation through four points.
#[allow(clippy::too_many_arguments)]
fn cubic_interpolate(
    a: f64,
    b: f64,
    d: f64,
    e: f64,
    fa: f64,
    fb: f64,
    fd: f64,
    fe: f64,
) -> f64 {
    let q11 = (d - e) * fd / (fe - fd);
    let q21 = (b - d) * fb / (fd - fb);
    let q31 = (a - b) * fa / (fb - fa);
    let d21 = (b - d) * fd / (fd - fb);
    let d31 = (a - b) * fb / (fb - fa);
    let q22 = (d21 - q11) * fb / (fe - fb);
    let q32 = (d31 - q21) * fa / (fd - fa);
    let d32 = (d31 - q21) * fd / (fd - fa);
    let q33 = (d32 - q22) * fa / (fe - fa);

    let c = q31 + q32 + q33 + a;
    if c <= a || c >= b {
        quadratic_interpolate(a, b, d, fa, fb, fd, 3)
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use approx::assert_relative_eq;

    /// Model that squares its input.
    struct SquareModel;
    impl Model for SquareModel {
        type Input = f64;
        type Output = f64;
        type Error = Infallible;

        fn call(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
            Ok(input * input)
        }
    }

    #[test]
    fn finds_square_root() {
        let problem = ScalarRoot { target: 9.0 };

        let solution = solve_unobserved(&SquareModel, &problem, [0.0, 10.0], &Config::default())
            .expect("should solve");

        assert_eq!(solution.status, Status::Converged);
        assert_relative_eq!(solution.x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(solution.snapshot.output, 9.0, epsilon = 1e-10);
        assert!(solution.iters < 20);
    }

    #[test]
    fn finds_fixed_point_of_cosine() {
        let solution = find_root(|x| x.cos() - x, [0.0, 1.0], &Config::default())
            .expect("should solve");

        assert!(solution.is_converged());
        assert_relative_eq!(solution.x, 0.739_085_133_215_160_6, epsilon = 1e-12);
    }

    #[test]
    fn handles_exponential_growth() {
        let solution = find_root(|x| x.exp() - 2.0, [-5.0, 5.0], &Config::default())
            .expect("should solve");

        assert!(solution.is_converged());
        assert_relative_eq!(solution.x, std::f64::consts::LN_2, epsilon = 1e-12);
    }

    #[test]
    fn observer_can_stop_iteration() {
        let problem = ScalarRoot { target: 9.0 };

        let mut calls = 0usize;
        let observer = |event: &Event<'_, f64, f64>| {
            calls += 1;
            if event.iter >= 3 {
                Some(Action::StopEarly)
            } else {
                None
            }
        };

        let solution = solve(&SquareModel, &problem, [0.0, 10.0], &Config::default(), observer)
            .expect("should stop cleanly");

        assert_eq!(solution.status, Status::StoppedByObserver);
        assert_eq!(solution.iters, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn normalizes_reversed_bracket() {
        let problem = ScalarRoot { target: 36.0 };

        let solution = solve_unobserved(&SquareModel, &problem, [10.0, 0.0], &Config::default())
            .expect("should solve with reversed bracket");

        assert_eq!(solution.status, Status::Converged);
        assert_relative_eq!(solution.x, 6.0, epsilon = 1e-12);
    }

    #[test]
    fn exact_root_at_an_endpoint() {
        let solution =
            find_root(|x| x - 2.0, [2.0, 5.0], &Config::default()).expect("should solve");

        assert_eq!(solution.status, Status::Converged);
        assert_eq!(solution.x, 2.0);
        assert_eq!(solution.iters, 0);
    }

    #[test]
    fn rejects_invalid_brackets_and_configs() {
        let config = Config::default();
        assert!(matches!(
            find_root(|x| x, [5.0, 5.0], &config),
            Err(Error::ZeroWidthBracket { .. })
        ));
        assert!(matches!(
            find_root(|x| x, [f64::NAN, 1.0], &config),
            Err(Error::NonFiniteBracket { .. })
        ));
        assert!(matches!(
            find_root(|x| x * x + 1.0, [-1.0, 1.0], &config),
            Err(Error::NoBracket { .. })
        ));

        let config = Config {
            x_rel_tol: f64::NAN,
            ..Config::default()
        };
        assert!(matches!(
            find_root(|x| x, [-1.0, 1.0], &config),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn zero_iters_returns_best_endpoint() {
        let config = Config {
            max_iters: 0,
            ..Config::default()
        };
        let solution =
            solve_unobserved(&SquareModel, &ScalarRoot { target: 9.0 }, [2.0, 10.0], &config)
                .expect("should return best endpoint");

        assert_eq!(solution.status, Status::MaxIters);
        assert_eq!(solution.iters, 0);
        assert_relative_eq!(solution.x, 2.0);
    }
}
