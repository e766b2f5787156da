//! Least-squares curve fitting with a parameter covariance estimate.
//!
//! The minimisation runs through `tiny_solver`'s Levenberg–Marquardt
//! optimizer with one residual block per sample. The covariance is computed
//! afterwards from the analytic Jacobian at the solution:
//! `cov = (JᵀJ)⁻¹ · SSR / (n − p)`.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};
use tiny_solver::factors::na as ts_na;
use tiny_solver::Optimizer;

/// Residual cost below `EXACT_FIT * Σy²` is treated as an exact fit.
const EXACT_FIT: f64 = 1e-24;
/// Smallest eigenvalue of the normalized `JᵀJ` that still counts as full rank.
const RANK_TOL: f64 = 1e-12;
/// Optimizer restarts from the last solution before giving up.
const MAX_ROUNDS: usize = 4;
/// Parameter key inside the `tiny_solver` problem.
const PARAMS_KEY: &str = "p";

/// A scalar model with a fixed number of parameters.
///
/// `value` is generic so the optimizer can differentiate it automatically;
/// `gradient` is the analytic Jacobian row used for the covariance.
pub trait CurveModel: Clone + Send + Sync + 'static {
    fn n_params(&self) -> usize;

    /// Model value at `x`.
    fn value<T: ts_na::RealField>(&self, x: f64, params: &[T]) -> T;

    /// Partial derivatives `∂f/∂p_k` at `x`, written into `out` (`len == n_params`).
    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]);
}

/// Errors reported by [`CurveFitter::fit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Fewer observations than free parameters.
    TooFewPoints {
        /// Required minimum number of points.
        needed: usize,
        /// Provided number of points.
        got: usize,
    },
    /// `x` and `y` differ in length.
    LengthMismatch { x: usize, y: usize },
    /// Initial guess does not match the model's parameter count.
    BadInitialGuess { expected: usize, got: usize },
    /// Data carry no information about the parameters (e.g. all zeros).
    Degenerate,
    /// A residual, parameter or covariance entry became NaN/inf.
    NonFinite,
    /// The optimizer returned no solution.
    NoSolution,
    /// One more Gauss–Newton step would still lower the cost noticeably.
    NotConverged {
        /// Residual sum of squares at the returned point.
        cost: f64,
        /// Cost reduction predicted for the next step.
        predicted_decrease: f64,
    },
    /// As many points as parameters: the fit is exact and the residual
    /// variance is undefined.
    NoDegreesOfFreedom { points: usize, params: usize },
    /// `JᵀJ` is rank deficient at the solution, so the covariance is undefined.
    SingularCovariance,
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewPoints { needed, got } => {
                write!(f, "too few points: need {}, got {}", needed, got)
            }
            Self::LengthMismatch { x, y } => {
                write!(f, "x has {} samples but y has {}", x, y)
            }
            Self::BadInitialGuess { expected, got } => {
                write!(f, "initial guess has {} parameters, model has {}", got, expected)
            }
            Self::Degenerate => write!(f, "data do not constrain the model"),
            Self::NonFinite => write!(f, "non-finite value encountered"),
            Self::NoSolution => write!(f, "optimizer returned no solution"),
            Self::NotConverged {
                cost,
                predicted_decrease,
            } => write!(
                f,
                "not converged: cost {:.3e} could still drop by {:.3e}",
                cost, predicted_decrease
            ),
            Self::NoDegreesOfFreedom { points, params } => write!(
                f,
                "{} points for {} parameters leave no degrees of freedom",
                points, params
            ),
            Self::SingularCovariance => write!(f, "singular covariance matrix"),
        }
    }
}

impl std::error::Error for SolverError {}

/// Best-fit parameters and their covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveFit {
    pub params: Vec<f64>,
    pub covariance: DMatrix<f64>,
    /// Residual sum of squares at the solution.
    pub cost: f64,
}

impl CurveFit {
    /// One-sigma parameter uncertainties: `sqrt(diag(cov))`.
    pub fn std_errors(&self) -> Vec<f64> {
        self.covariance.diagonal().iter().map(|v| v.sqrt()).collect()
    }
}

/// Residual `y − f(x; p)` of one sample.
#[derive(Debug, Clone)]
struct SampleFactor<M> {
    model: M,
    x: f64,
    y: f64,
}

impl<M: CurveModel, T: ts_na::RealField> tiny_solver::factors::Factor<T> for SampleFactor<M> {
    fn residual_func(&self, params: &[ts_na::DVector<T>]) -> ts_na::DVector<T> {
        let y: T = ts_na::convert(self.y);
        let r = y - self.model.value(self.x, params[0].as_slice());
        ts_na::DVector::<T>::from_vec(vec![r])
    }
}

/// Levenberg–Marquardt fit with optional box bounds.
#[derive(Debug, Clone)]
pub struct CurveFitter {
    /// Optimizer iterations per round.
    pub max_iterations: usize,
    /// Stop a round when an iteration lowers the cost by less than this fraction.
    pub f_tolerance: f64,
    /// Reject the solution when another Gauss–Newton step is predicted to
    /// lower the cost by more than this fraction.
    pub convergence_tolerance: f64,
    /// Per-parameter `(lo, hi)` bounds; missing entries are unbounded.
    pub bounds: Vec<Option<(f64, f64)>>,
}

impl Default for CurveFitter {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            f_tolerance: 1e-14,
            convergence_tolerance: 1e-6,
            bounds: Vec::new(),
        }
    }
}

impl CurveFitter {
    /// Fit `model` to `(x, y)` starting from `p0`.
    pub fn fit<M: CurveModel>(
        &self,
        model: &M,
        x: &[f64],
        y: &[f64],
        p0: &[f64],
    ) -> Result<CurveFit, SolverError> {
        let m = model.n_params();
        if p0.len() != m {
            return Err(SolverError::BadInitialGuess {
                expected: m,
                got: p0.len(),
            });
        }
        if x.len() != y.len() {
            return Err(SolverError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        let n = x.len();
        if n < m {
            return Err(SolverError::TooFewPoints { needed: m, got: n });
        }
        if x.iter().chain(y).chain(p0).any(|v| !v.is_finite()) {
            return Err(SolverError::NonFinite);
        }
        let y_sq: f64 = y.iter().map(|v| v * v).sum();
        if y_sq == 0.0 {
            return Err(SolverError::Degenerate);
        }
        let exact_cost = EXACT_FIT * y_sq;

        let mut problem = tiny_solver::Problem::new();
        for (&xi, &yi) in x.iter().zip(y) {
            problem.add_residual_block(
                1,
                &[PARAMS_KEY],
                Box::new(SampleFactor {
                    model: model.clone(),
                    x: xi,
                    y: yi,
                }),
                None,
            );
        }
        for (k, b) in self.bounds.iter().enumerate().take(m) {
            if let Some((lo, hi)) = *b {
                problem.set_variable_bounds(PARAMS_KEY, k, lo, hi);
            }
        }

        let optimizer = tiny_solver::LevenbergMarquardtOptimizer::default();
        let mut p = self.project(p0.to_vec());
        for round in 1..=MAX_ROUNDS {
            let mut initial_values = HashMap::<String, ts_na::DVector<f64>>::new();
            initial_values.insert(PARAMS_KEY.to_string(), ts_na::DVector::<f64>::from_vec(p.clone()));
            let options = tiny_solver::OptimizerOptions {
                max_iteration: self.max_iterations.max(1),
                verbosity_level: 0,
                min_abs_error_decrease_threshold: 0.25 * exact_cost,
                min_rel_error_decrease_threshold: self.f_tolerance,
                min_error_threshold: 0.25 * exact_cost,
                ..Default::default()
            };
            let result = optimizer
                .optimize(&problem, &initial_values, Some(options))
                .ok_or(SolverError::NoSolution)?;
            let solved = result.get(PARAMS_KEY).ok_or(SolverError::NoSolution)?;
            if solved.len() != m || solved.iter().any(|v| !v.is_finite()) {
                return Err(SolverError::NonFinite);
            }
            p = self.project(solved.iter().copied().collect());

            let (r, cost) = residuals(model, x, y, &p);
            if !cost.is_finite() {
                return Err(SolverError::NonFinite);
            }
            let j = jacobian(model, x, &p);
            let covariance = covariance(&j, cost, n)?;

            let predicted_decrease = self.predicted_decrease(&j, &r, &p);
            tracing::trace!(
                "fit round {}: cost {:.6e}, predicted decrease {:.3e}",
                round,
                cost,
                predicted_decrease
            );
            if cost <= exact_cost || predicted_decrease <= self.convergence_tolerance * cost + exact_cost {
                return Ok(CurveFit {
                    params: p,
                    covariance,
                    cost,
                });
            }
            if round == MAX_ROUNDS {
                return Err(SolverError::NotConverged {
                    cost,
                    predicted_decrease,
                });
            }
        }
        Err(SolverError::NoSolution)
    }

    fn project(&self, mut p: Vec<f64>) -> Vec<f64> {
        for (v, b) in p.iter_mut().zip(&self.bounds) {
            if let Some((lo, hi)) = *b {
                *v = v.clamp(lo, hi);
            }
        }
        p
    }

    /// `true` for parameters sitting on one of their bounds.
    fn at_bound(&self, k: usize, v: f64) -> bool {
        match self.bounds.get(k).copied().flatten() {
            Some((lo, hi)) => {
                let slack = 1e-12 * v.abs().max(1.0);
                v <= lo + slack || v >= hi - slack
            }
            None => false,
        }
    }

    /// Cost reduction `gᵀ H⁻¹ g` of a Gauss–Newton step over the free parameters.
    fn predicted_decrease(&self, j: &DMatrix<f64>, r: &DVector<f64>, p: &[f64]) -> f64 {
        let free: Vec<usize> = (0..p.len()).filter(|&k| !self.at_bound(k, p[k])).collect();
        if free.is_empty() {
            return 0.0;
        }
        let jf = j.select_columns(free.iter());
        let g = jf.transpose() * r;
        let h = jf.transpose() * &jf;
        match h.cholesky() {
            Some(chol) => g.dot(&chol.solve(&g)).max(0.0),
            None => 0.0,
        }
    }
}

/// `r = y − f(x; p)` and `Σ r²`.
fn residuals<M: CurveModel>(model: &M, x: &[f64], y: &[f64], p: &[f64]) -> (DVector<f64>, f64) {
    let r = DVector::from_iterator(
        x.len(),
        x.iter().zip(y).map(|(&xi, &yi)| yi - model.value::<f64>(xi, p)),
    );
    let cost = r.norm_squared();
    (r, cost)
}

fn jacobian<M: CurveModel>(model: &M, x: &[f64], p: &[f64]) -> DMatrix<f64> {
    let m = model.n_params();
    let mut j = DMatrix::<f64>::zeros(x.len(), m);
    let mut grad = vec![0.0; m];
    for (i, &xi) in x.iter().enumerate() {
        model.gradient(xi, p, &mut grad);
        for (k, &g) in grad.iter().enumerate() {
            j[(i, k)] = g;
        }
    }
    j
}

/// `(JᵀJ)⁻¹ · s²` with `s² = cost / (n − p)`.
///
/// Rank is judged on `JᵀJ` normalized to unit diagonal so that parameters on
/// very different scales are not mistaken for a degeneracy.
fn covariance(j: &DMatrix<f64>, cost: f64, n: usize) -> Result<DMatrix<f64>, SolverError> {
    let m = j.ncols();
    if n <= m {
        return Err(SolverError::NoDegreesOfFreedom { points: n, params: m });
    }
    let jtj = j.transpose() * j;
    let diag: Vec<f64> = (0..m).map(|k| jtj[(k, k)]).collect();
    if diag.iter().any(|&d| !(d > 0.0) || !d.is_finite()) {
        return Err(SolverError::SingularCovariance);
    }
    let normalized = DMatrix::from_fn(m, m, |a, b| jtj[(a, b)] / (diag[a] * diag[b]).sqrt());
    let min_eig = normalized.symmetric_eigenvalues().min();
    if !(min_eig > RANK_TOL) {
        return Err(SolverError::SingularCovariance);
    }

    let inv = jtj.try_inverse().ok_or(SolverError::SingularCovariance)?;
    let cov = inv * (cost / (n - m) as f64);
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::NonFinite);
    }
    Ok(cov)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    /// `y = a · exp(−b x)`.
    #[derive(Clone)]
    struct Decay;

    impl CurveModel for Decay {
        fn n_params(&self) -> usize {
            2
        }

        fn value<T: ts_na::RealField>(&self, x: f64, p: &[T]) -> T {
            let x: T = ts_na::convert(x);
            p[0].clone() * (-(p[1].clone() * x)).exp()
        }

        fn gradient(&self, x: f64, p: &[f64], out: &mut [f64]) {
            let e = (-p[1] * x).exp();
            out[0] = e;
            out[1] = -p[0] * x * e;
        }
    }

    /// `y = c0 + c1 x`, linear in its parameters.
    #[derive(Clone)]
    struct Line;

    impl CurveModel for Line {
        fn n_params(&self) -> usize {
            2
        }

        fn value<T: ts_na::RealField>(&self, x: f64, p: &[T]) -> T {
            let x: T = ts_na::convert(x);
            p[0].clone() + p[1].clone() * x
        }

        fn gradient(&self, x: f64, _p: &[f64], out: &mut [f64]) {
            out[0] = 1.0;
            out[1] = x;
        }
    }

    fn xs(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * step).collect()
    }

    #[test]
    fn recovers_exponential_decay() {
        let x = xs(40, 0.1);
        let y: Vec<f64> = x.iter().map(|&xi| Decay.value(xi, &[3.0, 1.7])).collect();
        let fit = CurveFitter::default().fit(&Decay, &x, &y, &[1.0, 1.0]).unwrap();
        assert_relative_eq!(fit.params[0], 3.0, max_relative = 1e-8);
        assert_relative_eq!(fit.params[1], 1.7, max_relative = 1e-8);
        assert!(fit.std_errors().iter().all(|&e| e < 1e-8));
    }

    #[test]
    fn large_amplitudes_do_not_slow_convergence() {
        let x = xs(60, 0.05);
        for amplitude in [1e6, 1e9] {
            let y: Vec<f64> = x.iter().map(|&xi| Decay.value(xi, &[amplitude, 0.8])).collect();
            let fit = CurveFitter::default().fit(&Decay, &x, &y, &[1.0, 1.0]).unwrap();
            assert_relative_eq!(fit.params[0], amplitude, max_relative = 1e-8);
            assert_relative_eq!(fit.params[1], 0.8, max_relative = 1e-8);
        }
    }

    #[test]
    fn line_covariance_matches_ordinary_least_squares() {
        let x = xs(25, 1.0);
        let mut rng = StdRng::seed_from_u64(7);
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| 2.0 + 0.5 * xi + rng.gen_range(-0.3..0.3))
            .collect();
        let fit = CurveFitter::default().fit(&Line, &x, &y, &[0.0, 0.0]).unwrap();

        // closed-form OLS for comparison
        let n = x.len() as f64;
        let sx: f64 = x.iter().sum();
        let sxx: f64 = x.iter().map(|v| v * v).sum();
        let sy: f64 = y.iter().sum();
        let sxy: f64 = x.iter().zip(&y).map(|(a, b)| a * b).sum();
        let det = n * sxx - sx * sx;
        let slope = (n * sxy - sx * sy) / det;
        let intercept = (sy - slope * sx) / n;
        assert_relative_eq!(fit.params[0], intercept, epsilon = 1e-6);
        assert_relative_eq!(fit.params[1], slope, epsilon = 1e-6);

        let ssr: f64 = x
            .iter()
            .zip(&y)
            .map(|(&xi, &yi)| (yi - intercept - slope * xi).powi(2))
            .sum();
        let s2 = ssr / (n - 2.0);
        assert_relative_eq!(fit.covariance[(1, 1)], s2 * n / det, max_relative = 1e-4);
        assert_relative_eq!(fit.covariance[(0, 0)], s2 * sxx / det, max_relative = 1e-4);
    }

    #[test]
    fn bounds_are_respected() {
        let x = xs(20, 0.2);
        let y: Vec<f64> = x.iter().map(|&xi| 1.0 + 3.0 * xi).collect();
        let solver = CurveFitter {
            bounds: vec![None, Some((0.0, 2.0))],
            ..Default::default()
        };
        let fit = solver.fit(&Line, &x, &y, &[0.0, 5.0]).unwrap();
        assert!(fit.params[1] <= 2.0);
        assert_relative_eq!(fit.params[1], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn rejects_bad_inputs() {
        let fitter = CurveFitter::default();
        assert_eq!(
            fitter.fit(&Line, &[1.0], &[1.0], &[0.0, 0.0]).unwrap_err(),
            SolverError::TooFewPoints { needed: 2, got: 1 }
        );
        assert_eq!(
            fitter.fit(&Line, &[1.0, 2.0], &[1.0], &[0.0, 0.0]).unwrap_err(),
            SolverError::LengthMismatch { x: 2, y: 1 }
        );
        assert_eq!(
            fitter.fit(&Line, &[1.0, 2.0], &[1.0, 2.0], &[0.0]).unwrap_err(),
            SolverError::BadInitialGuess { expected: 2, got: 1 }
        );
        assert_eq!(
            fitter.fit(&Line, &[1.0, f64::NAN], &[1.0, 2.0], &[0.0, 0.0]).unwrap_err(),
            SolverError::NonFinite
        );
        assert_eq!(
            fitter.fit(&Line, &[1.0, 2.0, 3.0], &[0.0; 3], &[0.0, 0.0]).unwrap_err(),
            SolverError::Degenerate
        );
    }

    #[test]
    fn exact_fit_has_no_degrees_of_freedom() {
        let err = CurveFitter::default()
            .fit(&Line, &[0.0, 1.0], &[1.0, 3.0], &[0.0, 0.0])
            .unwrap_err();
        assert_eq!(err, SolverError::NoDegreesOfFreedom { points: 2, params: 2 });
    }

    #[test]
    fn collinear_design_has_no_covariance() {
        // every sample at the same x: intercept and slope are not separable
        let x = vec![2.0; 10];
        let y = vec![5.0; 10];
        let err = CurveFitter::default().fit(&Line, &x, &y, &[0.0, 0.0]).unwrap_err();
        assert!(
            matches!(err, SolverError::SingularCovariance | SolverError::NoSolution),
            "got {:?}",
            err
        );
    }

    #[test]
    fn unconverged_fit_is_reported() {
        let x = xs(40, 0.1);
        let y: Vec<f64> = x.iter().map(|&xi| Decay.value(xi, &[3.0, 1.7])).collect();
        let solver = CurveFitter {
            max_iterations: 1,
            ..Default::default()
        };
        let err = solver.fit(&Decay, &x, &y, &[1.0, 0.05]).unwrap_err();
        assert!(matches!(err, SolverError::NotConverged { .. }), "got {:?}", err);
    }
}
