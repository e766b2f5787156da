//! Anisotropy parameter β from intensity-vs-angle data.
//!
//! Model (Cooper & Zare 1968):
//!
//! ```text
//! I(θ) = A · [1 + β · P₂(cos θ)],   P₂(x) = (3x² − 1) / 2
//! ```
//!
//! with θ measured from the vertical (polarization) axis.

pub mod solver;

use solver::{CurveFitter, CurveModel, SolverError};
use tiny_solver::factors::na as ts_na;

use crate::integrate::{RadialBand, RadialIntegration};
use crate::ProfileError;

/// Inclusive angular interval `(lo, hi)` in radians.
pub type ThetaRange = (f64, f64);

/// Second-order Legendre polynomial.
#[inline]
pub fn legendre_p2(x: f64) -> f64 {
    (3.0 * x * x - 1.0) / 2.0
}

/// Photoelectron angular distribution `A (1 + β P₂(cos θ))`.
#[inline]
pub fn angular_distribution(theta: f64, beta: f64, amplitude: f64) -> f64 {
    amplitude * (1.0 + beta * legendre_p2(theta.cos()))
}

/// [`angular_distribution`] as a fit model with parameters `[β, A]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AngularDistributionModel;

impl CurveModel for AngularDistributionModel {
    fn n_params(&self) -> usize {
        2
    }

    fn value<T: ts_na::RealField>(&self, theta: f64, p: &[T]) -> T {
        let one: T = ts_na::convert(1.0);
        let p2: T = ts_na::convert(legendre_p2(theta.cos()));
        p[1].clone() * (one + p[0].clone() * p2)
    }

    fn gradient(&self, theta: f64, p: &[f64], out: &mut [f64]) {
        let p2 = legendre_p2(theta.cos());
        out[0] = p[1] * p2;
        out[1] = 1.0 + p[0] * p2;
    }
}

/// Starting point, bounds and stopping rules for the β fit.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnisotropyConfig {
    /// Initial β.
    pub initial_beta: f64,
    /// Initial amplitude.
    pub initial_amplitude: f64,
    /// Optional `(lo, hi)` box for β. Physical values lie in `[-1, 2]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta_bounds: Option<(f64, f64)>,
    /// Optional `(lo, hi)` box for the amplitude.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amplitude_bounds: Option<(f64, f64)>,
    /// Optimizer iteration cap per round.
    pub max_iterations: usize,
    /// Relative cost-reduction tolerance of the optimizer.
    pub f_tolerance: f64,
    /// Largest relative cost reduction one more Gauss–Newton step may still
    /// promise at an accepted solution.
    pub convergence_tolerance: f64,
}

impl Default for AnisotropyConfig {
    fn default() -> Self {
        Self {
            initial_beta: 1.0,
            initial_amplitude: 1.0,
            beta_bounds: None,
            amplitude_bounds: None,
            max_iterations: 200,
            f_tolerance: 1e-14,
            convergence_tolerance: 1e-6,
        }
    }
}

impl AnisotropyConfig {
    fn validate(&self) -> Result<(), ProfileError> {
        for (name, value) in [
            ("initial_beta", self.initial_beta),
            ("initial_amplitude", self.initial_amplitude),
            ("f_tolerance", self.f_tolerance),
            ("convergence_tolerance", self.convergence_tolerance),
        ] {
            if !value.is_finite() {
                return Err(ProfileError::InvalidParameter { name, value });
            }
        }
        for (name, bounds) in [
            ("beta_bounds", self.beta_bounds),
            ("amplitude_bounds", self.amplitude_bounds),
        ] {
            if let Some((lo, hi)) = bounds {
                if lo.is_nan() || hi.is_nan() || lo > hi {
                    return Err(ProfileError::InvalidParameter { name, value: hi - lo });
                }
            }
        }
        Ok(())
    }

    fn solver(&self) -> CurveFitter {
        CurveFitter {
            max_iterations: self.max_iterations,
            f_tolerance: self.f_tolerance,
            convergence_tolerance: self.convergence_tolerance,
            bounds: vec![self.beta_bounds, self.amplitude_bounds],
        }
    }
}

/// Fitted anisotropy parameter and amplitude with one-sigma errors.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnisotropyFit {
    pub beta: f64,
    pub beta_error: f64,
    pub amplitude: f64,
    pub amplitude_error: f64,
    /// Samples used after angular filtering.
    pub n_points: usize,
    /// Residual sum of squares at the solution.
    pub cost: f64,
}

impl AnisotropyFit {
    /// Model intensity at `theta` for the fitted parameters.
    pub fn evaluate(&self, theta: f64) -> f64 {
        angular_distribution(theta, self.beta, self.amplitude)
    }
}

/// Keep the samples whose angle lies inside every range in `ranges`.
///
/// The ranges are intersected, not merged: several disjoint ranges select
/// nothing. Pass a single range (or overlapping ones) to restrict the fit.
pub fn select_theta_ranges(
    theta: &[f64],
    intensity: &[f64],
    ranges: Option<&[ThetaRange]>,
) -> (Vec<f64>, Vec<f64>) {
    let Some(ranges) = ranges else {
        return (theta.to_vec(), intensity.to_vec());
    };
    theta
        .iter()
        .zip(intensity)
        .filter(|(t, _)| ranges.iter().all(|&(lo, hi)| **t >= lo && **t <= hi))
        .map(|(&t, &v)| (t, v))
        .unzip()
}

/// Fit `A (1 + β P₂(cos θ))` to an angular profile.
///
/// `theta_ranges`, when given, restricts the fit to angles inside all of the
/// ranges (see [`select_theta_ranges`]).
pub fn anisotropy_parameter(
    theta: &[f64],
    intensity: &[f64],
    theta_ranges: Option<&[ThetaRange]>,
    config: &AnisotropyConfig,
) -> Result<AnisotropyFit, ProfileError> {
    if theta.len() != intensity.len() {
        return Err(ProfileError::InputShape {
            what: "angular profile",
            expected: [1, theta.len()],
            got: [1, intensity.len()],
        });
    }
    config.validate()?;

    let (theta, intensity) = select_theta_ranges(theta, intensity, theta_ranges);
    let model = AngularDistributionModel;
    if theta.len() < model.n_params() {
        return Err(ProfileError::EmptySelection {
            needed: model.n_params(),
            got: theta.len(),
        });
    }
    if intensity.iter().all(|&v| v == 0.0) {
        return Err(SolverError::Degenerate.into());
    }

    let fit = config.solver().fit(
        &model,
        &theta,
        &intensity,
        &[config.initial_beta, config.initial_amplitude],
    )?;
    let errors = fit.std_errors();
    tracing::debug!(
        "beta = {:.4} ± {:.4}, amplitude = {:.4} ± {:.4} ({} points, cost {:.3e})",
        fit.params[0],
        errors[0],
        fit.params[1],
        errors[1],
        theta.len(),
        fit.cost
    );
    Ok(AnisotropyFit {
        beta: fit.params[0],
        beta_error: errors[0],
        amplitude: fit.params[1],
        amplitude_error: errors[1],
        n_points: theta.len(),
        cost: fit.cost,
    })
}

/// β fit outcome for one radial band.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BandAnisotropy {
    pub band: RadialBand,
    pub midpoint: f64,
    /// Radial grid rows summed into the band.
    pub n_radial_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<AnisotropyFit>,
    /// Why the fit failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fit β independently for every band of a radial integration.
///
/// A failing band is recorded with its error and does not stop the others.
pub fn anisotropy_per_band(
    integration: &RadialIntegration,
    theta_ranges: Option<&[ThetaRange]>,
    config: &AnisotropyConfig,
) -> Vec<BandAnisotropy> {
    let mut out = Vec::with_capacity(integration.n_bands());
    for (b, band) in integration.bands.iter().enumerate() {
        let intensity = integration.intensity.row(b).to_vec();
        let result = anisotropy_parameter(&integration.theta, &intensity, theta_ranges, config);
        let (fit, error) = match result {
            Ok(fit) => (Some(fit), None),
            Err(e) => {
                tracing::warn!("band [{:.2}, {:.2}]: {}", band.lo, band.hi, e);
                (None, Some(e.to_string()))
            }
        };
        out.push(BandAnisotropy {
            band: *band,
            midpoint: integration.midpoints[b],
            n_radial_samples: integration.samples_per_band[b],
            fit,
            error,
        });
    }
    out
}
