//! Error taxonomy shared by the resampling, integration and fitting stages.

use crate::anisotropy::solver::SolverError;

/// Errors surfaced by profile extraction and anisotropy fitting.
///
/// None of these are retried internally: every operation is a deterministic
/// function of its inputs, so the caller has to change the inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileError {
    /// An array does not have the shape the operation requires.
    InputShape {
        /// Which array was rejected.
        what: &'static str,
        /// Required shape `[rows, cols]` (a minimum for images).
        expected: [usize; 2],
        /// Shape that was provided.
        got: [usize; 2],
    },
    /// The radius grid decreases along the radial axis.
    NonMonotonicRadii {
        /// First radial row where `r[row] < r[row - 1]`.
        row: usize,
    },
    /// A numeric parameter is outside its valid domain.
    InvalidParameter {
        /// Parameter name as it appears in the config.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// A selection left fewer samples than the operation needs.
    EmptySelection {
        /// Minimum number of samples required.
        needed: usize,
        /// Number of samples that survived the selection.
        got: usize,
    },
    /// The least-squares solver did not produce a usable solution.
    FitConvergence(SolverError),
}

impl std::fmt::Display for ProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InputShape {
                what,
                expected,
                got,
            } => write!(
                f,
                "bad {} shape: expected {}x{}, got {}x{}",
                what, expected[0], expected[1], got[0], got[1]
            ),
            Self::NonMonotonicRadii { row } => {
                write!(f, "radius grid decreases at radial row {}", row)
            }
            Self::InvalidParameter { name, value } => {
                write!(f, "invalid parameter {} = {}", name, value)
            }
            Self::EmptySelection { needed, got } => {
                write!(f, "selection too small: need {} samples, got {}", needed, got)
            }
            Self::FitConvergence(e) => write!(f, "fit did not converge: {}", e),
        }
    }
}

impl std::error::Error for ProfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FitConvergence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SolverError> for ProfileError {
    fn from(e: SolverError) -> Self {
        Self::FitConvergence(e)
    }
}
