//! JSON run configuration, overridable from the command line.

use std::path::Path;

use vmiprofile::{AnisotropyConfig, PolarConfig, RadialRangeSpec, ThetaRange};

use crate::{CliError, CliResult};

/// Every tunable of a run in one file.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub polar: PolarConfig,
    pub radial_ranges: RadialRangeSpec,
    /// Angular windows for the β fit (radians). All must contain a sample.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theta_ranges: Option<Vec<ThetaRange>>,
    pub anisotropy: AnisotropyConfig,
}

impl ProfileConfig {
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| -> CliError {
            format!("Failed to read config {}: {}", path.display(), e).into()
        })?;
        serde_json::from_str(&text).map_err(|e| -> CliError {
            format!("Invalid config {}: {}", path.display(), e).into()
        })
    }

    /// Config file when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}
