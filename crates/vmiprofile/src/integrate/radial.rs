use ndarray::{Array2, ArrayView2};

use super::RadialIntegration;
use crate::polar::{BilinearResampler, PolarConfig, PolarGrid, PolarResampler};
use crate::ProfileError;

/// Closed radial interval `[lo, hi]` in pixels.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RadialBand {
    pub lo: f64,
    pub hi: f64,
}

impl RadialBand {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Representative radius: the mean of the two bounds.
    pub fn midpoint(&self) -> f64 {
        (self.lo + self.hi) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    /// Both bounds are inclusive.
    #[inline]
    pub fn contains(&self, r: f64) -> bool {
        r >= self.lo && r <= self.hi
    }
}

impl From<(f64, f64)> for RadialBand {
    fn from((lo, hi): (f64, f64)) -> Self {
        Self { lo, hi }
    }
}

/// How the radial bands of [`radial_integration`] are chosen.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadialRangeSpec {
    /// Sliding window: band `i` is `[r[i], r[i + step]]` over the radial grid.
    Step(usize),
    /// Caller-chosen bands, evaluated in the given order.
    Explicit(Vec<RadialBand>),
}

impl Default for RadialRangeSpec {
    fn default() -> Self {
        Self::Step(1)
    }
}

impl From<usize> for RadialRangeSpec {
    fn from(step: usize) -> Self {
        Self::Step(step)
    }
}

impl From<Vec<RadialBand>> for RadialRangeSpec {
    fn from(bands: Vec<RadialBand>) -> Self {
        Self::Explicit(bands)
    }
}

impl From<Vec<(f64, f64)>> for RadialRangeSpec {
    fn from(bands: Vec<(f64, f64)>) -> Self {
        Self::Explicit(bands.into_iter().map(RadialBand::from).collect())
    }
}

impl RadialRangeSpec {
    /// Expand into a concrete band list against the grid's radial axis.
    ///
    /// A step of `k` yields `radii.len() - k` bands (none if the grid is
    /// shorter than the step).
    pub fn resolve(&self, radii: &[f64]) -> Result<Vec<RadialBand>, ProfileError> {
        match self {
            Self::Step(0) => Err(ProfileError::InvalidParameter {
                name: "step",
                value: 0.0,
            }),
            Self::Step(step) => Ok(radii
                .iter()
                .zip(radii.iter().skip(*step))
                .map(|(&lo, &hi)| RadialBand::new(lo, hi))
                .collect()),
            Self::Explicit(bands) => Ok(bands.clone()),
        }
    }
}

/// Intensity vs angle for each radial band of the image.
///
/// No Jacobian weighting is applied: the result describes angular shape, not
/// absolute 3D intensity.
pub fn radial_integration(
    image: &ArrayView2<'_, f64>,
    config: &PolarConfig,
    ranges: &RadialRangeSpec,
) -> Result<RadialIntegration, ProfileError> {
    radial_integration_with(&BilinearResampler, image, config, ranges)
}

/// [`radial_integration`] with a caller-supplied resampler.
pub fn radial_integration_with<R: PolarResampler + ?Sized>(
    resampler: &R,
    image: &ArrayView2<'_, f64>,
    config: &PolarConfig,
    ranges: &RadialRangeSpec,
) -> Result<RadialIntegration, ProfileError> {
    let grid = resampler.resample(image, config, false)?;
    integrate_over_bands(&grid, ranges)
}

/// Sum the grid's radial rows inside each band.
///
/// A band that selects no rows gets an all-zero profile and a zero entry in
/// `samples_per_band`; that is not an error.
pub fn integrate_over_bands(
    grid: &PolarGrid,
    ranges: &RadialRangeSpec,
) -> Result<RadialIntegration, ProfileError> {
    let radii = grid.radii().to_vec();
    let bands = ranges.resolve(&radii)?;
    tracing::debug!("integrating {} radial bands over {} radii", bands.len(), radii.len());

    let polar = grid.image();
    let mut intensity = Array2::<f64>::zeros((bands.len(), grid.n_angles()));
    let mut samples_per_band = Vec::with_capacity(bands.len());
    for (b, band) in bands.iter().enumerate() {
        let mut out = intensity.row_mut(b);
        let mut n = 0usize;
        for (i, &r) in radii.iter().enumerate() {
            if band.contains(r) {
                out += &polar.row(i);
                n += 1;
            }
        }
        samples_per_band.push(n);
    }

    let n_empty = samples_per_band.iter().filter(|&&n| n == 0).count();
    if n_empty > 0 {
        tracing::warn!("{} of {} radial bands contain no grid radii", n_empty, bands.len());
    }

    Ok(RadialIntegration {
        intensity,
        theta: grid.angles().to_vec(),
        midpoints: bands.iter().map(RadialBand::midpoint).collect(),
        bands,
        samples_per_band,
    })
}
