//! vmiprofile — radial and angular analysis of velocity-map images.
//!
//! A velocity-map imaging (VMI) detector records the 2D projection of a
//! cylindrically symmetric 3D particle distribution. The stages are:
//!
//! 1. **Polar** – resample the Cartesian image onto a regular `(r, θ)` grid
//!    around an origin, optionally weighted by `r`.
//! 2. **Integrate** – angular integration (speed distribution), its mean per
//!    unit angle, and radial-band integration (angular profiles).
//! 3. **Anisotropy** – least-squares fit of `A (1 + β P₂(cos θ))` to an
//!    angular profile, with one-sigma errors.
//!
//! Angles are measured from the +row axis of the image, which is the usual
//! orientation of the laser polarization in a VMI setup.
//!
//! # Public API
//! - [`angular_integration`], [`average_radial_intensity`],
//!   [`radial_integration`] and [`anisotropy_parameter`] as entry points
//! - [`PolarConfig`], [`RadialRangeSpec`] and [`AnisotropyConfig`] for tuning
//! - [`PolarResampler`] to swap the interpolation scheme

pub mod anisotropy;
mod error;
pub mod integrate;
pub mod polar;
pub mod raster;

#[cfg(test)]
mod test_utils;

pub use anisotropy::solver::SolverError;
pub use anisotropy::{
    anisotropy_parameter, anisotropy_per_band, AnisotropyConfig, AnisotropyFit, BandAnisotropy,
    ThetaRange,
};
pub use error::ProfileError;
pub use integrate::{
    angular_integration, average_radial_intensity, radial_integration, AngularProfile,
    RadialBand, RadialIntegration, RadialProfile, RadialRangeSpec,
};
pub use polar::{BilinearResampler, PolarConfig, PolarGrid, PolarResampler};
pub use raster::Origin;
