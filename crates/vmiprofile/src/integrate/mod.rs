//! Angular and radial integration of polar-resampled images.
//!
//! - [`angular_integration`]: integrate over θ at every radius (speed distribution).
//! - [`average_radial_intensity`]: the same, as a mean over solid angle.
//! - [`radial_integration`]: collapse radial bands into intensity-vs-θ profiles.
//!
//! Every function has a `_with` variant taking an explicit [`PolarResampler`];
//! the plain variants use [`BilinearResampler`].
//!
//! [`PolarResampler`]: crate::PolarResampler
//! [`BilinearResampler`]: crate::BilinearResampler

mod angular;
mod radial;

pub use angular::{
    angular_integration, angular_integration_with, average_radial_intensity,
    average_radial_intensity_with, integrate_over_angle,
};
pub use radial::{
    integrate_over_bands, radial_integration, radial_integration_with, RadialBand,
    RadialRangeSpec,
};

use ndarray::Array2;

/// Intensity as a function of radius, one entry per radial bin.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RadialProfile {
    /// Radial coordinates (pixels), increasing.
    pub radii: Vec<f64>,
    /// Angle-integrated (or averaged) intensity at each radius.
    pub intensity: Vec<f64>,
}

impl RadialProfile {
    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }

    /// Radius and value of the largest sample, or `None` for an empty profile.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.intensity
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &v)| (self.radii[i], v))
    }
}

/// Intensity as a function of angle for one radial band.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AngularProfile {
    /// Angles (radians) referenced to the vertical axis.
    pub theta: Vec<f64>,
    /// Band-summed intensity at each angle.
    pub intensity: Vec<f64>,
    /// Representative radius of the band.
    pub midpoint: f64,
}

/// Output of [`radial_integration`]: one angular profile per radial band.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RadialIntegration {
    /// Band-summed intensity, indexed `[band, angle]`.
    pub intensity: Array2<f64>,
    /// Angular axis shared by all bands (radians).
    pub theta: Vec<f64>,
    /// Bands in evaluation order.
    pub bands: Vec<RadialBand>,
    /// Midpoint radius of each band.
    pub midpoints: Vec<f64>,
    /// Number of radial grid rows that fell inside each band.
    ///
    /// Zero means the band's profile is all zeros because nothing was selected.
    pub samples_per_band: Vec<usize>,
}

impl RadialIntegration {
    pub fn n_bands(&self) -> usize {
        self.bands.len()
    }

    /// Angular profile of one band.
    pub fn angular_profile(&self, band: usize) -> Option<AngularProfile> {
        if band >= self.n_bands() {
            return None;
        }
        Some(AngularProfile {
            theta: self.theta.clone(),
            intensity: self.intensity.row(band).to_vec(),
            midpoint: self.midpoints[band],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_picks_largest_sample() {
        let p = RadialProfile {
            radii: vec![0.0, 1.0, 2.0, 3.0],
            intensity: vec![0.1, 4.0, -2.0, 3.9],
        };
        assert_eq!(p.peak(), Some((1.0, 4.0)));
        let empty = RadialProfile {
            radii: vec![],
            intensity: vec![],
        };
        assert!(empty.peak().is_none());
    }

    #[test]
    fn angular_profile_out_of_range_is_none() {
        let ri = RadialIntegration {
            intensity: Array2::zeros((1, 3)),
            theta: vec![0.0, 1.0, 2.0],
            bands: vec![RadialBand::new(1.0, 2.0)],
            midpoints: vec![1.5],
            samples_per_band: vec![2],
        };
        assert_eq!(ri.angular_profile(0).unwrap().midpoint, 1.5);
        assert!(ri.angular_profile(1).is_none());
    }
}
