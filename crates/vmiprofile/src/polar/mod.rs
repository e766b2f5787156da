//! Cartesian → polar resampling.
//!
//! Integration stages only see the [`PolarResampler`] trait, so any resampling
//! scheme can be plugged in. [`BilinearResampler`] is the built-in one.
//!
//! Angles are referenced to the vertical (row) axis: θ = 0 points along
//! increasing row index and θ = ±π/2 along the column axis.

mod bilinear;

pub use bilinear::BilinearResampler;

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::raster::Origin;
use crate::ProfileError;

/// Grid spacing and origin for polar resampling.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PolarConfig {
    /// Image center. `None` selects [`Origin::centered`] for the image at hand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    /// Radial step (pixels).
    pub dr: f64,
    /// Angular step (degrees). `None` makes the angular sample count equal to
    /// the image height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dt_deg: Option<f64>,
}

impl Default for PolarConfig {
    fn default() -> Self {
        Self {
            origin: None,
            dr: 1.0,
            dt_deg: None,
        }
    }
}

impl PolarConfig {
    /// Check the numeric fields without touching any image.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if !self.dr.is_finite() || self.dr <= 0.0 {
            return Err(ProfileError::InvalidParameter {
                name: "dr",
                value: self.dr,
            });
        }
        if let Some(dt) = self.dt_deg {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(ProfileError::InvalidParameter {
                    name: "dt_deg",
                    value: dt,
                });
            }
        }
        if let Some(o) = self.origin {
            if !o.row.is_finite() {
                return Err(ProfileError::InvalidParameter {
                    name: "origin.row",
                    value: o.row,
                });
            }
            if !o.col.is_finite() {
                return Err(ProfileError::InvalidParameter {
                    name: "origin.col",
                    value: o.col,
                });
            }
        }
        Ok(())
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_dr(mut self, dr: f64) -> Self {
        self.dr = dr;
        self
    }

    pub fn with_dt_deg(mut self, dt_deg: f64) -> Self {
        self.dt_deg = Some(dt_deg);
        self
    }
}

/// Polar-resampled image with its radius and angle coordinate grids.
///
/// All three arrays are indexed `[radial_bin, angular_bin]` and share one
/// shape. Radii are non-decreasing along the radial axis.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarGrid {
    image: Array2<f64>,
    r: Array2<f64>,
    theta: Array2<f64>,
}

impl PolarGrid {
    /// Assemble a grid from full coordinate arrays, validating shape and ordering.
    pub fn new(image: Array2<f64>, r: Array2<f64>, theta: Array2<f64>) -> Result<Self, ProfileError> {
        let shape = image.dim();
        for (what, arr) in [("radius grid", &r), ("angle grid", &theta)] {
            if arr.dim() != shape {
                return Err(ProfileError::InputShape {
                    what,
                    expected: [shape.0, shape.1],
                    got: [arr.nrows(), arr.ncols()],
                });
            }
        }
        if shape.0 == 0 || shape.1 == 0 {
            return Err(ProfileError::InputShape {
                what: "polar image",
                expected: [1, 1],
                got: [shape.0, shape.1],
            });
        }
        for row in 1..shape.0 {
            let decreasing = r
                .row(row)
                .iter()
                .zip(r.row(row - 1).iter())
                .any(|(cur, prev)| cur < prev);
            if decreasing {
                return Err(ProfileError::NonMonotonicRadii { row });
            }
        }
        Ok(Self { image, r, theta })
    }

    /// Assemble a grid from 1D axes (meshgrid expansion).
    pub fn from_axes(image: Array2<f64>, radii: &[f64], angles: &[f64]) -> Result<Self, ProfileError> {
        let shape = (radii.len(), angles.len());
        let r = Array2::from_shape_fn(shape, |(i, _)| radii[i]);
        let theta = Array2::from_shape_fn(shape, |(_, j)| angles[j]);
        Self::new(image, r, theta)
    }

    pub fn image(&self) -> &Array2<f64> {
        &self.image
    }

    pub fn r_grid(&self) -> &Array2<f64> {
        &self.r
    }

    pub fn theta_grid(&self) -> &Array2<f64> {
        &self.theta
    }

    /// Radial coordinates, taken from the first angular column.
    pub fn radii(&self) -> ArrayView1<'_, f64> {
        self.r.column(0)
    }

    /// Angular coordinates, taken from the first radial row.
    pub fn angles(&self) -> ArrayView1<'_, f64> {
        self.theta.row(0)
    }

    pub fn n_radii(&self) -> usize {
        self.image.nrows()
    }

    pub fn n_angles(&self) -> usize {
        self.image.ncols()
    }
}

/// Maps a Cartesian image onto a regular (r, θ) grid.
///
/// With `jacobian` set, implementations multiply every sample by its radius
/// (the area element of the polar grid).
pub trait PolarResampler {
    fn resample(
        &self,
        image: &ArrayView2<'_, f64>,
        config: &PolarConfig,
        jacobian: bool,
    ) -> Result<PolarGrid, ProfileError>;
}

impl<T: PolarResampler + ?Sized> PolarResampler for &T {
    fn resample(
        &self,
        image: &ArrayView2<'_, f64>,
        config: &PolarConfig,
        jacobian: bool,
    ) -> Result<PolarGrid, ProfileError> {
        (**self).resample(image, config, jacobian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_axes_expands_meshgrid() {
        let img = Array2::<f64>::zeros((3, 2));
        let grid = PolarGrid::from_axes(img, &[0.0, 1.0, 2.0], &[-1.0, 1.0]).unwrap();
        assert_eq!(grid.r_grid()[[2, 1]], 2.0);
        assert_eq!(grid.theta_grid()[[2, 1]], 1.0);
        assert_eq!(grid.radii().to_vec(), vec![0.0, 1.0, 2.0]);
        assert_eq!(grid.angles().to_vec(), vec![-1.0, 1.0]);
    }

    #[test]
    fn rejects_mismatched_coordinate_grids() {
        let err = PolarGrid::new(
            Array2::zeros((3, 4)),
            Array2::zeros((3, 4)),
            Array2::zeros((4, 3)),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProfileError::InputShape {
                what: "angle grid",
                expected: [3, 4],
                got: [4, 3],
            }
        );
    }

    #[test]
    fn rejects_decreasing_radii() {
        let img = Array2::<f64>::zeros((3, 2));
        let err = PolarGrid::from_axes(img, &[0.0, 2.0, 1.0], &[0.0, 0.5]).unwrap_err();
        assert_eq!(err, ProfileError::NonMonotonicRadii { row: 2 });
    }

    #[test]
    fn config_validation() {
        assert!(PolarConfig::default().validate().is_ok());
        assert!(PolarConfig::default().with_dr(0.0).validate().is_err());
        assert!(PolarConfig::default().with_dt_deg(-1.0).validate().is_err());
        let bad_origin = PolarConfig::default().with_origin(Origin::new(f64::NAN, 1.0));
        assert!(matches!(
            bad_origin.validate(),
            Err(ProfileError::InvalidParameter { name: "origin.row", .. })
        ));
    }

    #[test]
    fn config_json_defaults() {
        let cfg: PolarConfig = serde_json::from_str(r#"{"dr": 0.5}"#).unwrap();
        assert_eq!(cfg.dr, 0.5);
        assert!(cfg.origin.is_none());
        assert!(cfg.dt_deg.is_none());
    }
}
