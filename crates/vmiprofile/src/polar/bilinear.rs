use ndarray::{Array2, ArrayView2};

use super::{PolarConfig, PolarGrid, PolarResampler};
use crate::raster::{check_image_shape, Origin};
use crate::ProfileError;

/// Slack for sample positions that land a rounding error outside the pixel hull.
const EDGE_EPS: f64 = 1e-9;

/// Largest polar grid (radii × angles) a single resample may allocate.
pub const MAX_GRID_CELLS: usize = 1 << 25;

/// Polar resampler using bilinear interpolation between pixel centers.
///
/// The radial axis starts at the smallest pixel-center distance from the
/// origin and advances in steps of exactly `dr` until it covers the farthest
/// pixel center. The angular axis spans the range of pixel-center angles.
/// Samples outside the image read as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct BilinearResampler;

impl PolarResampler for BilinearResampler {
    fn resample(
        &self,
        image: &ArrayView2<'_, f64>,
        config: &PolarConfig,
        jacobian: bool,
    ) -> Result<PolarGrid, ProfileError> {
        check_image_shape(image)?;
        config.validate()?;

        let (rows, cols) = image.dim();
        let origin = Origin::resolve(config.origin, image);
        let extent = PixelExtent::measure(rows, cols, origin);

        let n_radii = axis_len(extent.r_min, extent.r_max, config.dr);
        if n_radii > MAX_GRID_CELLS as f64 {
            return Err(ProfileError::InvalidParameter {
                name: "dr",
                value: config.dr,
            });
        }
        let n_angles = match config.dt_deg {
            Some(dt_deg) => axis_len(extent.t_min, extent.t_max, dt_deg.to_radians()),
            None => rows as f64,
        };
        if n_radii * n_angles > MAX_GRID_CELLS as f64 {
            return Err(match config.dt_deg {
                Some(dt_deg) => ProfileError::InvalidParameter {
                    name: "dt_deg",
                    value: dt_deg,
                },
                None => ProfileError::InvalidParameter {
                    name: "dr",
                    value: config.dr,
                },
            });
        }

        let radii = regular_axis(extent.r_min, config.dr, n_radii as usize);
        let angles = match config.dt_deg {
            Some(dt_deg) => regular_axis(extent.t_min, dt_deg.to_radians(), n_angles as usize),
            None => {
                let step = (extent.t_max - extent.t_min) / rows as f64;
                (0..rows).map(|j| extent.t_min + j as f64 * step).collect()
            }
        };
        tracing::debug!(
            "polar grid {}x{} (dr={}, origin=({:.2}, {:.2}), jacobian={})",
            radii.len(),
            angles.len(),
            config.dr,
            origin.row,
            origin.col,
            jacobian
        );

        let directions: Vec<(f64, f64)> = angles.iter().map(|t| t.sin_cos()).collect();
        let mut polar = Array2::<f64>::zeros((radii.len(), angles.len()));
        for ((i, j), v) in polar.indexed_iter_mut() {
            let r = radii[i];
            let (sin_t, cos_t) = directions[j];
            let sample = bilinear_sample_or_zero(image, origin.row + r * cos_t, origin.col + r * sin_t);
            *v = if jacobian { sample * r } else { sample };
        }

        PolarGrid::from_axes(polar, &radii, &angles)
    }
}

/// Range of polar coordinates covered by the pixel centers of an image.
#[derive(Debug, Clone, Copy)]
struct PixelExtent {
    r_min: f64,
    r_max: f64,
    t_min: f64,
    t_max: f64,
}

impl PixelExtent {
    fn measure(rows: usize, cols: usize, origin: Origin) -> Self {
        let mut ext = Self {
            r_min: f64::INFINITY,
            r_max: f64::NEG_INFINITY,
            t_min: f64::INFINITY,
            t_max: f64::NEG_INFINITY,
        };
        for row in 0..rows {
            let y = row as f64 - origin.row;
            for col in 0..cols {
                let x = col as f64 - origin.col;
                let r = x.hypot(y);
                let t = x.atan2(y);
                ext.r_min = ext.r_min.min(r);
                ext.r_max = ext.r_max.max(r);
                ext.t_min = ext.t_min.min(t);
                ext.t_max = ext.t_max.max(t);
            }
        }
        ext
    }
}

/// Samples needed for `start, start + step, ...` to cover `[start, stop)`; at least one.
fn axis_len(start: f64, stop: f64, step: f64) -> f64 {
    ((stop - start) / step).ceil().max(1.0)
}

fn regular_axis(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// Bilinear interpolation at `(row, col)`; zero outside the pixel-center hull.
///
/// Expects an image of at least 2x2 pixels.
#[inline]
pub(crate) fn bilinear_sample_or_zero(image: &ArrayView2<'_, f64>, row: f64, col: f64) -> f64 {
    let (rows, cols) = image.dim();
    let max_row = (rows - 1) as f64;
    let max_col = (cols - 1) as f64;
    // written so NaN coordinates fall through to zero
    if !(row >= -EDGE_EPS && row <= max_row + EDGE_EPS && col >= -EDGE_EPS && col <= max_col + EDGE_EPS) {
        return 0.0;
    }
    let row = row.clamp(0.0, max_row);
    let col = col.clamp(0.0, max_col);

    let r0 = (row.floor() as usize).min(rows - 2);
    let c0 = (col.floor() as usize).min(cols - 2);
    let fr = row - r0 as f64;
    let fc = col - c0 as f64;

    let p00 = image[[r0, c0]];
    let p01 = image[[r0, c0 + 1]];
    let p10 = image[[r0 + 1, c0]];
    let p11 = image[[r0 + 1, c0 + 1]];

    (1.0 - fr) * (1.0 - fc) * p00 + (1.0 - fr) * fc * p01 + fr * (1.0 - fc) * p10 + fr * fc * p11
}
