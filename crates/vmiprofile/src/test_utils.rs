//! Synthetic VMI images for unit tests.
//!
//! All images are `[row, col]` arrays; distances and angles are measured from
//! `origin` with the same convention as the polar resampler (θ from the +row axis).

use ndarray::Array2;

use crate::anisotropy::angular_distribution;
use crate::raster::{array_to_luma32f, luma_to_array, Origin};

fn polar_of(origin: Origin, row: usize, col: usize) -> (f64, f64) {
    let y = row as f64 - origin.row;
    let x = col as f64 - origin.col;
    (x.hypot(y), x.atan2(y))
}

/// Pixels with `d <= rho` set to `level`, zero elsewhere.
pub(crate) fn draw_disk_image(rows: usize, cols: usize, origin: Origin, rho: f64, level: f64) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let (d, _) = polar_of(origin, r, c);
        if d <= rho {
            level
        } else {
            0.0
        }
    })
}

/// One-pixel-wide ring: `level` where `|d - r0| < 0.5`.
pub(crate) fn draw_thin_ring_image(rows: usize, cols: usize, origin: Origin, r0: f64, level: f64) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let (d, _) = polar_of(origin, r, c);
        if (d - r0).abs() < 0.5 {
            level
        } else {
            0.0
        }
    })
}

/// Gaussian ring of radius `r0` and width `sigma` with angular distribution
/// `amplitude (1 + beta P2(cos θ))`.
///
/// The ring is cut to exactly zero beyond `4 sigma` from `r0`.
pub(crate) fn draw_pad_image(
    rows: usize,
    cols: usize,
    origin: Origin,
    r0: f64,
    sigma: f64,
    beta: f64,
    amplitude: f64,
) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let (d, t) = polar_of(origin, r, c);
        let u = (d - r0) / sigma;
        if u.abs() > 4.0 {
            return 0.0;
        }
        (-0.5 * u * u).exp() * angular_distribution(t, beta, amplitude)
    })
}

/// Gaussian-blur an intensity array via `imageproc`.
pub(crate) fn blur_array(img: &Array2<f64>, sigma: f32) -> Array2<f64> {
    let buf = array_to_luma32f(&img.view());
    let blurred = imageproc::filter::gaussian_blur_f32(&buf, sigma);
    luma_to_array(&blurred)
}
