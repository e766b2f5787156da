use std::f64::consts::PI;

use ndarray::{ArrayView1, ArrayView2, Zip};

use super::RadialProfile;
use crate::polar::{BilinearResampler, PolarConfig, PolarGrid, PolarResampler};
use crate::ProfileError;

/// Integrate the image over angle, returning intensity vs radius.
///
/// With `jacobian` set the resampler contributes one factor of `r` and the
/// integrand is further weighted by `r |sin θ|`, giving the `r² sin θ` element
/// needed to recover the 3D radial distribution from its 2D projection.
pub fn angular_integration(
    image: &ArrayView2<'_, f64>,
    config: &PolarConfig,
    jacobian: bool,
) -> Result<RadialProfile, ProfileError> {
    angular_integration_with(&BilinearResampler, image, config, jacobian)
}

/// [`angular_integration`] with a caller-supplied resampler.
pub fn angular_integration_with<R: PolarResampler + ?Sized>(
    resampler: &R,
    image: &ArrayView2<'_, f64>,
    config: &PolarConfig,
    jacobian: bool,
) -> Result<RadialProfile, ProfileError> {
    let grid = resampler.resample(image, config, jacobian)?;
    integrate_over_angle(&grid, jacobian)
}

/// Mean intensity per unit angle at each radius.
///
/// Equal to `angular_integration(image, config, false)` divided by 2π.
pub fn average_radial_intensity(
    image: &ArrayView2<'_, f64>,
    config: &PolarConfig,
) -> Result<RadialProfile, ProfileError> {
    average_radial_intensity_with(&BilinearResampler, image, config)
}

/// [`average_radial_intensity`] with a caller-supplied resampler.
pub fn average_radial_intensity_with<R: PolarResampler + ?Sized>(
    resampler: &R,
    image: &ArrayView2<'_, f64>,
    config: &PolarConfig,
) -> Result<RadialProfile, ProfileError> {
    let mut profile = angular_integration_with(resampler, image, config, false)?;
    for v in profile.intensity.iter_mut() {
        *v /= 2.0 * PI;
    }
    Ok(profile)
}

/// Trapezoidal integration of every radial row of an already resampled grid.
///
/// The angular step is taken from the first two angle samples. `jacobian`
/// applies the `r |sin θ|` weight; the resampler's own factor of `r` must
/// already be in the grid.
pub fn integrate_over_angle(grid: &PolarGrid, jacobian: bool) -> Result<RadialProfile, ProfileError> {
    if grid.n_angles() < 2 {
        return Err(ProfileError::InputShape {
            what: "polar image (angular samples)",
            expected: [grid.n_radii(), 2],
            got: [grid.n_radii(), grid.n_angles()],
        });
    }
    let theta = grid.angles();
    let dt = theta[1] - theta[0];

    let intensity: Vec<f64> = if jacobian {
        let weighted = Zip::from(grid.image())
            .and(grid.r_grid())
            .and(grid.theta_grid())
            .map_collect(|&v, &r, &t| v * r * t.sin().abs());
        weighted.rows().into_iter().map(|row| trapezoid(row, dt)).collect()
    } else {
        grid.image().rows().into_iter().map(|row| trapezoid(row, dt)).collect()
    };

    let radii = grid.radii().iter().take(intensity.len()).copied().collect();
    Ok(RadialProfile { radii, intensity })
}

/// Trapezoidal rule over uniformly spaced samples.
pub(crate) fn trapezoid(y: ArrayView1<'_, f64>, dx: f64) -> f64 {
    let n = y.len();
    if n < 2 {
        return 0.0;
    }
    let interior: f64 = y.iter().skip(1).take(n - 2).sum();
    dx * (0.5 * (y[0] + y[n - 1]) + interior)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Origin;
    use crate::test_utils::{blur_array, draw_disk_image, draw_thin_ring_image};
    use approx::assert_relative_eq;
    use ndarray::{arr1, Array2};

    #[test]
    fn trapezoid_matches_hand_computation() {
        assert_relative_eq!(trapezoid(arr1(&[1.0, 3.0, 2.0]).view(), 0.5), 0.5 * (0.5 + 3.0 + 1.0));
        assert_eq!(trapezoid(arr1(&[7.0]).view(), 1.0), 0.0);
        assert_relative_eq!(trapezoid(arr1(&[1.0, 1.0, 1.0, 1.0, 1.0]).view(), 0.25), 1.0);
    }

    #[test]
    fn uniform_disk_with_jacobian_follows_r_squared() {
        let (rows, cols, rho, level) = (101, 101, 40.0, 2.0);
        let origin = Origin::new(50.0, 50.0);
        let img = draw_disk_image(rows, cols, origin, rho, level);
        let cfg = PolarConfig::default().with_origin(origin);
        let profile = angular_integration(&img.view(), &cfg, true).unwrap();

        // ∫ r·(r|sin θ|) dθ over a full turn = 4 r² for unit intensity
        for (&r, &v) in profile.radii.iter().zip(&profile.intensity) {
            if (5.0..=35.0).contains(&r) {
                let expected = 4.0 * level * r * r;
                assert_relative_eq!(v, expected, max_relative = 0.02);
            }
        }
        let outside = profile
            .radii
            .iter()
            .zip(&profile.intensity)
            .filter(|(r, _)| **r > rho + 2.0);
        for (_, &v) in outside {
            assert!(v.abs() < 1e-9, "expected zero outside the disk, got {}", v);
        }
    }

    #[test]
    fn average_is_plain_integration_over_two_pi() {
        let img = Array2::from_shape_fn((40, 36), |(r, c)| ((r * 7 + c * 3) % 11) as f64 - 4.0);
        let cfg = PolarConfig::default().with_dr(0.5);
        let plain = angular_integration(&img.view(), &cfg, false).unwrap();
        let avg = average_radial_intensity(&img.view(), &cfg).unwrap();
        assert_eq!(avg.radii, plain.radii);
        for (a, p) in avg.intensity.iter().zip(&plain.intensity) {
            assert_eq!(*a, *p / (2.0 * PI));
        }
    }

    #[test]
    fn thin_ring_peaks_at_its_radius_for_any_dr() {
        let origin = Origin::new(40.0, 40.0);
        let r0 = 25.0;
        let img = draw_thin_ring_image(81, 81, origin, r0, 1.0);
        for dr in [1.0, 0.5, 0.25] {
            let cfg = PolarConfig::default().with_origin(origin).with_dr(dr);
            let profile = angular_integration(&img.view(), &cfg, false).unwrap();
            let (r_peak, v_peak) = profile.peak().unwrap();
            assert!((r_peak - r0).abs() <= 0.25 + 1e-9, "dr={} peak at {}", dr, r_peak);
            for (&r, &v) in profile.radii.iter().zip(&profile.intensity) {
                if (r - r0).abs() > 2.0 {
                    assert!(v.abs() < 1e-9 * v_peak, "r={} carries {}", r, v);
                }
            }
        }
    }

    #[test]
    fn blurred_ring_still_peaks_at_its_radius() {
        let origin = Origin::new(32.0, 32.0);
        let img = blur_array(&draw_thin_ring_image(64, 64, origin, 18.0, 10.0), 1.5);
        let cfg = PolarConfig::default().with_origin(origin);
        let (r_peak, _) = angular_integration(&img.view(), &cfg, true).unwrap().peak().unwrap();
        assert!((r_peak - 18.0).abs() <= 1.0);
    }

    #[test]
    fn negative_intensities_are_integrated_as_given() {
        let img = Array2::<f64>::from_elem((16, 16), -1.0);
        let cfg = PolarConfig::default().with_origin(Origin::new(8.0, 8.0));
        let profile = angular_integration(&img.view(), &cfg, false).unwrap();
        assert!(profile.intensity[3] < 0.0);
        let zeros = Array2::<f64>::zeros((16, 16));
        let flat = angular_integration(&zeros.view(), &cfg, true).unwrap();
        assert!(flat.intensity.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn radii_and_intensity_have_equal_length() {
        let img = Array2::<f64>::ones((12, 17));
        let profile = angular_integration(&img.view(), &PolarConfig::default(), true).unwrap();
        assert_eq!(profile.radii.len(), profile.intensity.len());
        assert!(profile.radii.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn rejects_single_angle_grid() {
        let grid = PolarGrid::from_axes(Array2::ones((3, 1)), &[0.0, 1.0, 2.0], &[0.0]).unwrap();
        let err = integrate_over_angle(&grid, false).unwrap_err();
        assert!(matches!(err, ProfileError::InputShape { got: [3, 1], .. }));
    }

    #[test]
    fn custom_resampler_is_used() {
        struct Fixed;
        impl PolarResampler for Fixed {
            fn resample(
                &self,
                _image: &ArrayView2<'_, f64>,
                _config: &PolarConfig,
                _jacobian: bool,
            ) -> Result<PolarGrid, ProfileError> {
                PolarGrid::from_axes(Array2::ones((2, 3)), &[1.0, 2.0], &[0.0, 0.5, 1.0])
            }
        }
        let img = Array2::<f64>::zeros((4, 4));
        let profile =
            angular_integration_with(&Fixed, &img.view(), &PolarConfig::default(), false).unwrap();
        assert_eq!(profile.radii, vec![1.0, 2.0]);
        assert_relative_eq!(profile.intensity[0], 1.0);
    }
}
