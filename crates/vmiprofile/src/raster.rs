//! Image origin handling and conversions from `image` buffers to intensity arrays.
//!
//! Intensity images are `ndarray::Array2<f64>` indexed `[row, col]`. Pixel
//! centers sit on integer indices, so an origin of `(2.0, 3.0)` is the center
//! of the pixel in row 2, column 3.

use image::{DynamicImage, ImageBuffer, Luma};
use ndarray::{Array2, ArrayView2};

use crate::ProfileError;

/// Smallest image the resampler can interpolate.
pub const MIN_IMAGE_SIDE: usize = 2;

/// Image center (sub-pixel) in `[row, col]` index coordinates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Origin {
    /// Row coordinate.
    pub row: f64,
    /// Column coordinate.
    pub col: f64,
}

impl Origin {
    pub fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }

    /// Default origin for an image of the given shape: `n/2 + n%2` on both axes.
    pub fn centered(rows: usize, cols: usize) -> Self {
        Self {
            row: (rows / 2 + rows % 2) as f64,
            col: (cols / 2 + cols % 2) as f64,
        }
    }

    /// Use `origin` when given, otherwise compute the default from `image`'s shape.
    pub fn resolve(origin: Option<Origin>, image: &ArrayView2<'_, f64>) -> Self {
        origin.unwrap_or_else(|| {
            let (rows, cols) = image.dim();
            Self::centered(rows, cols)
        })
    }
}

/// Reject images the polar resampler cannot work with.
pub fn check_image_shape(image: &ArrayView2<'_, f64>) -> Result<(), ProfileError> {
    let (rows, cols) = image.dim();
    if rows < MIN_IMAGE_SIDE || cols < MIN_IMAGE_SIDE {
        return Err(ProfileError::InputShape {
            what: "image",
            expected: [MIN_IMAGE_SIDE, MIN_IMAGE_SIDE],
            got: [rows, cols],
        });
    }
    Ok(())
}

/// Convert a decoded image into an intensity array.
///
/// 8- and 16-bit grayscale images keep their raw counts. Every other pixel
/// format goes through `to_luma32f`, which normalizes to `[0, 1]`.
pub fn dynamic_to_array(img: &DynamicImage) -> Array2<f64> {
    match img {
        DynamicImage::ImageLuma8(g) => luma_to_array(g),
        DynamicImage::ImageLuma16(g) => luma_to_array(g),
        other => luma_to_array(&other.to_luma32f()),
    }
}

/// Convert a single-channel buffer into an `Array2<f64>` (`[row, col]` = pixel `(x=col, y=row)`).
pub fn luma_to_array<T>(img: &ImageBuffer<Luma<T>, Vec<T>>) -> Array2<f64>
where
    T: image::Primitive + Into<f64>,
{
    let (w, h) = img.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
        img.get_pixel(col as u32, row as u32)[0].into()
    })
}

/// Convert an intensity array into a 32-bit float luma buffer.
pub fn array_to_luma32f(arr: &ArrayView2<'_, f64>) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    let (rows, cols) = arr.dim();
    ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([arr[[y as usize, x as usize]] as f32])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn centered_origin_rounds_odd_sides_up() {
        assert_eq!(Origin::centered(4, 6), Origin::new(2.0, 3.0));
        assert_eq!(Origin::centered(5, 7), Origin::new(3.0, 4.0));
    }

    #[test]
    fn resolve_prefers_explicit_origin() {
        let img = Array2::<f64>::zeros((10, 12));
        let explicit = Origin::new(4.5, 5.5);
        assert_eq!(Origin::resolve(Some(explicit), &img.view()), explicit);
        assert_eq!(Origin::resolve(None, &img.view()), Origin::new(5.0, 6.0));
    }

    #[test]
    fn rejects_degenerate_images() {
        let img = Array2::<f64>::zeros((1, 8));
        let err = check_image_shape(&img.view()).unwrap_err();
        assert!(matches!(err, ProfileError::InputShape { got: [1, 8], .. }));
        assert!(check_image_shape(&Array2::<f64>::zeros((2, 2)).view()).is_ok());
    }

    #[test]
    fn gray_image_maps_xy_to_row_col() {
        let mut img = GrayImage::new(3, 2);
        img.put_pixel(2, 1, Luma([200]));
        let arr = dynamic_to_array(&DynamicImage::ImageLuma8(img));
        assert_eq!(arr.dim(), (2, 3));
        assert_eq!(arr[[1, 2]], 200.0);
        assert_eq!(arr[[0, 0]], 0.0);
    }

    #[test]
    fn luma32f_round_trip_preserves_values() {
        let arr = Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f64 * 0.5);
        let buf = array_to_luma32f(&arr.view());
        assert_eq!(luma_to_array(&buf), arr);
    }
}
