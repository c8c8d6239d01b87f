use crate::parallel;

use super::interpolate::interpolate_pixel;
use super::InterpolationMode;
use lensfix_image::{Image, ImageDtype, ImageError};

/// Apply generic geometric transformation to an image.
///
/// Every destination pixel samples `src` at `(map_x, map_y)`. Pixels whose source
/// coordinate falls outside `[0, width) x [0, height)` are set to `border_value`.
///
/// # Arguments
///
/// * `src` - The input image container with shape (height, width, C).
/// * `dst` - The output image container with shape (height, width, C).
/// * `map_x` - The x coordinates of the pixels to interpolate.
/// * `map_y` - The y coordinates of the pixels to interpolate.
/// * `interpolation` - The interpolation mode to use.
/// * `border_value` - The value written for out of bounds samples.
///
/// # Errors
///
/// * The map_x and map_y must have the same size.
/// * The output image must have the same size as the map_x and map_y.
pub fn remap<T: ImageDtype, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    map_x: &Image<f32, 1>,
    map_y: &Image<f32, 1>,
    interpolation: InterpolationMode,
    border_value: [T; C],
) -> Result<(), ImageError> {
    if map_x.size() != map_y.size() {
        return Err(ImageError::InvalidImageSize(
            map_x.cols(),
            map_x.rows(),
            map_y.cols(),
            map_y.rows(),
        ));
    }

    if dst.size() != map_x.size() {
        return Err(ImageError::InvalidImageSize(
            map_x.cols(),
            map_x.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let (width, height) = (src.cols() as f32, src.rows() as f32);

    // parallelize the remap operation by rows
    parallel::par_iter_rows_resample(dst, map_x, map_y, |&x, &y, dst_pixel| {
        // NaN coordinates fail every comparison and end up in the border
        if !(x >= 0.0 && x < width && y >= 0.0 && y < height) {
            dst_pixel.copy_from_slice(&border_value);
            return;
        }
        let pixel = interpolate_pixel(src, x, y, interpolation);
        dst_pixel
            .iter_mut()
            .zip(pixel.iter())
            .for_each(|(d, &p)| *d = T::from_f32(p));
    });

    Ok(())
}
