use lensfix_image::{Image, ImageError, ImageSize};
use rayon::prelude::*;

/// Create a pair of coordinate maps by evaluating `f` at every pixel.
///
/// # Arguments
///
/// * `size` - The size of the maps.
/// * `f` - A function receiving the `(x, y)` pixel coordinates and returning the
///   values to store in the x and y maps.
///
/// # Returns
///
/// A tuple `(map_x, map_y)` of single channel images with the given size.
pub fn meshgrid_from_fn(
    size: ImageSize,
    f: impl Fn(usize, usize) -> (f32, f32) + Send + Sync,
) -> Result<(Image<f32, 1>, Image<f32, 1>), ImageError> {
    let mut map_x = Image::<f32, 1>::from_size_val(size, 0.0)?;
    let mut map_y = Image::<f32, 1>::from_size_val(size, 0.0)?;

    let cols = size.width;
    if cols == 0 {
        return Ok((map_x, map_y));
    }

    map_x
        .as_slice_mut()
        .par_chunks_exact_mut(cols)
        .zip(map_y.as_slice_mut().par_chunks_exact_mut(cols))
        .enumerate()
        .for_each(|(y, (row_x, row_y))| {
            row_x
                .iter_mut()
                .zip(row_y.iter_mut())
                .enumerate()
                .for_each(|(x, (mx, my))| {
                    let (vx, vy) = f(x, y);
                    *mx = vx;
                    *my = vy;
                });
        });

    Ok((map_x, map_y))
}

/// Create the identity coordinate maps for the given size.
pub fn meshgrid(size: ImageSize) -> Result<(Image<f32, 1>, Image<f32, 1>), ImageError> {
    meshgrid_from_fn(size, |x, y| (x as f32, y as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meshgrid_identity() -> Result<(), ImageError> {
        let (map_x, map_y) = meshgrid(ImageSize {
            width: 3,
            height: 2,
        })?;
        assert_eq!(map_x.as_slice(), &[0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
        assert_eq!(map_y.as_slice(), &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        Ok(())
    }
}
