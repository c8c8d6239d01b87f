use lensfix_image::{Image, ImageError};

use crate::parallel;

/// Binarize a grayscale image with a threshold that adapts to the local illumination.
///
/// The image is split in square tiles of `tile_size` pixels. For every tile the minimum
/// and maximum intensities of its 3x3 tile neighbourhood are computed and pixels are
/// compared against the mid-range `(min + max) / 2`. Neighbourhoods whose contrast
/// `max - min` is below `min_contrast` carry no edge information and are compared
/// against the global mean intensity instead.
///
/// # Arguments
///
/// * `src` - The input grayscale image.
/// * `dst` - The output binary image, 255 for bright pixels and 0 for dark ones.
/// * `tile_size` - The side of the tiles in pixels. Must be positive.
/// * `min_contrast` - The minimum local contrast to use the local threshold.
///
/// # Examples
///
/// ```
/// use lensfix_image::{Image, ImageSize};
/// use lensfix_imgproc::threshold::adaptive_threshold;
///
/// let size = ImageSize { width: 4, height: 1 };
/// let image = Image::<u8, 1>::new(size, vec![10, 20, 200, 220]).unwrap();
/// let mut binary = Image::<u8, 1>::from_size_val(size, 0).unwrap();
///
/// adaptive_threshold(&image, &mut binary, 2, 20).unwrap();
/// assert_eq!(binary.as_slice(), &[0, 0, 255, 255]);
/// ```
pub fn adaptive_threshold(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    tile_size: usize,
    min_contrast: u8,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let (width, height) = (src.width(), src.height());
    if width == 0 || height == 0 {
        return Ok(());
    }
    let tile_size = tile_size.max(1);

    let tiles_x = width.div_ceil(tile_size);
    let tiles_y = height.div_ceil(tile_size);
    let src_data = src.as_slice();

    // extrema of every tile
    let mut tile_min = vec![u8::MAX; tiles_x * tiles_y];
    let mut tile_max = vec![u8::MIN; tiles_x * tiles_y];
    let mut sum = 0u64;
    for (y, row) in src_data.chunks_exact(width).enumerate() {
        let tile_row = (y / tile_size) * tiles_x;
        for (x, &px) in row.iter().enumerate() {
            let t = tile_row + x / tile_size;
            tile_min[t] = tile_min[t].min(px);
            tile_max[t] = tile_max[t].max(px);
            sum += px as u64;
        }
    }
    let global_mean = (sum / (width * height) as u64) as u8;

    // extrema over the 3x3 neighbourhood of every tile
    let mut thresholds = vec![global_mean; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (mut lo, mut hi) = (u8::MAX, u8::MIN);
            for ny in ty.saturating_sub(1)..(ty + 2).min(tiles_y) {
                for nx in tx.saturating_sub(1)..(tx + 2).min(tiles_x) {
                    lo = lo.min(tile_min[ny * tiles_x + nx]);
                    hi = hi.max(tile_max[ny * tiles_x + nx]);
                }
            }
            if hi - lo >= min_contrast {
                thresholds[ty * tiles_x + tx] = ((lo as u16 + hi as u16) / 2) as u8;
            }
        }
    }

    parallel::par_iter_rows_indexed(dst, |y, dst_row| {
        let src_row = &src_data[y * width..(y + 1) * width];
        let tile_row = (y / tile_size) * tiles_x;
        dst_row
            .iter_mut()
            .zip(src_row.iter())
            .enumerate()
            .for_each(|(x, (d, &s))| {
                *d = if s > thresholds[tile_row + x / tile_size] {
                    255
                } else {
                    0
                };
            });
    });

    Ok(())
}
