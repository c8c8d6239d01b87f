use lensfix_image::{Image, ImageError};

use crate::parallel;

/// Performs morphological dilation with a 3x3 square structuring element.
///
/// Every output pixel is the maximum of its 3x3 neighbourhood in the input. Applied to
/// a binary image it grows the bright regions by one pixel and shrinks the dark ones.
///
/// # Arguments
///
/// * `src` - The input grayscale image.
/// * `dst` - The output image, with the same size as the input.
pub fn dilate(src: &Image<u8, 1>, dst: &mut Image<u8, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let (width, height) = (src.width(), src.height());
    let src_data = src.as_slice();

    parallel::par_iter_rows_indexed(dst, |y, dst_row| {
        let y0 = y.saturating_sub(1);
        let y1 = (y + 1).min(height - 1);
        for (x, d) in dst_row.iter_mut().enumerate() {
            let x0 = x.saturating_sub(1);
            let x1 = (x + 1).min(width - 1);
            let mut val = 0u8;
            for yy in y0..=y1 {
                let row = &src_data[yy * width..(yy + 1) * width];
                for &px in &row[x0..=x1] {
                    val = val.max(px);
                }
            }
            *d = val;
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensfix_image::ImageSize;

    #[test]
    fn test_dilate() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 5,
            height: 5,
        };
        #[rustfmt::skip]
        let image = Image::<u8, 1>::new(
            size,
            vec![
                0, 0, 0, 0, 0,
                0, 0, 0, 0, 0,
                0, 0, 255, 0, 0,
                0, 0, 0, 0, 0,
                0, 0, 0, 0, 255,
            ],
        )?;

        let mut dilated = Image::<u8, 1>::from_size_val(size, 0)?;
        dilate(&image, &mut dilated)?;

        #[rustfmt::skip]
        let expected = vec![
            0, 0, 0, 0, 0,
            0, 255, 255, 255, 0,
            0, 255, 255, 255, 0,
            0, 255, 255, 255, 255,
            0, 0, 0, 255, 255,
        ];
        assert_eq!(dilated.as_slice(), expected.as_slice());
        Ok(())
    }
}
