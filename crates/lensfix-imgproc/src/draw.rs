use lensfix_image::Image;

use crate::calibration::chessboard::PatternSize;

/// Colors cycled over the rows of a detected checkerboard.
const ROW_COLORS: [[u8; 3]; 7] = [
    [255, 0, 0],
    [255, 128, 0],
    [200, 200, 0],
    [0, 255, 0],
    [0, 200, 200],
    [0, 0, 255],
    [255, 0, 255],
];

/// Helper function to set a pixel's color, ignoring coordinates outside of the image.
#[inline]
fn set_pixel<const C: usize>(img: &mut Image<u8, C>, x: i64, y: i64, color: [u8; C]) {
    if x >= 0 && x < img.cols() as i64 && y >= 0 && y < img.rows() as i64 {
        let start = (y as usize * img.cols() + x as usize) * C;
        img.as_slice_mut()[start..start + C].copy_from_slice(&color);
    }
}

/// Draws a line on an image inplace using Bresenham's line algorithm.
///
/// # Arguments
///
/// * `img` - The image to draw on.
/// * `p0` - The start point of the line as a tuple of (x, y).
/// * `p1` - The end point of the line as a tuple of (x, y).
/// * `color` - The color of the line as an array of `C` elements.
/// * `thickness` - The thickness of the line, drawn as a square brush.
pub fn draw_line<const C: usize>(
    img: &mut Image<u8, C>,
    p0: (i64, i64),
    p1: (i64, i64),
    color: [u8; C],
    thickness: usize,
) {
    let (mut x0, mut y0) = p0;
    let (x1, y1) = p1;

    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };

    let mut err = dx - dy;
    let half = if thickness > 1 {
        thickness as i64 / 2
    } else {
        0
    };

    loop {
        for i in -half..=half {
            for j in -half..=half {
                set_pixel(img, x0 + i, y0 + j, color);
            }
        }

        if x0 == x1 && y0 == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x0 += sx;
        }
        if e2 < dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Draws a circle outline on an image inplace using the midpoint circle algorithm.
///
/// # Arguments
///
/// * `img` - The image to draw on.
/// * `center` - The center of the circle as a tuple of (x, y).
/// * `radius` - The radius of the circle in pixels.
/// * `color` - The color of the circle.
pub fn draw_circle<const C: usize>(
    img: &mut Image<u8, C>,
    center: (i64, i64),
    radius: i64,
    color: [u8; C],
) {
    let (cx, cy) = center;
    let (mut x, mut y) = (radius, 0i64);
    let mut err = 1 - radius;

    while x >= y {
        for (px, py) in [
            (x, y),
            (y, x),
            (-y, x),
            (-x, y),
            (-x, -y),
            (-y, -x),
            (y, -x),
            (x, -y),
        ] {
            set_pixel(img, cx + px, cy + py, color);
        }
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}

/// Draws the detected corners of a checkerboard on an RGB image.
///
/// Every corner is marked with a circle and a cross, consecutive corners are joined
/// by lines and each row gets its own color.
///
/// # Arguments
///
/// * `img` - The image to draw on.
/// * `pattern` - The number of internal corners of the board.
/// * `corners` - The corners in row-major order as `[x, y]`.
pub fn draw_chessboard_corners(img: &mut Image<u8, 3>, pattern: PatternSize, corners: &[[f32; 2]]) {
    const RADIUS: i64 = 4;

    let round = |p: &[f32; 2]| (p[0].round() as i64, p[1].round() as i64);
    let row_len = pattern.points_per_row.max(1);

    let mut prev: Option<(i64, i64)> = None;
    for (i, corner) in corners.iter().enumerate() {
        let color = ROW_COLORS[(i / row_len) % ROW_COLORS.len()];
        let (x, y) = round(corner);

        if let Some(p) = prev {
            draw_line(img, p, (x, y), color, 1);
        }
        draw_line(img, (x - RADIUS, y - RADIUS), (x + RADIUS, y + RADIUS), color, 1);
        draw_line(img, (x - RADIUS, y + RADIUS), (x + RADIUS, y - RADIUS), color, 1);
        draw_circle(img, (x, y), RADIUS, color);
        prev = Some((x, y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensfix_image::{ImageError, ImageSize};

    #[rustfmt::skip]
    #[test]
    fn test_draw_line() -> Result<(), ImageError> {
        let mut img = Image::new(
            ImageSize { width: 5, height: 5 }, vec![0u8; 25],
        )?;
        draw_line(&mut img, (0, 0), (4, 4), [255], 1);
        assert_eq!(
            img.as_slice(),
            &[
                255,   0,   0,   0,   0,
                  0, 255,   0,   0,   0,
                  0,   0, 255,   0,   0,
                  0,   0,   0, 255,   0,
                  0,   0,   0,   0, 255,
            ]
        );
        Ok(())
    }

    #[rustfmt::skip]
    #[test]
    fn test_draw_circle() -> Result<(), ImageError> {
        let mut img = Image::new(
            ImageSize { width: 5, height: 5 }, vec![0u8; 25],
        )?;
        draw_circle(&mut img, (2, 2), 1, [9]);
        assert_eq!(
            img.as_slice(),
            &[
                0, 0, 0, 0, 0,
                0, 0, 9, 0, 0,
                0, 9, 0, 9, 0,
                0, 0, 9, 0, 0,
                0, 0, 0, 0, 0,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_draw_chessboard_corners() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 40,
            height: 30,
        };
        let mut img = Image::<u8, 3>::from_size_val(size, 0)?;
        let corners = [[10.0, 10.0], [20.0, 10.0], [10.0, 20.0], [20.0, 20.0]];
        draw_chessboard_corners(&mut img, PatternSize::new(2, 2), &corners);

        // first row in the first color, second row in the second one
        assert_eq!(img.get_pixel(15, 10, 0)?, 255);
        assert_eq!(img.get_pixel(15, 10, 1)?, 0);
        assert_eq!(img.get_pixel(24, 20, 1)?, 128);
        // drawing outside of the image is ignored
        draw_chessboard_corners(&mut img, PatternSize::new(1, 1), &[[-50.0, 100.0]]);
        Ok(())
    }
}
