use lensfix_image::Image;

use crate::interpolation::bilinear_interpolation;

/// Stopping rule for the sub-pixel corner refinement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubPixCriteria {
    /// Half of the side of the search window, in pixels.
    pub half_window: usize,
    /// Maximum number of iterations per corner.
    pub max_iterations: usize,
    /// Minimum corner displacement, in pixels, to keep iterating.
    pub epsilon: f32,
}

impl Default for SubPixCriteria {
    fn default() -> Self {
        Self {
            half_window: 3,
            max_iterations: 30,
            epsilon: 0.01,
        }
    }
}

fn sample_clamped(src: &Image<f32, 1>, x: f32, y: f32) -> f32 {
    let x = x.clamp(0.0, (src.cols() - 1) as f32);
    let y = y.clamp(0.0, (src.rows() - 1) as f32);
    bilinear_interpolation(src, x, y)[0]
}

/// Refine corner locations to sub-pixel accuracy.
///
/// At a saddle point of the intensity surface, the image gradient at every nearby
/// pixel is orthogonal to the vector from the corner to that pixel. Each iteration
/// solves the 2x2 least squares system built from that constraint over a Gaussian
/// weighted window around the current estimate. A corner that drifts further than
/// `half_window` from its initial position is restored to it.
///
/// # Arguments
///
/// * `src` - The grayscale image, with pixel centres at integer coordinates.
/// * `corners` - The initial corner estimates, refined in place as `[x, y]`.
/// * `criteria` - The window size and the stopping rule.
pub fn corner_subpix(src: &Image<f32, 1>, corners: &mut [[f32; 2]], criteria: &SubPixCriteria) {
    if src.cols() == 0 || src.rows() == 0 || criteria.half_window == 0 {
        return;
    }

    let win = criteria.half_window as i32;
    let side = (2 * win + 1) as usize;
    let patch_side = side + 2;

    let weights = (-win..=win)
        .map(|i| {
            let x = i as f32 / win as f32;
            (-x * x).exp()
        })
        .collect::<Vec<_>>();

    let eps2 = criteria.epsilon * criteria.epsilon;
    let mut patch = vec![0f32; patch_side * patch_side];

    for corner in corners.iter_mut() {
        let initial = *corner;
        let mut current = initial;

        for _ in 0..criteria.max_iterations {
            // patch centred on the current estimate, one pixel larger than the window
            for (r, row) in patch.chunks_exact_mut(patch_side).enumerate() {
                let y = current[1] + r as f32 - (win + 1) as f32;
                for (c, v) in row.iter_mut().enumerate() {
                    let x = current[0] + c as f32 - (win + 1) as f32;
                    *v = sample_clamped(src, x, y);
                }
            }

            let (mut a, mut b, mut c) = (0f64, 0f64, 0f64);
            let (mut bb1, mut bb2) = (0f64, 0f64);
            for i in 0..side {
                let py = i as f64 - win as f64;
                let row = (i + 1) * patch_side;
                for j in 0..side {
                    let px = j as f64 - win as f64;
                    let m = (weights[i] * weights[j]) as f64;
                    let k = row + j + 1;
                    let gx = (patch[k + 1] - patch[k - 1]) as f64;
                    let gy = (patch[k + patch_side] - patch[k - patch_side]) as f64;

                    let (gxx, gxy, gyy) = (gx * gx * m, gx * gy * m, gy * gy * m);
                    a += gxx;
                    b += gxy;
                    c += gyy;
                    bb1 += gxx * px + gxy * py;
                    bb2 += gxy * px + gyy * py;
                }
            }

            let det = a * c - b * b;
            if det.abs() <= f64::EPSILON {
                break;
            }

            let dx = ((c * bb1 - b * bb2) / det) as f32;
            let dy = ((-b * bb1 + a * bb2) / det) as f32;
            current = [current[0] + dx, current[1] + dy];

            if (current[0] - initial[0]).abs() > win as f32
                || (current[1] - initial[1]).abs() > win as f32
            {
                break;
            }
            if dx * dx + dy * dy <= eps2 {
                break;
            }
        }

        let drift_x = (current[0] - initial[0]).abs();
        let drift_y = (current[1] - initial[1]).abs();
        *corner = if drift_x > win as f32 || drift_y > win as f32 || !current[0].is_finite() {
            initial
        } else {
            current
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensfix_image::{ImageError, ImageSize};

    /// An anti-aliased saddle with its centre at `(cx, cy)`.
    fn saddle(size: usize, cx: f32, cy: f32) -> Result<Image<f32, 1>, ImageError> {
        const SS: usize = 8;
        let mut data = vec![0f32; size * size];
        for y in 0..size {
            for x in 0..size {
                let mut acc = 0.0;
                for sy in 0..SS {
                    for sx in 0..SS {
                        let px = x as f32 - 0.5 + (sx as f32 + 0.5) / SS as f32;
                        let py = y as f32 - 0.5 + (sy as f32 + 0.5) / SS as f32;
                        if (px - cx) * (py - cy) > 0.0 {
                            acc += 1.0;
                        }
                    }
                }
                data[y * size + x] = 255.0 * acc / (SS * SS) as f32;
            }
        }
        Image::new(
            ImageSize {
                width: size,
                height: size,
            },
            data,
        )
    }

    #[test]
    fn refine_saddle_point() -> Result<(), ImageError> {
        let image = saddle(24, 10.5, 12.5)?;
        let mut corners = [[11.2f32, 11.8f32]];
        corner_subpix(&image, &mut corners, &SubPixCriteria::default());

        approx::assert_relative_eq!(corners[0][0], 10.5, epsilon = 0.05);
        approx::assert_relative_eq!(corners[0][1], 12.5, epsilon = 0.05);
        Ok(())
    }

    #[test]
    fn flat_region_is_left_unchanged() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::from_size_val([16, 16].into(), 80.0)?;
        let mut corners = [[7.5f32, 8.25f32]];
        corner_subpix(&image, &mut corners, &SubPixCriteria::default());
        assert_eq!(corners[0], [7.5, 8.25]);
        Ok(())
    }
}
