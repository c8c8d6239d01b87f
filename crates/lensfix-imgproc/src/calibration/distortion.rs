use super::{CameraIntrinsic, PolynomialDistortion};
use crate::interpolation::grid::meshgrid_from_fn;
use lensfix_image::{Image, ImageError, ImageSize};

/// Apply the polynomial distortion to a point in normalized camera coordinates.
///
/// # Arguments
///
/// * `x` - The x coordinate of the normalized point
/// * `y` - The y coordinate of the normalized point
/// * `distortion` - The distortion parameters of the camera
///
/// # Returns
///
/// The distorted normalized coordinates.
pub fn distort_normalized(x: f64, y: f64, distortion: &PolynomialDistortion) -> (f64, f64) {
    let PolynomialDistortion { k1, k2, p1, p2, k3 } = *distortion;

    let r2 = x * x + y * y;

    // radial distortion
    let kr = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;

    // tangential distortion
    let xd = x * kr + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
    let yd = y * kr + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;

    (xd, yd)
}

/// Distort a point using polynomial distortion
///
/// # Arguments
///
/// * `x` - The x coordinate of the point in pixels
/// * `y` - The y coordinate of the point in pixels
/// * `intrinsic` - The intrinsic parameters of the camera
/// * `distortion` - The distortion parameters of the camera
///
/// # Returns
///
/// * `x` - The x coordinate of the distorted point
/// * `y` - The y coordinate of the distorted point
pub fn distort_point_polynomial(
    x: f64,
    y: f64,
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> (f64, f64) {
    let (fx, fy, cx, cy) = (intrinsic.fx, intrinsic.fy, intrinsic.cx, intrinsic.cy);

    // normalize the coordinates
    let x = (x - cx) / fx;
    let y = (y - cy) / fy;

    let (xd, yd) = distort_normalized(x, y, distortion);

    // denormalize the coordinates
    (fx * xd + cx, fy * yd + cy)
}

/// Per-pixel source coordinates that undo the lens distortion of a camera.
///
/// For every pixel of the undistorted output image, `map_x` and `map_y` hold the
/// location in the distorted input image to sample from.
#[derive(Clone, Debug, PartialEq)]
pub struct UndistortMap {
    /// The x coordinates to sample in the distorted image.
    pub map_x: Image<f32, 1>,
    /// The y coordinates to sample in the distorted image.
    pub map_y: Image<f32, 1>,
}

impl UndistortMap {
    /// The size of the output image.
    pub fn size(&self) -> ImageSize {
        self.map_x.size()
    }
}

/// Generate the undistortion map for a polynomial distortion model
///
/// The output keeps the input camera matrix, so the undistorted image has the same
/// size and focal lengths as the input.
///
/// # Arguments
///
/// * `intrinsic` - The intrinsic parameters of the camera
/// * `distortion` - The distortion parameters of the camera
/// * `size` - The size of the image
///
/// # Returns
///
/// The correction map for [`crate::interpolation::remap`].
pub fn generate_correction_map_polynomial(
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
    size: ImageSize,
) -> Result<UndistortMap, ImageError> {
    let (map_x, map_y) = meshgrid_from_fn(size, |x, y| {
        let (xdst, ydst) = distort_point_polynomial(x as f64, y as f64, intrinsic, distortion);
        (xdst as f32, ydst as f32)
    })?;

    Ok(UndistortMap { map_x, map_y })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn intrinsic() -> CameraIntrinsic {
        CameraIntrinsic {
            fx: 577.48583984375,
            fy: 652.8748779296875,
            cx: 320.0,
            cy: 240.0,
        }
    }

    #[test]
    fn test_distort_point_polynomial() {
        let distortion = PolynomialDistortion {
            k1: 0.1,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
            k3: 0.0,
        };

        // a point one focal length away along x sits at r2 = 1
        let k = intrinsic();
        let (x, y) = distort_point_polynomial(k.cx + k.fx, k.cy, &k, &distortion);
        assert_relative_eq!(x, k.cx + 1.1 * k.fx, epsilon = 1e-9);
        assert_relative_eq!(y, k.cy, epsilon = 1e-9);

        // the principal point never moves
        let (x, y) = distort_point_polynomial(k.cx, k.cy, &k, &distortion);
        assert_relative_eq!(x, k.cx);
        assert_relative_eq!(y, k.cy);
    }

    #[test]
    fn test_distort_tangential() {
        let distortion = PolynomialDistortion {
            p1: 0.01,
            p2: -0.02,
            ..Default::default()
        };
        let (xd, yd) = distort_normalized(0.5, 0.25, &distortion);
        let r2 = 0.3125;
        assert_relative_eq!(xd, 0.5 + 2.0 * 0.01 * 0.125 - 0.02 * (r2 + 0.5), epsilon = 1e-12);
        assert_relative_eq!(yd, 0.25 + 0.01 * (r2 + 0.125) - 2.0 * 0.02 * 0.125, epsilon = 1e-12);
    }

    #[test]
    fn test_correction_map_zero_distortion_is_identity() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 8,
            height: 4,
        };
        let map = generate_correction_map_polynomial(
            &intrinsic(),
            &PolynomialDistortion::default(),
            size,
        )?;
        assert_eq!(map.size(), size);
        for y in 0..size.height {
            for x in 0..size.width {
                assert_relative_eq!(map.map_x.get_pixel(x, y, 0)?, x as f32, epsilon = 1e-4);
                assert_relative_eq!(map.map_y.get_pixel(x, y, 0)?, y as f32, epsilon = 1e-4);
            }
        }
        Ok(())
    }

    #[test]
    fn test_correction_map_barrel() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 640,
            height: 480,
        };
        let distortion = PolynomialDistortion {
            k1: -0.2,
            ..Default::default()
        };
        let map = generate_correction_map_polynomial(&intrinsic(), &distortion, size)?;

        // barrel distortion pulls the corners of the output towards the center
        let corner_x = map.map_x.get_pixel(0, 0, 0)?;
        let corner_y = map.map_y.get_pixel(0, 0, 0)?;
        assert!(corner_x > 0.0);
        assert!(corner_y > 0.0);
        assert_relative_eq!(map.map_x.get_pixel(320, 240, 0)?, 320.0);
        Ok(())
    }
}
