/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation, normalized internally.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The rotation matrix.
///
/// Example:
///
/// ```
/// use lensfix_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = [1.0, 0.0, 0.0];
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(&axis, angle).unwrap();
/// assert!((rotation[1][2] + 1.0).abs() < 1e-12);
/// assert!((rotation[2][1] - 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], &'static str> {
    let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
    if magnitude < 1e-10 {
        return Err("cannot compute rotation matrix from a zero vector");
    }
    let (x, y, z) = (axis[0] / magnitude, axis[1] / magnitude, axis[2] / magnitude);

    let (s, c) = angle.sin_cos();
    let t = 1.0 - c;

    Ok([
        [c + x * x * t, x * y * t - z * s, x * z * t + y * s],
        [x * y * t + z * s, c + y * y * t, y * z * t - x * s],
        [x * z * t - y * s, y * z * t + x * s, c + z * z * t],
    ])
}

/// Convert a rotation vector (axis scaled by angle) to a rotation matrix.
///
/// Small rotations fall back to the first order expansion `I + [r]x`.
pub fn rotation_from_rvec(rvec: &[f64; 3]) -> [[f64; 3]; 3] {
    let theta = (rvec[0] * rvec[0] + rvec[1] * rvec[1] + rvec[2] * rvec[2]).sqrt();
    if theta < 1e-12 {
        return [
            [1.0, -rvec[2], rvec[1]],
            [rvec[2], 1.0, -rvec[0]],
            [-rvec[1], rvec[0], 1.0],
        ];
    }
    // the norm is checked above
    axis_angle_to_rotation_matrix(rvec, theta).unwrap_or([
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
    ])
}

/// Convert a rotation matrix to a rotation vector (axis scaled by angle).
///
/// # Arguments
///
/// * `r` - A proper rotation matrix.
///
/// # Returns
///
/// The rotation vector, with an angle in `[0, pi]`.
pub fn rvec_from_rotation(r: &[[f64; 3]; 3]) -> [f64; 3] {
    let cos_theta = ((r[0][0] + r[1][1] + r[2][2] - 1.0) / 2.0).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();

    // skew symmetric part, 2 sin(theta) * axis
    let w = [r[2][1] - r[1][2], r[0][2] - r[2][0], r[1][0] - r[0][1]];

    if theta < 1e-12 {
        return [w[0] / 2.0, w[1] / 2.0, w[2] / 2.0];
    }

    let sin_theta = theta.sin();
    if sin_theta > 1e-6 {
        let k = theta / (2.0 * sin_theta);
        return [w[0] * k, w[1] * k, w[2] * k];
    }

    // theta close to pi: recover the axis from the symmetric part
    let diag = [r[0][0], r[1][1], r[2][2]];
    let i = (0..3)
        .max_by(|&a, &b| diag[a].total_cmp(&diag[b]))
        .unwrap_or(0);
    let (j, k) = ((i + 1) % 3, (i + 2) % 3);

    let mut axis = [0.0; 3];
    axis[i] = ((diag[i] - diag[j] - diag[k] + 1.0) / 4.0).max(0.0).sqrt();
    if axis[i] > 0.0 {
        axis[j] = (r[j][i] + r[i][j]) / (4.0 * axis[i]);
        axis[k] = (r[k][i] + r[i][k]) / (4.0 * axis[i]);
    }
    // keep the sign consistent with the remaining skew symmetric part
    let sign = if w[0] * axis[0] + w[1] * axis[1] + w[2] * axis[2] < 0.0 {
        -1.0
    } else {
        1.0
    };

    [
        sign * axis[0] * theta,
        sign * axis[1] * theta,
        sign * axis[2] * theta,
    ]
}
