/// Compute the determinant of a 3x3 matrix.
pub fn det_mat33(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Multiply two 3x3 matrices.
pub fn mat33_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

/// Multiply a 3x3 matrix by a 3d vector.
pub fn mat33_mul_vec3(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Transpose a 3x3 matrix.
pub fn transpose_mat33(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}

/// Invert a 3x3 matrix using the adjugate.
///
/// # Returns
///
/// The inverse, or `None` if the matrix is singular.
pub fn inverse_mat33(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det = det_mat33(m);
    if det.abs() < f64::EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

/// Compute the cross product of two 3d vectors.
pub fn cross_vec3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Compute the dot product of two 3d vectors.
pub fn dot_product3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Compute the euclidean norm of a 3d vector.
pub fn norm_vec3(a: &[f64; 3]) -> f64 {
    dot_product3(a, a).sqrt()
}

/// Scale a 3x3 matrix inplace so that its last element is one.
///
/// Matrices whose last element is zero are scaled to unit Frobenius norm instead.
pub fn normalize_mat33_inplace(m: &mut [[f64; 3]; 3]) {
    let scale = if m[2][2].abs() > f64::EPSILON {
        m[2][2]
    } else {
        m.iter().flatten().map(|v| v * v).sum::<f64>().sqrt()
    };
    if scale == 0.0 {
        return;
    }
    m.iter_mut().flatten().for_each(|v| *v /= scale);
}

/// Copy a 3x3 matrix into a faer matrix.
pub fn mat33_to_faer(m: &[[f64; 3]; 3]) -> faer::Mat<f64> {
    faer::Mat::from_fn(3, 3, |i, j| m[i][j])
}

/// Find the rotation matrix closest to `m` in the Frobenius sense.
///
/// Computes `U * V^T` from the SVD of `m`, flipping the sign of the last singular
/// direction if needed so that the result has determinant +1.
pub fn nearest_rotation(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let svd = mat33_to_faer(m).svd();
    let (u, v) = (svd.u(), svd.v());

    let compose = |flip: f64| {
        let mut r = [[0.0; 3]; 3];
        for (i, row) in r.iter_mut().enumerate() {
            for (j, val) in row.iter_mut().enumerate() {
                *val = u.read(i, 0) * v.read(j, 0)
                    + u.read(i, 1) * v.read(j, 1)
                    + flip * u.read(i, 2) * v.read(j, 2);
            }
        }
        r
    };

    let r = compose(1.0);
    if det_mat33(&r) < 0.0 {
        compose(-1.0)
    } else {
        r
    }
}
