use crate::linalg;

/// Errors of the homography estimation.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum HomographyError {
    /// Fewer than four correspondences were given.
    #[error("at least 4 point correspondences are needed, got {0}")]
    NotEnoughPoints(usize),

    /// The two point sets have different lengths.
    #[error("mismatched number of points: {0} and {1}")]
    MismatchedPoints(usize, usize),

    /// The points are degenerate, e.g. collinear.
    #[error("degenerate point configuration")]
    Degenerate,
}

/// Similarity transform that moves the centroid of the points to the origin and scales
/// them to an average distance of sqrt(2).
fn normalization_transform(points: &[[f64; 2]]) -> Option<[[f64; 3]; 3]> {
    let n = points.len() as f64;
    let (mx, my) = points
        .iter()
        .fold((0.0, 0.0), |acc, p| (acc.0 + p[0] / n, acc.1 + p[1] / n));
    let mean_dist = points
        .iter()
        .map(|p| ((p[0] - mx).powi(2) + (p[1] - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < f64::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some([[s, 0.0, -s * mx], [0.0, s, -s * my], [0.0, 0.0, 1.0]])
}

/// Whether the conditioned points lie on a single line.
fn is_collinear(points: &[[f64; 2]], t: &[[f64; 3]; 3]) -> bool {
    let (sxx, syy, sxy) = points.iter().fold((0.0, 0.0, 0.0), |acc, p| {
        let [x, y] = apply(t, p);
        (acc.0 + x * x, acc.1 + y * y, acc.2 + x * y)
    });
    let trace = sxx + syy;
    sxx * syy - sxy * sxy <= 1e-12 * trace * trace
}

fn apply(t: &[[f64; 3]; 3], p: &[f64; 2]) -> [f64; 2] {
    [
        t[0][0] * p[0] + t[0][1] * p[1] + t[0][2],
        t[1][0] * p[0] + t[1][1] * p[1] + t[1][2],
    ]
}

/// Compute the homography mapping `src` points onto `dst` points.
///
/// Uses the normalized direct linear transform: both point sets are conditioned with
/// a similarity transform, the 2n x 9 design matrix is solved in the least squares
/// sense through its right singular vector of smallest singular value, and the
/// result is denormalized.
///
/// # Arguments
///
/// * `src` - The source 2d points, at least four.
/// * `dst` - The destination 2d points.
///
/// # Returns
///
/// The homography from src to dst, scaled so that its last element is one.
pub fn homography_dlt(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<[[f64; 3]; 3], HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::MismatchedPoints(src.len(), dst.len()));
    }
    if src.len() < 4 {
        return Err(HomographyError::NotEnoughPoints(src.len()));
    }

    let t_src = normalization_transform(src).ok_or(HomographyError::Degenerate)?;
    let t_dst = normalization_transform(dst).ok_or(HomographyError::Degenerate)?;
    if is_collinear(src, &t_src) || is_collinear(dst, &t_dst) {
        return Err(HomographyError::Degenerate);
    }

    // construct matrix A
    let n = src.len();
    let mut mat_a = faer::Mat::<f64>::zeros(2 * n, 9);
    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let [x1, y1] = apply(&t_src, s);
        let [x2, y2] = apply(&t_dst, d);

        mat_a.write(2 * i, 0, x1);
        mat_a.write(2 * i, 1, y1);
        mat_a.write(2 * i, 2, 1.0);
        mat_a.write(2 * i, 6, -x2 * x1);
        mat_a.write(2 * i, 7, -x2 * y1);
        mat_a.write(2 * i, 8, -x2);

        mat_a.write(2 * i + 1, 3, x1);
        mat_a.write(2 * i + 1, 4, y1);
        mat_a.write(2 * i + 1, 5, 1.0);
        mat_a.write(2 * i + 1, 6, -y2 * x1);
        mat_a.write(2 * i + 1, 7, -y2 * y1);
        mat_a.write(2 * i + 1, 8, -y2);
    }

    // take the right singular vector of the smallest singular value
    let svd = mat_a.svd();
    let v = svd.v();
    let h = |k: usize| v.read(k, 8);
    let h_norm = [
        [h(0), h(1), h(2)],
        [h(3), h(4), h(5)],
        [h(6), h(7), h(8)],
    ];

    // denormalize: H = T_dst^-1 * H_norm * T_src
    let t_dst_inv = linalg::inverse_mat33(&t_dst).ok_or(HomographyError::Degenerate)?;
    let mut homo = linalg::mat33_mul(&linalg::mat33_mul(&t_dst_inv, &h_norm), &t_src);

    if linalg::det_mat33(&homo).abs() < 1e-12 {
        return Err(HomographyError::Degenerate);
    }
    linalg::normalize_mat33_inplace(&mut homo);

    Ok(homo)
}
