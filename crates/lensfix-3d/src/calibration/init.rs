use lensfix_image::ImageSize;
use lensfix_imgproc::calibration::CameraIntrinsic;

use crate::camera::CameraPose;
use crate::linalg;

/// Conditioning transform taking pixels to coordinates centred on the image and scaled
/// by its largest side.
struct Conditioning {
    scale: f64,
    cx: f64,
    cy: f64,
}

impl Conditioning {
    fn new(image_size: ImageSize) -> Self {
        Self {
            scale: image_size.width.max(image_size.height).max(1) as f64,
            cx: (image_size.width as f64 - 1.0) / 2.0,
            cy: (image_size.height as f64 - 1.0) / 2.0,
        }
    }

    fn matrix(&self) -> [[f64; 3]; 3] {
        let s = 1.0 / self.scale;
        [[s, 0.0, -self.cx * s], [0.0, s, -self.cy * s], [0.0, 0.0, 1.0]]
    }

    /// Condition a homography and scale it to unit Frobenius norm.
    fn apply(&self, h: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
        let mut hn = linalg::mat33_mul(&self.matrix(), h);
        let norm = hn.iter().flatten().map(|v| v * v).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            hn.iter_mut().flatten().for_each(|v| *v /= norm);
        }
        hn
    }
}

// v_ij row of Zhang's constraint matrix, built from columns i and j of h.
fn v_ij(h: &[[f64; 3]; 3], i: usize, j: usize) -> [f64; 6] {
    [
        h[0][i] * h[0][j],
        h[0][i] * h[1][j] + h[1][i] * h[0][j],
        h[1][i] * h[1][j],
        h[2][i] * h[0][j] + h[0][i] * h[2][j],
        h[2][i] * h[1][j] + h[1][i] * h[2][j],
        h[2][i] * h[2][j],
    ]
}

/// Closed form intrinsics from conditioned homographies (Zhang's method) with a zero
/// skew constraint. Returns `(fx, fy, cx, cy)` in conditioned units.
fn zhang_closed_form(homographies: &[[[f64; 3]; 3]]) -> Option<[f64; 4]> {
    let rows = 2 * homographies.len() + 1;
    let mut mat_v = faer::Mat::<f64>::zeros(rows.max(6), 6);
    for (k, h) in homographies.iter().enumerate() {
        let v12 = v_ij(h, 0, 1);
        let v11 = v_ij(h, 0, 0);
        let v22 = v_ij(h, 1, 1);
        for c in 0..6 {
            mat_v.write(2 * k, c, v12[c]);
            mat_v.write(2 * k + 1, c, v11[c] - v22[c]);
        }
    }
    // zero skew: B12 = 0
    mat_v.write(2 * homographies.len(), 1, 1.0);

    let svd = mat_v.svd();
    let v = svd.v();
    let mut b = [0.0; 6];
    for (c, val) in b.iter_mut().enumerate() {
        *val = v.read(c, 5);
    }
    if b[0] < 0.0 {
        b.iter_mut().for_each(|x| *x = -*x);
    }

    let [b11, b12, b22, b13, b23, b33] = b;
    let den = b11 * b22 - b12 * b12;
    if b11.abs() < f64::EPSILON || den.abs() < f64::EPSILON {
        return None;
    }

    let v0 = (b12 * b13 - b11 * b23) / den;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda / b11 <= 0.0 || lambda * b11 / den <= 0.0 {
        return None;
    }
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / den).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    [alpha, beta, u0, v0]
        .iter()
        .all(|x| x.is_finite())
        .then_some([alpha, beta, u0, v0])
}

/// Focal lengths with the principal point fixed at the origin of the conditioned
/// frame. Solves for `1/fx^2` and `1/fy^2` in the least squares sense, falling back to a
/// single shared focal length.
fn focal_from_homographies(homographies: &[[[f64; 3]; 3]]) -> Option<[f64; 2]> {
    // rows of [a, b] = rhs with a = 1/fx^2, b = 1/fy^2
    let mut rows = Vec::with_capacity(2 * homographies.len());
    for h in homographies {
        rows.push((
            h[0][0] * h[0][1],
            h[1][0] * h[1][1],
            -h[2][0] * h[2][1],
        ));
        rows.push((
            h[0][0] * h[0][0] - h[0][1] * h[0][1],
            h[1][0] * h[1][0] - h[1][1] * h[1][1],
            -(h[2][0] * h[2][0] - h[2][1] * h[2][1]),
        ));
    }

    let (mut saa, mut sab, mut sbb, mut sar, mut sbr) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (a, b, r) in rows.iter() {
        saa += a * a;
        sab += a * b;
        sbb += b * b;
        sar += a * r;
        sbr += b * r;
    }

    let det = saa * sbb - sab * sab;
    if det.abs() > 1e-12 * (saa * sbb).max(f64::MIN_POSITIVE) {
        let inv_fx2 = (sar * sbb - sbr * sab) / det;
        let inv_fy2 = (saa * sbr - sab * sar) / det;
        if inv_fx2 > 0.0 && inv_fy2 > 0.0 {
            return Some([1.0 / inv_fx2.sqrt(), 1.0 / inv_fy2.sqrt()]);
        }
    }

    // shared focal length
    let (num, den) = rows.iter().fold((0.0, 0.0), |(num, den), (a, b, r)| {
        let c = a + b;
        (num + c * r, den + c * c)
    });
    if den > f64::EPSILON {
        let inv_f2 = num / den;
        if inv_f2 > 0.0 {
            let f = 1.0 / inv_f2.sqrt();
            return Some([f, f]);
        }
    }

    None
}

/// Initial intrinsic parameters from a set of target-to-image homographies.
///
/// Zhang's closed form solution is used when it yields a plausible camera (positive
/// focal lengths and a principal point inside the image). Otherwise the principal
/// point is fixed at the image centre and only the focal lengths are estimated, with
/// `max(width, height)` as the last resort.
///
/// # Arguments
///
/// * `homographies` - Homographies mapping target plane coordinates to pixels.
/// * `image_size` - The size of the images the homographies were estimated on.
pub fn init_intrinsics(
    homographies: &[[[f64; 3]; 3]],
    image_size: ImageSize,
) -> CameraIntrinsic {
    let cond = Conditioning::new(image_size);
    let conditioned = homographies
        .iter()
        .map(|h| cond.apply(h))
        .collect::<Vec<_>>();

    let (w, h) = (image_size.width as f64, image_size.height as f64);

    if conditioned.len() >= 2 {
        if let Some([fx, fy, u0, v0]) = zhang_closed_form(&conditioned) {
            let intrinsic = CameraIntrinsic {
                fx: fx * cond.scale,
                fy: fy * cond.scale,
                cx: u0 * cond.scale + cond.cx,
                cy: v0 * cond.scale + cond.cy,
            };
            if intrinsic.cx >= 0.0 && intrinsic.cx < w && intrinsic.cy >= 0.0 && intrinsic.cy < h
            {
                log::debug!("zhang initialization: {intrinsic:?}");
                return intrinsic;
            }
            log::debug!("zhang initialization rejected: {intrinsic:?}");
        }
    }

    let [fx, fy] = focal_from_homographies(&conditioned)
        .map(|[fx, fy]| [fx * cond.scale, fy * cond.scale])
        .unwrap_or([cond.scale, cond.scale]);

    let intrinsic = CameraIntrinsic {
        fx,
        fy,
        cx: cond.cx,
        cy: cond.cy,
    };
    log::debug!("centred initialization: {intrinsic:?}");
    intrinsic
}

/// Initial target pose from its homography and the camera intrinsics.
///
/// Decomposes `K^-1 H = [r1 r2 t] / lambda`, keeps the target in front of the camera and
/// projects `[r1 r2 r1xr2]` onto the closest rotation.
pub fn init_pose(h: &[[f64; 3]; 3], intrinsic: &CameraIntrinsic) -> Option<CameraPose> {
    let k_inv = linalg::inverse_mat33(&intrinsic.to_matrix())?;
    let a = linalg::mat33_mul(&k_inv, h);
    let col = |j: usize| [a[0][j], a[1][j], a[2][j]];
    let (a1, a2, a3) = (col(0), col(1), col(2));

    let n1 = linalg::norm_vec3(&a1);
    let n2 = linalg::norm_vec3(&a2);
    if n1 < f64::EPSILON || n2 < f64::EPSILON {
        return None;
    }
    let mut lambda = 2.0 / (n1 + n2);
    if a3[2] * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = a1.map(|x| x * lambda);
    let r2 = a2.map(|x| x * lambda);
    let r3 = linalg::cross_vec3(&r1, &r2);
    let translation = a3.map(|x| x * lambda);

    let r = [
        [r1[0], r2[0], r3[0]],
        [r1[1], r2[1], r3[1]],
        [r1[2], r2[2], r3[2]],
    ];

    Some(CameraPose {
        rotation: linalg::nearest_rotation(&r),
        translation,
    })
}
