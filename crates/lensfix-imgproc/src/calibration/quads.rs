use crate::components::Component;

/// A convex quadrilateral fitted to a dark checkerboard square.
///
/// The corners are stored in polygon order, either clockwise or counter-clockwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    /// The corners of the quadrilateral as `[x, y]` pixel coordinates.
    pub corners: [[f32; 2]; 4],
}

impl Quad {
    /// The length of the edge starting at corner `i`.
    pub fn edge_length(&self, i: usize) -> f32 {
        let a = self.corners[i];
        let b = self.corners[(i + 1) % 4];
        (b[0] - a[0]).hypot(b[1] - a[1])
    }

    /// The length of the shortest edge.
    pub fn min_edge(&self) -> f32 {
        (0..4).map(|i| self.edge_length(i)).fold(f32::MAX, f32::min)
    }

    /// The length of the longest edge.
    pub fn max_edge(&self) -> f32 {
        (0..4).map(|i| self.edge_length(i)).fold(0.0, f32::max)
    }

    /// The absolute area of the polygon, from the shoelace formula.
    pub fn area(&self) -> f32 {
        let mut acc = 0.0;
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            acc += a[0] * b[1] - b[0] * a[1];
        }
        0.5 * acc.abs()
    }

    /// The length of the perimeter.
    pub fn perimeter(&self) -> f32 {
        (0..4).map(|i| self.edge_length(i)).sum()
    }

    /// Whether the polygon is strictly convex.
    pub fn is_convex(&self) -> bool {
        let mut sign = 0.0f32;
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            let c = self.corners[(i + 2) % 4];
            let cross = (b[0] - a[0]) * (c[1] - b[1]) - (b[1] - a[1]) * (c[0] - b[0]);
            if cross == 0.0 || cross * sign < 0.0 {
                return false;
            }
            sign = cross;
        }
        true
    }
}

/// Parameters controlling which blobs are accepted as quadrilaterals.
#[derive(Clone, Debug)]
pub struct QuadParams {
    /// Minimum blob area in pixels.
    pub min_area: usize,
    /// Accepted range for the ratio between the blob area and the polygon area.
    pub area_ratio: (f32, f32),
    /// Minimum ratio between the shortest and the longest edge.
    pub min_edge_ratio: f32,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self {
            min_area: 25,
            area_ratio: (0.7, 1.4),
            min_edge_ratio: 0.25,
        }
    }
}

fn dist2(a: [f32; 2], b: [f32; 2]) -> f32 {
    let (dx, dy) = (a[0] - b[0], a[1] - b[1]);
    dx * dx + dy * dy
}

fn dist_to_segment(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
    let (abx, aby) = (b[0] - a[0], b[1] - a[1]);
    let len2 = abx * abx + aby * aby;
    if len2 == 0.0 {
        return dist2(p, a).sqrt();
    }
    let t = (((p[0] - a[0]) * abx + (p[1] - a[1]) * aby) / len2).clamp(0.0, 1.0);
    dist2(p, [a[0] + t * abx, a[1] + t * aby]).sqrt()
}

/// Fit a quadrilateral to a connected blob.
///
/// The four corners are taken from the extreme points of the blob boundary: the point
/// farthest from the centroid, the point farthest from that one, and the points on
/// either side of the resulting diagonal that lie farthest from it. The fit is
/// rejected when the boundary strays away from the polygon edges or when the
/// polygon is too small, too elongated or not convex.
///
/// # Arguments
///
/// * `component` - The blob, with its boundary pixels.
/// * `params` - The acceptance parameters.
///
/// # Returns
///
/// The fitted quadrilateral, or `None` if the blob is not quadrilateral enough.
pub fn fit_quad(component: &Component, params: &QuadParams) -> Option<Quad> {
    if component.area < params.min_area || component.boundary.len() < 8 {
        return None;
    }

    let points = component
        .boundary
        .iter()
        .map(|p| [p[0] as f32, p[1] as f32])
        .collect::<Vec<_>>();

    let n = points.len() as f32;
    let centroid = points.iter().fold([0.0f32; 2], |acc, p| {
        [acc[0] + p[0] / n, acc[1] + p[1] / n]
    });

    let farthest_from = |q: [f32; 2]| {
        points
            .iter()
            .copied()
            .max_by(|a, b| dist2(*a, q).total_cmp(&dist2(*b, q)))
    };

    let c0 = farthest_from(centroid)?;
    let c2 = farthest_from(c0)?;

    let diag = [c2[0] - c0[0], c2[1] - c0[1]];
    let diag_len = diag[0].hypot(diag[1]);
    if diag_len == 0.0 {
        return None;
    }

    // signed distance to the diagonal, scaled by its length
    let side = |p: &[f32; 2]| diag[0] * (p[1] - c0[1]) - diag[1] * (p[0] - c0[0]);
    let c1 = points
        .iter()
        .copied()
        .max_by(|a, b| side(a).total_cmp(&side(b)))?;
    let c3 = points
        .iter()
        .copied()
        .min_by(|a, b| side(a).total_cmp(&side(b)))?;

    let min_offset = 0.15 * diag_len;
    if side(&c1) / diag_len < min_offset || -side(&c3) / diag_len < min_offset {
        return None;
    }

    let quad = Quad {
        corners: [c0, c1, c2, c3],
    };

    let (min_edge, max_edge) = (quad.min_edge(), quad.max_edge());
    if min_edge < params.min_edge_ratio * max_edge || !quad.is_convex() {
        return None;
    }

    // pixel centres cover the polygon plus half a pixel around its perimeter
    let expected_area = quad.area() + 0.5 * quad.perimeter() + 1.0;
    let ratio = component.area as f32 / expected_area;
    if ratio < params.area_ratio.0 || ratio > params.area_ratio.1 {
        return None;
    }

    let tol = 2.0 + 0.05 * min_edge;
    let fits = points.iter().all(|p| {
        (0..4)
            .map(|i| dist_to_segment(*p, quad.corners[i], quad.corners[(i + 1) % 4]))
            .fold(f32::MAX, f32::min)
            <= tol
    });

    fits.then_some(quad)
}
