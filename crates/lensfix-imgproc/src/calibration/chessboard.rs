use std::collections::VecDeque;

use lensfix_image::{Image, ImageError};

use super::quads::{fit_quad, Quad, QuadParams};
use super::subpix::{corner_subpix, SubPixCriteria};
use crate::{components::connected_components, morphology::dilate, threshold::adaptive_threshold};

/// The number of internal corners of a checkerboard along each axis.
///
/// A board with `m x n` squares has `(m - 1) x (n - 1)` internal corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternSize {
    /// Number of internal corners along a row.
    pub points_per_row: usize,
    /// Number of internal corners along a column.
    pub points_per_col: usize,
}

impl PatternSize {
    /// Create a new pattern size.
    pub fn new(points_per_row: usize, points_per_col: usize) -> Self {
        Self {
            points_per_row,
            points_per_col,
        }
    }

    /// Total number of internal corners.
    pub fn len(&self) -> usize {
        self.points_per_row * self.points_per_col
    }

    /// Whether the pattern has no corners at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parameters of the checkerboard detector.
#[derive(Clone, Debug)]
pub struct ChessboardParams {
    /// How many times the binary image may be dilated to split touching squares.
    pub max_dilations: usize,
    /// Tile size of the adaptive threshold. Derived from the image size when `None`.
    pub tile_size: Option<usize>,
    /// Minimum local contrast of the adaptive threshold.
    pub min_contrast: u8,
    /// Acceptance parameters of the square fitting.
    pub quad: QuadParams,
    /// Maximum distance between the corners of two linked squares, relative to the
    /// shortest square edge.
    pub link_ratio: f32,
    /// Stopping rule of the sub-pixel refinement.
    pub subpix: SubPixCriteria,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            max_dilations: 2,
            tile_size: None,
            min_contrast: 20,
            quad: QuadParams::default(),
            link_ratio: 0.35,
            subpix: SubPixCriteria::default(),
        }
    }
}

impl ChessboardParams {
    /// Set the maximum number of dilations.
    pub fn with_max_dilations(mut self, max_dilations: usize) -> Self {
        self.max_dilations = max_dilations;
        self
    }

    /// Set a fixed tile size for the adaptive threshold.
    pub fn with_tile_size(mut self, tile_size: usize) -> Self {
        self.tile_size = Some(tile_size);
        self
    }

    /// Set the sub-pixel refinement criteria.
    pub fn with_subpix(mut self, subpix: SubPixCriteria) -> Self {
        self.subpix = subpix;
        self
    }
}

/// Corner graph built from the linked squares.
struct CornerGraph {
    points: Vec<[f32; 2]>,
    adj: Vec<Vec<usize>>,
}

fn sub(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

fn cosine(a: [f32; 2], b: [f32; 2]) -> f32 {
    let norm = a[0].hypot(a[1]) * b[0].hypot(b[1]);
    if norm == 0.0 {
        return -1.0;
    }
    (a[0] * b[0] + a[1] * b[1]) / norm
}

fn link_quads(quads: &[Quad], link_ratio: f32, extra: f32) -> CornerGraph {
    let corners = quads
        .iter()
        .enumerate()
        .flat_map(|(qi, q)| q.corners.iter().map(move |c| (qi, *c)))
        .collect::<Vec<_>>();

    let nearest = corners
        .iter()
        .map(|&(qi, p)| {
            corners
                .iter()
                .enumerate()
                .filter(|(_, (qj, _))| *qj != qi)
                .map(|(j, (_, c))| {
                    let d = sub(*c, p);
                    (j, d[0] * d[0] + d[1] * d[1])
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
        })
        .collect::<Vec<_>>();

    let mut node_of = vec![None; corners.len()];
    let mut points = Vec::new();
    for (i, nn) in nearest.iter().enumerate() {
        let Some((j, d2)) = *nn else {
            continue;
        };
        // mutual nearest neighbours, each pair handled once
        if j < i || nearest[j].map(|(k, _)| k) != Some(i) {
            continue;
        }
        let (qi, qj) = (corners[i].0, corners[j].0);
        let max_dist = link_ratio * quads[qi].min_edge().min(quads[qj].min_edge()) + extra;
        if d2 > max_dist * max_dist {
            continue;
        }
        let (a, b) = (corners[i].1, corners[j].1);
        node_of[i] = Some(points.len());
        node_of[j] = Some(points.len());
        points.push([0.5 * (a[0] + b[0]), 0.5 * (a[1] + b[1])]);
    }

    let mut adj = vec![Vec::new(); points.len()];
    for qi in 0..quads.len() {
        for k in 0..4 {
            let (Some(a), Some(b)) = (node_of[qi * 4 + k], node_of[qi * 4 + (k + 1) % 4]) else {
                continue;
            };
            if a != b && !adj[a].contains(&b) {
                adj[a].push(b);
                adj[b].push(a);
            }
        }
    }

    CornerGraph { points, adj }
}

/// Keep only the largest connected group of corners.
fn largest_group(graph: CornerGraph) -> CornerGraph {
    let n = graph.points.len();
    let mut visited = vec![false; n];
    let mut best: Vec<usize> = Vec::new();

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut group = vec![seed];
        let mut queue = VecDeque::from([seed]);
        while let Some(cur) = queue.pop_front() {
            for &next in &graph.adj[cur] {
                if !visited[next] {
                    visited[next] = true;
                    group.push(next);
                    queue.push_back(next);
                }
            }
        }
        if group.len() > best.len() {
            best = group;
        }
    }

    let mut remap = vec![usize::MAX; n];
    for (new, &old) in best.iter().enumerate() {
        remap[old] = new;
    }

    CornerGraph {
        points: best.iter().map(|&i| graph.points[i]).collect(),
        adj: best
            .iter()
            .map(|&i| graph.adj[i].iter().map(|&j| remap[j]).collect())
            .collect(),
    }
}

fn walk_straight(graph: &CornerGraph, start: usize, next: usize) -> Vec<usize> {
    let mut line = vec![start, next];
    loop {
        let (prev, cur) = (line[line.len() - 2], line[line.len() - 1]);
        let dir = sub(graph.points[cur], graph.points[prev]);
        let step = graph.adj[cur]
            .iter()
            .filter(|&&n| !line.contains(&n))
            .map(|&n| (n, cosine(dir, sub(graph.points[n], graph.points[cur]))))
            .filter(|(_, c)| *c > 0.8)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        match step {
            Some((n, _)) => line.push(n),
            None => break,
        }
    }
    line
}

fn horizontalness(graph: &CornerGraph, line: &[usize]) -> f32 {
    let (Some(&first), Some(&last)) = (line.first(), line.last()) else {
        return 0.0;
    };
    let d = sub(graph.points[last], graph.points[first]);
    let total = d[0].abs() + d[1].abs();
    if total == 0.0 {
        0.0
    } else {
        d[0].abs() / total
    }
}

fn order_path(graph: &CornerGraph) -> Option<Vec<usize>> {
    if graph.adj.iter().any(|a| a.len() > 2) {
        return None;
    }
    let start = (0..graph.points.len())
        .filter(|&i| graph.adj[i].len() == 1)
        .min_by(|&a, &b| {
            let (pa, pb) = (graph.points[a], graph.points[b]);
            (pa[0] + pa[1]).total_cmp(&(pb[0] + pb[1]))
        })?;

    let mut path = vec![start];
    let mut visited = vec![false; graph.points.len()];
    visited[start] = true;
    loop {
        let cur = path[path.len() - 1];
        let Some(&next) = graph.adj[cur].iter().find(|&&n| !visited[n]) else {
            break;
        };
        visited[next] = true;
        path.push(next);
    }
    Some(path)
}

/// Order the corners of a connected grid graph row by row.
///
/// Returns the node indices so that corner `c` sits at column `c % points_per_row` and
/// row `c / points_per_row`, or `None` if the graph is not a consistent grid.
fn order_grid(graph: &CornerGraph, pattern: PatternSize) -> Option<Vec<usize>> {
    let n = pattern.len();
    if graph.points.len() != n || n == 0 {
        return None;
    }
    if graph.adj.iter().any(|a| a.len() > 4) {
        return None;
    }
    if n == 1 {
        return Some(vec![0]);
    }

    let (rows, cols) = (pattern.points_per_col, pattern.points_per_row);
    let ordered = if rows == 1 || cols == 1 {
        order_path(graph)?
    } else {
        // start from the top-left-most corner of the grid
        let start = (0..n)
            .filter(|&i| graph.adj[i].len() == 2)
            .min_by(|&a, &b| {
                let (pa, pb) = (graph.points[a], graph.points[b]);
                (pa[0] + pa[1]).total_cmp(&(pb[0] + pb[1]))
            })?;

        let line_a = walk_straight(graph, start, graph.adj[start][0]);
        let line_b = walk_straight(graph, start, graph.adj[start][1]);

        let (first_row, first_col) = if cols == rows {
            if horizontalness(graph, &line_a) >= horizontalness(graph, &line_b) {
                (line_a, line_b)
            } else {
                (line_b, line_a)
            }
        } else if line_a.len() == cols && line_b.len() == rows {
            (line_a, line_b)
        } else if line_b.len() == cols && line_a.len() == rows {
            (line_b, line_a)
        } else {
            return None;
        };
        if first_row.len() != cols || first_col.len() != rows {
            return None;
        }

        let mut used = vec![false; n];
        first_row.iter().chain(first_col.iter()).for_each(|&i| used[i] = true);

        let mut grid = vec![first_row];
        for &row_start in first_col.iter().skip(1) {
            let prev_row = &grid[grid.len() - 1];
            let mut line = vec![row_start];
            for k in 1..cols {
                let hint = sub(graph.points[prev_row[k]], graph.points[prev_row[k - 1]]);
                let cur = line[k - 1];
                let (next, _) = graph.adj[cur]
                    .iter()
                    .filter(|&&nb| !used[nb])
                    .map(|&nb| (nb, cosine(hint, sub(graph.points[nb], graph.points[cur]))))
                    .filter(|(_, c)| *c > 0.5)
                    .max_by(|a, b| a.1.total_cmp(&b.1))?;
                used[next] = true;
                line.push(next);
            }
            grid.push(line);
        }

        // consecutive rows must be linked column by column
        for r in 1..grid.len() {
            for k in 0..cols {
                if !graph.adj[grid[r][k]].contains(&grid[r - 1][k]) {
                    return None;
                }
            }
        }

        grid.concat()
    };

    let mut seen = vec![false; n];
    for &i in &ordered {
        if seen[i] {
            return None;
        }
        seen[i] = true;
    }
    (ordered.len() == n).then_some(ordered)
}

fn default_tile_size(gray: &Image<u8, 1>) -> usize {
    (gray.width().min(gray.height()) / 20).max(4)
}

/// Find the internal corners of a checkerboard at pixel precision.
///
/// The frame is binarized with an adaptive threshold, the dark squares are fitted as
/// quadrilaterals and squares touching at a corner are linked into a grid. When the
/// squares merge into each other the binary image is dilated and the search is
/// repeated, up to `max_dilations` times.
///
/// # Arguments
///
/// * `gray` - The grayscale frame.
/// * `pattern` - The expected number of internal corners.
/// * `params` - The detector parameters.
///
/// # Returns
///
/// The corners in row-major order, or `None` if the full pattern was not found.
pub fn find_chessboard_corners(
    gray: &Image<u8, 1>,
    pattern: PatternSize,
    params: &ChessboardParams,
) -> Result<Option<Vec<[f32; 2]>>, ImageError> {
    if pattern.is_empty() || gray.width() < 3 || gray.height() < 3 {
        return Ok(None);
    }

    let tile_size = params.tile_size.unwrap_or_else(|| default_tile_size(gray));
    let mut binary = Image::<u8, 1>::from_size_val(gray.size(), 0)?;
    adaptive_threshold(gray, &mut binary, tile_size, params.min_contrast)?;
    let mut scratch = binary.clone();

    let (width, height) = (gray.width(), gray.height());

    for dilation in 0..=params.max_dilations {
        if dilation > 0 {
            dilate(&binary, &mut scratch)?;
            std::mem::swap(&mut binary, &mut scratch);
        }

        let quads = connected_components(&binary, 0)
            .iter()
            .filter(|c| !c.touches_border(width, height))
            .filter_map(|c| fit_quad(c, &params.quad))
            .collect::<Vec<_>>();

        let extra = 2.0 * dilation as f32 * std::f32::consts::SQRT_2;
        let graph = largest_group(link_quads(&quads, params.link_ratio, extra));

        log::trace!(
            "dilation {dilation}: {} quads, {} linked corners, {} expected",
            quads.len(),
            graph.points.len(),
            pattern.len()
        );

        if let Some(order) = order_grid(&graph, pattern) {
            return Ok(Some(order.iter().map(|&i| graph.points[i]).collect()));
        }
    }

    Ok(None)
}

/// Detect the internal corners of a checkerboard with sub-pixel accuracy.
///
/// Runs [`find_chessboard_corners`] and refines every corner with [`corner_subpix`].
///
/// # Examples
///
/// ```
/// use lensfix_image::Image;
/// use lensfix_imgproc::calibration::chessboard::{detect_chessboard, ChessboardParams, PatternSize};
///
/// let blank = Image::<u8, 1>::from_size_val([64, 48].into(), 255).unwrap();
/// let corners = detect_chessboard(&blank, PatternSize::new(9, 6), &ChessboardParams::default()).unwrap();
/// assert!(corners.is_none());
/// ```
pub fn detect_chessboard(
    gray: &Image<u8, 1>,
    pattern: PatternSize,
    params: &ChessboardParams,
) -> Result<Option<Vec<[f32; 2]>>, ImageError> {
    let Some(mut corners) = find_chessboard_corners(gray, pattern, params)? else {
        return Ok(None);
    };

    let gray_f32 = gray.cast::<f32>()?;
    corner_subpix(&gray_f32, &mut corners, &params.subpix);

    Ok(Some(corners))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensfix_image::ImageSize;

    /// Render a board of `squares_x x squares_y` squares of side `square` pixels,
    /// rotated by `angle` degrees around the image centre.
    fn render_board(
        size: ImageSize,
        squares_x: usize,
        squares_y: usize,
        square: f32,
        angle: f32,
    ) -> Result<Image<u8, 1>, ImageError> {
        const SS: usize = 4;
        let (s, c) = angle.to_radians().sin_cos();
        let (cx, cy) = ((size.width as f32 - 1.0) / 2.0, (size.height as f32 - 1.0) / 2.0);
        let (half_w, half_h) = (
            squares_x as f32 * square / 2.0,
            squares_y as f32 * square / 2.0,
        );

        let mut data = vec![0u8; size.width * size.height];
        for y in 0..size.height {
            for x in 0..size.width {
                let mut dark = 0;
                for sy in 0..SS {
                    for sx in 0..SS {
                        let px = x as f32 - 0.5 + (sx as f32 + 0.5) / SS as f32 - cx;
                        let py = y as f32 - 0.5 + (sy as f32 + 0.5) / SS as f32 - cy;
                        // board coordinates
                        let u = c * px + s * py + half_w;
                        let v = -s * px + c * py + half_h;
                        if u >= 0.0 && v >= 0.0 && u < 2.0 * half_w && v < 2.0 * half_h {
                            let (i, j) = ((u / square) as usize, (v / square) as usize);
                            if (i + j) % 2 == 0 {
                                dark += 1;
                            }
                        }
                    }
                }
                data[y * size.width + x] = (255 - 255 * dark / (SS * SS)) as u8;
            }
        }
        Image::new(size, data)
    }

    #[test]
    fn detect_axis_aligned_board() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 180,
            height: 160,
        };
        let image = render_board(size, 6, 5, 20.0, 0.0)?;
        let corners = detect_chessboard(&image, PatternSize::new(5, 4), &Default::default())?
            .expect("board not found");

        assert_eq!(corners.len(), 20);
        // the board spans [29.5, 149.5] x [29.5, 129.5]
        for (i, corner) in corners.iter().enumerate() {
            let (col, row) = ((i % 5) as f32, (i / 5) as f32);
            approx::assert_relative_eq!(corner[0], 49.5 + 20.0 * col, epsilon = 0.1);
            approx::assert_relative_eq!(corner[1], 49.5 + 20.0 * row, epsilon = 0.1);
        }
        Ok(())
    }

    #[test]
    fn detect_rotated_board() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 320,
            height: 280,
        };
        let image = render_board(size, 7, 5, 30.0, 15.0)?;
        let corners = detect_chessboard(&image, PatternSize::new(6, 4), &Default::default())?
            .expect("board not found");

        assert_eq!(corners.len(), 24);
        // neighbouring corners stay one square apart
        for row in corners.chunks_exact(6) {
            for pair in row.windows(2) {
                let d = (pair[1][0] - pair[0][0]).hypot(pair[1][1] - pair[0][1]);
                approx::assert_relative_eq!(d, 30.0, epsilon = 0.5);
            }
        }
        for k in 0..6 {
            let (a, b) = (corners[k], corners[6 + k]);
            let d = (b[0] - a[0]).hypot(b[1] - a[1]);
            approx::assert_relative_eq!(d, 30.0, epsilon = 0.5);
        }
        Ok(())
    }

    #[test]
    fn wrong_pattern_size_is_not_found() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 180,
            height: 160,
        };
        let image = render_board(size, 6, 5, 20.0, 0.0)?;
        let params = ChessboardParams::default();
        assert!(find_chessboard_corners(&image, PatternSize::new(6, 4), &params)?.is_none());
        assert!(find_chessboard_corners(&image, PatternSize::new(5, 3), &params)?.is_none());
        Ok(())
    }

    #[test]
    fn order_single_line() {
        // a vertical line of 3 corners, given out of order
        let graph = CornerGraph {
            points: vec![[10.0, 30.0], [10.0, 10.0], [10.0, 20.0]],
            adj: vec![vec![2], vec![2], vec![0, 1]],
        };
        let order = order_grid(&graph, PatternSize::new(1, 3));
        assert_eq!(order, Some(vec![1, 2, 0]));
        assert_eq!(order_grid(&graph, PatternSize::new(2, 2)), None);
    }

    #[test]
    fn order_single_corner() {
        let graph = CornerGraph {
            points: vec![[4.0, 4.0]],
            adj: vec![vec![]],
        };
        assert_eq!(order_grid(&graph, PatternSize::new(1, 1)), Some(vec![0]));
    }

    #[test]
    fn order_square_grid_prefers_horizontal_rows() {
        // 2x2 grid rotated slightly
        let graph = CornerGraph {
            points: vec![[10.0, 10.0], [20.0, 11.0], [9.0, 20.0], [19.0, 21.0]],
            adj: vec![vec![2, 1], vec![0, 3], vec![0, 3], vec![1, 2]],
        };
        assert_eq!(order_grid(&graph, PatternSize::new(2, 2)), Some(vec![0, 1, 2, 3]));
    }
}
