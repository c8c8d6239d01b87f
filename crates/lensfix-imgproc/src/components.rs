use lensfix_image::Image;

/// A disjoint-set (union-find) structure over pixel indices.
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    /// Returns the representative of the set containing `id`, with path compression.
    fn find(&mut self, mut id: usize) -> usize {
        let mut root = id;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        while self.parent[id] != root {
            let next = self.parent[id];
            self.parent[id] = root;
            id = next;
        }

        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] >= self.size[rb] {
            self.parent[rb] = ra;
            self.size[ra] += self.size[rb];
        } else {
            self.parent[ra] = rb;
            self.size[rb] += self.size[ra];
        }
    }
}

/// A 4-connected region of pixels sharing the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Number of pixels in the region.
    pub area: usize,
    /// Bounding box as `[min_x, min_y, max_x, max_y]`, inclusive.
    pub bbox: [usize; 4],
    /// Pixels of the region with at least one 4-neighbour outside of it, as `[x, y]`.
    pub boundary: Vec<[usize; 2]>,
}

impl Component {
    /// Whether the region touches the border of an image of the given size.
    pub fn touches_border(&self, width: usize, height: usize) -> bool {
        self.bbox[0] == 0 || self.bbox[1] == 0 || self.bbox[2] + 1 >= width || self.bbox[3] + 1 >= height
    }
}

/// Find the 4-connected regions of pixels equal to `value`.
///
/// # Arguments
///
/// * `src` - The input single channel image, usually binary.
/// * `value` - The pixel value that belongs to the regions.
///
/// # Returns
///
/// The regions, ordered by the raster position of their first pixel.
pub fn connected_components(src: &Image<u8, 1>, value: u8) -> Vec<Component> {
    let (width, height) = (src.width(), src.height());
    let data = src.as_slice();
    let mut uf = UnionFind::new(data.len());

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if data[idx] != value {
                continue;
            }
            if x > 0 && data[idx - 1] == value {
                uf.union(idx, idx - 1);
            }
            if y > 0 && data[idx - width] == value {
                uf.union(idx, idx - width);
            }
        }
    }

    let mut label_of_root = vec![usize::MAX; data.len()];
    let mut components: Vec<Component> = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if data[idx] != value {
                continue;
            }
            let root = uf.find(idx);
            if label_of_root[root] == usize::MAX {
                label_of_root[root] = components.len();
                components.push(Component {
                    area: 0,
                    bbox: [x, y, x, y],
                    boundary: Vec::new(),
                });
            }
            let comp = &mut components[label_of_root[root]];
            comp.area += 1;
            comp.bbox[0] = comp.bbox[0].min(x);
            comp.bbox[1] = comp.bbox[1].min(y);
            comp.bbox[2] = comp.bbox[2].max(x);
            comp.bbox[3] = comp.bbox[3].max(y);

            let on_boundary = x == 0
                || y == 0
                || x + 1 == width
                || y + 1 == height
                || data[idx - 1] != value
                || data[idx + 1] != value
                || data[idx - width] != value
                || data[idx + width] != value;
            if on_boundary {
                comp.boundary.push([x, y]);
            }
        }
    }

    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensfix_image::{ImageError, ImageSize};

    #[test]
    fn diagonal_neighbours_are_separate() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let image = Image::<u8, 1>::new(
            ImageSize { width: 4, height: 4 },
            vec![
                0, 0, 9, 9,
                0, 0, 9, 9,
                9, 9, 0, 0,
                9, 9, 0, 0,
            ],
        )?;

        let components = connected_components(&image, 0);
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].area, 4);
        assert_eq!(components[0].bbox, [0, 0, 1, 1]);
        assert_eq!(components[1].bbox, [2, 2, 3, 3]);
        assert!(components[1].touches_border(4, 4));
        Ok(())
    }

    #[test]
    fn boundary_excludes_interior() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 5,
            height: 5,
        };
        let mut image = Image::<u8, 1>::from_size_val(size, 255)?;
        for y in 1..4 {
            for x in 1..4 {
                image.set_pixel(x, y, 0, 0)?;
            }
        }

        let components = connected_components(&image, 0);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].area, 9);
        assert_eq!(components[0].boundary.len(), 8);
        assert!(!components[0].boundary.contains(&[2, 2]));
        assert!(!components[0].touches_border(5, 5));
        Ok(())
    }
}
