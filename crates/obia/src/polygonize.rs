//! Label image to polygons along pixel edges.
//!
//! Every boundary edge of a label is traced with the label on its right
//! (in row-down pixel space). Exterior rings come out with a positive
//! shoelace sum, holes with a negative one. At vertices where a label only
//! touches itself diagonally the tracer turns right first, so diagonal
//! neighbours never end up in the same ring.

use std::collections::HashMap;

use geo::{Contains, Coord, LineString, Polygon};

use crate::slic::LabelImage;

/// Outside-the-image neighbour label.
const OUTSIDE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Dir {
    East,
    South,
    West,
    North,
}

impl Dir {
    fn step(self) -> (i64, i64) {
        match self {
            Dir::East => (1, 0),
            Dir::South => (0, 1),
            Dir::West => (-1, 0),
            Dir::North => (0, -1),
        }
    }

    fn right(self) -> Dir {
        match self {
            Dir::East => Dir::South,
            Dir::South => Dir::West,
            Dir::West => Dir::North,
            Dir::North => Dir::East,
        }
    }

    fn left(self) -> Dir {
        self.right().right().right()
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    start: (i64, i64),
    dir: Dir,
    /// Label on the left-hand side.
    outside: u32,
}

impl Edge {
    fn end(&self) -> (i64, i64) {
        let (dx, dy) = self.dir.step();
        (self.start.0 + dx, self.start.1 + dy)
    }
}

/// Polygon of one label in pixel coordinates (x = column, y = row).
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPolygon {
    pub label: u32,
    pub polygon: Polygon<f64>,
}

fn boundary_edges(img: &LabelImage) -> Vec<Vec<Edge>> {
    let mut per_label: Vec<Vec<Edge>> = vec![Vec::new(); img.count as usize + 1];
    let (w, h) = (img.width as i64, img.height as i64);
    let at = |c: i64, r: i64| {
        if c < 0 || r < 0 || c >= w || r >= h {
            OUTSIDE
        } else {
            img.labels[(r * w + c) as usize]
        }
    };

    for r in 0..h {
        for c in 0..w {
            let label = at(c, r);
            let edges = &mut per_label[label as usize];
            let mut push = |start, dir, outside: u32| {
                if outside != label {
                    edges.push(Edge { start, dir, outside });
                }
            };
            push((c, r), Dir::East, at(c, r - 1));
            push((c + 1, r), Dir::South, at(c + 1, r));
            push((c + 1, r + 1), Dir::West, at(c, r + 1));
            push((c, r + 1), Dir::North, at(c - 1, r));
        }
    }
    per_label
}

/// Close rings out of one label's edges. Each returned ring is the list of
/// corner vertices without the closing repeat.
fn trace_rings(edges: &[Edge]) -> Vec<Vec<(i64, i64)>> {
    let mut by_start: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, e) in edges.iter().enumerate() {
        by_start.entry(e.start).or_default().push(i);
    }
    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let mut chain = vec![first];
        let mut current = first;

        loop {
            let here = edges[current].end();
            let dir = edges[current].dir;
            let candidates = by_start.get(&here).map(Vec::as_slice).unwrap_or(&[]);
            let next = [dir.right(), dir, dir.left()].into_iter().find_map(|want| {
                candidates
                    .iter()
                    .copied()
                    .find(|&i| edges[i].dir == want && (!used[i] || i == first))
            });
            match next {
                Some(i) if i == first => break,
                Some(i) => {
                    used[i] = true;
                    chain.push(i);
                    current = i;
                }
                // Unreachable for edges derived from a full label grid.
                None => break,
            }
        }

        let n = chain.len();
        let ring: Vec<(i64, i64)> = (0..n)
            .filter_map(|k| {
                let prev = &edges[chain[(k + n - 1) % n]];
                let e = &edges[chain[k]];
                (prev.dir != e.dir || prev.outside != e.outside).then_some(e.start)
            })
            .collect();
        rings.push(ring);
    }
    rings
}

fn shoelace(ring: &[(i64, i64)]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum()
}

fn to_line_string(ring: &[(i64, i64)]) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ring.iter().map(|&(x, y)| Coord { x: x as f64, y: y as f64 }).collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::new(coords)
}

fn assemble(label: u32, rings: Vec<Vec<(i64, i64)>>) -> Vec<LabelPolygon> {
    let (mut exteriors, mut holes): (Vec<_>, Vec<_>) = rings.into_iter().partition(|r| shoelace(r) > 0);
    exteriors.sort_by_key(|r| shoelace(r));

    let mut shells: Vec<(Polygon<f64>, Vec<LineString<f64>>)> = exteriors
        .iter()
        .map(|r| (Polygon::new(to_line_string(r), vec![]), Vec::new()))
        .collect();

    for hole in holes.drain(..) {
        // midpoint of the first hole edge lies strictly inside its shell
        let (a, b) = (hole[0], hole[1 % hole.len()]);
        let probe = Coord { x: (a.0 + b.0) as f64 / 2.0, y: (a.1 + b.1) as f64 / 2.0 };
        if let Some((_, inner)) = shells.iter_mut().find(|(shell, _)| shell.contains(&probe)) {
            inner.push(to_line_string(&hole));
        }
    }

    shells
        .into_iter()
        .map(|(shell, inner)| LabelPolygon { label, polygon: Polygon::new(shell.exterior().clone(), inner) })
        .collect()
}

/// Polygons for every label, ordered by label.
pub fn polygonize(img: &LabelImage) -> Vec<LabelPolygon> {
    boundary_edges(img)
        .into_iter()
        .enumerate()
        .skip(1)
        .flat_map(|(label, edges)| assemble(label as u32, trace_rings(&edges)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    fn image(width: usize, height: usize, labels: Vec<u32>) -> LabelImage {
        let count = labels.iter().copied().max().unwrap_or(0);
        LabelImage { width, height, labels, count }
    }

    #[test]
    fn single_label_is_image_rectangle() {
        let polys = polygonize(&image(3, 2, vec![1; 6]));
        assert_eq!(polys.len(), 1);
        let p = &polys[0].polygon;
        assert_eq!(p.exterior().0.len(), 5);
        assert_eq!(p.unsigned_area(), 6.0);
        assert!(p.interiors().is_empty());
    }

    #[test]
    fn shared_boundary_keeps_junction_vertices() {
        // left column label 1, right two columns label 2
        let polys = polygonize(&image(3, 2, vec![1, 2, 2, 1, 2, 2]));
        assert_eq!(polys.len(), 2);
        assert_eq!(polys[0].polygon.unsigned_area(), 2.0);
        assert_eq!(polys[1].polygon.unsigned_area(), 4.0);
    }

    #[test]
    fn enclosed_label_becomes_hole() {
        #[rustfmt::skip]
        let labels = vec![
            1, 1, 1,
            1, 2, 1,
            1, 1, 1,
        ];
        let polys = polygonize(&image(3, 3, labels));
        let outer = polys.iter().find(|p| p.label == 1).unwrap();
        assert_eq!(outer.polygon.interiors().len(), 1);
        assert_eq!(outer.polygon.unsigned_area(), 8.0);
        let inner = polys.iter().find(|p| p.label == 2).unwrap();
        assert_eq!(inner.polygon.unsigned_area(), 1.0);
    }

    #[test]
    fn diagonal_touch_splits_rings() {
        #[rustfmt::skip]
        let labels = vec![
            1, 2,
            2, 1,
        ];
        let polys = polygonize(&image(2, 2, labels));
        assert_eq!(polys.iter().filter(|p| p.label == 1).count(), 2);
        assert_eq!(polys.iter().filter(|p| p.label == 2).count(), 2);
        assert!(polys.iter().all(|p| p.polygon.unsigned_area() == 1.0));
    }

    #[test]
    fn l_shape_area() {
        #[rustfmt::skip]
        let labels = vec![
            1, 2,
            1, 1,
        ];
        let polys = polygonize(&image(2, 2, labels));
        let l = polys.iter().find(|p| p.label == 1).unwrap();
        assert_eq!(l.polygon.unsigned_area(), 3.0);
        assert_eq!(l.polygon.exterior().0.len(), 7);
    }
}
