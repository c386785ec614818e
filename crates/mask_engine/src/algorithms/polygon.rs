use geo_types::Coord;

use crate::types::{ContourType, DensePolygon};

/// True iff segment `(a,b)->(c,d)` crosses segment `(p,q)->(r,s)` strictly
/// inside both. Parallel segments never intersect.
#[allow(clippy::too_many_arguments)]
pub fn intersects(a: f64, b: f64, c: f64, d: f64, p: f64, q: f64, r: f64, s: f64) -> bool {
    let det = (c - a) * (s - q) - (r - p) * (d - b);
    if det == 0.0 {
        return false;
    }
    let lambda = ((s - q) * (r - a) + (p - r) * (s - b)) / det;
    let gamma = ((b - d) * (r - a) + (c - a) * (s - b)) / det;
    (0.0 < lambda && lambda < 1.0) && (0.0 < gamma && gamma < 1.0)
}

/// Check that a closed polygon given as flat `[x0, y0, x1, y1, ...]` does
/// not self-intersect. Every pair of edges is tested except an edge with
/// itself and edges sharing a vertex.
pub fn is_valid(flat_vertices: &[f64]) -> bool {
    let vertices: Vec<&[f64]> = flat_vertices.chunks_exact(2).collect();
    let n = vertices.len();
    for (idx, v) in vertices.iter().enumerate() {
        let next_idx = (idx + 1) % n;
        for (idx2, v2) in vertices.iter().enumerate() {
            if idx2 == idx {
                continue;
            }
            let next_idx2 = (idx2 + 1) % n;
            if idx2 == next_idx || next_idx2 == idx {
                continue;
            }
            let (w, w2) = (vertices[next_idx], vertices[next_idx2]);
            if intersects(v[0], v[1], w[0], w[1], v2[0], v2[1], w2[0], w2[1]) {
                return false;
            }
        }
    }
    true
}

/// Bresenham line from `p1` to `p2`, both ends included.
pub fn straight_line(p1: Coord<i32>, p2: Coord<i32>) -> Vec<Coord<i32>> {
    let (mut x, mut y) = (p1.x, p1.y);
    let dx = (p2.x - x).abs();
    let dy = (p2.y - y).abs();
    let sx = if x < p2.x { 1 } else { -1 };
    let sy = if y < p2.y { 1 } else { -1 };
    let mut err = dx - dy;
    let mut line = vec![Coord { x, y }];
    while x != p2.x || y != p2.y {
        let e2 = err << 1;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
        line.push(Coord { x, y });
    }
    line
}

/// Every border pixel of a closed polygon, each vertex appearing once.
pub fn densify_polygon(vertices: &[Coord<i32>], kind: ContourType) -> DensePolygon {
    let mut data = Vec::new();
    for (i, &p1) in vertices.iter().enumerate() {
        let p2 = vertices[(i + 1) % vertices.len()];
        let line = straight_line(p1, p2);
        data.extend_from_slice(&line[..line.len() - 1]);
    }
    DensePolygon::new(kind, data)
}

/// Orientation in image space (y pointing down).
pub fn is_clockwise(vertices: &[Coord<i32>]) -> bool {
    let mut sum = 0i64;
    for (i, p1) in vertices.iter().enumerate() {
        let p2 = vertices[(i + 1) % vertices.len()];
        sum += (p2.x - p1.x) as i64 * (p2.y + p1.y) as i64;
    }
    sum < 0
}
