use geo_types::{Coord, CoordNum, LineString};

use crate::traits::Simplifier;

fn sq_dist<T: CoordNum + Into<f64>>(p1: Coord<T>, p2: Coord<T>) -> f64 {
    let dx = p1.x.into() - p2.x.into();
    let dy = p1.y.into() - p2.y.into();
    dx * dx + dy * dy
}

/// Squared distance from `p` to the segment `a`-`b`.
fn sq_seg_dist<T: CoordNum + Into<f64>>(p: Coord<T>, a: Coord<T>, b: Coord<T>) -> f64 {
    let (px, py) = (p.x.into(), p.y.into());
    let (mut x, mut y) = (a.x.into(), a.y.into());
    let dx = b.x.into() - x;
    let dy = b.y.into() - y;
    if dx != 0.0 || dy != 0.0 {
        let t = ((px - x) * dx + (py - y) * dy) / (dx * dx + dy * dy);
        if t > 1.0 {
            x = b.x.into();
            y = b.y.into();
        } else if t > 0.0 {
            x += dx * t;
            y += dy * t;
        }
    }
    let (dx, dy) = (px - x, py - y);
    dx * dx + dy * dy
}

/// Drop points closer than the tolerance to the last kept one.
fn simplify_radial_dist<T: CoordNum + Into<f64>>(points: &[Coord<T>], sq_tolerance: f64) -> Vec<Coord<T>> {
    let last = points.len() - 1;
    let mut prev = 0;
    let mut kept = vec![points[0]];
    for i in 1..=last {
        if sq_dist(points[i], points[prev]) > sq_tolerance {
            kept.push(points[i]);
            prev = i;
        }
    }
    // the last point is kept by position, even when it repeats the previous one
    if prev != last {
        kept.push(points[last]);
    }
    kept
}

fn simplify_dp_step<T: CoordNum + Into<f64>>(
    points: &[Coord<T>],
    first: usize,
    last: usize,
    sq_tolerance: f64,
    out: &mut Vec<Coord<T>>,
) {
    let mut max_sq_dist = sq_tolerance;
    let mut index = None;
    for i in first + 1..last {
        let d = sq_seg_dist(points[i], points[first], points[last]);
        if d > max_sq_dist {
            index = Some(i);
            max_sq_dist = d;
        }
    }
    if let Some(index) = index {
        if index - first > 1 {
            simplify_dp_step(points, first, index, sq_tolerance, out);
        }
        out.push(points[index]);
        if last - index > 1 {
            simplify_dp_step(points, index, last, sq_tolerance, out);
        }
    }
}

fn simplify_douglas_peucker<T: CoordNum + Into<f64>>(points: &[Coord<T>], sq_tolerance: f64) -> Vec<Coord<T>> {
    let last = points.len() - 1;
    let mut out = vec![points[0]];
    simplify_dp_step(points, 0, last, sq_tolerance, &mut out);
    out.push(points[last]);
    out
}

/// Radial-distance prefilter followed by Douglas-Peucker.
///
/// `highest_quality` skips the prefilter. Chains of two points or fewer are
/// returned as is.
pub fn simplify<T: CoordNum + Into<f64>>(points: &[Coord<T>], tolerance: f64, highest_quality: bool) -> Vec<Coord<T>> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let sq_tolerance = tolerance * tolerance;
    let points = if highest_quality {
        points.to_vec()
    } else {
        simplify_radial_dist(points, sq_tolerance)
    };
    simplify_douglas_peucker(&points, sq_tolerance)
}

/// Radial prefilter + Douglas-Peucker on integer pixel corners
#[derive(Debug, Clone, Default)]
pub struct RadialDouglasPeucker {
    pub highest_quality: bool,
}

impl Simplifier for RadialDouglasPeucker {
    fn simplify(&self, points: &[Coord<i32>], tolerance: f64) -> Vec<Coord<i32>> {
        simplify(points, tolerance, self.highest_quality)
    }
}

/// Douglas-Peucker simplifier using geo crate's implementation
#[derive(Debug, Clone, Default)]
pub struct GeoDouglasPeucker;

impl Simplifier for GeoDouglasPeucker {
    fn simplify(&self, points: &[Coord<i32>], tolerance: f64) -> Vec<Coord<i32>> {
        use geo::Simplify;

        let line: LineString<f64> = points
            .iter()
            .map(|c| Coord { x: c.x as f64, y: c.y as f64 })
            .collect();
        line.simplify(&tolerance)
            .coords()
            .map(|c| Coord { x: c.x.round() as i32, y: c.y.round() as i32 })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(points: &[(i32, i32)]) -> Vec<Coord<i32>> {
        points.iter().map(|&(x, y)| Coord { x, y }).collect()
    }

    fn square_contour() -> Vec<Coord<i32>> {
        pts(&[
            (4, 2), (5, 2), (6, 2), (6, 3), (6, 4), (6, 5), (6, 6), (5, 6),
            (4, 6), (3, 6), (2, 6), (2, 5), (2, 4), (2, 3), (2, 2), (3, 2),
        ])
    }

    #[test]
    fn test_short_chains_are_untouched() {
        let two = pts(&[(0, 0), (10, 10)]);
        assert_eq!(simplify(&two, 5.0, false), two);
        assert!(simplify::<i32>(&[], 5.0, false).is_empty());
    }

    #[test]
    fn test_straight_line_collapses_to_endpoints() {
        let line: Vec<Coord<i32>> = (0..20).map(|i| Coord { x: i, y: 2 * i }).collect();
        assert_eq!(simplify(&line, 0.5, true), pts(&[(0, 0), (19, 38)]));
        assert_eq!(simplify(&line, 0.5, false), pts(&[(0, 0), (19, 38)]));
    }

    #[test]
    fn test_square_contour_keeps_its_corners() {
        assert_eq!(
            simplify(&square_contour(), 1.0, false),
            pts(&[(4, 2), (6, 2), (6, 6), (2, 6), (3, 2)])
        );
    }

    #[test]
    fn test_radial_pass_keeps_dropped_last_point() {
        // the trailing (5, 0) is within tolerance of the kept (5, 0)
        let chain = pts(&[(0, 0), (5, 0), (5, 0)]);
        assert_eq!(simplify_radial_dist(&chain, 1.0), chain);

        let closing = pts(&[(0, 0), (4, 0), (4, 4), (0, 1)]);
        assert_eq!(simplify_radial_dist(&closing, 4.0), closing);
        assert_eq!(simplify_radial_dist(&closing, 100.0), pts(&[(0, 0), (0, 1)]));
    }

    #[test]
    fn test_larger_tolerance_never_adds_points() {
        let contour = square_contour();
        let mut previous = contour.len();
        for tolerance in [0.0, 0.5, 1.0, 2.0, 4.0] {
            let simplified = simplify(&contour, tolerance, false);
            assert!(simplified.len() <= previous);
            assert_eq!(simplified.first(), contour.first());
            assert_eq!(simplified.last(), contour.last());
            previous = simplified.len();
        }
    }

    #[test]
    fn test_simplifiers_stay_on_the_outline() {
        let contour = square_contour();
        let simplifiers: Vec<Box<dyn Simplifier>> = vec![
            Box::new(RadialDouglasPeucker::default()),
            Box::new(RadialDouglasPeucker { highest_quality: true }),
            Box::new(GeoDouglasPeucker),
        ];
        for simplifier in simplifiers {
            let simplified = simplifier.simplify(&contour, 1.0);
            assert!(simplified.len() <= 8);
            assert!(simplified.len() >= 3);
            for p in simplified {
                assert!(contour.contains(&p));
            }
        }
    }
}
