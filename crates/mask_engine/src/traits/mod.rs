use geo_types::Coord;

/// Trait for contour simplification algorithms
pub trait Simplifier: Send + Sync {
    /// Reduce the vertex count of an open or closed point chain. The first
    /// and last points are always kept.
    fn simplify(&self, points: &[Coord<i32>], tolerance: f64) -> Vec<Coord<i32>>;
}
