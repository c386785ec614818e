use std::collections::BTreeMap;

use geo_types::{Coord, LineString, Polygon};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use ts_rs::TS;

/// Pixel id as stored in the raster: `[id1, id2, class]`.
pub type InstanceId = [u8; 3];

/// Single-integer form of an [`InstanceId`], see [`crate::codec::fuse`].
pub type FusedId = u32;

/// Id of unassigned pixels.
pub const BACKGROUND: InstanceId = [0, 0, 0];

/// Display tint of locked instances.
pub const LOCKED_COLOR: [u8; 3] = [200, 200, 200];

/// Alpha of every non-black display pixel.
pub const MASK_ALPHA_VALUE: u8 = 255;

/// Palette used in instance visualisation mode.
pub const DISTINCT_COLORS: [[u8; 3]; 20] = [
    [230, 25, 75],   // red-pink
    [60, 180, 75],   // green
    [255, 225, 25],  // yellow
    [0, 130, 200],   // blue
    [245, 130, 48],  // orange
    [145, 30, 180],  // purple
    [70, 240, 240],  // cyan
    [240, 50, 230],  // pink-purple
    [210, 245, 60],  // yellow-green
    [250, 190, 190], // light pink
    [0, 128, 128],   // blue green
    [230, 190, 255], // light purple
    [170, 110, 40],  // brown
    [255, 250, 200], // light yellow green
    [128, 0, 0],     // dark red
    [170, 255, 195], // green fluo
    [128, 128, 0],   // dark green-brown
    [255, 215, 180], // beige
    [0, 0, 128],     // dark blue
    [128, 128, 128], // grey
];

/// Whether a contour bounds a blob from outside or bounds one of its holes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize, JsonSchema, TS,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContourType {
    External,
    Internal,
}

/// A traced blob boundary, as linear indices into the `(width + 1)`-wide
/// grid of pixel corners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour {
    pub kind: ContourType,
    pub points: Vec<usize>,
}

/// One connected region of pixels sharing the searched id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// Number of pixels in the region
    pub nb_pixels: usize,
    /// External contour first, then one internal contour per hole
    pub contours: Vec<Contour>,
}

impl Blob {
    pub fn external(&self) -> Option<&Contour> {
        self.contours.iter().find(|c| c.kind == ContourType::External)
    }

    pub fn holes(&self) -> impl Iterator<Item = &Contour> {
        self.contours.iter().filter(|c| c.kind == ContourType::Internal)
    }

    pub fn has_holes(&self) -> bool {
        self.holes().next().is_some()
    }
}

/// A contour expressed as `(x, y)` pixel-corner coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensePolygon {
    pub kind: ContourType,
    pub data: Vec<Coord<i32>>,
}

impl DensePolygon {
    pub fn new(kind: ContourType, data: Vec<Coord<i32>>) -> Self {
        Self { kind, data }
    }

    /// Convert to a geo-types polygon for geometric operations
    pub fn to_geo_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self
            .data
            .iter()
            .map(|c| Coord { x: c.x as f64, y: c.y as f64 })
            .collect();
        Polygon::new(LineString::new(coords), vec![])
    }

    /// Enclosed area. For traced contours this is the exact pixel count of
    /// the enclosed region since every edge runs along pixel borders.
    pub fn area(&self) -> f64 {
        use geo::Area;
        self.to_geo_polygon().unsigned_area()
    }

    pub fn extrema(&self) -> Option<Extrema> {
        Extrema::of_points(&self.data)
    }
}

/// Axis-aligned box `[x_min, y_min, x_max, y_max]`, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Extrema {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl Extrema {
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    /// Minimal box around a point list, `None` when the list is empty.
    pub fn of_points(points: &[Coord<i32>]) -> Option<Self> {
        use geo::BoundingRect;
        let rect = LineString::new(points.to_vec()).bounding_rect()?;
        Some(Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    pub fn of_dense_polygons(polygons: &[DensePolygon]) -> Option<Self> {
        polygons
            .iter()
            .filter_map(DensePolygon::extrema)
            .reduce(|a, b| a.union(&b))
    }

    pub fn union(&self, other: &Extrema) -> Extrema {
        Extrema {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Intersect with a `width` x `height` raster, returning inclusive pixel
    /// ranges `(x0, y0, x1, y1)` or `None` if nothing overlaps.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let x0 = self.x_min.max(0) as i64;
        let y0 = self.y_min.max(0) as i64;
        let x1 = (self.x_max as i64).min(width as i64 - 1);
        let y1 = (self.y_max as i64).min(height as i64 - 1);
        if x0 > x1 || y0 > y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

/// Polygon edit direction.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema, TS,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FillMode {
    #[default]
    Add,
    Remove,
}

/// How an externally built mask is merged into the raster.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema, TS,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FillType {
    /// Instance footprint OR mask
    #[default]
    Unite,
    /// Instance footprint becomes exactly the mask
    Replace,
    /// Instance footprint AND NOT mask
    Subtract,
    /// Instance footprint AND mask
    Intersect,
}

/// Display colouring scheme.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaskVisuMode {
    /// One colour per class
    Semantic,
    /// One colour per instance
    #[default]
    Instance,
}

/// Display colour and instance policy of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClassStyle {
    pub color: [u8; 3],
    /// Each created shape gets its own instance id when set, otherwise all
    /// shapes of the class share `[0, 0, class]`.
    pub multi_instance: bool,
}

impl ClassStyle {
    pub fn new(color: [u8; 3], multi_instance: bool) -> Self {
        Self { color, multi_instance }
    }
}

pub type ClassMap = BTreeMap<u8, ClassStyle>;

/// Class map used when the host does not provide one.
pub fn default_class_map() -> ClassMap {
    BTreeMap::from([
        (0, ClassStyle::new([0, 0, 0], false)),
        (1, ClassStyle::new([255, 0, 0], false)),
        (2, ClassStyle::new([0, 255, 0], true)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Coord<i32>> {
        vec![
            Coord { x: x0, y: y0 },
            Coord { x: x1, y: y0 },
            Coord { x: x1, y: y1 },
            Coord { x: x0, y: y1 },
        ]
    }

    #[test]
    fn test_extrema_of_points_is_minimal_box() {
        let extrema = Extrema::of_points(&square(3, 4, 9, 7)).expect("non-empty");
        assert_eq!(extrema, Extrema::new(3, 4, 9, 7));
        assert!(Extrema::of_points(&[]).is_none());
    }

    #[test]
    fn test_extrema_union_and_clamp() {
        let a = Extrema::new(-5, 2, 4, 4);
        let b = Extrema::new(1, -1, 20, 3);
        let u = a.union(&b);
        assert_eq!(u, Extrema::new(-5, -1, 20, 4));
        assert_eq!(u.clamp_to(10, 10), Some((0, 0, 9, 4)));
        assert_eq!(Extrema::new(12, 12, 15, 15).clamp_to(10, 10), None);
    }

    #[test]
    fn test_dense_polygon_area_counts_pixels() {
        let poly = DensePolygon::new(ContourType::Internal, square(2, 2, 5, 4));
        assert_eq!(poly.area(), 6.0);
    }

    #[test]
    fn test_extrema_of_dense_polygons() {
        let polys = vec![
            DensePolygon::new(ContourType::External, square(0, 0, 3, 3)),
            DensePolygon::new(ContourType::External, square(5, 1, 8, 9)),
        ];
        assert_eq!(Extrema::of_dense_polygons(&polys), Some(Extrema::new(0, 0, 8, 9)));
        assert_eq!(Extrema::of_dense_polygons(&[]), None);
    }

    #[test]
    fn test_enum_names() {
        assert_eq!(FillType::Subtract.to_string(), "subtract");
        assert_eq!("intersect".parse::<FillType>().expect("known name"), FillType::Intersect);
        assert_eq!(serde_json::to_string(&ContourType::Internal).expect("serializable"), "\"internal\"");
    }
}
