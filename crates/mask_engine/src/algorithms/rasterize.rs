use std::collections::BTreeSet;

use geo_types::Coord;
use image::{GrayImage, Luma, RgbImage};

use crate::{
    codec::fuse,
    types::{ContourType, DensePolygon, Extrema, FillMode, FusedId, InstanceId, BACKGROUND},
};

/// Ray-casting point-in-polygon test. An edge counts for a horizontal ray
/// when exactly one of its endpoints lies strictly below the ray, so a point
/// on a shared edge is never counted twice.
pub fn is_inside(x: f64, y: f64, polygon: &[Coord<i32>]) -> bool {
    let mut inside = false;
    let Some(last) = polygon.len().checked_sub(1) else {
        return false;
    };
    let mut j = last;
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].x as f64, polygon[i].y as f64);
        let (xj, yj) = (polygon[j].x as f64, polygon[j].y as f64);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Linear indices of the pixels whose centre lies inside `polygon`, in
/// row-major order. Only the polygon's bounding box is scanned.
pub fn covered_pixels(polygon: &[Coord<i32>], width: u32, height: u32) -> Vec<usize> {
    let Some((x0, y0, x1, y1)) = Extrema::of_points(polygon).and_then(|e| e.clamp_to(width, height))
    else {
        return Vec::new();
    };
    let mut pixels = Vec::new();
    for y in y0..=y1 {
        for x in x0..=x1 {
            if is_inside(x as f64 + 0.5, y as f64 + 0.5, polygon) {
                pixels.push(y as usize * width as usize + x as usize);
            }
        }
    }
    pixels
}

pub(crate) fn read_id(raster: &RgbImage, idx: usize) -> InstanceId {
    let raw = raster.as_raw();
    [raw[idx * 3], raw[idx * 3 + 1], raw[idx * 3 + 2]]
}

pub(crate) fn write_id(raster: &mut RgbImage, idx: usize, id: InstanceId) {
    let raw: &mut [u8] = raster;
    raw[idx * 3..idx * 3 + 3].copy_from_slice(&id);
}

/// Pixels covered by `outline` and by none of `holes`, in row-major order.
///
/// With a blob's external contour and its internal contours this is exactly
/// the blob: same-id islands sitting in its holes are left out.
pub fn region_pixels(outline: &[Coord<i32>], holes: &[Vec<Coord<i32>>], width: u32, height: u32) -> Vec<usize> {
    let w = width as usize;
    covered_pixels(outline, width, height)
        .into_iter()
        .filter(|&idx| {
            let (x, y) = ((idx % w) as f64 + 0.5, (idx / w) as f64 + 0.5);
            !holes.iter().any(|hole| is_inside(x, y, hole))
        })
        .collect()
}

/// Paint (`Add`) or erase (`Remove`) the pixels covered by `polygon`.
///
/// `Add` writes `target`; `Remove` resets the covered pixels that currently
/// hold `target` to background. Pixels whose current id is locked are never
/// touched, and a locked `target` makes the whole call a no-op. Returns the
/// pixels that actually changed with the id each one held before.
pub fn update_by_polygon(
    raster: &mut RgbImage,
    polygon: &[Coord<i32>],
    target: InstanceId,
    mode: FillMode,
    locked: &BTreeSet<FusedId>,
) -> Vec<(usize, InstanceId)> {
    let (width, height) = raster.dimensions();
    update_pixels(raster, &covered_pixels(polygon, width, height), target, mode, locked)
}

/// [`update_by_polygon`] over an explicit list of pixel indices.
pub fn update_pixels(
    raster: &mut RgbImage,
    pixels: &[usize],
    target: InstanceId,
    mode: FillMode,
    locked: &BTreeSet<FusedId>,
) -> Vec<(usize, InstanceId)> {
    if locked.contains(&fuse(target)) {
        return Vec::new();
    }
    let mut changed = Vec::new();
    for &idx in pixels {
        let current = read_id(raster, idx);
        if locked.contains(&fuse(current)) {
            continue;
        }
        let next = match mode {
            FillMode::Add => target,
            FillMode::Remove if current == target => BACKGROUND,
            FillMode::Remove => continue,
        };
        if next != current {
            write_id(raster, idx, next);
            changed.push((idx, current));
        }
    }
    changed
}

/// Build a `width` x `height` mask from dense polygons.
///
/// Polygons are applied in list order: pixels covered by an external polygon
/// take `inside`, pixels covered by an internal polygon take `outside`. With
/// the blob-ordered lists produced by the store this leaves holes at
/// `outside` and islands inside holes at `inside`.
pub fn fill_region(
    polygons: &[DensePolygon],
    width: u32,
    height: u32,
    inside: u8,
    outside: u8,
) -> GrayImage {
    let mut mask = GrayImage::from_pixel(width, height, Luma([outside]));
    let raw: &mut [u8] = &mut mask;
    for polygon in polygons {
        let value = match polygon.kind {
            ContourType::External => inside,
            ContourType::Internal => outside,
        };
        for idx in covered_pixels(&polygon.data, width, height) {
            raw[idx] = value;
        }
    }
    mask
}
