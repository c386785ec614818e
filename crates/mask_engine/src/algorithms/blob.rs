//! Connected-component extraction by contour tracing.
//!
//! A single raster scan labels 4-connected regions of one id. The first
//! pixel of a region starts an external trace around it; the first pixel
//! above an unvisited background pocket starts an internal trace around the
//! hole. Traces follow the region border with a left-hand rule and emit the
//! pixel corners they pass, so contours are closed rings on the
//! `(width + 1) x (height + 1)` corner grid.
//!
//! Work happens on a copy of the label plane padded by one pixel on every
//! side, which keeps neighbour lookups free of bound checks.

use std::collections::{BTreeMap, VecDeque};

use image::RgbImage;

use crate::types::{Blob, Contour, ContourType, Extrema, InstanceId};

const UNSET: i32 = -1;
const MARKED: i32 = -2;

#[derive(Debug, Clone, Copy)]
enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

use Corner::*;

/// Corners to emit when the trace turns from direction `from` to `to`.
/// Directions are 0 right, 2 down, 4 left, 6 up.
fn turn_corners(from: usize, to: usize) -> &'static [Corner] {
    match (from, to) {
        (0, 0) => &[TopRight],
        (0, 2) => &[TopRight, BottomRight],
        (0, 4) => &[TopRight, BottomRight, BottomLeft],
        (2, 2) => &[BottomRight],
        (2, 4) => &[BottomRight, BottomLeft],
        (2, 6) => &[BottomRight, BottomLeft, TopLeft],
        (4, 0) => &[BottomLeft, TopLeft, TopRight],
        (4, 4) => &[BottomLeft],
        (4, 6) => &[BottomLeft, TopLeft],
        (6, 0) => &[TopLeft, TopRight],
        (6, 2) => &[TopLeft, TopRight, BottomRight],
        (6, 6) => &[TopLeft],
        _ => &[],
    }
}

pub struct BlobExtractor<'a> {
    raster: &'a RgbImage,
    width: usize,
    height: usize,
    aug_w: usize,
    target: InstanceId,
    /// Neighbour offsets in the padded plane, clockwise from "right"
    offsets: [isize; 8],
    labels: Vec<i32>,
}

impl<'a> BlobExtractor<'a> {
    pub fn new(raster: &'a RgbImage, target: InstanceId) -> Self {
        let width = raster.width() as usize;
        let height = raster.height() as usize;
        let aug_w = width + 2;
        let w = aug_w as isize;
        Self {
            raster,
            width,
            height,
            aug_w,
            target,
            offsets: [1, w + 1, w, w - 1, -1, -w - 1, -w, -w + 1],
            labels: vec![UNSET; aug_w * (height + 2)],
        }
    }

    /// Label every blob of the target id. With a search box only blobs
    /// having at least one pixel inside it are returned, each complete.
    pub fn extract(mut self, search_box: Option<Extrema>) -> BTreeMap<usize, Blob> {
        let mut blobs = BTreeMap::new();
        let (scope, bounds) = match search_box {
            None if self.width == 0 || self.height == 0 => return blobs,
            None => (None, (1, 1, self.width, self.height)),
            Some(search_box) => match self.scope_for(search_box) {
                Some((scope, bounds)) => (Some(scope), bounds),
                None => return blobs,
            },
        };

        let (x0, y0, x1, y1) = bounds;
        let mut next_label = 0i32;
        for ay in y0..=y1 {
            for ax in x0..=x1 {
                let pos = ay * self.aug_w + ax;
                if !self.is_target(pos) || scope.as_ref().is_some_and(|s| !s[pos]) {
                    continue;
                }

                // first pixel of a new blob
                if !self.is_target(pos - self.aug_w) && self.labels[pos] == UNSET {
                    let label = next_label;
                    next_label += 1;
                    let (contour, added) = self.trace(pos, label, ContourType::External);
                    blobs.insert(
                        label as usize,
                        Blob { nb_pixels: added, contours: vec![contour] },
                    );
                }

                // pixel right above an unvisited hole
                let below = pos + self.aug_w;
                if !self.is_target(below) && self.labels[below] == UNSET {
                    let label = if self.labels[pos] != UNSET {
                        self.labels[pos]
                    } else {
                        self.labels[pos - 1]
                    };
                    if label >= 0 {
                        let (contour, added) = self.trace(pos, label, ContourType::Internal);
                        if let Some(blob) = blobs.get_mut(&(label as usize)) {
                            blob.contours.push(contour);
                            blob.nb_pixels += added;
                        }
                    }
                }

                // inner pixel, same blob as its left neighbour
                if self.labels[pos] == UNSET {
                    let label = self.labels[pos - 1].max(0);
                    self.labels[pos] = label;
                    if let Some(blob) = blobs.get_mut(&(label as usize)) {
                        blob.nb_pixels += 1;
                    }
                }
            }
        }
        tracing::trace!(id = ?self.target, blobs = blobs.len(), "extracted blobs");
        blobs
    }

    fn is_target(&self, pos: usize) -> bool {
        let ax = pos % self.aug_w;
        let ay = pos / self.aug_w;
        if ax == 0 || ay == 0 || ax > self.width || ay > self.height {
            return false;
        }
        let idx = ((ay - 1) * self.width + ax - 1) * 3;
        self.raster.as_raw()[idx..idx + 3] == self.target
    }

    /// Flood the target pixels inside `search_box` to their full components.
    /// Returns the membership plane and the padded-plane bounds to scan.
    fn scope_for(&self, search_box: Extrema) -> Option<(Vec<bool>, (usize, usize, usize, usize))> {
        let (bx0, by0, bx1, by1) = search_box.clamp_to(self.width as u32, self.height as u32)?;
        let mut scope = vec![false; self.labels.len()];
        let mut bounds = (usize::MAX, usize::MAX, 0, 0);
        let mut queue = VecDeque::new();
        let w = self.aug_w;
        for y in by0 as usize..=by1 as usize {
            for x in bx0 as usize..=bx1 as usize {
                let seed = (y + 1) * w + x + 1;
                if scope[seed] || !self.is_target(seed) {
                    continue;
                }
                scope[seed] = true;
                queue.push_back(seed);
                while let Some(pos) = queue.pop_front() {
                    let (ax, ay) = (pos % w, pos / w);
                    bounds = (bounds.0.min(ax), bounds.1.min(ay), bounds.2.max(ax), bounds.3.max(ay));
                    for n in [pos + 1, pos - 1, pos + w, pos - w] {
                        if !scope[n] && self.is_target(n) {
                            scope[n] = true;
                            queue.push_back(n);
                        }
                    }
                }
            }
        }
        if bounds.0 == usize::MAX {
            return None;
        }
        Some((scope, bounds))
    }

    fn assign(&mut self, pos: usize, label: i32) -> usize {
        let fresh = self.labels[pos] == UNSET;
        self.labels[pos] = label;
        usize::from(fresh)
    }

    /// Next border pixel of the region around `s`, probing the four axis
    /// directions clockwise from `p`. Probed background pixels are marked so
    /// they never start an internal trace.
    fn tracer(&mut self, s: usize, p: usize) -> Option<(usize, usize)> {
        for d in (0..8).step_by(2) {
            let q = (p + d) % 8;
            let t = (s as isize + self.offsets[q]) as usize;
            if self.is_target(t) {
                return Some((t, q));
            }
            self.labels[t] = MARKED;
        }
        None
    }

    fn corner(&self, pos: usize, corner: Corner) -> usize {
        let x = pos % self.aug_w - 1;
        let y = pos / self.aug_w - 1;
        let (cx, cy) = match corner {
            TopLeft => (x, y),
            TopRight => (x + 1, y),
            BottomLeft => (x, y + 1),
            BottomRight => (x + 1, y + 1),
        };
        cy * (self.width + 1) + cx
    }

    /// Follow one border starting at `start`. Returns the contour and the
    /// number of pixels labelled for the first time.
    fn trace(&mut self, start: usize, label: i32, kind: ContourType) -> (Contour, usize) {
        let mut points = Vec::new();
        let mut added = self.assign(start, label);
        let first_direction = match kind {
            ContourType::External => 0,
            ContourType::Internal => 2,
        };

        let Some((second, mut q)) = self.tracer(start, first_direction) else {
            // isolated pixel
            for corner in [TopLeft, TopRight, BottomRight, BottomLeft] {
                points.push(self.corner(start, corner));
            }
            return (Contour { kind, points }, added);
        };

        let mut next = second;
        loop {
            added += self.assign(next, label);
            let current = next;
            let Some((t, new_q)) = self.tracer(current, (q + 6) % 8) else {
                break;
            };
            for &corner in turn_corners(q, new_q) {
                points.push(self.corner(current, corner));
            }
            next = t;
            q = new_q;
            if current == start && next == second {
                break;
            }
        }
        (Contour { kind, points }, added)
    }
}

/// Blobs of `target` in `raster`, optionally limited to those touching
/// `search_box`.
pub fn extract(raster: &RgbImage, target: InstanceId, search_box: Option<Extrema>) -> BTreeMap<usize, Blob> {
    BlobExtractor::new(raster, target).extract(search_box)
}

/// Convert linear indices to `(x, y)` for a grid of the given row stride.
pub fn convert_index_to_dict(indexes: &[usize], stride: usize) -> Vec<geo_types::Coord<i32>> {
    indexes
        .iter()
        .map(|&idx| geo_types::Coord { x: (idx % stride) as i32, y: (idx / stride) as i32 })
        .collect()
}
