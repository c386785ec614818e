//! The mask store: one RGB raster of instance ids plus the state derived
//! from it.
//!
//! Every write goes through a store method so the display buffer, the set
//! of present ids and the per-class id counters stay in step with the
//! raster.

use std::collections::{BTreeMap, BTreeSet};

use geo_types::Coord;
use image::{GrayImage, Rgba, RgbaImage, RgbImage};

use crate::{
    algorithms::{blob, convert_index_to_dict, rasterize},
    codec::{fuse, unfuse},
    error::{MaskError, Result},
    types::{
        default_class_map, Blob, ClassMap, DensePolygon, Extrema, FillMode, FillType, FusedId,
        InstanceId, MaskVisuMode, BACKGROUND, DISTINCT_COLORS, LOCKED_COLOR, MASK_ALPHA_VALUE,
    },
};

#[derive(Debug, Clone)]
pub struct MaskStore {
    raster: RgbImage,
    display: RgbaImage,
    fused_ids: BTreeSet<FusedId>,
    /// Pixel count per present id, background excluded
    pixel_counts: BTreeMap<FusedId, usize>,
    locked: BTreeSet<FusedId>,
    cls_map: ClassMap,
    /// Last id handed out per class, as `id1 + 256 * id2`
    next_ids: BTreeMap<u8, u16>,
    visu_mode: MaskVisuMode,
}

impl MaskStore {
    pub fn new(width: u32, height: u32, cls_map: ClassMap) -> Self {
        Self {
            raster: RgbImage::new(width, height),
            display: RgbaImage::new(width, height),
            fused_ids: BTreeSet::new(),
            pixel_counts: BTreeMap::new(),
            locked: BTreeSet::new(),
            cls_map,
            next_ids: BTreeMap::new(),
            visu_mode: MaskVisuMode::default(),
        }
    }

    /// Background-only store with the default class map.
    pub fn empty(width: u32, height: u32) -> Self {
        Self::new(width, height, default_class_map())
    }

    /// Replace the raster, e.g. with a persisted one. Present ids, id counters
    /// and the display are rebuilt. Locks on ids that disappeared are dropped.
    pub fn set_value(&mut self, raster: RgbImage) {
        let (width, height) = raster.dimensions();
        self.raster = raster;
        self.display = RgbaImage::new(width, height);
        self.recount();
        self.locked.retain(|fused| self.fused_ids.contains(fused));
        let present: Vec<FusedId> = self.fused_ids.iter().copied().collect();
        for fused in present {
            self.bump_counter(unfuse(fused));
        }
        self.recompute_color();
        tracing::debug!(width, height, instances = self.fused_ids.len(), "loaded raster");
    }

    pub fn value(&self) -> &RgbImage {
        &self.raster
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// RGBA rendering of the raster.
    pub fn display(&self) -> &RgbaImage {
        &self.display
    }

    /// Ids currently present in the raster, background excluded.
    pub fn fused_ids(&self) -> &BTreeSet<FusedId> {
        &self.fused_ids
    }

    pub fn locked(&self) -> &BTreeSet<FusedId> {
        &self.locked
    }

    pub fn cls_map(&self) -> &ClassMap {
        &self.cls_map
    }

    pub fn set_cls_map(&mut self, cls_map: ClassMap) {
        self.cls_map = cls_map;
        self.recompute_color();
    }

    pub fn visu_mode(&self) -> MaskVisuMode {
        self.visu_mode
    }

    pub fn set_visu_mode(&mut self, mode: MaskVisuMode) {
        self.visu_mode = mode;
        self.recompute_color();
    }

    /// Id stored at a row-major pixel index.
    ///
    /// # Panics
    /// If `index` is outside the raster.
    pub fn pixel_id(&self, index: usize) -> InstanceId {
        let len = self.raster.width() as usize * self.raster.height() as usize;
        assert!(index < len, "pixel index {index} out of range for {len} pixels");
        rasterize::read_id(&self.raster, index)
    }

    /// A fresh `[id1, id2]` for `class`. Counters only grow, so an id is never
    /// handed out twice by the same store.
    pub fn get_next_id(&mut self, class: u8) -> Result<[u8; 2]> {
        let counter = self.next_ids.entry(class).or_insert(0);
        if *counter == u16::MAX {
            return Err(MaskError::IdSpaceExhausted(class));
        }
        *counter += 1;
        let v = *counter;
        Ok([(v % 256) as u8, (v / 256) as u8])
    }

    /// Paint or erase a pixel-space polygon. Returns the changed pixel indices.
    pub fn update_by_polygon(
        &mut self,
        vertices: &[Coord<i32>],
        id: InstanceId,
        mode: FillMode,
    ) -> Vec<usize> {
        let pixels = rasterize::covered_pixels(vertices, self.width(), self.height());
        self.update_pixels(&pixels, id, mode)
    }

    /// Paint or erase an explicit set of row-major pixel indices, with the
    /// same lock rules as [`Self::update_by_polygon`].
    ///
    /// # Panics
    /// If an index is outside the raster.
    pub fn update_pixels(&mut self, pixels: &[usize], id: InstanceId, mode: FillMode) -> Vec<usize> {
        let changed = rasterize::update_pixels(&mut self.raster, pixels, id, mode, &self.locked);
        if mode == FillMode::Add {
            self.bump_counter(id);
        }
        self.after_write(&changed);
        tracing::debug!(?id, ?mode, changed = changed.len(), "pixel update");
        changed.into_iter().map(|(idx, _)| idx).collect()
    }

    /// Merge a full-size binary mask (non-zero = inside) into the footprint of
    /// `id`. Locked pixels are skipped and a locked `id` is left untouched.
    pub fn update_value(&mut self, mask: &GrayImage, id: InstanceId, fill_type: FillType) -> Result<()> {
        let (width, height) = self.raster.dimensions();
        if mask.dimensions() != (width, height) {
            return Err(MaskError::SizeMismatch {
                expected_width: width,
                expected_height: height,
                width: mask.width(),
                height: mask.height(),
            });
        }
        if self.locked.contains(&fuse(id)) {
            tracing::debug!(?id, "update_value on locked instance ignored");
            return Ok(());
        }

        let mut changed = Vec::new();
        for (idx, m) in mask.as_raw().iter().enumerate() {
            let current = rasterize::read_id(&self.raster, idx);
            if self.locked.contains(&fuse(current)) {
                continue;
            }
            let in_mask = *m != 0;
            let owned = current == id;
            let next = match fill_type {
                FillType::Unite | FillType::Replace if in_mask && !owned => id,
                FillType::Replace | FillType::Intersect if !in_mask && owned => BACKGROUND,
                FillType::Subtract if in_mask && owned => BACKGROUND,
                _ => continue,
            };
            rasterize::write_id(&mut self.raster, idx, next);
            changed.push((idx, current));
        }
        if matches!(fill_type, FillType::Unite | FillType::Replace) {
            self.bump_counter(id);
        }
        self.after_write(&changed);
        tracing::debug!(?id, %fill_type, changed = changed.len(), "mask merge");
        Ok(())
    }

    /// Relabel every pixel of `prev` as `curr`. Returns the number of pixels
    /// changed; nothing happens when either id is locked.
    pub fn replace_value(&mut self, prev: InstanceId, curr: InstanceId) -> usize {
        if prev == curr || self.locked.contains(&fuse(prev)) || self.locked.contains(&fuse(curr)) {
            return 0;
        }
        let changed: Vec<(usize, InstanceId)> = self
            .raster
            .pixels()
            .enumerate()
            .filter(|(_, p)| p.0 == prev)
            .map(|(idx, _)| (idx, prev))
            .collect();
        for &(idx, _) in &changed {
            rasterize::write_id(&mut self.raster, idx, curr);
        }
        self.bump_counter(curr);
        self.after_write(&changed);
        changed.len()
    }

    /// Write `id` on the non-zero pixels of `mask` placed with its top-left
    /// corner at `(x0, y0)`. Parts falling outside the raster are clipped.
    pub fn paste_mask(&mut self, mask: &GrayImage, x0: i32, y0: i32, id: InstanceId) -> usize {
        if self.locked.contains(&fuse(id)) {
            return 0;
        }
        let (width, height) = (self.width() as i64, self.height() as i64);
        let mut changed = Vec::new();
        for (mx, my, m) in mask.enumerate_pixels() {
            let (x, y) = (x0 as i64 + mx as i64, y0 as i64 + my as i64);
            if m.0[0] == 0 || x < 0 || y < 0 || x >= width || y >= height {
                continue;
            }
            let idx = (y * width + x) as usize;
            let current = rasterize::read_id(&self.raster, idx);
            if current == id || self.locked.contains(&fuse(current)) {
                continue;
            }
            rasterize::write_id(&mut self.raster, idx, id);
            changed.push((idx, current));
        }
        self.bump_counter(id);
        self.after_write(&changed);
        changed.len()
    }

    pub fn pixel_count(&self, id: InstanceId) -> usize {
        if id == BACKGROUND {
            let total = self.width() as usize * self.height() as usize;
            return total - self.pixel_counts.values().sum::<usize>();
        }
        self.pixel_counts.get(&fuse(id)).copied().unwrap_or(0)
    }

    pub fn get_blobs(&self, id: InstanceId, extrema: Option<Extrema>) -> BTreeMap<usize, Blob> {
        blob::extract(&self.raster, id, extrema)
    }

    /// Blob contours of `id` as corner coordinates, blob by blob, each
    /// external contour followed by its holes.
    pub fn get_polygons(&self, id: InstanceId, extrema: Option<Extrema>) -> Vec<DensePolygon> {
        let stride = self.width() as usize + 1;
        self.get_blobs(id, extrema)
            .values()
            .flat_map(|b| b.contours.iter())
            .map(|c| DensePolygon::new(c.kind, convert_index_to_dict(&c.points, stride)))
            .collect()
    }

    pub fn is_locked(&self, id: InstanceId) -> bool {
        self.locked.contains(&fuse(id))
    }

    pub fn lock(&mut self, id: InstanceId) {
        if id != BACKGROUND && self.locked.insert(fuse(id)) {
            self.recompute_color();
        }
    }

    pub fn unlock(&mut self, id: InstanceId) {
        if self.locked.remove(&fuse(id)) {
            self.recompute_color();
        }
    }

    /// Flip the lock on `id` and return whether it is now locked.
    pub fn toggle_lock(&mut self, id: InstanceId) -> bool {
        if self.is_locked(id) {
            self.unlock(id);
            false
        } else {
            self.lock(id);
            self.is_locked(id)
        }
    }

    /// Display colour of one id, alpha included.
    pub fn pixel_to_color(&self, id: InstanceId) -> [u8; 4] {
        let class = id[2];
        let fused = fuse(id);
        let rgb = if class == 0 {
            [0, 0, 0]
        } else if self.locked.contains(&fused) {
            LOCKED_COLOR
        } else {
            match self.visu_mode {
                MaskVisuMode::Instance => DISTINCT_COLORS[fused as usize % DISTINCT_COLORS.len()],
                MaskVisuMode::Semantic => self.cls_map.get(&class).map_or([0, 0, 0], |s| s.color),
            }
        };
        let alpha = if rgb == [0, 0, 0] { 0 } else { MASK_ALPHA_VALUE };
        [rgb[0], rgb[1], rgb[2], alpha]
    }

    /// Rebuild the whole display buffer from the raster.
    pub fn recompute_color(&mut self) {
        let mut colors: BTreeMap<InstanceId, [u8; 4]> = BTreeMap::new();
        let rendered: Vec<[u8; 4]> = self
            .raster
            .pixels()
            .map(|p| *colors.entry(p.0).or_insert_with(|| self.pixel_to_color(p.0)))
            .collect();
        for (dst, color) in self.display.pixels_mut().zip(rendered) {
            *dst = Rgba(color);
        }
    }

    /// Repaint and recount the changed pixels, given with their previous id.
    fn after_write(&mut self, changed: &[(usize, InstanceId)]) {
        let width = self.width() as usize;
        for &(idx, prev) in changed {
            let next = rasterize::read_id(&self.raster, idx);
            self.count_change(fuse(prev), fuse(next));
            let color = self.pixel_to_color(next);
            self.display.put_pixel((idx % width) as u32, (idx / width) as u32, Rgba(color));
        }
    }

    fn count_change(&mut self, prev: FusedId, next: FusedId) {
        if prev == next {
            return;
        }
        if prev != 0 {
            let emptied = match self.pixel_counts.get_mut(&prev) {
                Some(count) => {
                    *count -= 1;
                    *count == 0
                }
                None => false,
            };
            if emptied {
                self.pixel_counts.remove(&prev);
                self.fused_ids.remove(&prev);
            }
        }
        if next != 0 {
            *self.pixel_counts.entry(next).or_insert(0) += 1;
            self.fused_ids.insert(next);
        }
    }

    /// Full rescan, only when the whole raster is replaced.
    fn recount(&mut self) {
        self.pixel_counts.clear();
        for p in self.raster.pixels() {
            let fused = fuse(p.0);
            if fused != 0 {
                *self.pixel_counts.entry(fused).or_insert(0) += 1;
            }
        }
        self.fused_ids = self.pixel_counts.keys().copied().collect();
    }

    fn bump_counter(&mut self, id: InstanceId) {
        if id == BACKGROUND {
            return;
        }
        let local = id[0] as u16 + 256 * id[1] as u16;
        let counter = self.next_ids.entry(id[2]).or_insert(0);
        *counter = (*counter).max(local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContourType;
    use image::{Luma, Rgb};

    fn pts(points: &[(i32, i32)]) -> Vec<Coord<i32>> {
        points.iter().map(|&(x, y)| Coord { x, y }).collect()
    }

    fn rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Coord<i32>> {
        pts(&[(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    #[test]
    fn test_polygon_round_trip() {
        let mut store = MaskStore::empty(10, 10);
        let changed = store.update_by_polygon(&rect(2, 2, 6, 6), [1, 0, 1], FillMode::Add);
        assert_eq!(changed.len(), 16);
        assert_eq!(store.fused_ids().iter().copied().collect::<Vec<_>>(), vec![fuse([1, 0, 1])]);
        assert_eq!(store.pixel_id(2 * 10 + 2), [1, 0, 1]);
        assert_eq!(store.pixel_id(0), BACKGROUND);

        let blobs = store.get_blobs([1, 0, 1], None);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[&0].nb_pixels, 16);

        let polygons = store.get_polygons([1, 0, 1], None);
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].kind, ContourType::External);
        assert_eq!(polygons[0].data.len(), 16);
        assert_eq!(polygons[0].extrema(), Some(Extrema::new(2, 2, 6, 6)));

        let simplified = crate::algorithms::simplify(&polygons[0].data, 1.0, false);
        assert!(simplified.len() <= 8);
    }

    #[test]
    fn test_remove_clears_fused_id() {
        let mut store = MaskStore::empty(10, 10);
        store.update_by_polygon(&rect(2, 2, 6, 6), [1, 0, 1], FillMode::Add);
        store.update_by_polygon(&rect(0, 0, 10, 10), [1, 0, 1], FillMode::Remove);
        assert!(store.fused_ids().is_empty());
        assert_eq!(store.pixel_count([1, 0, 1]), 0);
        assert!(store.display().pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    fn scanned(store: &MaskStore) -> BTreeMap<FusedId, usize> {
        let mut counts = BTreeMap::new();
        for p in store.value().pixels() {
            if p.0 != BACKGROUND {
                *counts.entry(fuse(p.0)).or_insert(0) += 1;
            }
        }
        counts
    }

    #[test]
    fn test_present_ids_follow_every_write() {
        let mut store = MaskStore::empty(16, 16);
        let (a, b, c) = ([1, 0, 1], [2, 0, 1], [0, 0, 3]);
        store.update_by_polygon(&rect(0, 0, 8, 8), a, FillMode::Add);
        store.update_by_polygon(&rect(4, 4, 12, 12), b, FillMode::Add);
        // b covers the rest of a
        store.update_by_polygon(&rect(0, 0, 8, 8), b, FillMode::Add);
        assert!(!store.fused_ids().contains(&fuse(a)));

        let mut mask = GrayImage::new(16, 16);
        for y in 10..16 {
            for x in 0..16 {
                mask.put_pixel(x, y, Luma([1]));
            }
        }
        store.update_value(&mask, c, FillType::Unite).expect("same size");
        store.update_value(&mask, b, FillType::Subtract).expect("same size");
        store.replace_value(c, a);
        store.paste_mask(&GrayImage::from_pixel(3, 3, Luma([1])), 14, 14, c);
        store.update_by_polygon(&rect(0, 0, 16, 16), b, FillMode::Remove);

        let expected = scanned(&store);
        assert_eq!(store.fused_ids().iter().copied().collect::<Vec<_>>(), expected.keys().copied().collect::<Vec<_>>());
        for (&fused, &count) in &expected {
            assert_eq!(store.pixel_count(unfuse(fused)), count);
        }
        assert_eq!(store.pixel_count(BACKGROUND), 256 - expected.values().sum::<usize>());
        assert_eq!(store.pixel_count(b), 0);
        assert_eq!(store.pixel_count(c), 4);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_pixel_id_out_of_range_panics() {
        let store = MaskStore::empty(4, 4);
        store.pixel_id(16);
    }

    #[test]
    fn test_next_id_is_monotonic_per_class() {
        let mut store = MaskStore::empty(4, 4);
        assert_eq!(store.get_next_id(2).expect("free id"), [1, 0]);
        assert_eq!(store.get_next_id(2).expect("free id"), [2, 0]);
        assert_eq!(store.get_next_id(1).expect("free id"), [1, 0]);
        // painting a higher id pushes the counter past it
        store.update_by_polygon(&rect(0, 0, 2, 2), [255, 0, 2], FillMode::Add);
        assert_eq!(store.get_next_id(2).expect("free id"), [0, 1]);
    }

    #[test]
    fn test_next_id_exhaustion() {
        let mut store = MaskStore::empty(4, 4);
        store.update_by_polygon(&rect(0, 0, 1, 1), [255, 255, 2], FillMode::Add);
        assert!(matches!(store.get_next_id(2), Err(MaskError::IdSpaceExhausted(2))));
        assert!(store.get_next_id(1).is_ok());
    }

    #[test]
    fn test_set_value_seeds_ids() {
        let mut raster = RgbImage::new(6, 6);
        raster.put_pixel(1, 1, Rgb([4, 0, 2]));
        raster.put_pixel(2, 2, Rgb([9, 1, 2]));
        raster.put_pixel(3, 3, Rgb([0, 0, 1]));
        let mut store = MaskStore::empty(1, 1);
        store.set_value(raster);
        assert_eq!((store.width(), store.height()), (6, 6));
        assert_eq!(store.fused_ids().len(), 3);
        assert_eq!(store.get_next_id(2).expect("free id"), [10, 1]);
        assert_eq!(store.get_next_id(1).expect("free id"), [1, 0]);
        assert_eq!(store.display().get_pixel(1, 1).0[3], MASK_ALPHA_VALUE);
    }

    #[test]
    fn test_update_value_fill_types() {
        let id = [1, 0, 1];
        let mut mask = GrayImage::new(10, 10);
        for y in 0..10 {
            for x in 5..10 {
                mask.put_pixel(x, y, Luma([1]));
            }
        }
        let seeded = || {
            let mut store = MaskStore::empty(10, 10);
            // columns 0..7
            store.update_by_polygon(&rect(0, 0, 7, 10), id, FillMode::Add);
            store
        };

        let mut store = seeded();
        store.update_value(&mask, id, FillType::Unite).expect("same size");
        assert_eq!(store.pixel_count(id), 100);

        let mut store = seeded();
        store.update_value(&mask, id, FillType::Replace).expect("same size");
        assert_eq!(store.pixel_count(id), 50);
        assert_eq!(store.pixel_id(0), BACKGROUND);

        let mut store = seeded();
        store.update_value(&mask, id, FillType::Subtract).expect("same size");
        assert_eq!(store.pixel_count(id), 50);
        assert_eq!(store.pixel_id(6), BACKGROUND);

        let mut store = seeded();
        store.update_value(&mask, id, FillType::Intersect).expect("same size");
        assert_eq!(store.pixel_count(id), 20);
        assert_eq!(store.pixel_id(5), id);
    }

    #[test]
    fn test_update_value_rejects_wrong_size() {
        let mut store = MaskStore::empty(10, 10);
        let err = store
            .update_value(&GrayImage::new(5, 5), [1, 0, 1], FillType::Unite)
            .expect_err("size mismatch");
        assert!(matches!(err, MaskError::SizeMismatch { width: 5, height: 5, .. }));
    }

    #[test]
    fn test_update_value_respects_locks() {
        let mut store = MaskStore::empty(4, 4);
        store.update_by_polygon(&rect(0, 0, 2, 4), [1, 0, 2], FillMode::Add);
        store.lock([1, 0, 2]);
        let full = GrayImage::from_pixel(4, 4, Luma([255]));
        store.update_value(&full, [2, 0, 2], FillType::Unite).expect("same size");
        assert_eq!(store.pixel_count([1, 0, 2]), 8);
        assert_eq!(store.pixel_count([2, 0, 2]), 8);
        store.update_value(&full, [1, 0, 2], FillType::Subtract).expect("same size");
        assert_eq!(store.pixel_count([1, 0, 2]), 8);
    }

    #[test]
    fn test_lock_changes_display() {
        let mut store = MaskStore::empty(4, 4);
        store.update_by_polygon(&rect(0, 0, 2, 2), [1, 0, 2], FillMode::Add);
        let before = store.display().get_pixel(0, 0).0;
        assert_ne!(before, [0, 0, 0, 0]);

        assert!(store.toggle_lock([1, 0, 2]));
        assert!(store.is_locked([1, 0, 2]));
        let locked = store.display().get_pixel(0, 0).0;
        assert_eq!(locked, [200, 200, 200, MASK_ALPHA_VALUE]);

        assert!(!store.toggle_lock([1, 0, 2]));
        assert_eq!(store.display().get_pixel(0, 0).0, before);

        assert!(!store.toggle_lock(BACKGROUND));
        assert!(store.locked().is_empty());
    }

    #[test]
    fn test_visu_modes() {
        let mut store = MaskStore::empty(4, 4);
        store.update_by_polygon(&rect(0, 0, 1, 1), [0, 0, 1], FillMode::Add);
        store.update_by_polygon(&rect(3, 3, 4, 4), [0, 0, 0], FillMode::Add);
        let fused = fuse([0, 0, 1]) as usize;
        let instance = DISTINCT_COLORS[fused % 20];
        assert_eq!(store.display().get_pixel(0, 0).0[..3], instance);

        store.set_visu_mode(MaskVisuMode::Semantic);
        assert_eq!(store.display().get_pixel(0, 0).0, [255, 0, 0, MASK_ALPHA_VALUE]);
        assert_eq!(store.display().get_pixel(3, 3).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_replace_value_relabels() {
        let mut store = MaskStore::empty(6, 6);
        store.update_by_polygon(&rect(0, 0, 3, 3), [1, 0, 2], FillMode::Add);
        assert_eq!(store.replace_value([1, 0, 2], [7, 0, 2]), 9);
        assert_eq!(store.pixel_count([1, 0, 2]), 0);
        assert_eq!(store.pixel_count([7, 0, 2]), 9);
        assert!(!store.fused_ids().contains(&fuse([1, 0, 2])));
        assert_eq!(store.get_next_id(2).expect("free id"), [8, 0]);
    }

    #[test]
    fn test_paste_mask_clips_and_respects_locks() {
        let mut store = MaskStore::empty(6, 6);
        store.update_by_polygon(&rect(4, 4, 6, 6), [1, 0, 2], FillMode::Add);
        store.lock([1, 0, 2]);
        let patch = GrayImage::from_pixel(4, 4, Luma([1]));
        // covers x 3..7, y 3..7: 9 pixels inside, 4 of them locked
        let written = store.paste_mask(&patch, 3, 3, [2, 0, 2]);
        assert_eq!(written, 5);
        assert_eq!(store.pixel_count([1, 0, 2]), 4);
        assert_eq!(store.paste_mask(&patch, -10, -10, [2, 0, 2]), 0);
    }
}
