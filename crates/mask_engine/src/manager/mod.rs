pub mod builder;

use geo_types::Coord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};
use ts_rs::TS;

use crate::{
    algorithms::{convert_index_to_dict, covered_pixels, densify_polygon, fill_region, region_pixels},
    codec::{fuse, unfuse},
    error::{MaskError, Result},
    events::{EventEmitter, ListenerId, MaskEvent},
    store::MaskStore,
    traits::Simplifier,
    types::{ContourType, DensePolygon, Extrema, FillMode, FillType, InstanceId, BACKGROUND},
};

pub use builder::EditionEngineBuilder;

/// Interaction mode of the engine. Exactly one is active at a time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema, TS,
    Display, EnumString, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Mode {
    /// Draw a polygon and paint it as a new instance
    Create,
    /// Click an instance to select it
    #[default]
    Select,
    /// Grow the selected instance with a polygon
    EditAdd,
    /// Cut a polygon out of the selected instance
    EditRemove,
    /// Click an instance to toggle its write protection
    Lock,
}

#[derive(
    Debug, Clone, PartialEq,
    Serialize, Deserialize, JsonSchema, TS,
    Display, VariantNames, IntoStaticStr,
)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EditCommand {
    /// Deactivate the current mode and activate another
    SetMode { mode: Mode },

    /// Click at a normalised image position
    PointerDown {
        #[schemars(range(min = 0.0, max = 1.0))]
        x: f64,
        #[schemars(range(min = 0.0, max = 1.0))]
        y: f64,
    },

    /// Move the trailing node of the current draft
    PointerMove { x: f64, y: f64 },

    /// Apply the current draft
    Commit,

    /// Drop the current draft, or the selection when there is none
    Cancel,

    /// Class used by subsequent create commits
    SetTargetClass { class_id: u8 },

    /// Erase small blobs and fill small holes of every instance
    FilterAll { min_pixels: usize },

    /// Erase small blobs and fill small holes of one instance
    FilterId { id: InstanceId, min_pixels: usize },

    /// Merge the selected region into `id`
    FillSelection { id: InstanceId, fill_type: FillType },
}

impl EditCommand {
    /// Get the JSON schema for all commands
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EditCommand)
    }

    /// Get a list of all available command names
    pub fn command_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SetMode { .. } => "Switch the active interaction mode",
            Self::PointerDown { .. } => "Click at a normalised position: add a draft node, select or toggle a lock",
            Self::PointerMove { .. } => "Move the trailing node of the polygon being drawn",
            Self::Commit => "Paint the polygon being drawn into the mask",
            Self::Cancel => "Drop the polygon being drawn, or the current selection",
            Self::SetTargetClass { .. } => "Set the class of instances created from now on",
            Self::FilterAll { .. } => "Remove blobs and fill holes smaller than a pixel count, for every instance",
            Self::FilterId { .. } => "Remove blobs and fill holes smaller than a pixel count, for one instance",
            Self::FillSelection { .. } => "Merge the selected region into an instance",
        }
    }
}

/// Polygon being drawn, in normalised coordinates. The last node follows the
/// pointer; the others are fixed.
#[derive(Debug, Clone, Default, PartialEq)]
struct PolygonDraft {
    nodes: Vec<Coord<f64>>,
}

impl PolygonDraft {
    fn click(&mut self, p: Coord<f64>) {
        self.nodes.pop();
        self.nodes.push(p);
        self.nodes.push(p);
    }

    fn hover(&mut self, p: Coord<f64>) {
        if let Some(last) = self.nodes.last_mut() {
            *last = p;
        }
    }

    fn to_pixels(nodes: &[Coord<f64>], width: u32, height: u32) -> Vec<Coord<i32>> {
        nodes
            .iter()
            .map(|n| Coord {
                x: (n.x * width as f64).round() as i32,
                y: (n.y * height as f64).round() as i32,
            })
            .collect()
    }

    /// Fixed nodes in pixel space.
    fn finish(mut self, width: u32, height: u32) -> Vec<Coord<i32>> {
        self.nodes.pop();
        Self::to_pixels(&self.nodes, width, height)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ModeState {
    Create(Option<PolygonDraft>),
    Select,
    Edit(FillMode, Option<PolygonDraft>),
    Lock,
}

impl ModeState {
    fn activate(mode: Mode) -> Self {
        match mode {
            Mode::Create => Self::Create(None),
            Mode::Select => Self::Select,
            Mode::EditAdd => Self::Edit(FillMode::Add, None),
            Mode::EditRemove => Self::Edit(FillMode::Remove, None),
            Mode::Lock => Self::Lock,
        }
    }

    fn mode(&self) -> Mode {
        match self {
            Self::Create(_) => Mode::Create,
            Self::Select => Mode::Select,
            Self::Edit(FillMode::Add, _) => Mode::EditAdd,
            Self::Edit(FillMode::Remove, _) => Mode::EditRemove,
            Self::Lock => Mode::Lock,
        }
    }

    fn draft(&self) -> Option<&PolygonDraft> {
        match self {
            Self::Create(draft) | Self::Edit(_, draft) => draft.as_ref(),
            _ => None,
        }
    }

    fn draft_slot(&mut self) -> Option<&mut Option<PolygonDraft>> {
        match self {
            Self::Create(draft) | Self::Edit(_, draft) => Some(draft),
            _ => None,
        }
    }
}

/// Drives a [`MaskStore`] from pointer input and commands.
pub struct EditionEngine {
    store: MaskStore,
    state: ModeState,
    target_class: u8,
    selected: Option<InstanceId>,
    selection_polygons: Vec<DensePolygon>,
    outline_visible: bool,
    simplifier: Box<dyn Simplifier>,
    outline_tolerance: f64,
    events: EventEmitter,
}

impl EditionEngine {
    pub fn new(store: MaskStore) -> Self {
        EditionEngineBuilder::new().with_store(store).build()
    }

    pub fn builder() -> EditionEngineBuilder {
        EditionEngineBuilder::new()
    }

    pub fn store(&self) -> &MaskStore {
        &self.store
    }

    /// Direct store access. Selection outlines are not refreshed for writes
    /// made through it.
    pub fn store_mut(&mut self) -> &mut MaskStore {
        &mut self.store
    }

    pub fn mode(&self) -> Mode {
        self.state.mode()
    }

    pub fn target_class(&self) -> u8 {
        self.target_class
    }

    pub fn set_target_class(&mut self, class_id: u8) {
        self.target_class = class_id;
    }

    pub fn selected(&self) -> Option<InstanceId> {
        self.selected
    }

    /// Contours of the selected instance, empty without selection.
    pub fn selection_polygons(&self) -> &[DensePolygon] {
        &self.selection_polygons
    }

    /// Whether the active mode shows the selection outline.
    pub fn outline_visible(&self) -> bool {
        self.outline_visible
    }

    /// Selection contours reduced by the configured simplifier.
    pub fn simplified_selection(&self) -> Vec<DensePolygon> {
        self.selection_polygons
            .iter()
            .map(|p| DensePolygon::new(p.kind, self.simplifier.simplify(&p.data, self.outline_tolerance)))
            .collect()
    }

    /// The polygon being drawn, densified in pixel space.
    pub fn draft_outline(&self) -> Option<DensePolygon> {
        let draft = self.state.draft()?;
        let vertices = PolygonDraft::to_pixels(&draft.nodes, self.store.width(), self.store.height());
        Some(densify_polygon(&vertices, ContourType::External))
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&MaskEvent) + 'static) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Deactivate the current mode, dropping its draft, then activate `mode`.
    pub fn set_mode(&mut self, mode: Mode) {
        let previous = self.state.mode();
        self.state = ModeState::activate(mode);
        self.outline_visible = matches!(mode, Mode::Select | Mode::EditAdd | Mode::EditRemove)
            && self.selected.is_some();
        tracing::debug!(from = %previous, to = %mode, "mode change");
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) -> Result<()> {
        let p = Coord { x, y };
        match &mut self.state {
            ModeState::Create(draft) | ModeState::Edit(_, draft) => {
                draft.get_or_insert_with(PolygonDraft::default).click(p);
            }
            ModeState::Select => {
                let id = self.probe(x, y)?;
                if id == BACKGROUND {
                    self.deselect();
                } else {
                    self.select(id);
                }
            }
            ModeState::Lock => {
                let id = self.probe(x, y)?;
                if id == BACKGROUND {
                    tracing::debug!(x, y, "lock click on background ignored");
                    return Ok(());
                }
                let locked = self.store.toggle_lock(id);
                tracing::debug!(?id, locked, "lock toggled");
                self.events.emit(MaskEvent::Update);
            }
        }
        Ok(())
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) {
        if let Some(Some(draft)) = self.state.draft_slot() {
            draft.hover(Coord { x, y });
        }
    }

    /// Apply the draft of the active mode. Without a draft this does nothing.
    pub fn commit(&mut self) -> Result<()> {
        let (width, height) = (self.store.width(), self.store.height());
        match &mut self.state {
            ModeState::Create(draft) => {
                let Some(draft) = draft.take() else {
                    return Ok(());
                };
                let vertices = draft.finish(width, height);
                if vertices.len() < 3 {
                    tracing::warn!(vertices = vertices.len(), "create commit rejected");
                    return Err(MaskError::DegeneratePolygon(vertices.len()));
                }
                let id = self.new_instance_id()?;
                self.store.update_by_polygon(&vertices, id, FillMode::Add);
                tracing::debug!(?id, "instance created");
                self.events.emit(MaskEvent::Update);
            }
            ModeState::Edit(mode, draft) => {
                let mode = *mode;
                let Some(draft) = draft.take() else {
                    return Ok(());
                };
                let vertices = draft.finish(width, height);
                if vertices.len() < 3 {
                    tracing::warn!(vertices = vertices.len(), "edit commit rejected");
                    return Err(MaskError::DegeneratePolygon(vertices.len()));
                }
                let Some(id) = self.selected else {
                    tracing::warn!("edit commit without selection ignored");
                    self.events.emit(MaskEvent::Update);
                    return Ok(());
                };
                self.store.update_by_polygon(&vertices, id, mode);
                let search_box = [
                    Extrema::of_points(&vertices),
                    Extrema::of_dense_polygons(&self.selection_polygons),
                ]
                .into_iter()
                .flatten()
                .reduce(|a, b| a.union(&b));
                self.selection_polygons = self.store.get_polygons(id, search_box);
                if self.selection_polygons.is_empty() {
                    self.deselect();
                }
                self.events.emit(MaskEvent::Update);
            }
            ModeState::Select | ModeState::Lock => {}
        }
        Ok(())
    }

    /// Escape: drop the draft if one is in progress, otherwise deselect.
    /// The raster is never modified.
    pub fn cancel(&mut self) {
        match &mut self.state {
            ModeState::Create(draft) => {
                draft.take();
            }
            ModeState::Edit(_, draft) => {
                if draft.take().is_none() {
                    self.deselect();
                }
            }
            ModeState::Select => self.deselect(),
            ModeState::Lock => {}
        }
    }

    /// Erase the blobs of every instance smaller than `min_pixels` and fill
    /// their holes below that size.
    pub fn filter_all(&mut self, min_pixels: usize) {
        let ids: Vec<u32> = self.store.fused_ids().iter().copied().collect();
        for fused in ids {
            self.filter_blobs(unfuse(fused), min_pixels);
        }
        self.refresh_selection();
        self.events.emit(MaskEvent::Update);
    }

    pub fn filter_id(&mut self, id: InstanceId, min_pixels: usize) {
        self.filter_blobs(id, min_pixels);
        self.refresh_selection();
        self.events.emit(MaskEvent::Update);
    }

    /// Merge the region of the current selection into `id`. Does nothing
    /// without a selection.
    pub fn fill_selection(&mut self, id: InstanceId, fill_type: FillType) -> Result<()> {
        if self.selected.is_none() {
            return Ok(());
        }
        let mask = fill_region(&self.selection_polygons, self.store.width(), self.store.height(), 1, 0);
        self.store.update_value(&mask, id, fill_type)?;
        self.refresh_selection();
        self.events.emit(MaskEvent::Update);
        Ok(())
    }

    pub fn execute(&mut self, command: EditCommand) -> Result<()> {
        tracing::debug!(command = %command, "execute");
        match command {
            EditCommand::SetMode { mode } => self.set_mode(mode),
            EditCommand::PointerDown { x, y } => self.pointer_down(x, y)?,
            EditCommand::PointerMove { x, y } => self.pointer_move(x, y),
            EditCommand::Commit => self.commit()?,
            EditCommand::Cancel => self.cancel(),
            EditCommand::SetTargetClass { class_id } => self.set_target_class(class_id),
            EditCommand::FilterAll { min_pixels } => self.filter_all(min_pixels),
            EditCommand::FilterId { id, min_pixels } => self.filter_id(id, min_pixels),
            EditCommand::FillSelection { id, fill_type } => self.fill_selection(id, fill_type)?,
        }
        Ok(())
    }

    fn probe(&self, x: f64, y: f64) -> Result<InstanceId> {
        if !(0.0..1.0).contains(&x) || !(0.0..1.0).contains(&y) {
            return Err(MaskError::OutOfBounds { x, y });
        }
        let (width, height) = (self.store.width() as usize, self.store.height() as usize);
        if width == 0 || height == 0 {
            return Err(MaskError::OutOfBounds { x, y });
        }
        let px = ((x * width as f64).floor() as usize).min(width - 1);
        let py = ((y * height as f64).floor() as usize).min(height - 1);
        Ok(self.store.pixel_id(py * width + px))
    }

    fn new_instance_id(&mut self) -> Result<InstanceId> {
        let class = self.target_class;
        let multi_instance = self.store.cls_map().get(&class).is_some_and(|s| s.multi_instance);
        if multi_instance {
            let [id1, id2] = self.store.get_next_id(class)?;
            Ok([id1, id2, class])
        } else {
            Ok([0, 0, class])
        }
    }

    fn select(&mut self, id: InstanceId) {
        self.selected = Some(id);
        self.selection_polygons = self.store.get_polygons(id, None);
        self.outline_visible = true;
        tracing::debug!(?id, polygons = self.selection_polygons.len(), "selected");
        self.events.emit(MaskEvent::Selection { id: Some(id) });
    }

    fn deselect(&mut self) {
        self.selection_polygons.clear();
        self.outline_visible = false;
        if self.selected.take().is_some() {
            self.events.emit(MaskEvent::Selection { id: None });
        }
    }

    fn refresh_selection(&mut self) {
        if let Some(id) = self.selected {
            self.selection_polygons = self.store.get_polygons(id, None);
        }
    }

    fn filter_blobs(&mut self, id: InstanceId, min_pixels: usize) {
        let (width, height) = (self.store.width(), self.store.height());
        let stride = width as usize + 1;
        let blobs = self.store.get_blobs(id, None);
        let mut small_holes = Vec::new();
        let mut erased = 0;
        for blob in blobs.values() {
            let holes: Vec<Vec<Coord<i32>>> =
                blob.holes().map(|h| convert_index_to_dict(&h.points, stride)).collect();
            if blob.nb_pixels >= min_pixels {
                small_holes.extend(
                    holes
                        .into_iter()
                        .map(|hole| DensePolygon::new(ContourType::Internal, hole))
                        .filter(|hole| hole.area() < min_pixels as f64),
                );
                continue;
            }
            if let Some(external) = blob.external() {
                let outline = convert_index_to_dict(&external.points, stride);
                let pixels = region_pixels(&outline, &holes, width, height);
                self.store.update_pixels(&pixels, id, FillMode::Remove);
                erased += 1;
            }
        }

        // only background is filled; erased specks count as background here
        let mut filled = 0;
        for hole in small_holes {
            let pixels: Vec<usize> = covered_pixels(&hole.data, width, height)
                .into_iter()
                .filter(|&idx| self.store.pixel_id(idx) == BACKGROUND)
                .collect();
            if !self.store.update_pixels(&pixels, id, FillMode::Add).is_empty() {
                filled += 1;
            }
        }
        tracing::debug!(fused = fuse(id), erased, filled, "filtered blobs");
    }
}

impl std::fmt::Debug for EditionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditionEngine")
            .field("mode", &self.state.mode())
            .field("target_class", &self.target_class)
            .field("selected", &self.selected)
            .field("width", &self.store.width())
            .field("height", &self.store.height())
            .finish()
    }
}
