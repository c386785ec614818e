use crate::{
    algorithms::RadialDouglasPeucker,
    events::EventEmitter,
    manager::{EditionEngine, Mode, ModeState},
    store::MaskStore,
    traits::Simplifier,
    types::ClassMap,
};

/// Builder for creating edition engines with a fluent API
pub struct EditionEngineBuilder {
    width: u32,
    height: u32,
    store: Option<MaskStore>,
    cls_map: Option<ClassMap>,
    target_class: u8,
    initial_mode: Mode,
    simplifier: Option<Box<dyn Simplifier>>,
    outline_tolerance: f64,
}

impl EditionEngineBuilder {
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            store: None,
            cls_map: None,
            target_class: 1,
            initial_mode: Mode::default(),
            simplifier: None,
            outline_tolerance: 1.0,
        }
    }

    /// Size of the background-only store created by [`Self::build`]. Ignored
    /// when a store is given.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Edit an existing store (replaces any size set before)
    pub fn with_store(mut self, store: MaskStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_class_map(mut self, cls_map: ClassMap) -> Self {
        self.cls_map = Some(cls_map);
        self
    }

    pub fn with_target_class(mut self, class_id: u8) -> Self {
        self.target_class = class_id;
        self
    }

    pub fn with_initial_mode(mut self, mode: Mode) -> Self {
        self.initial_mode = mode;
        self
    }

    /// Set the selection outline simplifier (replaces the default one)
    pub fn with_simplifier<S>(mut self, simplifier: S) -> Self
    where
        S: Simplifier + 'static,
    {
        self.simplifier = Some(Box::new(simplifier));
        self
    }

    pub fn with_outline_tolerance(mut self, tolerance: f64) -> Self {
        self.outline_tolerance = tolerance;
        self
    }

    /// Build the engine with default components if not specified
    pub fn build(self) -> EditionEngine {
        let mut store = self
            .store
            .unwrap_or_else(|| MaskStore::empty(self.width, self.height));
        if let Some(cls_map) = self.cls_map {
            store.set_cls_map(cls_map);
        }
        let simplifier = self
            .simplifier
            .unwrap_or_else(|| Box::new(RadialDouglasPeucker::default()));

        tracing::debug!(
            width = store.width(),
            height = store.height(),
            mode = %self.initial_mode,
            target_class = self.target_class,
            "edition engine ready"
        );
        EditionEngine {
            store,
            state: ModeState::activate(self.initial_mode),
            target_class: self.target_class,
            selected: None,
            selection_polygons: Vec::new(),
            outline_visible: false,
            simplifier,
            outline_tolerance: self.outline_tolerance,
            events: EventEmitter::new(),
        }
    }
}

impl Default for EditionEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
