use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::InstanceId;

/// Notifications emitted by the edition engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaskEvent {
    /// The raster changed, or an edit was attempted
    Update,
    /// The selected instance changed; `None` after a deselection
    Selection { id: Option<InstanceId> },
}

/// Handle returned by [`EventEmitter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&MaskEvent)>;

/// Explicit listener registry. Listeners run synchronously, in subscription
/// order, before `emit` returns.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Vec<(ListenerId, Listener)>,
    next: u64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&MaskEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false when `id` was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, event: MaskEvent) {
        tracing::trace!(?event, listeners = self.listeners.len(), "emit");
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
