//! # Instance Segmentation Mask Engine
//!
//! A dense per-pixel instance label buffer with polygon painting, blob
//! extraction with hole detection, contour simplification and an interactive
//! edition engine driving it from pointer input.
//!
//! ## Core Features
//!
//! - **Id raster**: every pixel stores `[id1, id2, class]` as three bytes,
//!   so the same buffer is used for rendering, hit testing and persistence
//! - **Polygon editing**: paint or erase polygons, honouring locked instances
//! - **Blob extraction**: contour-tracing labelling with external and
//!   internal (hole) contours
//! - **Simplification**: radial distance + Douglas-Peucker outline reduction
//! - **Edition engine**: create / select / edit / lock modes with events
//! - **Export**: PNG, base64 data URLs and GeoJSON
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mask_engine::{EditionEngine, Mode};
//!
//! let mut engine = EditionEngine::builder()
//!     .with_size(640, 480)
//!     .with_target_class(2)
//!     .with_initial_mode(Mode::Create)
//!     .build();
//!
//! // pointer positions are normalised to the image size
//! for (x, y) in [(0.1, 0.1), (0.4, 0.1), (0.4, 0.5)] {
//!     engine.pointer_down(x, y)?;
//! }
//! engine.commit()?;
//!
//! let geojson = engine.store().to_geojson_string()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod codec;
pub mod traits;
pub mod algorithms;
pub mod store;
pub mod events;
pub mod manager;
pub mod io;

// Re-exports for convenience
pub use error::{MaskError, Result};
pub use types::*;
pub use traits::*;
pub use algorithms::{GeoDouglasPeucker, RadialDouglasPeucker};
pub use store::MaskStore;
pub use events::{EventEmitter, ListenerId, MaskEvent};
pub use manager::{EditCommand, EditionEngine, EditionEngineBuilder, Mode};
pub use io::InstanceProperties;
