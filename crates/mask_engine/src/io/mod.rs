//! In-memory import and export of the mask raster.

pub mod geojson;
pub mod png;

pub use self::geojson::InstanceProperties;
pub use self::png::DATA_URL_PREFIX;
