pub mod blob;
pub mod polygon;
pub mod rasterize;
pub mod simplification;

pub use blob::*;
pub use polygon::*;
pub use rasterize::*;
pub use simplification::*;
