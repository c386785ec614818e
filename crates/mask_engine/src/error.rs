use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("Failed to encode or decode mask image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid base64 mask payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Polygon needs at least 3 vertices, got {0}")]
    DegeneratePolygon(usize),

    #[error("Mask size mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    SizeMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Pointer position ({x}, {y}) lies outside the mask")]
    OutOfBounds { x: f64, y: f64 },

    #[error("No free instance id left for class {0}")]
    IdSpaceExhausted(u8),

    #[error("Invalid instance key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, MaskError>;
