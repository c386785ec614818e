use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::ImageFormat;

use crate::{error::Result, store::MaskStore};

/// Prefix of the data URLs produced by [`MaskStore::to_base64`].
pub const DATA_URL_PREFIX: &str = "data:image/png;base64,";

impl MaskStore {
    /// Lossless PNG of the id raster, one RGB pixel per mask pixel.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.value().write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    /// The raster as a `data:image/png;base64,` URL.
    pub fn to_base64(&self) -> Result<String> {
        Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(self.to_png_bytes()?)))
    }

    /// Replace the raster with a decoded PNG. An alpha channel is dropped.
    pub fn load_png_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let raster = image::load_from_memory(bytes)?.to_rgb8();
        self.set_value(raster);
        Ok(())
    }

    /// Accepts a data URL or bare base64.
    pub fn load_base64(&mut self, data: &str) -> Result<()> {
        let payload = match data.split_once(";base64,") {
            Some((_, payload)) => payload,
            None => data,
        };
        let bytes = STANDARD.decode(payload.trim())?;
        self.load_png_bytes(&bytes)
    }
}
