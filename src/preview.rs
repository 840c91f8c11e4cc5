use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// A built preview image as returned by the rendering service.
///
/// Constructing one validates that the bytes decode as an image, so a
/// service answering with garbage surfaces as a validation failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Preview {
    bytes: Vec<u8>,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl Preview {
    pub fn decode(bytes: Vec<u8>) -> ServiceResult<Self> {
        let format = image::guess_format(&bytes)?;
        let img = image::load_from_memory_with_format(&bytes, format)?;
        Ok(Self {
            width: img.width(),
            height: img.height(),
            bytes,
            format,
        })
    }

    /// Accepts raw base64 or a `data:<mime>;base64,` URL.
    pub fn from_base64(text: &str) -> ServiceResult<Self> {
        let payload = match text.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => text,
        };
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| ServiceError::validation(format!("preview is not base64: {e}")))?;
        Self::decode(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.to_mime_type(),
            STANDARD.encode(&self.bytes)
        )
    }

    /// Downscale so the longest side is at most `max_side`, as a PNG data URL.
    pub fn thumbnail_data_url(&self, max_side: u32) -> ServiceResult<String> {
        let img = image::load_from_memory_with_format(&self.bytes, self.format)?;
        let thumb = img.thumbnail(max_side, max_side).to_rgba8();
        encode_png(thumb.as_raw(), thumb.width(), thumb.height())
    }
}

impl TryFrom<String> for Preview {
    type Error = ServiceError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::from_base64(&text)
    }
}

impl From<Preview> for String {
    fn from(p: Preview) -> Self {
        p.data_url()
    }
}

fn encode_png(rgba: &[u8], w: u32, h: u32) -> ServiceResult<String> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(rgba, w, h, image::ExtendedColorType::Rgba8)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&buf)))
}

#[cfg(test)]
pub(crate) fn test_png(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(w, h, |x, y| {
        image::Rgba([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 128, 255])
    });
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), w, h, image::ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_dimensions() {
        let p = Preview::decode(test_png(40, 20)).unwrap();
        assert_eq!(p.dimensions(), (40, 20));
        assert!(p.data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn rejects_non_image_bytes() {
        let err = Preview::decode(b"definitely not a png".to_vec()).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn data_url_round_trip() {
        let p = Preview::decode(test_png(8, 8)).unwrap();
        let back = Preview::from_base64(&p.data_url()).unwrap();
        assert_eq!(back, p);
        let raw = STANDARD.encode(p.bytes());
        assert_eq!(Preview::from_base64(&raw).unwrap(), p);
    }

    #[test]
    fn thumbnail_fits_bound() {
        let p = Preview::decode(test_png(300, 100)).unwrap();
        let url = p.thumbnail_data_url(64).unwrap();
        let thumb = Preview::from_base64(&url).unwrap();
        let (w, h) = thumb.dimensions();
        assert!(w <= 64 && h <= 64);
        assert_eq!(w, 64);
    }
}
