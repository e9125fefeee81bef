use std::borrow::{Borrow, Cow};
use std::fmt;
use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BRANDS: &[&str] = &[
    "Toyota",
    "Honda",
    "Ford",
    "BMW",
    "Mercedes",
    "Audi",
    "Tesla",
    "Chevrolet",
    "Nissan",
    "Hyundai",
    "Kia",
    "Volkswagen",
    "Subaru",
    "Lexus",
    "Jeep",
];

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 4096;
/// Logos are inlined into the trip blob, so the stored copy stays small.
pub const MAX_LOGO_BYTES: usize = 512 * 1024;
pub const MAX_LOGO_DIMENSION: u32 = 256;
pub const PLACEHOLDER_EMOJI: &str = "🚗";
pub const LOGO_DIR: &str = "assets/logos";

/// Case-sensitive brand identifier, used as the key of the counts table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct BrandName(String);

impl BrandName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Brand names collide when they are equal ignoring case.
    pub fn collides_with(&self, other: &str) -> bool {
        self.0.to_lowercase() == other.to_lowercase()
    }
}

impl fmt::Display for BrandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for BrandName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BrandName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An image as a `data:` URL.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn mime(&self) -> Option<&str> {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CustomBrand {
    pub name: BrandName,
    #[serde(default)]
    pub emoji: String,
    #[serde(rename = "dataUrl", default)]
    pub image: Option<ImageRef>,
}

impl CustomBrand {
    pub fn label(&self) -> String {
        if self.emoji.is_empty() {
            self.name.to_string()
        } else {
            format!("{} {}", self.name, self.emoji)
        }
    }

    pub fn image_src(&self) -> Cow<'_, str> {
        match &self.image {
            Some(image) => Cow::Borrowed(image.as_str()),
            None => Cow::Owned(placeholder_image(self.name.as_str(), &self.emoji).0),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("input bytes empty")]
    EmptyInput,

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("image too large: {width}x{height}, max {max_dimension} per side")]
    DimensionsTooLarge {
        width: u32,
        height: u32,
        max_dimension: u32,
    },

    #[error("logo too large to store: {size} bytes, max {max_size}")]
    LogoTooLarge { size: usize, max_size: usize },

    #[error("failed to decode image: {source}")]
    Decode {
        #[from]
        source: image::ImageError,
    },
}

/// Turns uploaded bytes into a data URL after checking they are a usable image.
/// Raster logos over [`MAX_LOGO_DIMENSION`] or [`MAX_LOGO_BYTES`] are scaled
/// down and stored as PNG.
pub fn uploaded_image(bytes: &[u8]) -> Result<ImageRef, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::EmptyInput);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ImageError::InputTooLarge {
            size: bytes.len(),
            max_size: MAX_IMAGE_BYTES,
        });
    }
    if looks_like_svg(bytes) {
        check_logo_size(bytes.len())?;
        return Ok(ImageRef::from_bytes("image/svg+xml", bytes));
    }

    let format = image::guess_format(bytes).map_err(|_| ImageError::UnsupportedFormat)?;
    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        _ => return Err(ImageError::UnsupportedFormat),
    };

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format).into_dimensions()?;
    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(ImageError::DimensionsTooLarge {
            width,
            height,
            max_dimension: MAX_IMAGE_DIMENSION,
        });
    }

    let fits = width <= MAX_LOGO_DIMENSION && height <= MAX_LOGO_DIMENSION;
    if fits && bytes.len() <= MAX_LOGO_BYTES {
        return Ok(ImageRef::from_bytes(mime, bytes));
    }

    let png = shrink_to_logo(bytes, format)?;
    check_logo_size(png.len())?;
    debug!(
        from_bytes = bytes.len(),
        to_bytes = png.len(),
        width,
        height,
        "logo downscaled"
    );
    Ok(ImageRef::from_bytes("image/png", &png))
}

fn shrink_to_logo(bytes: &[u8], format: ImageFormat) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory_with_format(bytes, format)?;
    let oversized = decoded.width() > MAX_LOGO_DIMENSION || decoded.height() > MAX_LOGO_DIMENSION;
    let logo = if oversized {
        decoded.thumbnail(MAX_LOGO_DIMENSION, MAX_LOGO_DIMENSION)
    } else {
        decoded
    };
    let mut out = Cursor::new(Vec::new());
    logo.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

fn check_logo_size(size: usize) -> Result<(), ImageError> {
    if size > MAX_LOGO_BYTES {
        return Err(ImageError::LogoTooLarge {
            size,
            max_size: MAX_LOGO_BYTES,
        });
    }
    Ok(())
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    // the cut may split a multi-byte character
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return false,
    };
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

/// Generated badge for custom brands without a usable upload.
pub fn placeholder_image(name: &str, emoji: &str) -> ImageRef {
    let emoji = if emoji.trim().is_empty() {
        PLACEHOLDER_EMOJI
    } else {
        emoji.trim()
    };
    let svg = placeholder_svg(&format!("{name} {emoji}"));
    ImageRef::from_bytes("image/svg+xml", svg.as_bytes())
}

fn placeholder_svg(text: &str) -> String {
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="240" height="160" viewBox="0 0 240 160">
  <rect x="8" y="8" rx="22" ry="22" width="224" height="144" fill="#f0f4ff" stroke="#1a2a6c" stroke-width="4"/>
  <g font-family="Arial, Helvetica, sans-serif" text-anchor="middle">
    <text x="120" y="90" font-size="34" fill="#1a2a6c" font-weight="700">{}</text>
  </g>
</svg>"##,
        escape_xml(text)
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Bundled logo path for a built-in brand.
pub fn default_logo_path(name: &str) -> String {
    format!("{LOGO_DIR}/{}.svg", name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_data_url(image: &ImageRef) -> Vec<u8> {
        let (_, payload) = image.as_str().split_once(";base64,").unwrap();
        STANDARD.decode(payload).unwrap()
    }

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::new(4, 3);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn brand_collision_ignores_case() {
        let toyota = BrandName::new("Toyota");
        assert!(toyota.collides_with("TOYOTA"));
        assert!(toyota.collides_with("toyota"));
        assert!(!toyota.collides_with("Toyota2"));
    }

    #[test]
    fn brand_names_are_case_sensitive_keys() {
        assert_ne!(BrandName::new("Kia"), BrandName::new("kia"));
    }

    #[test]
    fn placeholder_encodes_name_and_emoji() {
        let image = placeholder_image("Rivian", "⚡");
        assert_eq!(image.mime(), Some("image/svg+xml"));
        let svg = String::from_utf8(decode_data_url(&image)).unwrap();
        assert!(svg.contains("Rivian ⚡"));
        assert!(svg.starts_with("<svg"));
    }

    #[test]
    fn placeholder_defaults_emoji() {
        let image = placeholder_image("Rivian", "  ");
        let svg = String::from_utf8(decode_data_url(&image)).unwrap();
        assert!(svg.contains("Rivian 🚗"));
    }

    #[test]
    fn placeholder_escapes_markup() {
        let image = placeholder_image("A&B <Motors>", "");
        let svg = String::from_utf8(decode_data_url(&image)).unwrap();
        assert!(svg.contains("A&amp;B &lt;Motors&gt;"));
    }

    #[test]
    fn png_upload_is_accepted() {
        let png = tiny_png();
        let image = uploaded_image(&png).unwrap();
        assert_eq!(image.mime(), Some("image/png"));
        assert_eq!(decode_data_url(&image), png);
    }

    #[test]
    fn svg_upload_is_accepted() {
        let svg = br#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg"></svg>"#;
        let image = uploaded_image(svg).unwrap();
        assert_eq!(image.mime(), Some("image/svg+xml"));
    }

    #[test]
    fn svg_split_at_sniff_boundary_is_accepted() {
        let mut svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\">".to_vec();
        svg.resize(511, b' ');
        svg.extend_from_slice("é</svg>".as_bytes());
        let image = uploaded_image(&svg).unwrap();
        assert_eq!(image.mime(), Some("image/svg+xml"));
    }

    #[test]
    fn invalid_utf8_is_not_svg() {
        let mut bytes = b"<svg".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, 0x00]);
        assert!(!looks_like_svg(&bytes));
    }

    #[test]
    fn large_raster_logo_is_downscaled() {
        let img = image::RgbImage::from_pixel(800, 400, image::Rgb([200, 30, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();

        let image = uploaded_image(&out.into_inner()).unwrap();
        assert_eq!(image.mime(), Some("image/png"));
        let stored = image::load_from_memory(&decode_data_url(&image)).unwrap();
        assert_eq!((stored.width(), stored.height()), (256, 128));
    }

    #[test]
    fn padded_upload_never_stores_more_than_a_logo() {
        let mut padded = tiny_png();
        padded.resize(8 * 1024 * 1024, 0);
        if let Ok(image) = uploaded_image(&padded) {
            assert!(decode_data_url(&image).len() <= MAX_LOGO_BYTES);
        }
    }

    #[test]
    fn oversized_svg_logo_rejected() {
        let mut svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\">".to_vec();
        svg.resize(MAX_LOGO_BYTES + 1, b' ');
        assert!(matches!(
            uploaded_image(&svg),
            Err(ImageError::LogoTooLarge { .. })
        ));
    }

    #[test]
    fn empty_upload_rejected() {
        assert!(matches!(uploaded_image(&[]), Err(ImageError::EmptyInput)));
    }

    #[test]
    fn oversized_upload_rejected() {
        let big = vec![0u8; MAX_IMAGE_BYTES + 1];
        assert!(matches!(
            uploaded_image(&big),
            Err(ImageError::InputTooLarge { .. })
        ));
    }

    #[test]
    fn garbage_upload_rejected() {
        assert!(matches!(
            uploaded_image(b"definitely not an image"),
            Err(ImageError::UnsupportedFormat)
        ));
    }

    #[test]
    fn custom_label_includes_emoji() {
        let brand = CustomBrand {
            name: BrandName::new("Rivian"),
            emoji: "⚡".into(),
            image: None,
        };
        assert_eq!(brand.label(), "Rivian ⚡");
        assert!(brand.image_src().starts_with("data:image/svg+xml;base64,"));
    }

    #[test]
    fn custom_brand_wire_format() {
        let brand = CustomBrand {
            name: BrandName::new("Rivian"),
            emoji: String::new(),
            image: Some(ImageRef::from_bytes("image/png", &[1, 2, 3])),
        };
        let json = serde_json::to_value(&brand).unwrap();
        assert_eq!(json["name"], "Rivian");
        assert!(json["dataUrl"].as_str().unwrap().starts_with("data:image/png"));
    }

    #[test]
    fn logo_path_is_lowercase() {
        assert_eq!(default_logo_path("BMW"), "assets/logos/bmw.svg");
    }
}
