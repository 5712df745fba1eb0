use std::collections::HashMap;

use lopdf::Stream;
use tracing::debug;

use crate::error::ImageReadError;

/// Widest image, in points, that fits a column.
pub const MAX_IMAGE_WIDTH: u32 = 250;

/// Looks up the natural size of an image by its `src`.
pub trait ImageReader {
    fn read_size(&mut self, source: &str) -> Result<(u32, u32), ImageReadError>;
}

/// Shrinks `(width, height)` so the width is at most `max_width`, keeping the
/// aspect ratio. Images already narrow enough are left alone.
pub fn scale_to_max_width(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let ratio = f64::from(max_width) / f64::from(width);
    (max_width, (f64::from(height) * ratio).round() as u32)
}

#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    /// Ready-to-embed image XObject. `None` for size-only entries.
    pub xobject: Option<Stream>,
}

/// Decoded images of a crawl, keyed by the `src` they were referenced by.
#[derive(Debug, Default)]
pub struct ImageLibrary {
    images: HashMap<String, LoadedImage>,
    failures: HashMap<String, String>,
}

impl ImageLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `bytes` into an image XObject. Decoding failures are
    /// remembered so the parser can report them when it reaches the image.
    pub fn load(&mut self, source: &str, bytes: Vec<u8>) {
        match decode(bytes) {
            Ok(image) => {
                debug!("Loaded image {} ({}x{})", source, image.width, image.height);
                self.failures.remove(source);
                self.images.insert(source.to_string(), image);
            }
            Err(reason) => {
                self.record_failure(source, reason);
            }
        }
    }

    pub fn insert_size(&mut self, source: &str, width: u32, height: u32) {
        self.images.insert(
            source.to_string(),
            LoadedImage {
                width,
                height,
                xobject: None,
            },
        );
    }

    pub fn record_failure(&mut self, source: &str, reason: impl Into<String>) {
        self.failures.insert(source.to_string(), reason.into());
    }

    pub fn contains(&self, source: &str) -> bool {
        self.images.contains_key(source) || self.failures.contains_key(source)
    }

    pub fn get(&self, source: &str) -> Option<&LoadedImage> {
        self.images.get(source)
    }
}

impl ImageReader for ImageLibrary {
    fn read_size(&mut self, source: &str) -> Result<(u32, u32), ImageReadError> {
        if let Some(image) = self.images.get(source) {
            return Ok((image.width, image.height));
        }
        let reason = self
            .failures
            .get(source)
            .cloned()
            .unwrap_or_else(|| "image was never loaded".to_string());
        Err(ImageReadError::new(source, reason))
    }
}

fn decode(bytes: Vec<u8>) -> Result<LoadedImage, String> {
    let xobject = lopdf::xobject::image_from(bytes).map_err(|e| e.to_string())?;
    let dimension = |key: &[u8]| -> Result<u32, String> {
        xobject
            .dict
            .get(key)
            .and_then(|value| value.as_i64())
            .map(|value| value.max(0) as u32)
            .map_err(|e| format!("image has no usable {}: {}", String::from_utf8_lossy(key), e))
    };
    let width = dimension(b"Width")?;
    let height = dimension(b"Height")?;
    Ok(LoadedImage {
        width,
        height,
        xobject: Some(xobject),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(500, 200, (250, 100))]
    #[case(1000, 333, (250, 83))]
    #[case(250, 90, (250, 90))]
    #[case(120, 300, (120, 300))]
    fn scales_to_column_width(#[case] width: u32, #[case] height: u32, #[case] expected: (u32, u32)) {
        assert_eq!(scale_to_max_width(width, height, MAX_IMAGE_WIDTH), expected);
    }

    #[test]
    fn library_reports_failures_and_unknown_sources() {
        let mut library = ImageLibrary::new();
        library.insert_size("ok.png", 10, 20);
        library.record_failure("bad.png", "404");

        assert_eq!(library.read_size("ok.png"), Ok((10, 20)));
        assert_eq!(library.read_size("bad.png").unwrap_err().reason, "404");
        assert!(library.read_size("missing.png").is_err());
    }

    #[test]
    fn garbage_bytes_become_a_failure() {
        let mut library = ImageLibrary::new();
        library.load("junk.png", b"not an image".to_vec());
        assert!(library.contains("junk.png"));
        assert!(library.get("junk.png").is_none());
        assert!(library.read_size("junk.png").is_err());
    }
}
