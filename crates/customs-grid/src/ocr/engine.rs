//! Text recognition on cleaned cell crops.
//!
//! Recognizers are built by a [`RecognizerFactory`] on the worker that uses
//! them and never leave it, so they do not need to be `Send`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use customs_grid_core::luminance::prepare_cell;
use image::RgbImage;
use pdf::Rect;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Failed to initialize OCR engine for '{lang}': {message}")]
    Init { lang: String, message: String },

    #[error("Failed to run OCR: {0}")]
    Recognition(String),

    #[error("OCR engine panicked: {0}")]
    Panicked(String),

    #[error("This build has no OCR backend; rebuild with `--features tesseract`")]
    Unavailable,
}

pub trait TextRecognizer {
    /// Recognize a cleaned crop and return its text lines, top to bottom.
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<String>, OcrError>;
}

pub trait RecognizerFactory: Send + Sync {
    fn create(&self, lang: &str) -> Result<Box<dyn TextRecognizer>, OcrError>;
}

/// Map the short language codes used on the command line to Tesseract
/// traineddata names.  Unknown codes pass through.
pub fn tesseract_language(code: &str) -> &str {
    match code {
        "en" => "eng",
        "th" => "tha",
        "ch" => "chi_sim",
        "chinese_cht" => "chi_tra",
        "japan" => "jpn",
        "korean" => "kor",
        other => other,
    }
}

/// Crop, clean and recognize one cell.  Never fails: an empty crop gives
/// `""` without touching the recognizer, and a recognition error or a panic
/// inside the recognizer is logged and also gives `""`.
pub fn recognize_cell(
    recognizer: &mut dyn TextRecognizer,
    page: &RgbImage,
    rect: &Rect,
    scale: f32,
    threshold: u8,
) -> String {
    let Some(crop) = prepare_cell(page, rect, scale, threshold) else {
        return String::new();
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| recognizer.recognize(&crop)))
        .unwrap_or_else(|payload| Err(OcrError::Panicked(panic_message(payload.as_ref()))));

    match outcome {
        Ok(lines) => lines
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => {
            log::error!("cell {}: {}", rect, e);
            String::new()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tesseract
// ---------------------------------------------------------------------------

#[cfg(feature = "tesseract")]
pub struct TesseractRecognizer {
    lt: leptess::LepTess,
}

#[cfg(feature = "tesseract")]
impl TesseractRecognizer {
    pub fn new(lang: &str) -> Result<Self, OcrError> {
        let init = |message: String| OcrError::Init {
            lang: lang.to_string(),
            message,
        };

        let mut lt = leptess::LepTess::new(None, tesseract_language(lang))
            .map_err(|e| init(e.to_string()))?;
        // Treat each crop as one uniform block of text.
        lt.set_variable(leptess::Variable::TesseditPagesegMode, "6")
            .map_err(|e| init(e.to_string()))?;

        Ok(Self { lt })
    }
}

#[cfg(feature = "tesseract")]
impl TextRecognizer for TesseractRecognizer {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<String>, OcrError> {
        let mut png = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| OcrError::Recognition(format!("cannot encode crop: {}", e)))?;

        self.lt
            .set_image_from_mem(png.get_ref())
            .map_err(|e| OcrError::Recognition(e.to_string()))?;

        let text = self
            .lt
            .get_utf8_text()
            .map_err(|e| OcrError::Recognition(e.to_string()))?;

        Ok(text.lines().map(str::to_string).collect())
    }
}

#[cfg(feature = "tesseract")]
pub struct TesseractFactory;

#[cfg(feature = "tesseract")]
impl RecognizerFactory for TesseractFactory {
    fn create(&self, lang: &str) -> Result<Box<dyn TextRecognizer>, OcrError> {
        Ok(Box::new(TesseractRecognizer::new(lang)?))
    }
}

/// The recognizer factory this build ships with.
pub fn default_factory() -> Result<Arc<dyn RecognizerFactory>, OcrError> {
    #[cfg(feature = "tesseract")]
    {
        Ok(Arc::new(TesseractFactory))
    }
    #[cfg(not(feature = "tesseract"))]
    {
        Err(OcrError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    /// Returns its script and remembers the crop sizes it saw.
    struct Scripted {
        lines: Vec<String>,
        fail: bool,
        seen: Vec<(u32, u32)>,
    }

    impl TextRecognizer for Scripted {
        fn recognize(&mut self, image: &RgbImage) -> Result<Vec<String>, OcrError> {
            self.seen.push(image.dimensions());
            if self.fail {
                return Err(OcrError::Recognition("boom".into()));
            }
            Ok(self.lines.clone())
        }
    }

    fn scripted(lines: &[&str], fail: bool) -> Scripted {
        Scripted {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            fail,
            seen: vec![],
        }
    }

    fn page() -> RgbImage {
        RgbImage::from_pixel(100, 100, Rgb([250, 250, 250]))
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(tesseract_language("en"), "eng");
        assert_eq!(tesseract_language("th"), "tha");
        assert_eq!(tesseract_language("ch"), "chi_sim");
        assert_eq!(tesseract_language("deu"), "deu");
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let mut r = scripted(&["12", "  ", "", "KGM"], false);
        let text = recognize_cell(&mut r, &page(), &Rect::new(0.0, 0.0, 10.0, 10.0), 2.0, 10);
        assert_eq!(text, "12\nKGM");
        assert_eq!(r.seen, vec![(20, 20)]);
    }

    #[test]
    fn test_failure_yields_empty_string() {
        let mut r = scripted(&["x"], true);
        let text = recognize_cell(&mut r, &page(), &Rect::new(0.0, 0.0, 10.0, 10.0), 1.0, 10);
        assert_eq!(text, "");
    }

    struct Exploding;

    impl TextRecognizer for Exploding {
        fn recognize(&mut self, _image: &RgbImage) -> Result<Vec<String>, OcrError> {
            panic!("engine state corrupted");
        }
    }

    #[test]
    fn test_panicking_recognizer_yields_empty_string() {
        let mut r = Exploding;
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(recognize_cell(&mut r, &page(), &rect, 1.0, 10), "");
        // The recognizer is still usable for the next cell.
        assert_eq!(recognize_cell(&mut r, &page(), &rect, 1.0, 10), "");
    }

    #[test]
    fn test_panic_message_is_extracted() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }

    #[test]
    fn test_empty_crop_skips_recognizer() {
        let mut r = scripted(&["x"], false);
        let text = recognize_cell(&mut r, &page(), &Rect::new(200.0, 0.0, 210.0, 10.0), 1.0, 10);
        assert_eq!(text, "");
        assert!(r.seen.is_empty());
    }

    #[cfg(not(feature = "tesseract"))]
    #[test]
    fn test_no_backend_without_feature() {
        assert!(matches!(default_factory(), Err(OcrError::Unavailable)));
    }
}
