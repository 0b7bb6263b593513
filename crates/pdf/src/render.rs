//! Page rasterisation through PDFium.

use std::collections::HashMap;
use std::path::Path;

use image::RgbImage;
use pdfium_render::prelude::{PdfPage, PdfRenderConfig, Pdfium};

use crate::PdfError;

/// Resolution the cell crops are taken at.
pub const DEFAULT_DPI: f32 = 300.0;

/// A rendered page and the factor mapping page points to pixels.
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub image: RgbImage,
    /// Pixels per point (`dpi / 72`).
    pub scale: f32,
}

/// Renders pages of a PDF held in memory.
pub struct PageRasterizer {
    pdfium: Pdfium,
    dpi: f32,
}

impl PageRasterizer {
    /// Bind PDFium, looking first in `library_dir` (when given), then in the
    /// working directory, then in the system library path.
    pub fn new(library_dir: Option<&Path>, dpi: f32) -> Result<Self, PdfError> {
        let bindings = match library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")),
        }
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| PdfError::Render(format!("could not bind PDFium: {}", e)))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
            dpi,
        })
    }

    pub fn dpi(&self) -> f32 {
        self.dpi
    }

    /// Render the requested 0-based pages, in the order of `pages`.  Only
    /// loading the document fails the whole call; each page carries its own
    /// result.
    pub fn render_pages(
        &self,
        bytes: &[u8],
        pages: &[usize],
    ) -> Result<Vec<(usize, Result<RasterPage, PdfError>)>, PdfError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PdfError::Render(format!("cannot load document: {}", e)))?;
        let page_count = document.pages().len() as usize;

        let mut rendered: HashMap<usize, Result<RasterPage, PdfError>> = HashMap::new();
        for (index, page) in document.pages().iter().enumerate() {
            if pages.contains(&index) {
                rendered.insert(index, self.render_page(&page, index));
            }
        }

        Ok(pages
            .iter()
            .map(|&index| {
                let raster = match rendered.get(&index) {
                    Some(Ok(raster)) => Ok(raster.clone()),
                    Some(Err(PdfError::Render(message))) => Err(PdfError::Render(message.clone())),
                    Some(Err(e)) => Err(PdfError::Render(e.to_string())),
                    None => Err(PdfError::PageOutOfRange {
                        page: index + 1,
                        count: page_count,
                    }),
                };
                (index, raster)
            })
            .collect())
    }

    fn render_page(&self, page: &PdfPage, index: usize) -> Result<RasterPage, PdfError> {
        let scale = self.dpi / 72.0;
        let width_px = (page.width().value * scale).round() as i32;
        let height_px = (page.height().value * scale).round() as i32;

        let bitmap = page
            .render_with_config(
                &PdfRenderConfig::new()
                    .set_target_width(width_px)
                    .set_target_height(height_px)
                    .render_form_data(true)
                    .render_annotations(true),
            )
            .map_err(|e| PdfError::Render(format!("page {}: {}", index + 1, e)))?;

        log::debug!(
            "rendered page {} at {} dpi ({}x{} px)",
            index + 1,
            self.dpi,
            width_px,
            height_px
        );

        Ok(RasterPage {
            image: bitmap.as_image().to_rgb8(),
            scale,
        })
    }
}
