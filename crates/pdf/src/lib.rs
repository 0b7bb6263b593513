use thiserror::Error;

use parser::backend::{LopdfBackend, PageId, PdfBackend};
use parser::geometry::Edge;
use parser::layout::TextSpan;

pub mod parser;
pub mod render;
pub mod types;

pub use parser::table::{Table, TableRow, TableSettings};
pub use render::{PageRasterizer, RasterPage, DEFAULT_DPI};
pub use types::*;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("Document is encrypted")]
    Encrypted,
    #[error("Page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },
    #[error("Render error: {0}")]
    Render(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A parsed PDF document.  Pages are addressed by 0-based index.
pub struct PdfDocument {
    backend: LopdfBackend,
    page_ids: Vec<PageId>,
}

impl PdfDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let backend = LopdfBackend::load_bytes(bytes)?;
        let page_ids = backend.pages().into_values().collect();
        Ok(Self { backend, page_ids })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Parse one page's content stream into text spans and ruling edges.
    pub fn page(&self, index: usize) -> Result<PageContent, PdfError> {
        let page_id = *self
            .page_ids
            .get(index)
            .ok_or(PdfError::PageOutOfRange {
                page: index + 1,
                count: self.page_ids.len(),
            })?;

        let page_box = self.backend.page_box(page_id)?;
        let raw = self.backend.page_content(page_id)?;
        let ops = self.backend.decode_content(&raw)?;
        let fonts = self.backend.page_fonts(page_id).unwrap_or_else(|e| {
            log::debug!("page {}: no font resources ({})", index + 1, e);
            Vec::new()
        });

        let edges = parser::geometry::extract_page_edges(&ops, &page_box);
        log::trace!("page {}: {} ruling edges", index + 1, edges.len());

        Ok(PageContent {
            index,
            page_box,
            spans: parser::layout::extract_page_spans(&ops, &fonts, page_box),
            edges,
        })
    }
}

/// The vector content of one page, in top-left page space.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub index: usize,
    pub page_box: PageBox,
    pub spans: Vec<TextSpan>,
    pub edges: Vec<Edge>,
}

impl PageContent {
    /// Native text blocks in content-stream order, corrected by `rule`.
    pub fn text_blocks(&self, rule: &CorrectionRule) -> Vec<TextBlock> {
        parser::layout::native_text_blocks(&self.spans, rule)
    }

    /// Lattice tables, top-to-bottom then left-to-right.
    pub fn find_tables(&self, settings: &TableSettings) -> Vec<Table> {
        parser::table::find_tables(&self.edges, settings)
    }

    pub fn glyphs(&self) -> Vec<Glyph> {
        parser::layout::page_glyphs(&self.spans)
    }
}

#[cfg(test)]
mod tests {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    use super::*;

    /// One A4 page: two ruled cells side by side and a number drawn inside
    /// the first one with a control byte where a `2` belongs.
    fn sample_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("re", vec![50.into(), 600.into(), 100.into(), 50.into()]),
                Operation::new("re", vec![150.into(), 600.into(), 100.into(), 50.into()]),
                Operation::new("S", vec![]),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![60.into(), 620.into()]),
                Operation::new("Tj", vec![Object::string_literal(b"1\x155".to_vec())]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_empty_bytes_fail_to_parse() {
        assert!(matches!(PdfDocument::from_bytes(&[]), Err(PdfError::Parse(_))));
    }

    #[test]
    fn test_page_out_of_range() {
        let doc = PdfDocument::from_bytes(&sample_pdf()).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert!(matches!(
            doc.page(3),
            Err(PdfError::PageOutOfRange { page: 4, count: 1 })
        ));
    }

    #[test]
    fn test_page_box_inherited_from_pages_node() {
        let page = PdfDocument::from_bytes(&sample_pdf()).unwrap().page(0).unwrap();
        assert_eq!(page.page_box.width(), 595.0);
        assert_eq!(page.page_box.height(), 842.0);
    }

    #[test]
    fn test_text_blocks_are_corrected() {
        let page = PdfDocument::from_bytes(&sample_pdf()).unwrap().page(0).unwrap();
        let blocks = page.text_blocks(&CorrectionRule::default());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "125");
        let (cx, cy) = blocks[0].bbox.center();
        assert!((50.0..150.0).contains(&cx));
        assert!((192.0..242.0).contains(&cy));
    }

    #[test]
    fn test_tables_found_from_rectangles() {
        let page = PdfDocument::from_bytes(&sample_pdf()).unwrap().page(0).unwrap();
        let tables = page.find_tables(&TableSettings::default());
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 1);
        assert_eq!(
            tables[0].rows[0].cells,
            vec![
                Some(Rect::new(50.0, 192.0, 150.0, 242.0)),
                Some(Rect::new(150.0, 192.0, 250.0, 242.0)),
            ]
        );
    }

    #[test]
    fn test_table_text_keeps_raw_glyphs() {
        let page = PdfDocument::from_bytes(&sample_pdf()).unwrap().page(0).unwrap();
        let settings = TableSettings::default();
        let tables = page.find_tables(&settings);
        assert_eq!(
            tables[0].extract(&page.glyphs(), &settings),
            vec![vec![Some("1\u{15}5".to_string()), Some(String::new())]]
        );
    }
}
