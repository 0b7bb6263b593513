//! Page-level misses.  A warning skips one page; the document carries on.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// No table geometry on the page.
    StructuralMiss,
    /// A table, but no row where the line items begin.
    AnchorMiss,
    /// The page could not be rasterized for OCR.
    RenderFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageWarning {
    pub kind: WarningKind,
    /// 0-based page index.
    pub page: usize,
    pub message: String,
}

impl PageWarning {
    pub fn structural_miss(page: usize) -> Self {
        PageWarning {
            kind: WarningKind::StructuralMiss,
            page,
            message: format!("page {}: no table found", page + 1),
        }
    }

    pub fn anchor_miss(page: usize) -> Self {
        PageWarning {
            kind: WarningKind::AnchorMiss,
            page,
            message: format!("page {}: no line-item start row found", page + 1),
        }
    }

    pub fn render_failure(page: usize, reason: impl std::fmt::Display) -> Self {
        PageWarning {
            kind: WarningKind::RenderFailure,
            page,
            message: format!("page {}: could not render ({})", page + 1, reason),
        }
    }
}

impl std::fmt::Display for PageWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_use_one_based_pages() {
        assert_eq!(PageWarning::structural_miss(0).to_string(), "page 1: no table found");
        assert_eq!(
            PageWarning::anchor_miss(4).to_string(),
            "page 5: no line-item start row found"
        );
        assert_eq!(
            PageWarning::render_failure(2, "bitmap allocation failed").to_string(),
            "page 3: could not render (bitmap allocation failed)"
        );
    }

    #[test]
    fn test_kind_serializes_in_snake_case() {
        let json = serde_json::to_string(&PageWarning::anchor_miss(0)).unwrap();
        assert!(json.contains("\"kind\":\"anchor_miss\""));
    }
}
