//! Form templates.
//!
//! Every supported declaration layout gets a [`CellGridParser`].  They all
//! share [`CanonicalParser`]; a template that needs something different
//! wraps it and adjusts the result instead of re-implementing it.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::GridError;
use crate::group::{Group, EXPORT_GROUP_SIZE, IMPORT_GROUP_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormKind {
    Import,
    Export,
}

impl FormKind {
    pub fn group_size(self) -> usize {
        match self {
            FormKind::Import => IMPORT_GROUP_SIZE,
            FormKind::Export => EXPORT_GROUP_SIZE,
        }
    }
}

impl FromStr for FormKind {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "import" => Ok(FormKind::Import),
            "export" => Ok(FormKind::Export),
            _ => Err(GridError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for FormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormKind::Import => f.write_str("import"),
            FormKind::Export => f.write_str("export"),
        }
    }
}

/// What a template needs from the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateProfile {
    pub kind: FormKind,
    pub template: &'static str,
    pub group_size: usize,
    /// Patch the table text from the native text layer before grouping.
    pub brick_replacement: bool,
}

/// One group reduced to what the field parsers downstream consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    /// 0-based page index.
    pub page: usize,
    pub group_idx: usize,
    pub item_no: Option<String>,
    /// Resolved rows, each cell trimmed.
    pub rows: Vec<Vec<String>>,
}

pub trait CellGridParser: Send + Sync {
    fn profile(&self) -> &TemplateProfile;

    fn parse_group(&self, page: usize, group: &Group) -> LineItem;
}

/// Item number from the first line of the first resolved cell.
#[derive(Debug, Clone)]
pub struct CanonicalParser {
    profile: TemplateProfile,
}

impl CanonicalParser {
    pub fn new(profile: TemplateProfile) -> Self {
        CanonicalParser { profile }
    }
}

impl CellGridParser for CanonicalParser {
    fn profile(&self) -> &TemplateProfile {
        &self.profile
    }

    fn parse_group(&self, page: usize, group: &Group) -> LineItem {
        let rows: Vec<Vec<String>> = group
            .rows
            .iter()
            .map(|row| row.iter().map(|c| c.trim().to_string()).collect())
            .collect();

        let item_no = rows
            .first()
            .and_then(|r| r.first())
            .and_then(|c| c.lines().next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        LineItem {
            page,
            group_idx: group.group_idx,
            item_no,
            rows,
        }
    }
}

/// HLS export forms: OCR misreads the item column, so the number comes from
/// the first digit run of the as-extracted first cell.
#[derive(Debug, Clone)]
pub struct HlsExportParser {
    base: CanonicalParser,
}

impl CellGridParser for HlsExportParser {
    fn profile(&self) -> &TemplateProfile {
        self.base.profile()
    }

    fn parse_group(&self, page: usize, group: &Group) -> LineItem {
        static DIGITS: OnceLock<Regex> = OnceLock::new();
        let digits = DIGITS.get_or_init(|| Regex::new(r"\d+").unwrap());

        let mut item = self.base.parse_group(page, group);
        if let Some(m) = group
            .original_rows
            .first()
            .and_then(|r| r.first())
            .and_then(|c| digits.find(c.trim()))
        {
            item.item_no = Some(m.as_str().to_string());
        }
        item
    }
}

const TEMPLATES: [(FormKind, &str); 7] = [
    (FormKind::Import, "TianShi"),
    (FormKind::Import, "LSS"),
    (FormKind::Import, "HLS"),
    (FormKind::Import, "OLC"),
    (FormKind::Import, "SNP"),
    (FormKind::Export, "TianShi"),
    (FormKind::Export, "HLS"),
];

fn profile_for(kind: FormKind, template: &'static str) -> TemplateProfile {
    TemplateProfile {
        kind,
        template,
        group_size: kind.group_size(),
        brick_replacement: kind == FormKind::Import && template == "OLC",
    }
}

/// Every known template with its profile.
pub fn known_templates() -> Vec<TemplateProfile> {
    TEMPLATES.iter().map(|&(k, t)| profile_for(k, t)).collect()
}

/// Build the parser for a template.  Names match case-insensitively.
pub fn parser_for(kind: FormKind, template: &str) -> Result<Box<dyn CellGridParser>, GridError> {
    let name = TEMPLATES
        .iter()
        .find(|(k, t)| *k == kind && t.eq_ignore_ascii_case(template))
        .map(|&(_, t)| t)
        .ok_or_else(|| GridError::UnknownTemplate {
            kind: kind.to_string(),
            template: template.to_string(),
        })?;

    let base = CanonicalParser::new(profile_for(kind, name));
    Ok(match (kind, name) {
        (FormKind::Export, "HLS") => Box::new(HlsExportParser { base }),
        _ => Box::new(base),
    })
}
