//! Placeholder discovery.
//!
//! Matching runs over each paragraph's concatenated run text, so a key that
//! Word split across several runs is still found.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::document::{cell_text, first_cell_text, paragraph_text, row_cells, table_rows, Document};
use crate::error::DocumentError;
use crate::xml::XmlElement;

/// Any `{{...}}` span, shortest match.
pub static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{.*?\}\}").expect("valid placeholder regex"));

/// `{{DYNAMIC_TABLE::<ID>}}`, capturing the id.
pub static DYNAMIC_TABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{DYNAMIC_TABLE::([A-Za-z0-9_]+)\}\}").expect("valid table marker regex")
});

/// Table id of the first dynamic-table marker in `text`.
pub fn table_marker_id(text: &str) -> Option<&str> {
    DYNAMIC_TABLE_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Table discovered through its template row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScannedTable {
    /// Keys from cells 1..N of the template row, first occurrence order.
    pub template_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// Simple placeholders, table markers excluded.
    pub keys: BTreeSet<String>,
    pub tables: BTreeMap<String, ScannedTable>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.tables.is_empty()
    }
}

/// Open `path` read-only and scan it.
#[instrument(level = "debug")]
pub fn scan_template(path: &Path) -> Result<ScanResult, DocumentError> {
    let document = Document::open(path)?;
    let result = scan(&document);
    info!(
        "Scanned {:?}: {} keys, {} dynamic tables",
        path,
        result.keys.len(),
        result.tables.len()
    );
    Ok(result)
}

pub fn scan(document: &Document) -> ScanResult {
    scan_body(document.body())
}

pub fn scan_body(body: &XmlElement) -> ScanResult {
    let mut result = ScanResult::default();

    body.visit("p", &mut |p| {
        let text = paragraph_text(p);
        for m in KEY_PATTERN.find_iter(&text) {
            let key = m.as_str();
            if DYNAMIC_TABLE_PATTERN.is_match(key) {
                continue;
            }
            result.keys.insert(key.to_string());
        }
    });

    body.visit("tbl", &mut |table| scan_table(table, &mut result.tables));

    result
}

fn scan_table(table: &XmlElement, tables: &mut BTreeMap<String, ScannedTable>) {
    let mut template_found: Option<String> = None;

    for (row_index, row) in table_rows(table).enumerate() {
        let Some(first) = first_cell_text(row) else {
            continue;
        };
        let Some(table_id) = table_marker_id(&first) else {
            continue;
        };

        if let Some(current) = &template_found {
            warn!(
                "Table with template row {} has a second marker {} at row {}; ignored",
                current, table_id, row_index
            );
            continue;
        }
        template_found = Some(table_id.to_string());

        if tables.contains_key(table_id) {
            debug!("Dynamic table {} already defined by an earlier table", table_id);
            continue;
        }

        let mut template_keys: Vec<String> = Vec::new();
        for cell in row_cells(row).skip(1) {
            let text = cell_text(cell);
            for m in KEY_PATTERN.find_iter(&text) {
                let key = m.as_str();
                if DYNAMIC_TABLE_PATTERN.is_match(key) || template_keys.iter().any(|k| k == key) {
                    continue;
                }
                template_keys.push(key.to_string());
            }
        }
        debug!(
            "Dynamic table {} (row {}) template keys: {:?}",
            table_id, row_index, template_keys
        );
        tables.insert(table_id.to_string(), ScannedTable { template_keys });
    }
}
