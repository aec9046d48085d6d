//! Merge orchestration: template in, populated copy out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::document::Document;
use crate::error::{MergeError, MergeWarning};
use crate::project::{Entry, KeysData, TableDefinition};
use crate::splice::replace_all;
use crate::table::expand_tables;
use crate::xml::XmlElement;

/// Summary of one successful merge.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub template: PathBuf,
    pub output: PathBuf,
    /// Number of placeholder occurrences substituted.
    pub replacements: usize,
    pub tables_expanded: usize,
    pub rows_generated: usize,
    pub warnings: Vec<MergeWarning>,
    pub generated_at: DateTime<Utc>,
}

/// Copy `template` to `output` and populate the copy from `keys_data`.
///
/// The template file is never written: an `output` that resolves to the
/// template is rejected before anything is copied. On any failure after the
/// copy the output file is removed.
#[instrument(skip(keys_data), level = "debug")]
pub fn generate(
    template: &Path,
    output: &Path,
    keys_data: &KeysData,
) -> Result<MergeReport, MergeError> {
    if !template.is_file() {
        return Err(MergeError::TemplateNotFound(template.to_path_buf()));
    }
    if is_same_file(template, output) {
        return Err(MergeError::OutputIsTemplate(output.to_path_buf()));
    }

    std::fs::copy(template, output).map_err(|source| MergeError::Io {
        path: output.to_path_buf(),
        source,
    })?;

    match populate(template, output, keys_data) {
        Ok(report) => {
            info!(
                "Generated {:?}: {} replacements, {} tables, {} rows",
                output, report.replacements, report.tables_expanded, report.rows_generated
            );
            Ok(report)
        }
        Err(e) => {
            warn!("Merge of {:?} failed, removing {:?}: {}", template, output, e);
            if let Err(remove_err) = std::fs::remove_file(output) {
                debug!("Could not remove partial output {:?}: {}", output, remove_err);
            }
            Err(e)
        }
    }
}

/// An output that does not exist yet cannot alias the template.
fn is_same_file(template: &Path, output: &Path) -> bool {
    match (template.canonicalize(), output.canonicalize()) {
        (Ok(template), Ok(output)) => template == output,
        _ => false,
    }
}

fn populate(template: &Path, output: &Path, keys_data: &KeysData) -> Result<MergeReport, MergeError> {
    let mut document = Document::open(output)?;

    let (simple, tables) = partition(keys_data);
    debug!("{} simple keys, {} table definitions", simple.len(), tables.len());

    let body = document.body_mut();

    // Top-level paragraphs first, so keys outside tables are settled before
    // any table content is generated.
    let mut replacements = 0;
    for p in body.elements_mut().filter(|el| el.is_w("p")) {
        replacements += splice_keys(p, &simple);
    }

    let stats = expand_tables(body, &tables);

    // Everything else: table cells, generated rows, text boxes.
    body.visit_mut("p", &mut |p| {
        replacements += splice_keys(p, &simple);
    });

    document.save(output)?;

    Ok(MergeReport {
        template: template.to_path_buf(),
        output: output.to_path_buf(),
        replacements,
        tables_expanded: stats.tables_expanded,
        rows_generated: stats.rows_generated,
        warnings: stats.warnings,
        generated_at: Utc::now(),
    })
}

/// Split the project data into key → value and table id → definition.
pub fn partition(keys_data: &KeysData) -> (BTreeMap<&str, &str>, BTreeMap<&str, &TableDefinition>) {
    let mut simple = BTreeMap::new();
    let mut tables = BTreeMap::new();
    for (id, entry) in keys_data {
        match entry {
            Entry::Key(record) => {
                simple.insert(id.as_str(), record.value.as_str());
            }
            Entry::Table(definition) => {
                tables.insert(id.as_str(), definition);
            }
        }
    }
    (simple, tables)
}

fn splice_keys(paragraph: &mut XmlElement, simple: &BTreeMap<&str, &str>) -> usize {
    simple
        .iter()
        .map(|(key, value)| replace_all(paragraph, key, value))
        .sum()
}
