//! Template-merge engine for DOCX documents.
//!
//! Templates carry literal `{{KEY}}` placeholders and tables tagged with a
//! `{{DYNAMIC_TABLE::ID}}` template row. This crate provides:
//! - `scanner`: placeholder and dynamic-table discovery
//! - `splice`: text replacement across formatting runs
//! - `table`: dynamic-table expansion with cell style copying
//! - `merge::generate`: template in, populated copy out
//! - `Project`: the editing session and its `.dfp` JSON sidecar

mod document;
mod error;
mod merge;
mod package;
mod project;
pub mod scanner;
pub mod splice;
mod style;
mod table;
mod xml;

pub use document::{
    cell_text, paragraph_runs, paragraph_text, row_cells, run_text, table_rows, Document,
    DOCUMENT_PART,
};
pub use error::{DocumentError, MergeError, MergeWarning, ProjectError};
pub use merge::{generate, partition, MergeReport};
pub use package::DocxPackage;
pub use project::{
    DynamicTableTag, Entry, KeyRecord, KeyStatus, KeysData, MergeOutcome, Project, Record,
    ScanSummary, TableDefinition, PROJECT_EXTENSION, SIDECAR_VERSION,
};
pub use project::sidecar_path;
pub use scanner::{scan_template, ScanResult, ScannedTable};
pub use table::{expand_tables, ExpansionStats};
pub use xml::{XmlElement, XmlNode, W_NS};
