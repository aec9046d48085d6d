//! Error types for the merge engine and the project session.

use std::path::PathBuf;

/// Failure to read, parse or write a DOCX package.
///
/// A scan that hits one of these yields no results at all.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid DOCX container: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed XML in {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("Part {0} is not valid UTF-8")]
    Utf8(String),

    #[error("Part not found in DOCX: {0}")]
    MissingPart(String),

    #[error("Main document part has no w:body element")]
    MissingBody,
}

/// Fatal merge failures. Anything after the initial copy also removes the
/// partially written output.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("Output path is the template itself: {}", .0.display())]
    OutputIsTemplate(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

/// Non-fatal conditions collected while merging.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeWarning {
    /// The template row does not cover the table grid, so the generated row
    /// was skipped.
    StructuralMismatch {
        table_id: String,
        record: usize,
        expected: usize,
        actual: usize,
    },
}

impl std::fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeWarning::StructuralMismatch {
                table_id,
                record,
                expected,
                actual,
            } => write!(
                f,
                "table {}: row {} skipped, it spans {} grid columns but the grid has {}",
                table_id, record, actual, expected
            ),
        }
    }
}

/// Project session and sidecar errors.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid project JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not a DOCX template: {}", .0.display())]
    InvalidTemplate(PathBuf),

    #[error("Invalid project file: missing field {0}")]
    InvalidFormat(&'static str),

    #[error("Entry {id} exists with a different kind")]
    KindMismatch { id: String },

    #[error("Key {0} is frozen")]
    Frozen(String),

    #[error("No entry named {0}")]
    NotFound(String),

    #[error("Project has no output directory")]
    NoOutputPath,

    #[error("Project has never been saved and no path was given")]
    NoProjectPath,

    #[error(transparent)]
    Document(#[from] DocumentError),
}
