use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_PROJECT: &str = "project.dfp";

/// Configuration for the docx-merge command line.
#[derive(Parser, Debug)]
#[command(name = "docx-merge", version)]
#[command(about = "Fill DOCX templates from a docx-merge project")]
pub struct Config {
    /// Project sidecar file; a missing .dfp extension is added
    #[arg(long, global = true, default_value = DEFAULT_PROJECT, env = "DOCX_MERGE_PROJECT")]
    pub project: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info", env = "DOCX_MERGE_LOG")]
    pub log_level: String,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty project
    Init,
    /// Add templates and scan them for keys and tables
    AddTemplate {
        #[arg(required = true)]
        templates: Vec<PathBuf>,
    },
    /// Remove a template from the project
    RemoveTemplate { template: PathBuf },
    /// Scan every template again
    Rescan,
    /// List keys and tables
    List,
    /// Set the value of a key
    Set { key: String, value: String },
    /// Protect a key from edits
    Freeze { key: String },
    Unfreeze { key: String },
    /// Append a row to a dynamic table
    AddRow {
        table: String,
        /// KEY=VALUE pairs; braces around KEY are optional
        #[arg(value_parser = parse_assignment)]
        values: Vec<(String, String)>,
    },
    /// Remove every row of a dynamic table
    ClearRows { table: String },
    /// Set the output directory
    Output { dir: PathBuf },
    /// Merge templates
    Generate {
        /// Merge a single template instead of the project's templates
        #[arg(long, requires = "output")]
        template: Option<PathBuf>,
        /// Output file for --template
        #[arg(long, requires = "template")]
        output: Option<PathBuf>,
    },
}

/// `KEY=VALUE`, with `KEY` normalised to `{{KEY}}`.
pub fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {:?}", raw));
    }
    Ok((normalize_key(key), value.to_string()))
}

pub fn normalize_key(key: &str) -> String {
    if key.starts_with("{{") && key.ends_with("}}") {
        key.to_string()
    } else {
        format!("{{{{{}}}}}", key)
    }
}
