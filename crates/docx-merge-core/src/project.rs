//! Project session: templates, output directory and the keys data, persisted
//! as a `.dfp` JSON sidecar.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{MergeError, ProjectError};
use crate::merge::{generate, MergeReport};
use crate::scanner::{self, ScanResult};

pub const PROJECT_EXTENSION: &str = "dfp";
pub const SIDECAR_VERSION: &str = "1.0";
const UNTITLED: &str = "Untitled";

/// Identifier (placeholder key or table id) to entry, sorted by identifier.
pub type KeysData = BTreeMap<String, Entry>;

/// One table row: template key to cell text.
pub type Record = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    #[default]
    Empty,
    Filled,
    /// Reserved for validation; never set automatically.
    Invalid,
}

impl KeyStatus {
    pub fn derive(value: &str) -> Self {
        if value.is_empty() {
            KeyStatus::Empty
        } else {
            KeyStatus::Filled
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub status: KeyStatus,
    #[serde(default)]
    pub is_frozen: bool,
}

impl KeyRecord {
    /// Unfrozen record with the status derived from `value`.
    pub fn with_value(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            status: KeyStatus::derive(&value),
            value,
            is_frozen: false,
        }
    }
}

/// Serialised as `"type": "dynamic_table"`, which tells tables apart from keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DynamicTableTag {
    #[default]
    #[serde(rename = "dynamic_table")]
    DynamicTable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    #[serde(rename = "type")]
    pub kind: DynamicTableTag,
    /// Display labels; empty means derive from `template_keys`.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Owned by the scanner.
    #[serde(default)]
    pub template_keys: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_records")]
    pub data: Vec<Record>,
}

impl TableDefinition {
    pub fn new(template_keys: Vec<String>) -> Self {
        Self {
            template_keys,
            ..Self::default()
        }
    }

    /// One label per template key: the stored `columns` when they line up,
    /// else the key without braces and spaces, else `Column N`.
    pub fn column_labels(&self) -> Vec<String> {
        if !self.columns.is_empty() && self.columns.len() == self.template_keys.len() {
            return self.columns.clone();
        }
        self.template_keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let label = key.trim_matches(|c| c == '{' || c == '}' || c == ' ');
                if label.is_empty() {
                    format!("Column {}", i + 1)
                } else {
                    label.to_string()
                }
            })
            .collect()
    }
}

/// Hand-edited sidecars may hold numbers or booleans in table rows.
fn deserialize_records<'de, D>(deserializer: D) -> Result<Vec<Record>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<BTreeMap<String, serde_json::Value>> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(key, value)| {
                    let text = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (key, text)
                })
                .collect()
        })
        .collect())
}

/// An entry of the keys data. Tables carry a `type` discriminant; anything
/// else is a simple key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Entry {
    Table(TableDefinition),
    Key(KeyRecord),
}

impl<'de> Deserialize<'de> for Entry {
    /// Dispatch on `type`: once an entry says it is a table, a malformed body
    /// is an error rather than a fallback to a key.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let is_table = value.get("type").and_then(serde_json::Value::as_str) == Some("dynamic_table");
        let entry = if is_table {
            TableDefinition::deserialize(value).map(Entry::Table)
        } else {
            KeyRecord::deserialize(value).map(Entry::Key)
        };
        entry.map_err(serde::de::Error::custom)
    }
}

impl Entry {
    pub fn as_key(&self) -> Option<&KeyRecord> {
        match self {
            Entry::Key(record) => Some(record),
            Entry::Table(_) => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableDefinition> {
        match self {
            Entry::Table(table) => Some(table),
            Entry::Key(_) => None,
        }
    }
}

/// Entries a scan added to the project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub new_keys: usize,
    pub new_tables: usize,
}

impl std::ops::AddAssign for ScanSummary {
    fn add_assign(&mut self, other: Self) {
        self.new_keys += other.new_keys;
        self.new_tables += other.new_tables;
    }
}

/// Result of merging one template of the project.
#[derive(Debug)]
pub struct MergeOutcome {
    pub template: PathBuf,
    pub output: PathBuf,
    pub result: Result<MergeReport, MergeError>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    #[serde(default)]
    version: String,
    template_paths: Vec<PathBuf>,
    output_path: Option<PathBuf>,
    keys_data: KeysData,
}

const REQUIRED_FIELDS: [&str; 3] = ["template_paths", "output_path", "keys_data"];

#[derive(Debug, Clone, Default)]
pub struct Project {
    path: Option<PathBuf>,
    template_paths: Vec<PathBuf>,
    output_path: Option<PathBuf>,
    keys_data: KeysData,
    modified: bool,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn template_paths(&self) -> &[PathBuf] {
        &self.template_paths
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn keys_data(&self) -> &KeysData {
        &self.keys_data
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Sidecar file name, or "Untitled" for a project never saved.
    pub fn display_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNTITLED.to_string())
    }

    // -----------------------------------------------------------------------
    // Templates and output
    // -----------------------------------------------------------------------

    /// Add an existing `.docx` file. Returns false if it is already listed.
    pub fn add_template(&mut self, path: &Path) -> Result<bool, ProjectError> {
        let is_docx = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"));
        if !path.is_file() || !is_docx {
            return Err(ProjectError::InvalidTemplate(path.to_path_buf()));
        }
        if self.template_paths.iter().any(|p| p == path) {
            return Ok(false);
        }
        self.template_paths.push(path.to_path_buf());
        self.modified = true;
        info!("Template added: {:?}", path);
        Ok(true)
    }

    pub fn remove_template(&mut self, path: &Path) -> bool {
        let before = self.template_paths.len();
        self.template_paths.retain(|p| p != path);
        let removed = self.template_paths.len() != before;
        if removed {
            self.modified = true;
            info!("Template removed: {:?}", path);
        }
        removed
    }

    /// Set the output directory, creating it when missing.
    pub fn set_output_path(&mut self, dir: &Path) -> Result<(), ProjectError> {
        std::fs::create_dir_all(dir)?;
        self.output_path = Some(dir.to_path_buf());
        self.modified = true;
        info!("Output directory set: {:?}", dir);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Scan one template and merge what it finds into the project. A failed
    /// scan leaves the project untouched.
    #[instrument(skip(self), level = "debug")]
    pub fn scan_template(&mut self, path: &Path) -> Result<ScanSummary, ProjectError> {
        let result = scanner::scan_template(path).map_err(|e| {
            warn!("Scan of {:?} failed: {}", path, e);
            e
        })?;
        Ok(self.apply_scan(&result))
    }

    /// Union a scan result into the keys data; existing entries are kept as is.
    pub fn apply_scan(&mut self, result: &ScanResult) -> ScanSummary {
        let mut summary = ScanSummary::default();
        for key in &result.keys {
            if self.register_key(key) {
                summary.new_keys += 1;
            }
        }
        for (id, table) in &result.tables {
            if self.register_table(id, &table.template_keys) {
                summary.new_tables += 1;
            }
        }
        summary
    }

    /// Add an empty, unfrozen key. No-op when `key` is already present.
    pub fn register_key(&mut self, key: &str) -> bool {
        if self.keys_data.contains_key(key) {
            return false;
        }
        self.keys_data
            .insert(key.to_string(), Entry::Key(KeyRecord::default()));
        self.modified = true;
        debug!("New key: {}", key);
        true
    }

    /// Add an empty table definition. No-op when `id` is already present.
    pub fn register_table(&mut self, id: &str, template_keys: &[String]) -> bool {
        if self.keys_data.contains_key(id) {
            return false;
        }
        self.keys_data.insert(
            id.to_string(),
            Entry::Table(TableDefinition::new(template_keys.to_vec())),
        );
        self.modified = true;
        debug!("New dynamic table {} with keys {:?}", id, template_keys);
        true
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    pub fn entry(&self, id: &str) -> Option<&Entry> {
        self.keys_data.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.keys_data.iter().map(|(id, entry)| (id.as_str(), entry))
    }

    /// Replace an entry with `entry`. Returns whether anything changed.
    ///
    /// Keys take value, status and frozen flag from `entry`; a frozen key
    /// cannot change value unless the same update unfreezes it. Tables take
    /// only their data rows. Unknown ids are inserted.
    pub fn update_entry(&mut self, id: &str, entry: Entry) -> Result<bool, ProjectError> {
        let Some(current) = self.keys_data.get_mut(id) else {
            self.keys_data.insert(id.to_string(), entry);
            self.modified = true;
            info!("Entry {} added", id);
            return Ok(true);
        };

        let changed = match (current, entry) {
            (Entry::Key(old), Entry::Key(new)) => {
                if old.is_frozen && new.is_frozen && old.value != new.value {
                    return Err(ProjectError::Frozen(id.to_string()));
                }
                if old.value != new.value || old.is_frozen != new.is_frozen {
                    *old = new;
                    true
                } else {
                    false
                }
            }
            (Entry::Table(old), Entry::Table(new)) => {
                if old.data != new.data {
                    old.data = new.data;
                    true
                } else {
                    false
                }
            }
            _ => {
                return Err(ProjectError::KindMismatch { id: id.to_string() });
            }
        };

        if changed {
            self.modified = true;
            debug!("Entry {} updated", id);
        }
        Ok(changed)
    }

    fn key_record(&self, key: &str) -> Result<&KeyRecord, ProjectError> {
        self.entry(key)
            .ok_or_else(|| ProjectError::NotFound(key.to_string()))?
            .as_key()
            .ok_or_else(|| ProjectError::KindMismatch { id: key.to_string() })
    }

    fn table(&self, id: &str) -> Result<&TableDefinition, ProjectError> {
        self.entry(id)
            .ok_or_else(|| ProjectError::NotFound(id.to_string()))?
            .as_table()
            .ok_or_else(|| ProjectError::KindMismatch { id: id.to_string() })
    }

    /// Set a key's value, keeping its frozen flag.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<bool, ProjectError> {
        let current = self.key_record(key)?;
        let record = KeyRecord {
            is_frozen: current.is_frozen,
            ..KeyRecord::with_value(value)
        };
        self.update_entry(key, Entry::Key(record))
    }

    pub fn set_frozen(&mut self, key: &str, frozen: bool) -> Result<bool, ProjectError> {
        let record = KeyRecord {
            is_frozen: frozen,
            ..self.key_record(key)?.clone()
        };
        self.update_entry(key, Entry::Key(record))
    }

    /// Append one record to a table's data.
    pub fn add_row(&mut self, id: &str, record: Record) -> Result<bool, ProjectError> {
        let mut table = self.table(id)?.clone();
        table.data.push(record);
        self.update_entry(id, Entry::Table(table))
    }

    pub fn clear_rows(&mut self, id: &str) -> Result<bool, ProjectError> {
        let mut table = self.table(id)?.clone();
        table.data.clear();
        self.update_entry(id, Entry::Table(table))
    }

    // -----------------------------------------------------------------------
    // Generation
    // -----------------------------------------------------------------------

    /// Merge every template into the output directory under its own file
    /// name. One failed template does not stop the others.
    #[instrument(skip(self), level = "debug")]
    pub fn generate_all(&self) -> Result<Vec<MergeOutcome>, ProjectError> {
        let output_dir = self.output_path.as_deref().ok_or(ProjectError::NoOutputPath)?;

        let mut outcomes = Vec::with_capacity(self.template_paths.len());
        for template in &self.template_paths {
            let Some(file_name) = template.file_name() else {
                warn!("Template path {:?} has no file name; skipped", template);
                continue;
            };
            let output = output_dir.join(file_name);
            let result = generate(template, &output, &self.keys_data);
            if let Err(e) = &result {
                warn!("Merge of {:?} failed: {}", template, e);
            }
            outcomes.push(MergeOutcome {
                template: template.clone(),
                output,
                result,
            });
        }
        Ok(outcomes)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the sidecar to `path` (or the last save location), forcing the
    /// `.dfp` extension. Returns the path written.
    pub fn save(&mut self, path: Option<&Path>) -> Result<PathBuf, ProjectError> {
        let target = path
            .or(self.path.as_deref())
            .ok_or(ProjectError::NoProjectPath)?;
        let target = sidecar_path(target);

        let sidecar = Sidecar {
            version: SIDECAR_VERSION.to_string(),
            template_paths: self.template_paths.clone(),
            output_path: self.output_path.clone(),
            keys_data: self.keys_data.clone(),
        };
        let json = serde_json::to_string_pretty(&sidecar)?;
        std::fs::write(&target, json)?;

        self.path = Some(target.clone());
        self.modified = false;
        info!("Project saved to {:?}", target);
        Ok(target)
    }

    /// Read the sidecar at `path`, under the same `.dfp` rule as `save`.
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let path = sidecar_path(path);
        let text = std::fs::read_to_string(&path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        for field in REQUIRED_FIELDS {
            if value.get(field).is_none() {
                return Err(ProjectError::InvalidFormat(field));
            }
        }
        let sidecar: Sidecar = serde_json::from_value(value)?;
        if sidecar.version != SIDECAR_VERSION {
            debug!("Project version {:?}, expected {}", sidecar.version, SIDECAR_VERSION);
        }

        info!("Project loaded from {:?}", path);
        Ok(Self {
            path: Some(path),
            template_paths: sidecar.template_paths,
            output_path: sidecar.output_path,
            keys_data: sidecar.keys_data,
            modified: false,
        })
    }
}

/// `path` with the `.dfp` extension, which every sidecar carries.
pub fn sidecar_path(path: &Path) -> PathBuf {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PROJECT_EXTENSION))
    {
        path.to_path_buf()
    } else {
        path.with_extension(PROJECT_EXTENSION)
    }
}
