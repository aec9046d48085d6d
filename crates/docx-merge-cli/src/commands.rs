use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Serialize;
use tracing::{info, warn};

use docx_merge_core::{generate, sidecar_path, Entry, MergeOutcome, MergeReport, Project, Record};

use crate::config::{Command, Config};

/// Run one command against the project file. Returns false when part of the
/// work failed without aborting the command.
pub fn run(config: &Config) -> anyhow::Result<bool> {
    let project_path = sidecar_path(&config.project);
    if let Command::Init = config.command {
        return init(&project_path);
    }

    let mut project = Project::load(&project_path)
        .with_context(|| format!("Failed to load project {:?}", project_path))?;
    info!("Project {}", project.display_name());

    let succeeded = match &config.command {
        Command::Init => true,
        Command::AddTemplate { templates } => add_templates(&mut project, templates)?,
        Command::RemoveTemplate { template } => {
            if !project.remove_template(template) {
                bail!("Template {:?} is not part of the project", template);
            }
            true
        }
        Command::Rescan => rescan(&mut project),
        Command::List => {
            print!("{}", render_list(&project, config.json)?);
            true
        }
        Command::Set { key, value } => {
            let key = crate::config::normalize_key(key);
            project
                .set_value(&key, value)
                .with_context(|| format!("Failed to set {}", key))?;
            true
        }
        Command::Freeze { key } | Command::Unfreeze { key } => {
            let frozen = matches!(config.command, Command::Freeze { .. });
            let key = crate::config::normalize_key(key);
            project
                .set_frozen(&key, frozen)
                .with_context(|| format!("Failed to update {}", key))?;
            true
        }
        Command::AddRow { table, values } => {
            add_row(&mut project, table, values)?;
            true
        }
        Command::ClearRows { table } => {
            project
                .clear_rows(table)
                .with_context(|| format!("Failed to clear table {}", table))?;
            true
        }
        Command::Output { dir } => {
            project
                .set_output_path(dir)
                .with_context(|| format!("Failed to use output directory {:?}", dir))?;
            true
        }
        Command::Generate { template, output } => match (template, output) {
            (Some(template), Some(output)) => generate_one(&project, template, output, config.json)?,
            _ => generate_all(&project, config.json)?,
        },
    };

    if project.is_modified() {
        project
            .save(None)
            .with_context(|| format!("Failed to save project {:?}", project_path))?;
    }
    Ok(succeeded)
}

fn init(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        bail!("Project {:?} already exists", path);
    }
    let mut project = Project::new();
    let saved = project
        .save(Some(path))
        .with_context(|| format!("Failed to create project {:?}", path))?;
    println!("Created {}", saved.display());
    Ok(true)
}

fn add_templates(project: &mut Project, templates: &[PathBuf]) -> anyhow::Result<bool> {
    let mut succeeded = true;
    for template in templates {
        let added = project
            .add_template(template)
            .with_context(|| format!("Cannot add template {:?}", template))?;
        if !added {
            println!("{}: already in project", template.display());
            continue;
        }
        match project.scan_template(template) {
            Ok(summary) => println!(
                "{}: {} new keys, {} new tables",
                template.display(),
                summary.new_keys,
                summary.new_tables
            ),
            Err(e) => {
                eprintln!("{}: scan failed: {}", template.display(), e);
                succeeded = false;
            }
        }
    }
    Ok(succeeded)
}

fn rescan(project: &mut Project) -> bool {
    let mut succeeded = true;
    let mut total = docx_merge_core::ScanSummary::default();
    for template in project.template_paths().to_vec() {
        match project.scan_template(&template) {
            Ok(summary) => total += summary,
            Err(e) => {
                eprintln!("{}: scan failed: {}", template.display(), e);
                succeeded = false;
            }
        }
    }
    println!("{} new keys, {} new tables", total.new_keys, total.new_tables);
    succeeded
}

fn render_list(project: &Project, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(project.keys_data())?));
    }
    let mut out = String::new();
    for (id, entry) in project.entries() {
        match entry {
            Entry::Table(table) => {
                out.push_str(&format!(
                    "[TABLE] {}  {} rows  columns: {}\n",
                    id,
                    table.data.len(),
                    table.column_labels().join(", ")
                ));
            }
            Entry::Key(record) => {
                let status = serde_json::to_value(record.status)?;
                let frozen = if record.is_frozen { " frozen" } else { "" };
                out.push_str(&format!(
                    "{}  [{}{}]  {}\n",
                    id,
                    status.as_str().unwrap_or_default(),
                    frozen,
                    record.value
                ));
            }
        }
    }
    Ok(out)
}

fn add_row(project: &mut Project, table: &str, values: &[(String, String)]) -> anyhow::Result<()> {
    for key in unknown_columns(project, table, values) {
        warn!("{} is not a column of table {}; it will not be rendered", key, table);
    }

    let record: Record = values.iter().cloned().collect();
    project
        .add_row(table, record)
        .with_context(|| format!("Failed to add a row to {}", table))?;
    Ok(())
}

/// Keys of `values` that no column of `table` renders.
fn unknown_columns<'a>(project: &Project, table: &str, values: &'a [(String, String)]) -> Vec<&'a str> {
    let template_keys = project
        .entry(table)
        .and_then(Entry::as_table)
        .map(|t| t.template_keys.as_slice())
        .unwrap_or_default();
    values
        .iter()
        .map(|(key, _)| key.as_str())
        .filter(|key| !template_keys.iter().any(|k| k == key))
        .collect()
}

#[derive(Debug, Serialize)]
struct GenerateOutput<'a> {
    template: &'a Path,
    output: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a MergeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn print_report(report: &MergeReport) {
    println!(
        "{} -> {}: {} replacements, {} tables, {} rows",
        report.template.display(),
        report.output.display(),
        report.replacements,
        report.tables_expanded,
        report.rows_generated
    );
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
}

fn generate_one(project: &Project, template: &Path, output: &Path, json: bool) -> anyhow::Result<bool> {
    let report = generate(template, output, project.keys_data())
        .with_context(|| format!("Failed to generate {:?}", output))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(true)
}

fn generate_all(project: &Project, json: bool) -> anyhow::Result<bool> {
    let outcomes = project.generate_all().context("Failed to generate documents")?;
    if outcomes.is_empty() {
        println!("No templates in project");
    }

    let succeeded = outcomes.iter().all(|outcome| outcome.result.is_ok());
    if json {
        println!("{}", serde_json::to_string_pretty(&generate_rows(&outcomes))?);
        return Ok(succeeded);
    }
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => print_report(report),
            Err(e) => eprintln!("{}: {}", outcome.template.display(), e),
        }
    }
    Ok(succeeded)
}

fn generate_rows(outcomes: &[MergeOutcome]) -> Vec<GenerateOutput<'_>> {
    outcomes
        .iter()
        .map(|outcome| GenerateOutput {
            template: &outcome.template,
            output: &outcome.output,
            report: outcome.result.as_ref().ok(),
            error: outcome.result.as_ref().err().map(|e| e.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use docx_merge_core::{paragraph_text, Document};
    use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn row(cells: &[&str]) -> TableRow {
        TableRow::new(
            cells
                .iter()
                .map(|text| TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text))))
                .collect(),
        )
    }

    fn letter_template(path: &Path) {
        let docx = Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Dear {{NAME}}")))
            .add_table(Table::new(vec![
                row(&["No", "Model", "Qty"]),
                row(&["{{DYNAMIC_TABLE::HW}}", "{{MODEL}}", "{{QTY}}"]),
            ]));
        docx.build().pack(std::fs::File::create(path).unwrap()).unwrap();
    }

    fn run_with(project: &Path, args: &[&str]) -> anyhow::Result<bool> {
        let mut argv = vec!["docx-merge", "--project", project.to_str().unwrap()];
        argv.extend_from_slice(args);
        run(&Config::try_parse_from(argv).unwrap())
    }

    /// A project at `<dir>/job.dfp` holding the letter template.
    fn letter_project() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("letter.docx");
        letter_template(&template);
        let project = dir.path().join("job.dfp");
        assert!(run_with(&project, &["init"]).unwrap());
        assert!(run_with(&project, &["add-template", template.to_str().unwrap()]).unwrap());
        (dir, project, template)
    }

    fn key_value(project: &Project, key: &str) -> (String, bool) {
        let record = project.entry(key).and_then(Entry::as_key).unwrap();
        (record.value.clone(), record.is_frozen)
    }

    #[test]
    fn test_project_path_without_extension_is_reused() {
        let dir = TempDir::new().unwrap();
        let bare = dir.path().join("job");

        assert!(run_with(&bare, &["init"]).unwrap());
        assert!(dir.path().join("job.dfp").is_file());
        assert!(!bare.exists());

        assert!(run_with(&bare, &["output", dir.path().join("out").to_str().unwrap()]).unwrap());
        assert!(run_with(&dir.path().join("job.json"), &["list"]).unwrap());

        let saved = Project::load(&dir.path().join("job.dfp")).unwrap();
        assert_eq!(saved.output_path(), Some(dir.path().join("out").as_path()));
        assert!(!dir.path().join("job.json").exists());
    }

    #[test]
    fn test_init_refuses_existing_project() {
        let (_dir, project, _) = letter_project();
        assert!(run_with(&project, &["init"]).is_err());
    }

    #[test]
    fn test_edits_are_saved() {
        let (_dir, project, _) = letter_project();

        assert!(run_with(&project, &["set", "NAME", "Ann"]).unwrap());
        assert!(run_with(&project, &["freeze", "{{NAME}}"]).unwrap());
        assert!(run_with(&project, &["set", "NAME", "Bob"]).is_err());

        let saved = Project::load(&project).unwrap();
        assert_eq!(key_value(&saved, "{{NAME}}"), ("Ann".to_string(), true));
        assert!(!saved.is_modified());
    }

    #[test]
    fn test_add_row_normalises_keys() {
        let (_dir, project, _) = letter_project();

        assert!(run_with(&project, &["add-row", "HW", "MODEL=X1", "{{QTY}}=3", "COLOR=red"]).unwrap());

        let saved = Project::load(&project).unwrap();
        let table = saved.entry("HW").and_then(Entry::as_table).unwrap();
        assert_eq!(
            table.data,
            vec![Record::from([
                ("{{COLOR}}".to_string(), "red".to_string()),
                ("{{MODEL}}".to_string(), "X1".to_string()),
                ("{{QTY}}".to_string(), "3".to_string()),
            ])]
        );

        let values = vec![
            ("{{MODEL}}".to_string(), "X2".to_string()),
            ("{{COLOR}}".to_string(), "blue".to_string()),
        ];
        assert_eq!(unknown_columns(&saved, "HW", &values), vec!["{{COLOR}}"]);
        assert_eq!(unknown_columns(&saved, "NOPE", &values).len(), 2);
    }

    #[test]
    fn test_render_list() {
        let (_dir, project, _) = letter_project();
        run_with(&project, &["set", "NAME", "Ann"]).unwrap();
        run_with(&project, &["add-row", "HW", "MODEL=X1", "QTY=3"]).unwrap();
        let saved = Project::load(&project).unwrap();

        let json: serde_json::Value = serde_json::from_str(&render_list(&saved, true).unwrap()).unwrap();
        assert_eq!(json["{{NAME}}"]["value"], "Ann");
        assert_eq!(json["{{NAME}}"]["status"], "filled");
        assert_eq!(json["HW"]["type"], "dynamic_table");

        let text = render_list(&saved, false).unwrap();
        assert!(text.contains("[TABLE] HW  1 rows  columns: MODEL, QTY\n"));
        assert!(text.contains("{{NAME}}  [filled]  Ann\n"));
        assert!(text.contains("{{QTY}}  [empty]  \n"));
    }

    #[test]
    fn test_generate_reports_failure_in_exit_status() {
        let (dir, project, template) = letter_project();
        let out_dir = dir.path().join("out");
        run_with(&project, &["set", "NAME", "Ann"]).unwrap();
        run_with(&project, &["output", out_dir.to_str().unwrap()]).unwrap();

        assert!(run_with(&project, &["generate"]).unwrap());
        let document = Document::open(&out_dir.join("letter.docx")).unwrap();
        assert_eq!(paragraph_text(document.paragraphs().next().unwrap()), "Dear Ann");

        std::fs::remove_file(&template).unwrap();
        assert!(!run_with(&project, &["--json", "generate"]).unwrap());
        assert!(!run_with(&project, &["rescan"]).unwrap());
    }

    #[test]
    fn test_generate_rows_carry_errors() {
        let (dir, project, template) = letter_project();
        let mut loaded = Project::load(&project).unwrap();
        loaded.set_output_path(&dir.path().join("out")).unwrap();
        std::fs::remove_file(&template).unwrap();

        let outcomes = loaded.generate_all().unwrap();
        let rows = serde_json::to_value(generate_rows(&outcomes)).unwrap();

        assert_eq!(rows[0]["template"], template.to_str().unwrap());
        assert!(rows[0].get("report").is_none());
        assert!(rows[0]["error"].as_str().unwrap().starts_with("Template not found"));
    }

    #[test]
    fn test_single_template_generate() {
        let (dir, project, template) = letter_project();
        let output = dir.path().join("single.docx");

        let ok = run_with(
            &project,
            &["generate", "--template", template.to_str().unwrap(), "--output", output.to_str().unwrap()],
        )
        .unwrap();

        assert!(ok);
        assert!(output.is_file());
        let onto_template = run_with(
            &project,
            &["generate", "--template", template.to_str().unwrap(), "--output", template.to_str().unwrap()],
        );
        assert!(onto_template.is_err());
    }
}
