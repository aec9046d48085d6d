use std::path::{Path, PathBuf};

use docx_merge_core::{
    cell_text, generate, paragraph_runs, paragraph_text, row_cells, run_text, scan_template,
    table_rows, Document, Entry, KeyRecord, KeysData, MergeError, Project, Record,
    TableDefinition,
};
use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};
use pretty_assertions::assert_eq;
use rstest::*;
use tempfile::TempDir;

fn paragraph(runs: &[&str]) -> Paragraph {
    runs.iter()
        .fold(Paragraph::new(), |p, text| p.add_run(Run::new().add_text(*text)))
}

fn row(cells: &[&str]) -> TableRow {
    TableRow::new(
        cells
            .iter()
            .map(|text| TableCell::new().add_paragraph(paragraph(&[*text])))
            .collect(),
    )
}

fn write_docx(path: &Path, docx: Docx) {
    let file = std::fs::File::create(path).unwrap();
    docx.build().pack(file).unwrap();
}

/// Letter with a split key, an unknown key and a hardware table.
fn letter_template(path: &Path) {
    let docx = Docx::new()
        .add_paragraph(paragraph(&["Name: ", "{{ORG", "_NAME}}", " end."]))
        .add_paragraph(paragraph(&["Keep {{UNKNOWN}} as is"]))
        .add_table(Table::new(vec![
            row(&["No", "Model", "Qty"]),
            row(&["{{DYNAMIC_TABLE::HW}}", "{{MODEL}}", "{{QTY}}"]),
            row(&["1", "sample", "0"]),
        ]))
        .add_table(Table::new(vec![row(&["Signed: {{SIGNER}}"])]));
    write_docx(path, docx);
}

fn keys_data() -> KeysData {
    let mut data = KeysData::new();
    data.insert("{{ORG_NAME}}".to_string(), Entry::Key(KeyRecord::with_value("Acme")));
    data.insert("{{SIGNER}}".to_string(), Entry::Key(KeyRecord::with_value("J. Doe")));

    let mut table = TableDefinition::new(vec!["{{MODEL}}".to_string(), "{{QTY}}".to_string()]);
    for (model, qty) in [("X1", "3"), ("X2", "1")] {
        table.data.push(Record::from([
            ("{{MODEL}}".to_string(), model.to_string()),
            ("{{QTY}}".to_string(), qty.to_string()),
        ]));
    }
    data.insert("HW".to_string(), Entry::Table(table));
    data
}

/// Every paragraph text in the body, table cells included.
fn all_paragraph_texts(document: &Document) -> Vec<String> {
    let mut texts = Vec::new();
    document.body().visit("p", &mut |p| texts.push(paragraph_text(p)));
    texts
}

fn table_texts(document: &Document, index: usize) -> Vec<Vec<String>> {
    table_rows(document.tables()[index])
        .map(|r| row_cells(r).map(cell_text).collect())
        .collect()
}

#[fixture]
fn workspace() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("letter.docx");
    letter_template(&template);
    (dir, template)
}

#[rstest]
fn test_generate_populates_copy(workspace: (TempDir, PathBuf)) {
    let (dir, template) = workspace;
    let output = dir.path().join("out.docx");

    let report = generate(&template, &output, &keys_data()).unwrap();

    assert_eq!(report.tables_expanded, 1);
    assert_eq!(report.rows_generated, 2);
    assert!(report.warnings.is_empty());
    assert_eq!(report.replacements, 2);

    let document = Document::open(&output).unwrap();
    let first = document.paragraphs().next().unwrap();
    assert_eq!(paragraph_text(first), "Name: Acme end.");
    let runs: Vec<String> = paragraph_runs(first).map(run_text).collect();
    assert_eq!(runs, vec!["Name: Acme", " end."]);

    assert_eq!(
        table_texts(&document, 0),
        vec![
            vec!["No", "Model", "Qty"],
            vec!["1", "X1", "3"],
            vec!["2", "X2", "1"],
        ]
    );
    assert_eq!(table_texts(&document, 1), vec![vec!["Signed: J. Doe"]]);
}

#[rstest]
fn test_unmapped_placeholders_survive(workspace: (TempDir, PathBuf)) {
    let (dir, template) = workspace;
    let output = dir.path().join("out.docx");

    generate(&template, &output, &keys_data()).unwrap();

    let texts = all_paragraph_texts(&Document::open(&output).unwrap());
    assert!(texts.iter().any(|t| t == "Keep {{UNKNOWN}} as is"));
    assert!(!texts.iter().any(|t| t.contains("DYNAMIC_TABLE")));
}

#[rstest]
fn test_template_is_never_modified(workspace: (TempDir, PathBuf)) {
    let (dir, template) = workspace;
    let before = std::fs::read(&template).unwrap();

    generate(&template, &dir.path().join("out.docx"), &keys_data()).unwrap();

    assert_eq!(std::fs::read(&template).unwrap(), before);
}

#[rstest]
fn test_empty_keys_data_keeps_text(workspace: (TempDir, PathBuf)) {
    let (dir, template) = workspace;
    let output = dir.path().join("out.docx");

    let report = generate(&template, &output, &KeysData::new()).unwrap();

    assert_eq!(report.replacements, 0);
    assert_eq!(report.tables_expanded, 0);
    let document = Document::open(&output).unwrap();
    assert_eq!(table_texts(&document, 0).len(), 3);
    assert_eq!(
        paragraph_text(document.paragraphs().next().unwrap()),
        "Name: {{ORG_NAME}} end."
    );
}

#[rstest]
fn test_missing_template(workspace: (TempDir, PathBuf)) {
    let (dir, _) = workspace;
    let output = dir.path().join("out.docx");

    let err = generate(&dir.path().join("nope.docx"), &output, &keys_data()).unwrap_err();

    assert!(matches!(err, MergeError::TemplateNotFound(_)));
    assert!(!output.exists());
}

#[rstest]
fn test_scan_finds_keys_and_tables(workspace: (TempDir, PathBuf)) {
    let (_dir, template) = workspace;

    let result = scan_template(&template).unwrap();

    let keys: Vec<&str> = result.keys.iter().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec!["{{MODEL}}", "{{ORG_NAME}}", "{{QTY}}", "{{SIGNER}}", "{{UNKNOWN}}"]
    );
    assert_eq!(
        result.tables["HW"].template_keys,
        vec!["{{MODEL}}".to_string(), "{{QTY}}".to_string()]
    );
}

#[rstest]
fn test_project_round_trip_and_generate_all(workspace: (TempDir, PathBuf)) {
    let (dir, template) = workspace;
    let out_dir = dir.path().join("generated");

    let mut project = Project::new();
    assert!(project.add_template(&template).unwrap());
    let summary = project.scan_template(&template).unwrap();
    assert_eq!(summary.new_keys, 5);
    assert_eq!(summary.new_tables, 1);
    assert_eq!(project.scan_template(&template).unwrap().new_keys, 0);

    project.set_value("{{ORG_NAME}}", "Acme").unwrap();
    project
        .add_row(
            "HW",
            Record::from([
                ("{{MODEL}}".to_string(), "X1".to_string()),
                ("{{QTY}}".to_string(), "3".to_string()),
            ]),
        )
        .unwrap();
    project.set_output_path(&out_dir).unwrap();
    let saved = project.save(Some(dir.path().join("job").as_path())).unwrap();

    let reloaded = Project::load(&saved).unwrap();
    let outcomes = reloaded.generate_all().unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].output, out_dir.join("letter.docx"));
    let report = outcomes[0].result.as_ref().unwrap();
    assert_eq!(report.rows_generated, 1);

    let document = Document::open(&out_dir.join("letter.docx")).unwrap();
    assert_eq!(table_texts(&document, 0)[1], vec!["1", "X1", "3"]);
}

#[rstest]
fn test_generate_all_reports_each_template(workspace: (TempDir, PathBuf)) {
    let (dir, template) = workspace;
    let second = dir.path().join("second.docx");
    letter_template(&second);

    let mut project = Project::new();
    project.add_template(&template).unwrap();
    project.add_template(&second).unwrap();
    project.set_output_path(&dir.path().join("out")).unwrap();
    std::fs::remove_file(&second).unwrap();

    let outcomes = project.generate_all().unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(outcomes[1].result, Err(MergeError::TemplateNotFound(_))));
    assert!(!outcomes[1].output.exists());
}

#[rstest]
fn test_output_onto_template_is_refused(workspace: (TempDir, PathBuf)) {
    let (_dir, template) = workspace;
    let before = std::fs::read(&template).unwrap();

    let err = generate(&template, &template, &keys_data()).unwrap_err();

    assert!(matches!(err, MergeError::OutputIsTemplate(_)));
    assert_eq!(std::fs::read(&template).unwrap(), before);
}

#[rstest]
fn test_generate_all_into_template_dir_keeps_template(workspace: (TempDir, PathBuf)) {
    let (dir, template) = workspace;
    let before = std::fs::read(&template).unwrap();

    let mut project = Project::new();
    project.add_template(&template).unwrap();
    project.set_output_path(dir.path()).unwrap();

    let outcomes = project.generate_all().unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0].result, Err(MergeError::OutputIsTemplate(_))));
    assert_eq!(std::fs::read(&template).unwrap(), before);
}
