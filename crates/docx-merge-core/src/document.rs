//! The main document part of a DOCX package and WordprocessingML accessors.

use std::path::Path;

use tracing::{debug, info};

use crate::error::DocumentError;
use crate::package::DocxPackage;
use crate::xml::{XmlElement, XmlNode};

pub const DOCUMENT_PART: &str = "word/document.xml";

/// An opened document: the package plus the parsed `word/document.xml`.
///
/// The `w:body` element is held apart from the root so callers get plain
/// `&mut` access to it; it is put back in place on save.
#[derive(Debug, Clone)]
pub struct Document {
    package: DocxPackage,
    root: XmlElement,
    body: XmlElement,
    body_index: usize,
}

impl Document {
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        let package = DocxPackage::open(path)?;
        let document = Self::from_package(package)?;
        debug!("Opened document {:?}", path);
        Ok(document)
    }

    pub fn from_package(package: DocxPackage) -> Result<Self, DocumentError> {
        let xml = package.part_str(DOCUMENT_PART)?;
        let root = XmlElement::parse(xml).map_err(|source| DocumentError::Xml {
            part: DOCUMENT_PART.to_string(),
            source,
        })?;
        let (root, body, body_index) = split_body(root)?;
        Ok(Self {
            package,
            root,
            body,
            body_index,
        })
    }

    pub fn body(&self) -> &XmlElement {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut XmlElement {
        &mut self.body
    }

    /// Serialise `word/document.xml` with the current body.
    pub fn document_xml(&self) -> String {
        let mut root = self.root.clone();
        root.children
            .insert(self.body_index, XmlNode::Element(self.body.clone()));
        root.to_xml()
    }

    /// Write the package to `path` through a temporary sibling file.
    pub fn save(&mut self, path: &Path) -> Result<(), DocumentError> {
        let xml = self.document_xml();
        self.package.set_part(DOCUMENT_PART, xml.into_bytes());

        let temp_path = path.with_extension("docx.tmp");
        if let Err(e) = self.package.write(&temp_path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
        std::fs::rename(&temp_path, path)?;
        info!("Saved document to {:?}", path);
        Ok(())
    }

    /// Top-level paragraphs of the body, in order.
    pub fn paragraphs(&self) -> impl Iterator<Item = &XmlElement> {
        self.body.w_children("p")
    }

    /// Every table in the body (nested tables included), in document order.
    pub fn tables(&self) -> Vec<&XmlElement> {
        let mut tables = Vec::new();
        collect_tables(&self.body, &mut tables);
        tables
    }
}

fn collect_tables<'a>(el: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
    for child in el.elements() {
        if child.is_w("tbl") {
            out.push(child);
        }
        collect_tables(child, out);
    }
}

fn split_body(mut root: XmlElement) -> Result<(XmlElement, XmlElement, usize), DocumentError> {
    let body_index = root
        .w_child_indices("body")
        .first()
        .copied()
        .ok_or(DocumentError::MissingBody)?;
    match root.children.remove(body_index) {
        XmlNode::Element(body) => Ok((root, body, body_index)),
        _ => Err(DocumentError::MissingBody),
    }
}

// ---------------------------------------------------------------------------
// Paragraphs and runs
// ---------------------------------------------------------------------------

/// Direct `w:r` children of a paragraph.
pub fn paragraph_runs(paragraph: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    paragraph.w_children("r")
}

/// Concatenated text of a paragraph's runs.
pub fn paragraph_text(paragraph: &XmlElement) -> String {
    paragraph_runs(paragraph).map(run_text).collect()
}

/// Visible text of a run: `w:t` content, `w:tab` as tab, line breaks
/// (`w:cr`, `w:br` other than page and column breaks) as newline.
pub fn run_text(run: &XmlElement) -> String {
    let mut text = String::new();
    for child in run.elements().filter(|el| is_text_child(el)) {
        if child.is_w("t") {
            text.push_str(&child.text());
        } else if child.is_w("tab") {
            text.push('\t');
        } else {
            text.push('\n');
        }
    }
    text
}

fn is_text_child(el: &XmlElement) -> bool {
    el.is_w("t")
        || el.is_w("tab")
        || el.is_w("cr")
        || (el.is_w("br") && matches!(el.w_attr("type"), None | Some("textWrapping")))
}

/// True when the run holds something besides properties and text: fields,
/// drawings, page breaks, symbols.
pub(crate) fn run_has_content(run: &XmlElement) -> bool {
    run.elements().any(|el| !el.is_w("rPr") && !is_text_child(el))
}

/// Replace a run's text with `text`.
///
/// Only text children are rewritten; `w:rPr` and any other content stay in
/// place and the new text goes where the old text began. Tabs and newlines
/// become `w:tab` / `w:br`; every text fragment is written with
/// `xml:space="preserve"`.
pub fn set_run_text(run: &mut XmlElement, text: &str) {
    let anchor = run.children.iter().position(|node| match node {
        XmlNode::Element(el) => is_text_child(el),
        _ => false,
    });
    run.children.retain(|node| match node {
        XmlNode::Element(el) => !is_text_child(el),
        _ => true,
    });

    let mut fragments = Vec::new();
    let mut fragment = String::new();
    for ch in text.chars() {
        match ch {
            '\t' | '\n' => {
                push_text(run, &mut fragments, &mut fragment);
                let name = if ch == '\t' { "tab" } else { "br" };
                fragments.push(run.new_w(name));
            }
            _ => fragment.push(ch),
        }
    }
    push_text(run, &mut fragments, &mut fragment);

    let at = anchor.unwrap_or(run.children.len()).min(run.children.len());
    run.children
        .splice(at..at, fragments.into_iter().map(XmlNode::Element));
}

fn push_text(run: &XmlElement, fragments: &mut Vec<XmlElement>, fragment: &mut String) {
    if fragment.is_empty() {
        return;
    }
    let mut t = run.new_w("t");
    t.preserve_space();
    t.set_text(fragment);
    fragments.push(t);
    fragment.clear();
}

/// Build a `w:r` holding `text`.
pub fn new_run(context: &XmlElement, text: &str) -> XmlElement {
    let mut run = context.new_w("r");
    if text.is_empty() {
        let mut t = run.new_w("t");
        t.preserve_space();
        run.push(t);
    } else {
        set_run_text(&mut run, text);
    }
    run
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Direct `w:tr` children of a table.
pub fn table_rows(table: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    table.w_children("tr")
}

/// Direct `w:tc` children of a row.
pub fn row_cells(row: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    row.w_children("tc")
}

/// Cell text: each paragraph's run text, joined with newlines.
pub fn cell_text(cell: &XmlElement) -> String {
    cell.w_children("p")
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of the row's first cell, or `None` for a row without cells.
pub fn first_cell_text(row: &XmlElement) -> Option<String> {
    row_cells(row).next().map(cell_text)
}

/// Widths (`w:gridCol/@w:w`) of the table grid, one entry per grid column.
pub fn grid_columns(table: &XmlElement) -> Vec<Option<String>> {
    table
        .w_child("tblGrid")
        .map(|grid| {
            grid.w_children("gridCol")
                .map(|col| col.w_attr("w").map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
