//! Dynamic-table expansion.
//!
//! A table whose row starts with `{{DYNAMIC_TABLE::<ID>}}` in its first cell
//! is regenerated from the records of table `<ID>`: everything below the
//! template row is cleared, one row per record is built with the template
//! row's cell layout and cell styles, then the template row itself is dropped.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::document::{first_cell_text, grid_columns, new_run, row_cells};
use crate::error::MergeWarning;
use crate::project::TableDefinition;
use crate::scanner::table_marker_id;
use crate::style::{copy_cell_style, ensure_property_block, set_cell_alignment};
use crate::xml::{XmlElement, XmlNode};

/// Per-table outcome, used by the merge report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionStats {
    pub tables_expanded: usize,
    pub rows_generated: usize,
    pub warnings: Vec<MergeWarning>,
}

/// Expand every dynamic table under `body` (outer tables before inner ones).
pub fn expand_tables(
    body: &mut XmlElement,
    definitions: &BTreeMap<&str, &TableDefinition>,
) -> ExpansionStats {
    let mut stats = ExpansionStats::default();
    body.visit_mut("tbl", &mut |table| {
        expand_table(table, definitions, &mut stats);
    });
    stats
}

/// Expand one table in place. Tables without a template row, or whose id has
/// no definition, are left as they are.
fn expand_table(
    table: &mut XmlElement,
    definitions: &BTreeMap<&str, &TableDefinition>,
    stats: &mut ExpansionStats,
) {
    let row_indices = table.w_child_indices("tr");

    let mut found: Option<(usize, String)> = None;
    for (position, &idx) in row_indices.iter().enumerate() {
        let Some(row) = table.children[idx].as_element() else {
            continue;
        };
        let Some(text) = first_cell_text(row) else {
            continue;
        };
        if let Some(id) = table_marker_id(&text) {
            found = Some((position, id.to_string()));
            break;
        }
    }
    let Some((template_position, table_id)) = found else {
        return;
    };
    let Some(definition) = definitions.get(table_id.as_str()) else {
        debug!("No data for dynamic table {}; left as static content", table_id);
        return;
    };
    let template_keys = definition.template_keys.clone();
    let template_idx = row_indices[template_position];

    // Clear everything below the template row, bottom-up.
    for &idx in row_indices[template_position + 1..].iter().rev() {
        table.children.remove(idx);
    }

    let template_row = match table.children.remove(template_idx) {
        XmlNode::Element(row) => row,
        other => {
            table.children.insert(template_idx, other);
            return;
        }
    };
    let template_cells: Vec<&XmlElement> = row_cells(&template_row).collect();
    let layouts = cell_layouts(table, &template_row, &template_cells);
    let grid_len = grid_columns(table).len();
    let covered = row_span(&template_row, &layouts);

    let mut insert_at = template_idx;
    let mut generated = 0usize;
    for (record_index, record) in definition.data.iter().enumerate() {
        if grid_len > 0 && covered != grid_len {
            let warning = MergeWarning::StructuralMismatch {
                table_id: table_id.clone(),
                record: record_index + 1,
                expected: grid_len,
                actual: covered,
            };
            warn!("{}", warning);
            stats.warnings.push(warning);
            continue;
        }

        let mut row = template_row.new_w("tr");
        if let Some(tr_pr) = template_row.w_child("trPr") {
            row.push(tr_pr.clone());
        }
        for layout in &layouts {
            row.push(new_cell(&template_row, layout));
        }

        for (col, cell) in row.elements_mut().filter(|el| el.is_w("tc")).enumerate() {
            let value = if col == 0 {
                (record_index + 1).to_string()
            } else {
                template_keys
                    .get(col - 1)
                    .and_then(|key| record.get(key))
                    .cloned()
                    .unwrap_or_default()
            };
            fill_cell(cell, &value);
            copy_cell_style(template_cells[col], cell);
            if col == 0 {
                set_cell_alignment(cell, "center");
            }
        }

        table.children.insert(insert_at, XmlNode::Element(row));
        insert_at += 1;
        generated += 1;
    }

    info!(
        "Expanded dynamic table {}: {} rows from {} records",
        table_id,
        generated,
        definition.data.len()
    );
    stats.tables_expanded += 1;
    stats.rows_generated += generated;
}

/// Width and horizontal span of one template cell.
#[derive(Debug, Clone)]
struct CellLayout {
    width: Option<XmlElement>,
    grid_span: Option<XmlElement>,
    span: usize,
}

/// One layout per template cell. A cell without its own `w:tcW` takes the
/// summed width of the grid columns it spans.
fn cell_layouts(
    table: &XmlElement,
    template_row: &XmlElement,
    template_cells: &[&XmlElement],
) -> Vec<CellLayout> {
    let grid = grid_columns(table);
    let mut column = row_property(template_row, "gridBefore");
    template_cells
        .iter()
        .map(|tc| {
            let tc_pr = tc.w_child("tcPr");
            let grid_span = tc_pr.and_then(|pr| pr.w_child("gridSpan")).cloned();
            let span = grid_span
                .as_ref()
                .and_then(|el| el.w_attr("val"))
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(1);
            let width = tc_pr
                .and_then(|pr| pr.w_child("tcW"))
                .cloned()
                .or_else(|| grid_width(tc, &grid, column, span));
            column += span;
            CellLayout {
                width,
                grid_span,
                span,
            }
        })
        .collect()
}

fn grid_width(context: &XmlElement, grid: &[Option<String>], column: usize, span: usize) -> Option<XmlElement> {
    let columns = grid.get(column..column + span)?;
    let mut total = 0u64;
    for width in columns {
        total += width.as_deref()?.parse::<u64>().ok()?;
    }
    let mut tc_w = context.new_w("tcW");
    tc_w.set_w_attr("w", &total.to_string());
    tc_w.set_w_attr("type", "dxa");
    Some(tc_w)
}

/// Grid columns a row occupies, skipped leading and trailing columns included.
fn row_span(row: &XmlElement, layouts: &[CellLayout]) -> usize {
    row_property(row, "gridBefore")
        + layouts.iter().map(|l| l.span).sum::<usize>()
        + row_property(row, "gridAfter")
}

fn row_property(row: &XmlElement, name: &str) -> usize {
    row.w_child("trPr")
        .and_then(|pr| pr.w_child(name))
        .and_then(|el| el.w_attr("val"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// An empty cell with the template cell's width and span and a single empty
/// paragraph.
fn new_cell(context: &XmlElement, layout: &CellLayout) -> XmlElement {
    let mut cell = context.new_w("tc");
    for prop in [&layout.width, &layout.grid_span].into_iter().flatten() {
        ensure_property_block(&mut cell, "tcPr").push(prop.clone());
    }
    let p = cell.new_w("p");
    cell.push(p);
    cell
}

/// Replace the cell's paragraphs with one paragraph holding `text` in one run.
fn fill_cell(cell: &mut XmlElement, text: &str) {
    cell.children
        .retain(|n| n.as_element().is_some_and(|el| el.is_w("tcPr")));
    let mut p = cell.new_w("p");
    let run = new_run(&p, text);
    p.push(run);
    cell.push(p);
}
