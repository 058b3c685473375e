//! CSV output and console preview rendering for the filtered table.

use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};
use grants_core::{OpportunityField, FIELD_COUNT};

use crate::table::OpportunityTable;

const PREVIEW_FIELDS: [OpportunityField; 5] = [
    OpportunityField::OpportunityId,
    OpportunityField::OpportunityNumber,
    OpportunityField::OpportunityCategory,
    OpportunityField::PostDate,
    OpportunityField::OpportunityTitle,
];

const PREVIEW_CELL_WIDTH: usize = 48;

/// Write the whole table to `path`: one header row of column names, then one
/// row per record. Returns the number of data rows written.
pub fn write_csv(table: &OpportunityTable, path: &Path) -> Result<usize> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer
        .write_record(OpportunityTable::column_names())
        .with_context(|| format!("writing header to {}", path.display()))?;

    for row in table.rows() {
        let cells: Vec<Cow<'_, str>> = OpportunityField::ALL
            .into_iter()
            .map(|field| row.cell(field))
            .collect();
        writer
            .write_record(cells.iter().map(|cell| cell.as_bytes()))
            .with_context(|| {
                format!(
                    "writing opportunity {} to {}",
                    row.record.opportunity_id,
                    path.display()
                )
            })?;
    }

    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(table.len())
}

/// Fixed-width text preview of the first `rows` rows over a handful of
/// identifying columns, followed by the table shape.
pub fn render_preview(table: &OpportunityTable, rows: usize) -> String {
    let head = table.head(rows);
    let cells: Vec<Vec<String>> = head
        .iter()
        .map(|row| {
            PREVIEW_FIELDS
                .iter()
                .map(|field| truncate(&row.cell(*field), PREVIEW_CELL_WIDTH))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = PREVIEW_FIELDS
        .iter()
        .enumerate()
        .map(|(i, field)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(field.column_name().chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut lines = Vec::with_capacity(head.len() + 2);
    lines.push(join_padded(
        PREVIEW_FIELDS.iter().map(|f| f.column_name().to_string()),
        &widths,
    ));
    for row in cells {
        lines.push(join_padded(row.into_iter(), &widths));
    }
    lines.push(format!("[{} rows x {} columns]", table.len(), FIELD_COUNT));
    lines.join("\n")
}

fn join_padded(cells: impl Iterator<Item = String>, widths: &[usize]) -> String {
    cells
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
