//! Delimited-text encoding of row batches and decoding of query result grids.

use crate::config::CsvMode;
use crate::error::{AppError, Result};
use crate::query::ResultGrid;
use crate::types::TabularRow;

/// Content type stored alongside every encoded document.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Encode a batch of rows: a header taken from the first row, then one line
/// per row. Lines are `\n`-separated with no trailing newline. An empty batch
/// encodes to an empty document.
pub fn encode<R: TabularRow>(rows: &[R], mode: CsvMode) -> Result<String> {
    let Some(first) = rows.first() else {
        return Ok(String::new());
    };
    let header = first.field_names();

    match mode {
        CsvMode::Legacy => {
            let mut lines = Vec::with_capacity(rows.len() + 1);
            lines.push(header.join(","));
            lines.extend(rows.iter().map(|r| r.values().join(",")));
            Ok(lines.join("\n"))
        }
        CsvMode::Quoted => {
            let mut writer = csv::WriterBuilder::new()
                .terminator(csv::Terminator::Any(b'\n'))
                .quote_style(csv::QuoteStyle::Necessary)
                .from_writer(Vec::new());
            writer.write_record(header)?;
            for row in rows {
                writer.write_record(row.values())?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| AppError::Io(e.into_error()))?;
            let mut doc = String::from_utf8(bytes)
                .map_err(|e| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            if doc.ends_with('\n') {
                doc.pop();
            }
            Ok(doc)
        }
    }
}

/// Header names and first data row of a result grid. Null or missing header
/// cells become empty names; null data cells become empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRow {
    pub header: Vec<String>,
    pub values: Vec<String>,
}

impl DecodedRow {
    /// Value at column `i`, or the empty string when the row is short.
    pub fn value(&self, i: usize) -> String {
        self.values.get(i).cloned().unwrap_or_default()
    }
}

/// Decode a grid holding a header row and at least one data row.
pub fn decode(grid: &ResultGrid) -> Result<DecodedRow> {
    let [header, data, ..] = grid.rows.as_slice() else {
        return Err(AppError::InsufficientRows { rows: grid.rows.len() });
    };

    Ok(DecodedRow {
        header: header.iter().map(|c| c.clone().unwrap_or_default()).collect(),
        values: data.iter().map(|c| c.clone().unwrap_or_default()).collect(),
    })
}
