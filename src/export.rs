//! CSV export of report rows.
//!
//! Columns follow [`crate::normalize::REPORT_COLUMNS`]; the header row is
//! derived from the serde names on [`EnrichedReportRow`].

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::normalize::{EnrichedReportRow, REPORT_COLUMNS};

/// Writes `rows` as CSV to `writer`. An empty report still gets a header.
pub fn write_csv<W: Write>(writer: W, rows: &[EnrichedReportRow]) -> crate::error::Result<()> {
    let mut out = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    out.write_record(REPORT_COLUMNS)?;
    for row in rows {
        out.serialize(row)?;
    }
    out.flush()?;
    Ok(())
}

/// Creates (or truncates) `path` and writes the report into it.
pub fn write_csv_file(path: &Path, rows: &[EnrichedReportRow]) -> crate::error::Result<()> {
    let file = File::create(path)?;
    write_csv(file, rows)
}
