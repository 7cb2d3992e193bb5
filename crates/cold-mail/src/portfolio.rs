/// Portfolio dataset loading.
///
/// The dataset is a CSV file with a header row holding at least `Techstack` and `Links`.
/// Other columns are ignored. The header check runs before any row is read, so a dataset with
/// the wrong shape fails fast with a `SchemaError` naming the missing column.
use std::io;
use std::path::Path;

use tracing::info;

use crate::error::{DatasetError, SchemaError};
use crate::model::PortfolioEntry;

pub const TECHSTACK_COLUMN: &str = "Techstack";
pub const LINKS_COLUMN: &str = "Links";

pub fn load_portfolio(path: &Path) -> Result<Vec<PortfolioEntry>, DatasetError> {
    let display = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| DatasetError::Read {
        path: display.clone(),
        source: csv::Error::from(e),
    })?;
    let entries = read_portfolio(file, &display)?;
    info!(path = %display, rows = entries.len(), "portfolio dataset loaded");
    Ok(entries)
}

/// Read rows from any CSV source. `origin` only labels errors.
pub fn read_portfolio<R: io::Read>(
    reader: R,
    origin: &str,
) -> Result<Vec<PortfolioEntry>, DatasetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let read_error = |source: csv::Error| DatasetError::Read {
        path: origin.to_string(),
        source,
    };

    let headers = csv_reader.headers().map_err(read_error)?.clone();
    let techstack_idx = column_index(&headers, TECHSTACK_COLUMN)?;
    let links_idx = column_index(&headers, LINKS_COLUMN)?;

    let mut entries = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(read_error)?;
        entries.push(PortfolioEntry::new(
            record.get(techstack_idx).unwrap_or("").trim(),
            record.get(links_idx).unwrap_or("").trim(),
        ));
    }
    Ok(entries)
}

fn column_index(headers: &csv::StringRecord, column: &'static str) -> Result<usize, SchemaError> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == column)
        .ok_or(SchemaError { column })
}
