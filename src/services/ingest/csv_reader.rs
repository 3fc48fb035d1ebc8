use std::collections::HashSet;

use csv::{ReaderBuilder, StringRecord};

use super::utils::{coerce_cell, sheet_name_from_file, unique_header};
use crate::error::AppError;
use crate::models::{Row, Sheet};

/// Parses a header-first CSV document into a single sheet.
///
/// Blank lines are skipped by the reader. Every record must have as many fields as the
/// header row; anything else is reported as a parse error.
pub fn read_csv(file_name: &str, data: &[u8]) -> Result<Sheet, AppError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(data);

    let mut existing_names = HashSet::new();
    let headers: Vec<String> = reader
        .headers()
        .map_err(AppError::csv_parse)?
        .iter()
        .map(|name| unique_header(name, &mut existing_names))
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(AppError::csv_parse)?;
        if is_blank(&record) {
            continue;
        }
        rows.push(record_to_row(&headers, &record));
    }

    tracing::debug!("Parsed CSV {} with {} columns and {} rows", file_name, headers.len(), rows.len());

    Ok(Sheet {
        name: sheet_name_from_file(file_name),
        headers,
        rows,
    })
}

fn is_blank(record: &StringRecord) -> bool {
    record.len() == 1 && record.get(0).map_or(true, str::is_empty)
}

fn record_to_row(headers: &[String], record: &StringRecord) -> Row {
    headers
        .iter()
        .zip(record.iter())
        .filter_map(|(header, raw)| coerce_cell(raw).map(|value| (header.clone(), value)))
        .collect()
}
