use std::collections::HashSet;
use std::io::Cursor;

use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Data, Reader};

use super::utils::unique_header;
use crate::error::AppError;
use crate::models::{CellValue, Row, Sheet};

/// Reads every worksheet of a spreadsheet payload, in workbook order.
///
/// The container is detected from the bytes, so an xlsx file saved with an `.xls` name still
/// opens. Empty sheets are kept here; the caller decides what to drop.
pub fn read_spreadsheet(data: Bytes) -> Result<Vec<Sheet>, AppError> {
    let workbook = open_workbook_auto_from_rs(Cursor::new(data)).map_err(AppError::excel_parse)?;
    read_worksheets(workbook)
}

fn read_worksheets<R>(mut workbook: R) -> Result<Vec<Sheet>, AppError>
where
    R: Reader<Cursor<Bytes>>,
    R::Error: std::fmt::Display,
{
    let sheet_names = workbook.sheet_names().to_vec();
    tracing::info!("Reading {} sheets", sheet_names.len());

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for sheet_name in &sheet_names {
        let range = workbook.worksheet_range(sheet_name).map_err(|e| {
            tracing::error!("Failed to read worksheet {}: {}", sheet_name, e);
            AppError::excel_parse(format!("sheet '{}': {}", sheet_name, e))
        })?;
        sheets.push(sheet_from_rows(sheet_name, range.rows()));
    }

    Ok(sheets)
}

/// First row is the header row; each following row becomes a `Row` of its non-empty cells.
pub fn sheet_from_rows<'a, I>(sheet_name: &str, rows: I) -> Sheet
where
    I: IntoIterator<Item = &'a [Data]>,
{
    let mut rows = rows.into_iter();

    let mut existing_names = HashSet::new();
    let headers: Vec<String> = rows
        .next()
        .map(|header_row| {
            header_row
                .iter()
                .map(|cell| unique_header(&header_text(cell), &mut existing_names))
                .collect()
        })
        .unwrap_or_default();

    let data_rows: Vec<Row> = rows
        .map(|cells| {
            headers
                .iter()
                .zip(cells.iter())
                .filter_map(|(header, cell)| cell_value(cell).map(|value| (header.clone(), value)))
                .collect::<Row>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    Sheet {
        name: sheet_name.to_string(),
        headers,
        rows: data_rows,
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> Option<CellValue> {
    match cell {
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::DateTime(d) => Some(CellValue::Number(d.as_f64())),
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(CellValue::Text(s.clone())),
        Data::Bool(b) => Some(CellValue::Text(b.to_string().to_uppercase())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(CellValue::Text(s.clone())),
        _ => None,
    }
}
