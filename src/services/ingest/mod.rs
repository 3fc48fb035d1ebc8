pub mod csv_reader;
pub mod excel_reader;
pub mod utils;

use bytes::Bytes;

use crate::error::AppError;
use crate::models::{Sheet, Workbook};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Spreadsheet,
}

impl FileFormat {
    /// Decided by extension alone, case-insensitively. Which spreadsheet container it is gets
    /// sniffed from the bytes later.
    pub fn from_file_name(file_name: &str) -> Result<Self, AppError> {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".csv") {
            Ok(FileFormat::Csv)
        } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            Ok(FileFormat::Spreadsheet)
        } else {
            Err(AppError::UnsupportedFormat(file_name.to_string()))
        }
    }
}

/// Turns one uploaded file into a workbook of non-empty sheets. Either every sheet is
/// returned or the whole file fails.
pub fn ingest(file_name: &str, format: FileFormat, data: Bytes) -> Result<Workbook, AppError> {
    let start = std::time::Instant::now();
    tracing::info!("Ingesting {} ({:?}, {}KB)", file_name, format, data.len() / 1024);

    let sheets = match format {
        FileFormat::Csv => vec![csv_reader::read_csv(file_name, &data)?],
        FileFormat::Spreadsheet => excel_reader::read_spreadsheet(data)?,
    };

    let workbook = assemble_workbook(file_name, sheets)?;
    tracing::info!(
        "Ingested {} in {:?}: {} sheet(s), {} rows",
        file_name,
        start.elapsed(),
        workbook.sheet_count(),
        workbook.sheets.iter().map(Sheet::row_count).sum::<usize>()
    );

    Ok(workbook)
}

/// Keeps the sheets that have data rows, in their original order.
fn assemble_workbook(file_name: &str, sheets: Vec<Sheet>) -> Result<Workbook, AppError> {
    let sheets: Vec<Sheet> = sheets
        .into_iter()
        .filter(|sheet| {
            if sheet.rows.is_empty() {
                tracing::warn!("Sheet {} has no data rows, skipping", sheet.name);
                false
            } else {
                true
            }
        })
        .collect();

    if sheets.is_empty() {
        tracing::error!("No data rows found in {}", file_name);
        return Err(AppError::EmptyDataset);
    }

    Ok(Workbook {
        file_name: file_name.to_string(),
        sheets,
    })
}
