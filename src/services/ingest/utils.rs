use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::CellValue;

static NUMERIC_CELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?\s*$").unwrap()
});

static TRAILING_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^/.]+$").unwrap());

const EMPTY_HEADER: &str = "__EMPTY";
const DEFAULT_SHEET_NAME: &str = "data";

/// Returns `name` unchanged unless it is blank or already taken, in which case a
/// placeholder or numeric suffix keeps the header set unique.
pub fn unique_header(name: &str, existing_names: &mut HashSet<String>) -> String {
    let base_name = if name.is_empty() { EMPTY_HEADER } else { name };

    let mut candidate = base_name.to_string();
    let mut counter = 1;
    while !existing_names.insert(candidate.clone()) {
        candidate = format!("{}_{}", base_name, counter);
        counter += 1;
    }

    candidate
}

/// Types one raw text cell. Empty cells yield `None` and are left out of the row.
pub fn coerce_cell(raw: &str) -> Option<CellValue> {
    if raw.is_empty() {
        return None;
    }

    if NUMERIC_CELL.is_match(raw) {
        // Overflow to infinity would serialize as null; keep the text instead.
        if let Some(n) = raw.trim().parse::<f64>().ok().filter(|n| n.is_finite()) {
            return Some(CellValue::Number(n));
        }
    }

    Some(CellValue::Text(raw.to_string()))
}

/// `sales.2024.csv` -> `sales.2024`; falls back to `data` when nothing is left.
pub fn sheet_name_from_file(file_name: &str) -> String {
    let stem = TRAILING_EXTENSION.replace(file_name, "");
    if stem.is_empty() {
        DEFAULT_SHEET_NAME.to_string()
    } else {
        stem.into_owned()
    }
}
