use rayon::prelude::*;
use serde::Serialize;

use crate::models::{ChartKind, ChartSelection, Row, Sheet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisOptions {
    /// Any header may be used on the X axis.
    pub all_columns: Vec<String>,
    /// Headers with at least one numeric cell; candidates for the Y axis.
    pub numeric_columns: Vec<String>,
}

/// What the renderer needs to draw one chart. Cell values are passed through untouched.
#[derive(Debug, Serialize)]
pub struct ChartData<'a> {
    pub chart_kind: ChartKind,
    pub x_column: &'a str,
    pub y_column: &'a str,
    pub rows: &'a [Row],
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChartOutcome<'a> {
    Ready(ChartData<'a>),
    NoChart,
}

pub fn axis_options(sheet: &Sheet) -> AxisOptions {
    AxisOptions {
        all_columns: sheet.headers.clone(),
        numeric_columns: numeric_columns(sheet),
    }
}

/// Mixed columns count as numeric; non-numeric cells become gaps for the renderer.
pub fn numeric_columns(sheet: &Sheet) -> Vec<String> {
    sheet
        .headers
        .par_iter()
        .filter(|header| {
            sheet
                .rows
                .iter()
                .any(|row| row.get(header.as_str()).map_or(false, |v| v.is_number()))
        })
        .cloned()
        .collect()
}

pub fn prepare_chart<'a>(sheet: &'a Sheet, selection: &'a ChartSelection) -> ChartOutcome<'a> {
    match (selection.x_column.as_deref(), selection.y_column.as_deref()) {
        (Some(x_column), Some(y_column)) => ChartOutcome::Ready(ChartData {
            chart_kind: selection.chart_kind,
            x_column,
            y_column,
            rows: &sheet.rows,
        }),
        _ => ChartOutcome::NoChart,
    }
}
