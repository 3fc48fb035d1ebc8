use std::cmp::Ordering;

use crate::models::{CellValue, Row, SortDirection, SortDirective};

/// Returns the rows reordered by `directive`, leaving `rows` untouched.
///
/// Rows missing the column always go last, whatever the direction. The sort is stable, so
/// ties keep their input order in both directions.
pub fn sorted_rows<'a>(rows: &'a [Row], directive: &SortDirective) -> Vec<&'a Row> {
    let mut view: Vec<&Row> = rows.iter().collect();
    view.sort_by(|a, b| {
        compare_cells(
            a.get(&directive.column),
            b.get(&directive.column),
            directive.direction,
        )
    });
    view
}

/// Rows in their original order, or sorted when a directive is active.
pub fn table_rows<'a>(rows: &'a [Row], directive: Option<&SortDirective>) -> Vec<&'a Row> {
    match directive {
        Some(directive) => sorted_rows(rows, directive),
        None => rows.iter().collect(),
    }
}

fn compare_cells(a: Option<&CellValue>, b: Option<&CellValue>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = a.natural_cmp(b);
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        }
    }
}
