//! Application state and the transitions that mutate it.
//!
//! Long-running work (parsing, model calls) is split into `begin_*` / `complete_*` pairs.
//! `begin_*` hands out a ticket describing the context it started in; `complete_*` applies the
//! result only if that context is still current, so a slow response can never land on data
//! the user has already replaced.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{ChartSelection, Row, Sheet, SortDirective, View, Workbook};
use crate::services::chart::{self, AxisOptions, ChartOutcome};
use crate::services::ingest::FileFormat;
use crate::services::llm_agent::user_facing;
use crate::services::prompt::compose_analysis_prompt;
use crate::services::sort_view;

#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub generation: u64,
    pub file_name: String,
    pub format: FileFormat,
}

#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    pub generation: u64,
    pub sheet_index: usize,
    pub request_id: u64,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    Applied,
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Applied { answer: String },
    Discarded,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetSummary {
    pub name: String,
    pub headers: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub file_name: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub sheets: Vec<SheetSummary>,
    pub active_sheet: usize,
    pub view: View,
    pub sort: Option<SortDirective>,
    pub chart: ChartSelection,
    pub is_parsing: bool,
    pub is_analyzing: bool,
    pub analysis: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TableView<'a> {
    pub sheet: &'a str,
    pub headers: &'a [String],
    pub sort: Option<&'a SortDirective>,
    pub rows: Vec<&'a Row>,
}

#[derive(Debug, Default)]
pub struct Controller {
    workbook: Option<Workbook>,
    loaded_at: Option<DateTime<Utc>>,
    active_sheet: usize,
    view: View,
    sort: Option<SortDirective>,
    chart: ChartSelection,
    is_parsing: bool,
    is_analyzing: bool,
    analysis: Option<String>,
    error: Option<String>,
    /// Bumped whenever the data an in-flight operation was started against goes away.
    generation: u64,
    /// Latest analysis request; older ones are superseded.
    analysis_seq: u64,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail<T>(&mut self, err: AppError) -> Result<T, AppError> {
        tracing::warn!("Operation failed: {}", err);
        self.error = Some(err.to_string());
        Err(err)
    }

    fn active(&self) -> Option<&Sheet> {
        self.workbook.as_ref().and_then(|wb| wb.sheet(self.active_sheet))
    }

    fn active_or_fail(&mut self) -> Result<&Sheet, AppError> {
        if self.active().is_none() {
            return self.fail(AppError::InvalidInput("No file has been loaded.".to_string()));
        }
        self.active()
            .ok_or_else(|| AppError::Internal("active sheet vanished".to_string()))
    }

    fn clear_views(&mut self) {
        self.view = View::Table;
        self.sort = None;
        self.chart = ChartSelection::default();
    }

    /// Starts a new upload. An unsupported file is reported without disturbing what is
    /// already loaded; otherwise the current dataset is discarded.
    pub fn begin_upload(&mut self, file_name: &str) -> Result<UploadTicket, AppError> {
        self.error = None;
        let format = match FileFormat::from_file_name(file_name) {
            Ok(format) => format,
            Err(err) => return self.fail(err),
        };

        self.generation += 1;
        self.workbook = None;
        self.loaded_at = None;
        self.active_sheet = 0;
        self.analysis = None;
        self.is_analyzing = false;
        self.is_parsing = true;
        self.clear_views();

        tracing::info!("Upload of {} started (generation {})", file_name, self.generation);
        Ok(UploadTicket {
            generation: self.generation,
            file_name: file_name.to_string(),
            format,
        })
    }

    /// Rejects an upload that never reached the parser (oversized, unreadable body). Nothing
    /// that is loaded is touched.
    pub fn reject_upload(&mut self, err: AppError) -> AppError {
        tracing::warn!("Upload rejected: {}", err);
        self.error = Some(err.to_string());
        err
    }

    pub fn complete_upload(
        &mut self,
        ticket: &UploadTicket,
        result: Result<Workbook, AppError>,
    ) -> Result<Completion, AppError> {
        if ticket.generation != self.generation {
            tracing::warn!("Discarding stale upload result for {}", ticket.file_name);
            return Ok(Completion::Discarded);
        }

        self.is_parsing = false;
        match result {
            Ok(workbook) => {
                tracing::info!("Loaded {} with {} sheet(s)", workbook.file_name, workbook.sheet_count());
                self.workbook = Some(workbook);
                self.loaded_at = Some(Utc::now());
                self.active_sheet = 0;
                Ok(Completion::Applied)
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn switch_sheet(&mut self, index: usize) -> Result<(), AppError> {
        self.error = None;
        let sheet_count = self.workbook.as_ref().map_or(0, Workbook::sheet_count);
        if index >= sheet_count {
            return self.fail(AppError::InvalidInput(format!(
                "Sheet index {} is out of range ({} sheet(s) loaded).",
                index, sheet_count
            )));
        }

        self.active_sheet = index;
        self.generation += 1;
        self.is_analyzing = false;
        self.clear_views();
        Ok(())
    }

    pub fn set_view(&mut self, view: View) {
        self.view = view;
    }

    /// Sorts by `column`, flipping the direction when the same column is requested again.
    pub fn request_sort(&mut self, column: &str) -> Result<SortDirective, AppError> {
        self.error = None;
        let known = self.active_or_fail()?.has_header(column);
        if !known {
            return self.fail(AppError::InvalidInput(format!("Unknown column '{}'.", column)));
        }

        let directive = SortDirective::toggle(self.sort.as_ref(), column);
        self.sort = Some(directive.clone());
        Ok(directive)
    }

    pub fn select_chart(&mut self, selection: ChartSelection) -> Result<(), AppError> {
        self.error = None;
        let options = chart::axis_options(self.active_or_fail()?);

        if let Some(x) = &selection.x_column {
            if !options.all_columns.contains(x) {
                return self.fail(AppError::InvalidInput(format!("Unknown X-axis column '{}'.", x)));
            }
        }
        if let Some(y) = &selection.y_column {
            if !options.numeric_columns.contains(y) {
                return self.fail(AppError::InvalidInput(format!(
                    "Y-axis column '{}' has no numeric values.",
                    y
                )));
            }
        }

        self.chart = selection;
        Ok(())
    }

    pub fn begin_analysis(
        &mut self,
        question: &str,
        sample_rows: usize,
    ) -> Result<AnalysisTicket, AppError> {
        self.error = None;
        if question.trim().is_empty() {
            return self.fail(AppError::InvalidInput("Please enter a question.".to_string()));
        }

        let prompt = match self.active() {
            Some(sheet) => compose_analysis_prompt(sheet, question, sample_rows),
            None => Err(AppError::NoDataToAnalyze),
        };
        let prompt = match prompt {
            Ok(prompt) => prompt,
            Err(err) => return self.fail(err),
        };

        self.analysis_seq += 1;
        self.analysis = None;
        self.is_analyzing = true;

        Ok(AnalysisTicket {
            generation: self.generation,
            sheet_index: self.active_sheet,
            request_id: self.analysis_seq,
            prompt,
        })
    }

    pub fn complete_analysis(
        &mut self,
        ticket: &AnalysisTicket,
        result: Result<String, AppError>,
    ) -> Result<AnalysisOutcome, AppError> {
        let current = ticket.generation == self.generation
            && ticket.sheet_index == self.active_sheet
            && ticket.request_id == self.analysis_seq;
        if !current {
            tracing::warn!("Discarding stale analysis response (request {})", ticket.request_id);
            return Ok(AnalysisOutcome::Discarded);
        }

        self.is_analyzing = false;
        match result {
            Ok(answer) => {
                self.analysis = Some(answer.clone());
                Ok(AnalysisOutcome::Applied { answer })
            }
            Err(err) => self.fail(user_facing(err)),
        }
    }

    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Controller {
            generation,
            analysis_seq: self.analysis_seq,
            ..Controller::default()
        };
        tracing::info!("State reset (generation {})", generation);
    }

    pub fn snapshot(&self) -> Snapshot {
        let sheets = self
            .workbook
            .as_ref()
            .map(|wb| {
                wb.sheets
                    .iter()
                    .map(|sheet| SheetSummary {
                        name: sheet.name.clone(),
                        headers: sheet.headers.clone(),
                        row_count: sheet.row_count(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Snapshot {
            file_name: self.workbook.as_ref().map(|wb| wb.file_name.clone()),
            loaded_at: self.loaded_at,
            sheets,
            active_sheet: self.active_sheet,
            view: self.view,
            sort: self.sort.clone(),
            chart: self.chart.clone(),
            is_parsing: self.is_parsing,
            is_analyzing: self.is_analyzing,
            analysis: self.analysis.clone(),
            error: self.error.clone(),
        }
    }

    pub fn table_view(&self) -> Option<TableView<'_>> {
        let sheet = self.active()?;
        Some(TableView {
            sheet: &sheet.name,
            headers: &sheet.headers,
            sort: self.sort.as_ref(),
            rows: sort_view::table_rows(&sheet.rows, self.sort.as_ref()),
        })
    }

    pub fn axis_options(&self) -> Option<AxisOptions> {
        self.active().map(chart::axis_options)
    }

    pub fn chart(&self) -> Option<ChartOutcome<'_>> {
        self.active().map(|sheet| chart::prepare_chart(sheet, &self.chart))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, ChartKind, SortDirection};
    use crate::services::prompt::DEFAULT_SAMPLE_ROWS;

    fn sheet(name: &str, values: &[f64]) -> Sheet {
        Sheet {
            name: name.to_string(),
            headers: vec!["x".to_string(), "label".to_string()],
            rows: values
                .iter()
                .map(|v| {
                    Row::from([
                        ("x".to_string(), CellValue::Number(*v)),
                        ("label".to_string(), CellValue::Text(format!("r{}", v))),
                    ])
                })
                .collect(),
        }
    }

    fn workbook(file_name: &str) -> Workbook {
        Workbook {
            file_name: file_name.to_string(),
            sheets: vec![sheet("first", &[3.0, 1.0, 2.0]), sheet("second", &[9.0])],
        }
    }

    fn loaded(file_name: &str) -> Controller {
        let mut controller = Controller::new();
        let ticket = controller.begin_upload(file_name).unwrap();
        let done = controller.complete_upload(&ticket, Ok(workbook(file_name))).unwrap();
        assert_eq!(done, Completion::Applied);
        controller
    }

    #[test]
    fn upload_loads_workbook_and_resets_views() {
        let controller = loaded("sales.xlsx");
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.file_name.as_deref(), Some("sales.xlsx"));
        assert_eq!(snapshot.sheets.len(), 2);
        assert_eq!(snapshot.sheets[0].row_count, 3);
        assert_eq!(snapshot.active_sheet, 0);
        assert_eq!(snapshot.view, View::Table);
        assert!(!snapshot.is_parsing);
        assert!(snapshot.loaded_at.is_some());
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn unsupported_upload_keeps_loaded_data() {
        let mut controller = loaded("sales.csv");
        let err = controller.begin_upload("notes.docx").unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(_)));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.file_name.as_deref(), Some("sales.csv"));
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Invalid file type. Please upload a CSV or Excel file.")
        );
    }

    #[test]
    fn failed_parse_is_recorded_once() {
        let mut controller = Controller::new();
        let ticket = controller.begin_upload("broken.csv").unwrap();
        let err = controller
            .complete_upload(&ticket, Err(AppError::csv_parse("bad quote")))
            .unwrap_err();
        assert!(matches!(err, AppError::ParseError { .. }));

        let snapshot = controller.snapshot();
        assert!(snapshot.file_name.is_none());
        assert!(!snapshot.is_parsing);
        assert_eq!(snapshot.error.as_deref(), Some("Error parsing CSV: bad quote"));

        // The next operation clears the previous error before reporting its own.
        controller.begin_upload("retry.csv").unwrap();
        assert!(controller.snapshot().error.is_none());
    }

    #[test]
    fn sort_requests_toggle_and_validate_columns() {
        let mut controller = loaded("sales.csv");

        let d = controller.request_sort("x").unwrap();
        assert_eq!(d.direction, SortDirection::Ascending);
        let view = controller.table_view().unwrap();
        let xs: Vec<&CellValue> = view.rows.iter().map(|r| &r["x"]).collect();
        assert_eq!(xs, vec![&CellValue::Number(1.0), &CellValue::Number(2.0), &CellValue::Number(3.0)]);

        let d = controller.request_sort("x").unwrap();
        assert_eq!(d.direction, SortDirection::Descending);

        let d = controller.request_sort("label").unwrap();
        assert_eq!(d.direction, SortDirection::Ascending);

        assert!(controller.request_sort("nope").is_err());
        assert!(controller.snapshot().error.unwrap().contains("nope"));
    }

    #[test]
    fn sorting_without_data_fails_safely() {
        let mut controller = Controller::new();
        assert!(controller.request_sort("x").is_err());
        assert!(controller.table_view().is_none());
    }

    #[test]
    fn switching_sheet_resets_views() {
        let mut controller = loaded("book.xlsx");
        controller.set_view(View::Chart);
        controller.request_sort("x").unwrap();

        controller.switch_sheet(1).unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.active_sheet, 1);
        assert_eq!(snapshot.view, View::Table);
        assert!(snapshot.sort.is_none());

        assert!(controller.switch_sheet(2).is_err());
        assert_eq!(controller.snapshot().active_sheet, 1);
    }

    #[test]
    fn chart_selection_is_validated() {
        let mut controller = loaded("book.xlsx");

        let x_only = ChartSelection {
            chart_kind: ChartKind::Line,
            x_column: Some("label".to_string()),
            y_column: None,
        };
        controller.select_chart(x_only).unwrap();
        assert!(matches!(controller.chart(), Some(ChartOutcome::NoChart)));

        let bad_y = ChartSelection {
            chart_kind: ChartKind::Bar,
            x_column: Some("x".to_string()),
            y_column: Some("label".to_string()),
        };
        assert!(controller.select_chart(bad_y).is_err());

        let good = ChartSelection {
            chart_kind: ChartKind::Bar,
            x_column: Some("label".to_string()),
            y_column: Some("x".to_string()),
        };
        controller.select_chart(good).unwrap();
        assert!(matches!(controller.chart(), Some(ChartOutcome::Ready(_))));
    }

    #[test]
    fn analysis_without_data_fails_safely() {
        let mut controller = Controller::new();
        let err = controller.begin_analysis("Summarize", DEFAULT_SAMPLE_ROWS).unwrap_err();
        assert!(matches!(err, AppError::NoDataToAnalyze));
        assert_eq!(controller.snapshot().error.as_deref(), Some("No data available to analyze."));
        assert!(!controller.snapshot().is_analyzing);
    }

    #[test]
    fn blank_question_is_rejected() {
        let mut controller = loaded("sales.csv");
        assert!(matches!(
            controller.begin_analysis("   ", DEFAULT_SAMPLE_ROWS),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn analysis_answer_is_applied() {
        let mut controller = loaded("sales.csv");
        let ticket = controller.begin_analysis("Summarize", DEFAULT_SAMPLE_ROWS).unwrap();
        assert!(ticket.prompt.contains("The full dataset contains 3 rows."));
        assert!(controller.snapshot().is_analyzing);

        let outcome = controller.complete_analysis(&ticket, Ok("Three rows.".to_string())).unwrap();
        assert_eq!(outcome, AnalysisOutcome::Applied { answer: "Three rows.".to_string() });
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.analysis.as_deref(), Some("Three rows."));
        assert!(!snapshot.is_analyzing);
    }

    #[test]
    fn service_failures_are_classified_and_keep_data() {
        let mut controller = loaded("sales.csv");

        let ticket = controller.begin_analysis("Summarize", DEFAULT_SAMPLE_ROWS).unwrap();
        let err = controller
            .complete_analysis(&ticket, Err(AppError::LlmError("API key not valid".to_string())))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredential));

        let ticket = controller.begin_analysis("Summarize", DEFAULT_SAMPLE_ROWS).unwrap();
        let err = controller
            .complete_analysis(&ticket, Err(AppError::LlmError("503 overloaded".to_string())))
            .unwrap_err();
        assert!(matches!(err, AppError::AnalysisRequestFailed));

        let snapshot = controller.snapshot();
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Failed to get analysis from the model. Please try again later.")
        );
        assert_eq!(snapshot.file_name.as_deref(), Some("sales.csv"));
    }

    #[test]
    fn new_upload_discards_outstanding_analysis() {
        let mut controller = loaded("old.csv");
        let stale = controller.begin_analysis("Summarize", DEFAULT_SAMPLE_ROWS).unwrap();

        let upload = controller.begin_upload("new.csv").unwrap();
        controller.complete_upload(&upload, Ok(workbook("new.csv"))).unwrap();

        let outcome = controller.complete_analysis(&stale, Ok("about old data".to_string())).unwrap();
        assert_eq!(outcome, AnalysisOutcome::Discarded);
        let snapshot = controller.snapshot();
        assert!(snapshot.analysis.is_none());
        assert_eq!(snapshot.file_name.as_deref(), Some("new.csv"));
    }

    #[test]
    fn newer_question_supersedes_older_one() {
        let mut controller = loaded("sales.csv");
        let first = controller.begin_analysis("First?", DEFAULT_SAMPLE_ROWS).unwrap();
        let second = controller.begin_analysis("Second?", DEFAULT_SAMPLE_ROWS).unwrap();

        assert_eq!(
            controller.complete_analysis(&first, Ok("one".to_string())).unwrap(),
            AnalysisOutcome::Discarded
        );
        controller.complete_analysis(&second, Ok("two".to_string())).unwrap();
        assert_eq!(controller.snapshot().analysis.as_deref(), Some("two"));
    }

    #[test]
    fn sheet_switch_discards_outstanding_analysis() {
        let mut controller = loaded("book.xlsx");
        let stale = controller.begin_analysis("Summarize", DEFAULT_SAMPLE_ROWS).unwrap();
        controller.switch_sheet(1).unwrap();
        assert_eq!(
            controller.complete_analysis(&stale, Ok("first sheet".to_string())).unwrap(),
            AnalysisOutcome::Discarded
        );
    }

    #[test]
    fn stale_upload_result_is_ignored_after_reset() {
        let mut controller = Controller::new();
        let ticket = controller.begin_upload("slow.csv").unwrap();
        controller.reset();

        let done = controller.complete_upload(&ticket, Ok(workbook("slow.csv"))).unwrap();
        assert_eq!(done, Completion::Discarded);
        assert!(controller.snapshot().file_name.is_none());
        assert!(!controller.snapshot().is_parsing);
    }
}
