use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid file type. Please upload a CSV or Excel file.")]
    UnsupportedFormat(String),
    #[error("Error parsing {format}: {message}")]
    ParseError {
        format: &'static str,
        message: String,
    },
    #[error("The file is empty or contains no data in any of its sheets.")]
    EmptyDataset,
    /// Raw failure reported by the analysis service, before classification.
    #[error("LLM error: {0}")]
    LlmError(String),
    #[error("The analysis service API key is invalid. Please check your configuration.")]
    InvalidCredential,
    #[error("Failed to get analysis from the model. Please try again later.")]
    AnalysisRequestFailed,
    #[error("No data available to analyze.")]
    NoDataToAnalyze,
    #[error("{0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn csv_parse(message: impl ToString) -> Self {
        AppError::ParseError { format: "CSV", message: message.to_string() }
    }

    pub fn excel_parse(message: impl ToString) -> Self {
        AppError::ParseError { format: "Excel file", message: message.to_string() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::ParseError { .. } => StatusCode::BAD_REQUEST,
            AppError::EmptyDataset => StatusCode::BAD_REQUEST,
            AppError::LlmError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidCredential => StatusCode::UNAUTHORIZED,
            AppError::AnalysisRequestFailed => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NoDataToAnalyze => StatusCode::BAD_REQUEST,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization failed: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("worker task failed: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
