use std::path::PathBuf;

/// Errors produced while loading survey data, analysing it, or writing reports.
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("XLSX read error: {0}")]
    Xlsx(String),
    #[error("XLSX write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
    #[error("No valid questions: {0}")]
    NoValidQuestions(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Output file is locked, please close it first: {}", .0.display())]
    OutputLocked(PathBuf),
    #[error("Nothing to analyse: {0}")]
    EmptyInput(String),
    #[error("Render error: {0}")]
    Render(String),
}

impl From<zip::result::ZipError> for SurveyError {
    fn from(e: zip::result::ZipError) -> Self {
        SurveyError::Xlsx(format!("Open .xlsx zip failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, SurveyError>;
