use thiserror::Error;

use crate::types::Technique;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("parameters are for {actual}, instrument runs {expected}")]
    TechniqueMismatch {
        expected: Technique,
        actual: Technique,
    },
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
    #[error("malformed sample {line:?}: {reason}")]
    MalformedSample { line: String, reason: String },
    #[error("insufficient data: need {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("a session is already receiving")]
    SessionBusy,
    #[error("no transport connected")]
    NotConnected,
    #[error("acquisition worker panicked")]
    WorkerPanicked,
    #[error("cannot access {}: {source}", path.display())]
    File {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid csv layout: {0}")]
    CsvLayout(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
}

impl EngineError {
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        EngineError::MalformedSample {
            line: line.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn file(path: &std::path::Path, source: std::io::Error) -> Self {
        EngineError::File {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for EngineError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        EngineError::Plot(format!("{value:?}"))
    }
}

impl From<image::ImageError> for EngineError {
    fn from(value: image::ImageError) -> Self {
        EngineError::Plot(value.to_string())
    }
}
