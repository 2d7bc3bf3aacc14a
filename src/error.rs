use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("uploaded file has no header row")]
    NoHeader,

    #[error("uploaded file contains no rows")]
    Empty,

    #[error("missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("column '{column}' row {row}: '{value}' is not a number")]
    NotNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("column '{column}' row {row}: '{value}' is not an integer label")]
    NotLabel {
        column: String,
        row: usize,
        value: String,
    },
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid model: {0}")]
    Invalid(String),

    #[error(
        "feature mismatch with schema '{schema}' v{version}: missing [{}], unexpected [{}]",
        .missing.join(", "),
        .unexpected.join(", ")
    )]
    SchemaMismatch {
        schema: String,
        version: u32,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("invalid feature size: expected {expected}, got {actual}")]
    InvalidFeatureSize { expected: usize, actual: usize },

    #[error("model returned {actual} labels for {expected} rows")]
    OutputLength { expected: usize, actual: usize },

    #[error("unsupported model artifact: {0}")]
    Unsupported(String),

    #[cfg(feature = "torch")]
    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetricsError {
    #[error("{actual} predictions for {expected} true labels")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("no labels to score")]
    Empty,
}

/// Failure of a single upload. The session keeps its previous state.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("{0} is not a .csv file")]
    NotCsv(String),

    #[error("no file uploaded")]
    NoFile,

    #[error(transparent)]
    Table(#[from] TableError),
}

impl UploadError {
    /// Message shown inline on the page.
    pub fn user_message(&self) -> String {
        format!("Upload error: {}", self)
    }
}

/// Failure of a single predict request. Never fatal for the process.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("no file uploaded")]
    NoFile,

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

impl PredictError {
    /// Message shown inline on the page.
    pub fn user_message(&self) -> String {
        format!("Prediction error: {}", self)
    }
}
