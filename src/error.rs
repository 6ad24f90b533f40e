use thiserror::Error;

/// Structural failures that abort a fusion run.
///
/// Per-record defects (bad coordinates, unparseable timestamps) never surface
/// here; those records are dropped where they are read.
#[derive(Error, Debug)]
pub enum FusionError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("malformed JSON on line {line}: {source}")]
    MalformedLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, FusionError>;
