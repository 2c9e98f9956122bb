use thiserror::Error;

/// Fatal failures while loading inputs or resolving the final report.
///
/// Malformed flow log lines are not errors; they surface as
/// [`crate::flowlog::FlowLine::Skipped`] and never abort a run.
#[derive(Debug, Error)]
pub enum FlowTagError {
    #[error("protocol reference row {line}: expected at least 2 fields, got {fields}")]
    ReferenceData { line: u64, fields: usize },

    #[error("lookup table row {line}: expected at least 3 fields, got {fields}")]
    MalformedRow { line: u64, fields: usize },

    #[error("lookup table row {line}: unknown protocol '{name}'")]
    UnknownProtocol { line: u64, name: String },

    #[error("no protocol name for protocol number '{number}'")]
    UnknownProtocolNumber { number: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlowTagError>;
