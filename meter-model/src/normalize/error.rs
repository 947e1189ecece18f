/// The payload is not a meter message this system recognizes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("no recognized meter key (expected `electricitymeter` or `gasmeter`)")]
    UnrecognizedMeter,
}

/// A recognized meter message with a field that cannot be read.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("timestamp is missing")]
    MissingTimestamp,
    #[error("invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("invalid decimal in {field}: '{value}'")]
    InvalidDecimal { field: &'static str, value: String },
    #[error("malformed meter data: {reason}")]
    Malformed { reason: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl NormalizeError {
    /// Short classification used for metric labels and dead-letter records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schema",
            Self::Validation(_) => "validation",
        }
    }
}
