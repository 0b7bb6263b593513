use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("group size must be at least 1")]
    InvalidGroupSize,

    #[error("unknown form kind '{0}' (expected 'import' or 'export')")]
    UnknownKind(String),

    #[error("unknown template '{template}' for {kind} forms")]
    UnknownTemplate { kind: String, template: String },

    #[error("invalid anchor pattern: {0}")]
    InvalidAnchor(String),
}
