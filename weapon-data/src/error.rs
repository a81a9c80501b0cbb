use thiserror::Error;

/// Problems with the weapon records themselves, as opposed to I/O
#[derive(Debug, Error)]
pub enum DataError {
    #[error("field `{field}`: can't parse `{value}` as a number")]
    Parse { field: Box<str>, value: Box<str> },

    #[error("field `{field}` is missing from {origin}")]
    SchemaMismatch { field: Box<str>, origin: Box<str> },

    #[error("batch size {batch_size} is invalid for {num_examples} examples")]
    InvalidBatchSize {
        batch_size: usize,
        num_examples: usize,
    },

    #[error("expected {expected} encoded columns, found {found}")]
    WidthMismatch { expected: usize, found: usize },
}
