use thiserror::Error;

/// Failures of the VAE model that callers may want to tell apart
#[derive(Debug, Error)]
pub enum VaeError {
    #[error("checkpoint {path}: {message}")]
    CheckpointIo { path: Box<str>, message: String },

    #[error("checkpoint has no parameter `{name}`")]
    MissingParameter { name: Box<str> },

    #[error("checkpoint parameter `{name}` does not belong to this model")]
    UnexpectedParameter { name: Box<str> },

    #[error("checkpoint parameter `{name}` has shape {found:?}, model expects {expected:?}")]
    CheckpointShapeMismatch {
        name: Box<str>,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("model samples the latent space in batches of {expected}, got {found} rows")]
    BatchSizeMismatch { expected: usize, found: usize },

    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),
}
