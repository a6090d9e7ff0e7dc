use std::path::PathBuf;

/// Missing or malformed scope configuration (metadata.yaml, structure.yaml, ddr.yaml).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("no file starting with '{name}' and ending in '.{extension}' found in {}", dir.display())]
    NotFound {
        name: String,
        extension: String,
        dir: PathBuf,
    },

    #[error("source file {} is empty", path.display())]
    Empty { path: PathBuf },

    #[error("failed to parse {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("unknown column '{0}' in cache table")]
    UnknownColumn(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl LoaderError {
    /// Input that exists but could not be checked at all (downgraded to a warning).
    pub fn is_soft(&self) -> bool {
        matches!(self, LoaderError::Empty { .. })
    }
}

/// Finds a [`LoaderError`] anywhere in an anyhow chain.
pub fn find_loader_error(err: &anyhow::Error) -> Option<&LoaderError> {
    err.chain().find_map(|e| e.downcast_ref::<LoaderError>())
}
