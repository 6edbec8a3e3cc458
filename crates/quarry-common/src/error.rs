use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error(
        "checksum mismatch for migration '{unit_id}': ledger has {expected}, shipped unit has {actual}"
    )]
    ChecksumMismatch {
        unit_id: String,
        expected: String,
        actual: String,
    },

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Migration errors are fatal at startup; everything else is recoverable
    /// per request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MigrationFailed(_) | Error::ChecksumMismatch { .. } | Error::Config(_)
        )
    }
}
