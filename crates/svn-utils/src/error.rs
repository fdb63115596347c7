/// Base error type for svn-utils operations.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("path error: {0}")]
    Path(String),

    #[error("invalid revision: {0}")]
    BadRevision(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
