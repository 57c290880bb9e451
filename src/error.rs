//! Error types and `Result` alias for the storage core.
//!
//! An errno-style result code per failure condition, grouped under four
//! severities a caller can react to uniformly: Fatal, Rollback, Ddl,
//! InitStage.

/// Result code, one variant per condition the storage core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("generic error")]
    Error,
    #[error("internal logic error")]
    Internal,
    #[error("permission denied")]
    Perm,
    #[error("operation aborted")]
    Abort,
    #[error("resource busy")]
    Busy,
    #[error("database locked")]
    Locked,
    #[error("out of memory")]
    NoMem,
    #[error("attempt to write a read-only relation")]
    ReadOnly,
    #[error("operation interrupted")]
    Interrupt,
    #[error("disk I/O error")]
    IoErr,
    #[error("on-disk image is corrupt")]
    Corrupt,
    #[error("not found")]
    NotFound,
    #[error("device or buffer pool is full")]
    Full,
    #[error("unable to open data file")]
    CantOpen,
    #[error("protocol violation")]
    Protocol,
    #[error("empty result")]
    Empty,
    #[error("catalog/schema error")]
    Schema,
    #[error("value too large")]
    TooBig,
    #[error("constraint violation")]
    Constraint,
    #[error("data type mismatch")]
    Mismatch,
    #[error("API misuse")]
    Misuse,
    #[error("large file support is needed but unavailable")]
    NoLfs,
    #[error("authorization denied")]
    Auth,
    #[error("malformed on-disk format")]
    Format,
    #[error("value out of valid range")]
    Range,
    #[error("not a valid database file")]
    NotADb,
    #[error("notice")]
    Notice,
    #[error("warning")]
    Warning,
}

/// Which layer must react to an [`ErrorKind`], per `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Unrecoverable process state: caller must terminate, recovery runs on next start.
    Fatal,
    /// Statement-level failure: transaction manager aborts the transaction.
    Rollback,
    /// Catalog-level violation, a subtype of Rollback.
    Ddl,
    /// Planner/executor could not bind; never reaches storage mutations.
    InitStage,
}

impl ErrorKind {
    /// Classify this error kind per the propagation policy in `spec.md` §7.
    pub fn severity(self) -> Severity {
        use ErrorKind::*;
        match self {
            NoMem | IoErr | Corrupt | Full | Protocol | NotADb => Severity::Fatal,
            Schema => Severity::Ddl,
            _ => Severity::Rollback,
        }
    }
}

/// An error carrying a [`ErrorKind`] and a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("({code:?}) {message}")]
pub struct Error {
    pub code: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorKind) -> Self {
        Self {
            message: code.to_string(),
            code,
        }
    }

    pub fn with_message(code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::with_message(ErrorKind::IoErr, e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
