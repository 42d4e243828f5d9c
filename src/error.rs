//! Error types for lease file loading.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

/// Errors that can occur while configuring or loading a lease database.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system I/O error while reading a lease or config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config file).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The lease source is unusable or the configuration is invalid.
    ///
    /// Returned by [`DhcpdLeases::new`](crate::DhcpdLeases::new) when the
    /// lease file does not exist or is not a regular file, before any parse
    /// is attempted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A `lease` block violates the lease file grammar.
    ///
    /// This includes malformed address literals, invalid dates, unbalanced
    /// braces, and clauses cut off by the end of the file. A failed load
    /// leaves the previously published table untouched.
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
}

impl Error {
    /// Returns true for grammar violations found while parsing.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }

    /// Returns true when the lease source or configuration is unusable.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

/// A specialized Result type for lease operations.
pub type Result<T> = std::result::Result<T, Error>;
