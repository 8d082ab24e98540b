//! Error types for stylesheet compilation and publishing.

use thiserror::Error;

/// Errors that can occur while compiling or publishing a stylesheet.
///
/// Lock contention is deliberately absent: another process publishing the
/// same output is reported as [`crate::PublishOutcome::LockHeld`].
#[derive(Debug, Error)]
pub enum SheetError {
    /// The SASS compiler rejected the source
    #[error("SASS compilation failed: {message}")]
    Compile { message: String },

    /// A registered native function returned an error
    #[error("Function `{name}` failed: {message}")]
    Function { name: String, message: String },

    /// A native function with this name is already registered
    #[error("Function `{0}` is already registered")]
    DuplicateFunction(String),

    /// Injected variable name is not a valid SASS identifier
    #[error("Invalid variable name: `{0}`")]
    InvalidVariable(String),

    /// Logical path does not start with a registered mount
    #[error("No resource mount for `{0}`")]
    UnknownMount(String),

    /// Logical path is absolute or escapes its mount
    #[error("Invalid resource path: `{0}`")]
    InvalidResourcePath(String),

    /// The output lock file could not be opened or locked
    #[error("Failed to lock output: {0}")]
    Lock(#[source] std::io::Error),

    /// Compile record could not be read or written
    #[error("Compile metadata error: {0}")]
    Metadata(String),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SheetError>;
