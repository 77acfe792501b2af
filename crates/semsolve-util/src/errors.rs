use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for semsolve's application layer.
///
/// The resolver library reports its own typed errors; this type covers the
/// surfaces around it (configuration, registry files, the binary).
#[derive(Debug, Error, Diagnostic)]
pub enum SemsolveError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed configuration (e.g. semsolve.toml).
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check semsolve.toml for syntax errors"))]
    Config { message: String },

    /// A registry file could not be read or parsed.
    #[error("Registry error: {message}")]
    #[diagnostic(help("Registry files map library -> version -> {{dependency: range}}"))]
    Registry { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type SemsolveResult<T> = miette::Result<T>;
