use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for loading and validating resolver inputs.
#[derive(Debug, Error, Diagnostic)]
pub enum WiringError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading a specific file failed.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or malformed repository description.
    #[error("Repository error: {message}")]
    #[diagnostic(help("Check the repository file for syntax errors and unknown resource names"))]
    Repository { message: String },

    /// A requirement filter could not be parsed.
    #[error("Invalid filter `{filter}`: {message}")]
    #[diagnostic(help("Filters use LDAP syntax, e.g. (&(osgi.wiring.package=org.example)(version>=1.0.0))"))]
    Filter { filter: String, message: String },

    /// A version or version range could not be parsed.
    #[error("Invalid version `{version}`: {message}")]
    Version { version: String, message: String },

    /// User configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type WiringResult<T> = miette::Result<T>;
