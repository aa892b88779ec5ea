use std::path::PathBuf;

use miette::{Diagnostic, SourceSpan};
use precomp_driver::DriverError;
use precomp_engine::ManifestError;
use precomp_recorder::TraceError;
use thiserror::Error;

/// CLI-specific error type that provides rich diagnostics
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("Failed to read file {path}")]
    #[diagnostic(code(precomp::cli::io_error))]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest {path}: {message}")]
    #[diagnostic(code(precomp::cli::manifest_syntax))]
    ManifestSyntax {
        path: PathBuf,
        #[source_code]
        src: String,
        #[label("{message}")]
        span: Option<SourceSpan>,
        message: String,
    },

    #[error("Manifest {path} describes an inconsistent engine")]
    #[diagnostic(
        code(precomp::cli::manifest_invalid),
        help("enclosing types must be declared before the types nested in them")
    )]
    ManifestInvalid {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error("{failed} of {total} requests failed")]
    #[diagnostic(code(precomp::cli::requests_failed))]
    RequestsFailed { failed: usize, total: usize },

    #[error("Recorded trace does not replay")]
    #[diagnostic(
        code(precomp::cli::unbalanced_trace),
        help("every class event must find its dependencies on the stack")
    )]
    UnbalancedTrace {
        #[source]
        source: TraceError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Driver(#[from] DriverError),
}

/// Convert IO errors with context
pub fn convert_io_error(error: std::io::Error, path: PathBuf) -> CliError {
    CliError::IoError {
        path,
        source: error,
    }
}

impl From<TraceError> for CliError {
    fn from(error: TraceError) -> Self {
        CliError::UnbalancedTrace { source: error }
    }
}
