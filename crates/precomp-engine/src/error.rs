use std::path::PathBuf;
use thiserror::Error;

/// Broad classification of an engine failure, used by the driver to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// A module, type or member does not exist.
    NotFound,
    /// A type exists but failed to load.
    TypeLoad,
    /// Generic instantiation rejected the arguments (arity, constraints, open types).
    Instantiation,
    /// Code generation threw.
    Jit,
    /// An operation that may suspend was called while the thread was pinned.
    SuspendedWhilePinned,
    Other,
}

/// An error raised inside the host engine (the analogue of a managed exception).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct EngineFault {
    pub kind: FaultKind,
    pub message: String,
}

impl EngineFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FaultKind::NotFound, message)
    }

    pub fn type_load(message: impl Into<String>) -> Self {
        Self::new(FaultKind::TypeLoad, message)
    }

    pub fn instantiation(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Instantiation, message)
    }

    pub fn jit(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Jit, message)
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineFault>;

/// Errors raised while reading an engine manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid manifest: {0}")]
    Invalid(String),
}
