use miette::Diagnostic;
use precomp_engine::{EngineFault, FaultKind};
use thiserror::Error;

use crate::status::Status;

/// Failure of a driver operation.
#[derive(Debug, Error, Diagnostic)]
pub enum DriverError {
    #[error("Module '{module}' could not be loaded")]
    #[diagnostic(code(precomp::driver::module_not_found))]
    ModuleNotFound {
        module: String,
        #[source]
        source: EngineFault,
    },

    #[error("Type '{name}' not found in module '{module}'")]
    #[diagnostic(code(precomp::driver::type_not_found))]
    TypeNotFound {
        module: String,
        name: String,
        #[source]
        source: EngineFault,
    },

    #[error("Enclosing type '{enclosing}' of '{name}' not found in module '{module}'")]
    #[diagnostic(code(precomp::driver::enclosing_type_not_found))]
    EnclosingTypeNotFound {
        module: String,
        enclosing: String,
        name: String,
        #[source]
        source: EngineFault,
    },

    #[error("No type definition in module '{module}' is named '{name}'")]
    #[diagnostic(
        code(precomp::driver::nested_type_not_found),
        help("nested type names are matched against the full qualified name, e.g. `Ns.Outer+Inner`")
    )]
    NestedTypeNotFound { module: String, name: String },

    #[error("Method '{name}' with the given signature not found on '{owner}'")]
    #[diagnostic(code(precomp::driver::method_not_found))]
    MethodNotFound { owner: String, name: String },

    #[error("{count} methods named '{name}' on '{owner}' match the given signature")]
    #[diagnostic(code(precomp::driver::ambiguous_method))]
    AmbiguousMethod {
        owner: String,
        name: String,
        count: usize,
    },

    #[error("Invalid {kind} handle {bits:#x}")]
    #[diagnostic(code(precomp::driver::invalid_handle))]
    InvalidHandle { kind: &'static str, bits: usize },

    #[error("Cannot instantiate '{target}'")]
    #[diagnostic(code(precomp::driver::instantiation))]
    Instantiation {
        target: String,
        #[source]
        source: EngineFault,
    },

    #[error("Engine fault: {0}")]
    #[diagnostic(code(precomp::driver::engine))]
    Engine(#[from] EngineFault),
}

impl DriverError {
    /// Status code reported for this error at the C boundary.
    pub fn status(&self) -> Status {
        match self {
            DriverError::ModuleNotFound { .. } => Status::MODULE_NOT_FOUND,
            DriverError::TypeNotFound { .. } | DriverError::NestedTypeNotFound { .. } => {
                Status::TYPE_NOT_FOUND
            }
            DriverError::EnclosingTypeNotFound { .. } => Status::ENCLOSING_TYPE_NOT_FOUND,
            DriverError::MethodNotFound { .. } => Status::METHOD_NOT_FOUND,
            DriverError::AmbiguousMethod { .. } => Status::AMBIGUOUS,
            DriverError::InvalidHandle { .. } => Status::INVALID_HANDLE,
            DriverError::Instantiation { .. } => Status::INSTANTIATION,
            DriverError::Engine(fault) => match fault.kind {
                FaultKind::NotFound => Status::TYPE_NOT_FOUND,
                FaultKind::TypeLoad => Status::TYPE_LOAD,
                FaultKind::Instantiation => Status::INSTANTIATION,
                FaultKind::Jit | FaultKind::SuspendedWhilePinned | FaultKind::Other => {
                    Status::ENGINE_FAULT
                }
            },
        }
    }
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
