//! Contracts between the precompilation driver and the host execution engine.
//!
//! The engine (type loader, generics engine, JIT) is an external collaborator;
//! [`HostEngine`] is everything the driver and the recorder need from it.
//! [`MemoryEngine`] is a complete in-memory implementation used by tests and by
//! the `precomp` command line tool.

pub mod engine;
pub mod error;
pub mod memory;
pub mod scope;
pub mod types;

pub use engine::{HostEngine, JitListener};
pub use error::{EngineFault, EngineResult, FaultKind, ManifestError};
pub use memory::{EngineManifest, JitBehavior, MemoryEngine};
pub use scope::PinnedScope;
pub use types::{
    CodeAddress, CodeRegion, MethodFlags, MethodInfo, MethodKey, MethodLookup, ModuleId,
    OptimizationTier, PrepareConfig, TypeDefToken, TypeKey,
};
