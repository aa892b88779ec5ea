//! Glue between the host engine, the driver and an external observer tool.
//!
//! [`ObserverHandle`] discovers the tool once and owns the recorder it returns.
//! [`CompilationHook`] listens to the engine's JIT and emits a dependency trace per
//! compiled method. [`ffi`] holds the C tables exchanged with the tool.

pub mod ffi;
pub mod hook;
pub mod observer;

pub use ffi::{DriverTable, ExportedDriver, ForeignRecorder, RecorderTable, SymbolDiscovery};
pub use hook::{CompilationHook, HookStats};
pub use observer::{
    Discovery, NoDiscovery, ObserverConfig, ObserverHandle, StaticDiscovery, DEFAULT_SYMBOL,
};
