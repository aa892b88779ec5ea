//! Dependency traces of JIT-compiled methods.
//!
//! A trace flattens the generic instantiation tree behind one compiled method into
//! class events and a closing function event. A receiver interprets it against a
//! stack: a class event pops `dep_count` units and pushes one, the function event
//! pops `type_arg_count + 1`. Every well-formed trace starts and ends at depth zero.

pub mod event;
pub mod reader;
pub mod recorder;
pub mod walk;

pub use event::{ClassEvent, FunctionEvent, TraceEvent};
pub use reader::{check_balance, ReplayedMethod, TraceError, TraceReader, TypeNode};
pub use recorder::{MemoryRecorder, Recorder};
pub use walk::{DependencyTrace, DependencyWalker};
