//! Ahead-of-time compilation driver.
//!
//! An external tool names classes and methods textually, specializes generic
//! definitions with handles it obtained earlier, and forces native code generation,
//! all through [`DriverInterface`]. Every operation runs inside a
//! [`PinnedScope`](precomp_engine::PinnedScope) and releases the pin around engine
//! work that may suspend.

pub mod compiler;
pub mod config;
pub mod driver;
pub mod error;
pub mod resolver;
pub mod specializer;
pub mod status;

pub use compiler::{CompileOutcome, UnableReason};
pub use config::{AmbiguityPolicy, DriverConfig};
pub use driver::{Driver, DriverInterface};
pub use error::{DriverError, DriverResult};
pub use status::Status;
