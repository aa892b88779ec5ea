//! Stable handles for engine-owned entities.
//!
//! The host engine owns every type and method object; callers outside the engine
//! only ever see pointer-sized handles. A [`HandleTable`] maps those handles to the
//! engine's own keys, so handle equality means entity equality and the all-zero
//! bit pattern stays reserved as the "invalid" sentinel.

mod raw;
mod table;

pub use raw::{FuncRef, RawHandle, TypeRef, MAX_INDEX};
pub use table::HandleTable;
