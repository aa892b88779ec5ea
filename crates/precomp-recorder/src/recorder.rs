use parking_lot::Mutex;

use crate::event::{ClassEvent, FunctionEvent, TraceEvent};

/// Receiver of dependency traces.
///
/// Calls arrive in the paired order of a [`DependencyTrace`](crate::DependencyTrace):
/// class events for every dependency, then one function event.
pub trait Recorder: Send + Sync {
    fn record_class(&self, module: &str, name: &str, dep_count: u32);

    fn record_function(&self, name: &str, signature: &[u8], type_arg_count: u32);
}

/// Recorder that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Drains the recorded events.
    pub fn take(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Recorder for MemoryRecorder {
    fn record_class(&self, module: &str, name: &str, dep_count: u32) {
        self.events.lock().push(TraceEvent::Class(ClassEvent {
            module: module.to_string(),
            name: name.to_string(),
            dep_count,
        }));
    }

    fn record_function(&self, name: &str, signature: &[u8], type_arg_count: u32) {
        self.events.lock().push(TraceEvent::Function(FunctionEvent {
            name: name.to_string(),
            signature: signature.to_vec(),
            type_arg_count,
        }));
    }
}
