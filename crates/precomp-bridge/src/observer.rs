//! The link between the engine and an external observer tool.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use precomp_driver::DriverInterface;
use precomp_recorder::{DependencyTrace, Recorder};

thread_local! {
    /// Set while this thread runs a discovery.
    static DISCOVERING: Cell<bool> = const { Cell::new(false) };
    /// Address of the handle this thread is delivering a trace through, or 0.
    static EMITTING: Cell<usize> = const { Cell::new(0) };
    /// Traces produced by compilations the recorder triggered during delivery.
    static DEFERRED: RefCell<VecDeque<DependencyTrace>> = const { RefCell::new(VecDeque::new()) };
}

/// Exported symbol looked up by [`SymbolDiscovery`](crate::ffi::SymbolDiscovery).
pub const DEFAULT_SYMBOL: &str = "__precomp_observer";

/// Observer settings, read from the `[observer]` table of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// When false no discovery is attempted and nothing is ever recorded.
    pub enabled: bool,
    /// Symbol of the tool's registration function.
    pub symbol: String,
    /// Record compilations that happen before the engine reports itself initialized.
    pub record_before_ready: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        ObserverConfig {
            enabled: true,
            symbol: DEFAULT_SYMBOL.to_string(),
            record_before_ready: false,
        }
    }
}

/// Finds the external tool and exchanges interfaces with it.
///
/// Called at most once per [`ObserverHandle`].
pub trait Discovery: Send + Sync {
    fn discover(&self, driver: &Arc<dyn DriverInterface>) -> Option<Arc<dyn Recorder>>;
}

/// No tool is ever present.
pub struct NoDiscovery;

impl Discovery for NoDiscovery {
    fn discover(&self, _driver: &Arc<dyn DriverInterface>) -> Option<Arc<dyn Recorder>> {
        None
    }
}

type Registration =
    dyn Fn(Arc<dyn DriverInterface>) -> Option<Arc<dyn Recorder>> + Send + Sync + 'static;

/// A tool linked into the same program that registers through a closure.
pub struct StaticDiscovery {
    register: Box<Registration>,
}

impl StaticDiscovery {
    pub fn new(
        register: impl Fn(Arc<dyn DriverInterface>) -> Option<Arc<dyn Recorder>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        StaticDiscovery {
            register: Box::new(register),
        }
    }

    /// Always registers `recorder`.
    pub fn recorder(recorder: Arc<dyn Recorder>) -> Self {
        Self::new(move |_| Some(recorder.clone()))
    }
}

impl Discovery for StaticDiscovery {
    fn discover(&self, driver: &Arc<dyn DriverInterface>) -> Option<Arc<dyn Recorder>> {
        (self.register)(driver.clone())
    }
}

/// Process-lifetime link between the engine, the driver and an optional recorder.
///
/// Construct one at startup and pass it to the compilation hook and to whoever
/// needs the driver. Discovery happens once, either through [`initialize`] or on
/// the first [`recorder`] call after the engine is ready.
///
/// [`initialize`]: ObserverHandle::initialize
/// [`recorder`]: ObserverHandle::recorder
pub struct ObserverHandle {
    driver: Arc<dyn DriverInterface>,
    discovery: Box<dyn Discovery>,
    config: ObserverConfig,
    ready: AtomicBool,
    recorder: OnceCell<Option<Arc<dyn Recorder>>>,
    emit_lock: Mutex<()>,
}

impl ObserverHandle {
    pub fn new(
        driver: Arc<dyn DriverInterface>,
        discovery: Box<dyn Discovery>,
        config: ObserverConfig,
    ) -> Self {
        ObserverHandle {
            driver,
            discovery,
            config,
            ready: AtomicBool::new(false),
            recorder: OnceCell::new(),
            emit_lock: Mutex::new(()),
        }
    }

    /// Engine lifecycle notification. Marks the bridge ready without discovering.
    pub fn engine_initialized(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            log::debug!("observer bridge ready");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Runs discovery now if it has not run yet. Returns whether a recorder is linked.
    pub fn initialize(&self) -> bool {
        self.linked().is_some()
    }

    /// The linked recorder, or `None` if no tool registered or the bridge is not
    /// ready yet.
    pub fn recorder(&self) -> Option<Arc<dyn Recorder>> {
        if !self.is_ready() && !self.config.record_before_ready {
            return None;
        }
        self.linked()
    }

    /// The driver stays usable whether or not a tool was found.
    pub fn driver(&self) -> &Arc<dyn DriverInterface> {
        &self.driver
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Delivers one complete trace. Traces emitted concurrently never interleave.
    ///
    /// The recorder may compile code while it receives a trace. Traces of those
    /// compilations are delivered after the current one, before the lock is released.
    pub fn emit(&self, trace: &DependencyTrace) -> bool {
        let Some(recorder) = self.recorder() else {
            return false;
        };
        let this = self as *const Self as usize;
        if EMITTING.with(Cell::get) == this {
            DEFERRED.with(|queue| queue.borrow_mut().push_back(trace.clone()));
            return true;
        }

        let _guard = self.emit_lock.lock();
        let _emitting = Emitting::enter(this);
        trace.replay_into(recorder.as_ref());
        while let Some(nested) = DEFERRED.with(|queue| queue.borrow_mut().pop_front()) {
            log::trace!("delivering deferred trace of '{}'", nested.function().name);
            nested.replay_into(recorder.as_ref());
        }
        true
    }

    fn linked(&self) -> Option<Arc<dyn Recorder>> {
        if let Some(linked) = self.recorder.get() {
            return linked.clone();
        }
        // A tool's registration function may itself compile code; those compilations
        // see no recorder instead of waiting on the discovery that triggered them.
        if DISCOVERING.with(Cell::get) {
            return None;
        }
        self.recorder
            .get_or_init(|| {
                if !self.config.enabled {
                    log::info!("observer disabled");
                    return None;
                }
                DISCOVERING.with(|flag| flag.set(true));
                let _reset = ResetDiscovering;
                let recorder = self.discovery.discover(&self.driver);
                match &recorder {
                    Some(_) => log::info!("observer tool linked"),
                    None => log::info!("no observer tool registered, recording disabled"),
                }
                recorder
            })
            .clone()
    }
}

struct ResetDiscovering;

impl Drop for ResetDiscovering {
    fn drop(&mut self) {
        DISCOVERING.with(|flag| flag.set(false));
    }
}

/// Marks the thread as emitting through one handle. Restores whatever an outer
/// handle had set, including its pending traces.
struct Emitting {
    outer: usize,
    outer_deferred: VecDeque<DependencyTrace>,
}

impl Emitting {
    fn enter(handle: usize) -> Self {
        Emitting {
            outer: EMITTING.with(|flag| flag.replace(handle)),
            outer_deferred: DEFERRED.with(|queue| queue.take()),
        }
    }
}

impl Drop for Emitting {
    fn drop(&mut self) {
        EMITTING.with(|flag| flag.set(self.outer));
        let outer = std::mem::take(&mut self.outer_deferred);
        DEFERRED.with(|queue| *queue.borrow_mut() = outer);
    }
}
