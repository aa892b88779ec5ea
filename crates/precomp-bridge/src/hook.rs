use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use precomp_engine::{EngineResult, HostEngine, JitListener, MethodKey};
use precomp_recorder::DependencyWalker;

use crate::observer::ObserverHandle;

/// Diagnostic counters of a [`CompilationHook`].
#[derive(Debug, Default)]
pub struct HookStats {
    recorded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl HookStats {
    /// Traces delivered to the recorder.
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Compilations that are not recordable (stubs, native image code, no code).
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Compilations whose trace could not be produced or delivered.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Records a dependency trace for every JIT compilation the engine reports.
///
/// Recording is best effort: whatever happens here, the compilation it reports on
/// is not affected.
pub struct CompilationHook {
    observer: Arc<ObserverHandle>,
    stats: HookStats,
}

impl CompilationHook {
    pub fn new(observer: Arc<ObserverHandle>) -> Self {
        CompilationHook {
            observer,
            stats: HookStats::default(),
        }
    }

    /// Creates a hook and registers it with `engine`.
    pub fn install(observer: Arc<ObserverHandle>, engine: &dyn HostEngine) -> Arc<Self> {
        let hook = Arc::new(CompilationHook::new(observer));
        engine.add_jit_listener(hook.clone());
        hook
    }

    pub fn stats(&self) -> &HookStats {
        &self.stats
    }

    fn record(&self, engine: &dyn HostEngine, method: MethodKey) {
        match recordable(engine, method) {
            Ok(true) => {}
            Ok(false) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(fault) => {
                log::warn!("cannot inspect compiled method {:?}: {}", method, fault);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let trace = match DependencyWalker::trace_method(engine, method) {
            Ok(trace) => trace,
            Err(fault) => {
                log::warn!("dependency walk of {:?} failed: {}", method, fault);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        if self.observer.emit(&trace) {
            self.stats.recorded.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Whether a compiled method produces a trace.
fn recordable(engine: &dyn HostEngine, method: MethodKey) -> EngineResult<bool> {
    let info = engine.method_info(method)?;
    if info.flags.is_transient() || info.flags.pre_implemented {
        return Ok(false);
    }
    let Some(code) = engine.native_code(method)? else {
        return Ok(false);
    };
    Ok(engine.code_region(code).is_some())
}

impl JitListener for CompilationHook {
    fn method_compiled(&self, engine: &dyn HostEngine, method: MethodKey) {
        if self.observer.recorder().is_none() {
            return;
        }
        if catch_unwind(AssertUnwindSafe(|| self.record(engine, method))).is_err() {
            log::warn!("recording of {:?} panicked", method);
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
