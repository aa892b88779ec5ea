use crate::engine::HostEngine;

/// Scoped suspension-safety guard.
///
/// While a `PinnedScope` is alive the calling thread is pinned: the engine may
/// assume its managed state is stable and must not be suspended. Work that can
/// suspend (module loads, generic instantiation, code generation) goes through
/// [`PinnedScope::suspendable`], which releases the pin for the duration of the
/// closure and takes it back afterwards, also when the closure unwinds.
pub struct PinnedScope<'e> {
    engine: &'e dyn HostEngine,
}

impl<'e> PinnedScope<'e> {
    pub fn enter(engine: &'e dyn HostEngine) -> Self {
        engine.pin_thread();
        PinnedScope { engine }
    }

    /// Runs `work` with the pin released.
    pub fn suspendable<R>(&mut self, work: impl FnOnce() -> R) -> R {
        self.engine.unpin_thread();
        let repin = Repin(self.engine);
        let result = work();
        drop(repin);
        result
    }

    pub fn engine(&self) -> &'e dyn HostEngine {
        self.engine
    }
}

impl Drop for PinnedScope<'_> {
    fn drop(&mut self) {
        self.engine.unpin_thread();
    }
}

struct Repin<'e>(&'e dyn HostEngine);

impl Drop for Repin<'_> {
    fn drop(&mut self) {
        self.0.pin_thread();
    }
}
