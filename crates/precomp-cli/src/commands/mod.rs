pub mod compile;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use precomp_bridge::{
    CompilationHook, Discovery, NoDiscovery, ObserverHandle, StaticDiscovery, SymbolDiscovery,
};
use precomp_driver::Driver;
use precomp_engine::MemoryEngine;
use precomp_recorder::MemoryRecorder;

use crate::error::CliError;
use crate::manifest::PrecompManifest;

/// Where the observer bridge looks for a tool.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverKind {
    /// Record into memory and print the trace
    Memory,
    /// Look the registration symbol up in the running program
    Symbol,
    /// Never record
    None,
}

/// An engine loaded from a manifest, with the driver and bridge wired to it.
pub struct Session {
    pub engine: Arc<MemoryEngine>,
    pub driver: Arc<Driver>,
    pub observer: Arc<ObserverHandle>,
    pub hook: Arc<CompilationHook>,
    /// Present for [`ObserverKind::Memory`].
    pub recorder: Option<Arc<MemoryRecorder>>,
}

impl Session {
    pub fn open(
        path: &Path,
        manifest: &PrecompManifest,
        kind: ObserverKind,
    ) -> Result<Self, CliError> {
        let engine = Arc::new(MemoryEngine::from_manifest(&manifest.engine).map_err(|e| {
            CliError::ManifestInvalid {
                path: path.to_path_buf(),
                source: e,
            }
        })?);
        let driver = Arc::new(Driver::new(engine.clone(), manifest.driver.clone()));

        let mut recorder = None;
        let discovery: Box<dyn Discovery> = match kind {
            ObserverKind::Memory => {
                let memory = Arc::new(MemoryRecorder::new());
                recorder = Some(memory.clone());
                Box::new(StaticDiscovery::recorder(memory))
            }
            ObserverKind::Symbol => Box::new(SymbolDiscovery::new(manifest.observer.symbol.clone())),
            ObserverKind::None => Box::new(NoDiscovery),
        };
        let observer = Arc::new(ObserverHandle::new(
            driver.clone(),
            discovery,
            manifest.observer.clone(),
        ));
        let hook = CompilationHook::install(observer.clone(), engine.as_ref());

        // Every module is in place once the manifest is loaded.
        observer.engine_initialized();
        observer.initialize();

        Ok(Session {
            engine,
            driver,
            observer,
            hook,
            recorder,
        })
    }
}
