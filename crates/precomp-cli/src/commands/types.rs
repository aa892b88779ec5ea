use std::path::PathBuf;

use precomp_driver::DriverError;
use precomp_engine::{EngineFault, FaultKind, HostEngine, MemoryEngine, TypeDefToken};

use super::{ObserverKind, Session};
use crate::error::CliError;
use crate::manifest::PrecompManifest;

/// A type definition as the engine sees it.
#[derive(Debug, PartialEq, Eq)]
pub struct TypeListing {
    pub token: TypeDefToken,
    pub name: Result<String, String>,
}

#[derive(Debug)]
pub struct ModuleListing {
    pub file: String,
    pub types: Vec<TypeListing>,
}

pub fn list_types(engine: &MemoryEngine, module: &str) -> Result<ModuleListing, DriverError> {
    let id = engine
        .load_module(module)
        .map_err(|source| match source.kind {
            FaultKind::NotFound => DriverError::ModuleNotFound {
                module: module.to_string(),
                source,
            },
            _ => DriverError::Engine(source),
        })?;
    let types = engine
        .type_definitions(id)?
        .into_iter()
        .map(|token| TypeListing {
            token,
            name: engine
                .load_type_def(id, token)
                .and_then(|ty| engine.qualified_name(ty))
                .map_err(|fault: EngineFault| fault.message),
        })
        .collect();
    Ok(ModuleListing {
        file: engine.module_file(id)?,
        types,
    })
}

pub fn handle_types(manifest_path: PathBuf, module: String) -> Result<(), CliError> {
    let manifest = PrecompManifest::load(&manifest_path)?;
    let session = Session::open(&manifest_path, &manifest, ObserverKind::None)?;
    let listing = list_types(&session.engine, &module)?;

    println!("{} ({})", module, listing.file);
    for entry in listing.types {
        match entry.name {
            Ok(name) => println!("  {}  {}", entry.token, name),
            Err(message) => println!("  {}  <failed to load: {}>", entry.token, message),
        }
    }
    Ok(())
}
