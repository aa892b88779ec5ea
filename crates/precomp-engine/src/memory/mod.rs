//! In-memory reference engine.
//!
//! `MemoryEngine` implements [`HostEngine`] over a static description of modules,
//! type definitions and methods. It canonicalizes generic instantiations, enforces
//! the pinning discipline of [`PinnedScope`](crate::PinnedScope), and simulates a
//! JIT with deterministic addresses so the driver and the recorder can be exercised
//! without a real runtime.

mod manifest;

pub use manifest::{EngineManifest, JitBehavior, MethodDef, ModuleDef, TypeDef};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;

use crate::engine::{HostEngine, JitListener};
use crate::error::{EngineFault, EngineResult, FaultKind, ManifestError};
use crate::types::{
    CodeAddress, CodeRegion, MethodFlags, MethodInfo, MethodKey, MethodLookup, ModuleId,
    PrepareConfig, TypeDefToken, TypeKey,
};

thread_local! {
    static PIN_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Pinning depth of the calling thread.
pub fn pin_depth() -> u32 {
    PIN_DEPTH.with(|depth| depth.get())
}

const CODE_BASE: u64 = 0x7f00_0000_1000;
const CODE_ALIGN: u64 = 0x10;

struct ModuleEntry {
    name: String,
    file: String,
    loaded: bool,
    /// Type definitions in metadata order.
    types: Vec<TypeKey>,
}

enum TypeShape {
    Definition {
        module: ModuleId,
        name: String,
        namespace: Option<String>,
        enclosing: Option<TypeKey>,
        arity: u32,
        load_error: Option<String>,
    },
    Instance {
        definition: TypeKey,
        args: Vec<TypeKey>,
    },
}

struct TypeEntry {
    shape: TypeShape,
    methods: Vec<MethodKey>,
}

#[derive(Clone)]
struct MethodEntry {
    name: String,
    signature: Vec<u8>,
    owner: TypeKey,
    arity: u32,
    method_args: Vec<TypeKey>,
    flags: MethodFlags,
    jit: JitBehavior,
    code: Option<CodeAddress>,
    compile_count: u32,
}

#[derive(Default)]
struct State {
    modules: Vec<ModuleEntry>,
    types: Vec<TypeEntry>,
    methods: Vec<MethodEntry>,
    type_instances: FxHashMap<(TypeKey, Vec<TypeKey>), TypeKey>,
    method_instances: FxHashMap<(MethodKey, TypeKey, Vec<TypeKey>), MethodKey>,
    regions: FxHashMap<CodeAddress, u64>,
    next_address: u64,
}

/// Reference [`HostEngine`] backed by in-memory tables.
pub struct MemoryEngine {
    state: RwLock<State>,
    listeners: RwLock<Vec<Arc<dyn JitListener>>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        MemoryEngine {
            state: RwLock::new(State {
                next_address: CODE_BASE,
                ..State::default()
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl MemoryEngine {
    pub fn from_manifest(manifest: &EngineManifest) -> Result<Self, ManifestError> {
        let mut state = State {
            next_address: CODE_BASE,
            ..State::default()
        };

        for module_def in &manifest.modules {
            if state.modules.iter().any(|m| m.name == module_def.name) {
                return Err(ManifestError::Invalid(format!(
                    "module '{}' is declared twice",
                    module_def.name
                )));
            }
            let module = ModuleId(state.modules.len() as u32);
            let mut by_name: FxHashMap<String, TypeKey> = FxHashMap::default();
            let mut types = Vec::with_capacity(module_def.types.len());

            for type_def in &module_def.types {
                let enclosing = match &type_def.enclosing {
                    Some(outer) => Some(*by_name.get(outer).ok_or_else(|| {
                        ManifestError::Invalid(format!(
                            "type '{}' in module '{}' names unknown enclosing type '{}'",
                            type_def.name, module_def.name, outer
                        ))
                    })?),
                    None => None,
                };
                let qualified = match (&type_def.enclosing, &type_def.namespace) {
                    (Some(outer), _) => format!("{}+{}", outer, type_def.name),
                    (None, Some(ns)) if !ns.is_empty() => format!("{}.{}", ns, type_def.name),
                    (None, _) => type_def.name.clone(),
                };

                let key = TypeKey(state.types.len() as u64);
                state.types.push(TypeEntry {
                    shape: TypeShape::Definition {
                        module,
                        name: type_def.name.clone(),
                        namespace: type_def.namespace.clone(),
                        enclosing,
                        arity: type_def.arity,
                        load_error: type_def.load_error.clone(),
                    },
                    methods: Vec::new(),
                });

                for method_def in &type_def.methods {
                    let method = MethodKey(state.methods.len() as u64);
                    state.methods.push(MethodEntry {
                        name: method_def.name.clone(),
                        signature: method_def.signature.clone(),
                        owner: key,
                        arity: method_def.arity,
                        method_args: Vec::new(),
                        flags: MethodFlags {
                            dynamic: method_def.dynamic,
                            il_stub: method_def.il_stub,
                            pre_implemented: method_def.pre_implemented,
                            has_native_code_slot: method_def.native_code_slot,
                            has_precode: method_def.precode,
                            default_interface: method_def.default_interface,
                        },
                        jit: method_def.jit,
                        code: None,
                        compile_count: 0,
                    });
                    state.types[key.0 as usize].methods.push(method);
                }

                by_name.insert(qualified, key);
                types.push(key);
            }

            state.modules.push(ModuleEntry {
                name: module_def.name.clone(),
                file: module_def
                    .path
                    .clone()
                    .unwrap_or_else(|| module_def.name.clone()),
                loaded: false,
                types,
            });
        }

        log::debug!(
            "memory engine: {} modules, {} types, {} methods",
            state.modules.len(),
            state.types.len(),
            state.methods.len()
        );

        Ok(MemoryEngine {
            state: RwLock::new(state),
            listeners: RwLock::new(Vec::new()),
        })
    }

    pub fn load_manifest(path: &Path) -> Result<Self, ManifestError> {
        Self::from_manifest(&EngineManifest::load(path)?)
    }

    /// Number of times the JIT produced code for `method`.
    pub fn compile_count(&self, method: MethodKey) -> u32 {
        self.state
            .read()
            .methods
            .get(method.0 as usize)
            .map_or(0, |m| m.compile_count)
    }

    /// Simulates an ordinary first call of `method`, which JIT-compiles it if needed.
    pub fn invoke(&self, method: MethodKey) -> EngineResult<Option<CodeAddress>> {
        self.prepare_code(method, &PrepareConfig::on_call())
    }

    fn ensure_unpinned(&self, operation: &str) -> EngineResult<()> {
        if pin_depth() > 0 {
            return Err(EngineFault::new(
                FaultKind::SuspendedWhilePinned,
                format!("{} may suspend and was called on a pinned thread", operation),
            ));
        }
        Ok(())
    }

    fn notify_compiled(&self, method: MethodKey) {
        let listeners: Vec<Arc<dyn JitListener>> = self.listeners.read().clone();
        for listener in listeners {
            listener.method_compiled(self, method);
        }
    }
}

impl State {
    fn module(&self, module: ModuleId) -> EngineResult<&ModuleEntry> {
        self.modules
            .get(module.0 as usize)
            .ok_or_else(|| EngineFault::not_found(format!("no module with id {}", module.0)))
    }

    fn loaded_module(&self, module: ModuleId) -> EngineResult<&ModuleEntry> {
        let entry = self.module(module)?;
        if !entry.loaded {
            return Err(EngineFault::not_found(format!(
                "module '{}' is not loaded",
                entry.name
            )));
        }
        Ok(entry)
    }

    fn ty(&self, ty: TypeKey) -> EngineResult<&TypeEntry> {
        self.types
            .get(ty.0 as usize)
            .ok_or_else(|| EngineFault::not_found(format!("no type with key {}", ty.0)))
    }

    fn method(&self, method: MethodKey) -> EngineResult<&MethodEntry> {
        self.methods
            .get(method.0 as usize)
            .ok_or_else(|| EngineFault::not_found(format!("no method with key {}", method.0)))
    }

    fn check_loadable(&self, ty: TypeKey) -> EngineResult<TypeKey> {
        if let TypeShape::Definition {
            load_error: Some(message),
            ..
        } = &self.ty(ty)?.shape
        {
            return Err(EngineFault::type_load(message.clone()));
        }
        Ok(ty)
    }

    fn module_of(&self, ty: TypeKey) -> EngineResult<ModuleId> {
        match &self.ty(ty)?.shape {
            TypeShape::Definition { module, .. } => Ok(*module),
            TypeShape::Instance { definition, .. } => self.module_of(*definition),
        }
    }

    fn qualified_name(&self, ty: TypeKey) -> EngineResult<String> {
        match &self.ty(ty)?.shape {
            TypeShape::Definition {
                name,
                namespace,
                enclosing,
                ..
            } => Ok(match (enclosing, namespace) {
                (Some(outer), _) => format!("{}+{}", self.qualified_name(*outer)?, name),
                (None, Some(ns)) if !ns.is_empty() => format!("{}.{}", ns, name),
                (None, _) => name.clone(),
            }),
            TypeShape::Instance { definition, args } => {
                let mut rendered = self.qualified_name(*definition)?;
                rendered.push('<');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        rendered.push(',');
                    }
                    rendered.push_str(&self.qualified_name(*arg)?);
                }
                rendered.push('>');
                Ok(rendered)
            }
        }
    }

    /// Arity of a type definition that still has unbound parameters, 0 otherwise.
    fn open_arity(&self, ty: TypeKey) -> EngineResult<u32> {
        Ok(match &self.ty(ty)?.shape {
            TypeShape::Definition { arity, .. } => *arity,
            TypeShape::Instance { .. } => 0,
        })
    }

    fn allocate_code(&mut self, size: u64) -> CodeAddress {
        let address = CodeAddress(self.next_address);
        self.next_address += (size + CODE_ALIGN - 1) / CODE_ALIGN * CODE_ALIGN;
        address
    }
}

fn code_size(method: &MethodEntry) -> u64 {
    32 + method.signature.len() as u64 * 8 + method.method_args.len() as u64 * 16
}

impl HostEngine for MemoryEngine {
    fn load_module(&self, file_name: &str) -> EngineResult<ModuleId> {
        self.ensure_unpinned("module load")?;
        let mut state = self.state.write();
        let index = state
            .modules
            .iter()
            .position(|m| m.name == file_name || m.file == file_name)
            .ok_or_else(|| EngineFault::not_found(format!("module '{}' not found", file_name)))?;
        let module = &mut state.modules[index];
        if !module.loaded {
            log::debug!("loading module '{}'", module.name);
            module.loaded = true;
        }
        Ok(ModuleId(index as u32))
    }

    fn load_type_by_name(&self, module: ModuleId, name: &str) -> EngineResult<TypeKey> {
        self.ensure_unpinned("type load")?;
        let state = self.state.read();
        let entry = state.loaded_module(module)?;
        if name.contains('+') {
            return Err(EngineFault::not_found(format!(
                "type '{}' not found in '{}': nested names are not resolvable by name",
                name, entry.name
            )));
        }
        for &ty in &entry.types {
            let top_level = matches!(
                state.ty(ty)?.shape,
                TypeShape::Definition { enclosing: None, .. }
            );
            if top_level && state.qualified_name(ty)? == name {
                return state.check_loadable(ty);
            }
        }
        Err(EngineFault::not_found(format!(
            "type '{}' not found in '{}'",
            name, entry.name
        )))
    }

    fn type_definitions(&self, module: ModuleId) -> EngineResult<Vec<TypeDefToken>> {
        let state = self.state.read();
        let entry = state.loaded_module(module)?;
        Ok((0..entry.types.len() as u32)
            .map(TypeDefToken::from_row)
            .collect())
    }

    fn load_type_def(&self, module: ModuleId, token: TypeDefToken) -> EngineResult<TypeKey> {
        self.ensure_unpinned("type load")?;
        let state = self.state.read();
        let entry = state.loaded_module(module)?;
        let ty = token
            .row()
            .and_then(|row| entry.types.get(row as usize).copied())
            .ok_or_else(|| {
                EngineFault::not_found(format!("bad type definition token {}", token))
            })?;
        state.check_loadable(ty)
    }

    fn module_of(&self, ty: TypeKey) -> EngineResult<ModuleId> {
        self.state.read().module_of(ty)
    }

    fn module_file(&self, module: ModuleId) -> EngineResult<String> {
        Ok(self.state.read().module(module)?.file.clone())
    }

    fn qualified_name(&self, ty: TypeKey) -> EngineResult<String> {
        self.state.read().qualified_name(ty)
    }

    fn generic_arguments(&self, ty: TypeKey) -> EngineResult<Vec<TypeKey>> {
        Ok(match &self.state.read().ty(ty)?.shape {
            TypeShape::Definition { .. } => Vec::new(),
            TypeShape::Instance { args, .. } => args.clone(),
        })
    }

    fn instantiate_type(&self, generic: TypeKey, args: &[TypeKey]) -> EngineResult<TypeKey> {
        self.ensure_unpinned("type instantiation")?;
        let mut state = self.state.write();
        let cache_key = (generic, args.to_vec());
        if let Some(&existing) = state.type_instances.get(&cache_key) {
            return Ok(existing);
        }

        state.check_loadable(generic)?;
        let arity = state.open_arity(generic)?;
        if arity == 0 {
            return Err(EngineFault::instantiation(format!(
                "'{}' is not a generic type definition",
                state.qualified_name(generic)?
            )));
        }
        if arity as usize != args.len() {
            return Err(EngineFault::instantiation(format!(
                "'{}' expects {} type arguments, got {}",
                state.qualified_name(generic)?,
                arity,
                args.len()
            )));
        }
        for &arg in args {
            state.check_loadable(arg)?;
            if state.open_arity(arg)? > 0 {
                return Err(EngineFault::instantiation(format!(
                    "open generic type '{}' cannot be used as a type argument",
                    state.qualified_name(arg)?
                )));
            }
        }

        let instance = TypeKey(state.types.len() as u64);
        let definition_methods = state.ty(generic)?.methods.clone();
        let mut methods = Vec::with_capacity(definition_methods.len());
        for method in definition_methods {
            let mut copy = state.method(method)?.clone();
            copy.owner = instance;
            copy.code = None;
            copy.compile_count = 0;
            methods.push(MethodKey(state.methods.len() as u64));
            state.methods.push(copy);
        }
        state.types.push(TypeEntry {
            shape: TypeShape::Instance {
                definition: generic,
                args: args.to_vec(),
            },
            methods,
        });
        state.type_instances.insert(cache_key, instance);
        log::trace!("instantiated {}", state.qualified_name(instance)?);
        Ok(instance)
    }

    fn instantiate_method(
        &self,
        generic: MethodKey,
        owner: TypeKey,
        args: &[TypeKey],
    ) -> EngineResult<MethodKey> {
        self.ensure_unpinned("method instantiation")?;
        let mut state = self.state.write();
        let cache_key = (generic, owner, args.to_vec());
        if let Some(&existing) = state.method_instances.get(&cache_key) {
            return Ok(existing);
        }

        let definition = state.method(generic)?.clone();
        state.ty(owner)?;
        if definition.arity == 0 || !definition.method_args.is_empty() {
            return Err(EngineFault::instantiation(format!(
                "'{}' is not a generic method definition",
                definition.name
            )));
        }
        if definition.arity as usize != args.len() {
            return Err(EngineFault::instantiation(format!(
                "'{}' expects {} type arguments, got {}",
                definition.name,
                definition.arity,
                args.len()
            )));
        }
        for &arg in args {
            state.check_loadable(arg)?;
            if state.open_arity(arg)? > 0 {
                return Err(EngineFault::instantiation(format!(
                    "open generic type '{}' cannot be used as a type argument",
                    state.qualified_name(arg)?
                )));
            }
        }

        let instance = MethodKey(state.methods.len() as u64);
        state.methods.push(MethodEntry {
            owner,
            method_args: args.to_vec(),
            code: None,
            compile_count: 0,
            ..definition
        });
        state.method_instances.insert(cache_key, instance);
        Ok(instance)
    }

    fn find_method(&self, ty: TypeKey, name: &str, signature: &[u8]) -> EngineResult<MethodLookup> {
        let state = self.state.read();
        let mut matches = Vec::new();
        for &method in &state.ty(ty)?.methods {
            let entry = state.method(method)?;
            if entry.name == name && entry.signature == signature {
                matches.push(method);
            }
        }
        Ok(match matches.as_slice() {
            [] => MethodLookup::NotFound,
            [single] => MethodLookup::Unique(*single),
            many => MethodLookup::Ambiguous(many.len()),
        })
    }

    fn method_info(&self, method: MethodKey) -> EngineResult<MethodInfo> {
        let state = self.state.read();
        let entry = state.method(method)?;
        Ok(MethodInfo {
            name: entry.name.clone(),
            signature: entry.signature.clone(),
            owner: entry.owner,
            method_args: entry.method_args.clone(),
            arity: entry.arity,
            flags: entry.flags,
        })
    }

    fn native_code(&self, method: MethodKey) -> EngineResult<Option<CodeAddress>> {
        Ok(self.state.read().method(method)?.code)
    }

    fn prepare_code(
        &self,
        method: MethodKey,
        config: &PrepareConfig,
    ) -> EngineResult<Option<CodeAddress>> {
        self.ensure_unpinned("code preparation")?;
        let address = {
            let mut state = self.state.write();
            let entry = state.method(method)?.clone();
            if let Some(existing) = entry.code {
                return Ok(Some(existing));
            }
            if config.force_full_preparation && !entry.flags.supports_direct_preparation() {
                return Ok(None);
            }
            if entry.arity as usize != entry.method_args.len()
                || state.open_arity(entry.owner)? > 0
            {
                return Err(EngineFault::instantiation(format!(
                    "cannot generate code for open generic method '{}'",
                    entry.name
                )));
            }

            match entry.jit {
                JitBehavior::Error => {
                    return Err(EngineFault::jit(format!(
                        "code generation for '{}' threw",
                        entry.name
                    )))
                }
                JitBehavior::Fails => return Ok(None),
                JitBehavior::Ok | JitBehavior::InvalidCodeInfo => {}
            }

            let size = code_size(&entry);
            let address = state.allocate_code(size);
            if entry.jit == JitBehavior::Ok {
                state.regions.insert(address, size);
            }
            let slot = &mut state.methods[method.0 as usize];
            slot.code = Some(address);
            slot.compile_count += 1;
            log::debug!(
                "jit: '{}' -> {:#x} ({} bytes, {:?})",
                entry.name,
                address.0,
                size,
                config.tier
            );
            address
        };

        self.notify_compiled(method);
        Ok(Some(address))
    }

    fn code_region(&self, address: CodeAddress) -> Option<CodeRegion> {
        self.state
            .read()
            .regions
            .get(&address)
            .map(|&size| CodeRegion {
                start: address,
                size,
            })
    }

    fn pin_thread(&self) {
        PIN_DEPTH.with(|depth| depth.set(depth.get() + 1));
    }

    fn unpin_thread(&self) {
        PIN_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }

    fn add_jit_listener(&self, listener: Arc<dyn JitListener>) {
        self.listeners.write().push(listener);
    }
}
