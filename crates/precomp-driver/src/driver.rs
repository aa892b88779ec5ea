use parking_lot::RwLock;
use std::sync::Arc;

use precomp_engine::{HostEngine, MethodKey, PinnedScope, TypeKey};
use precomp_handles::{FuncRef, HandleTable, TypeRef};

use crate::compiler::{compile_method, CompileOutcome};
use crate::config::{AmbiguityPolicy, DriverConfig};
use crate::error::{DriverError, DriverResult};
use crate::{resolver, specializer};

/// Operations an external tool uses to force ahead-of-time compilation.
pub trait DriverInterface: Send + Sync {
    /// Resolves a (possibly nested, `Outer+Inner`) class in a module.
    fn resolve_class(&self, file_name: &str, class_name: &str) -> DriverResult<TypeRef>;

    /// Instantiates a generic type definition with an ordered argument list.
    fn specialize_class(&self, generic: TypeRef, type_args: &[TypeRef]) -> DriverResult<TypeRef>;

    /// Finds the method of `class` with exactly this name and signature blob.
    fn resolve_function(
        &self,
        class: TypeRef,
        method_name: &str,
        signature: &[u8],
    ) -> DriverResult<FuncRef>;

    /// Binds a generic method's own type parameters. The owner is left untouched.
    fn specialize_function(&self, generic: FuncRef, type_args: &[TypeRef])
        -> DriverResult<FuncRef>;

    /// Generates native code for the method unless it already has some.
    fn compile_function(&self, function: FuncRef) -> DriverResult<CompileOutcome>;
}

/// [`DriverInterface`] over a [`HostEngine`].
///
/// Engine keys are exposed as handles from two tables. Keys are interned, so the
/// same engine entity always yields the same handle.
pub struct Driver {
    engine: Arc<dyn HostEngine>,
    config: DriverConfig,
    types: RwLock<HandleTable<TypeKey>>,
    funcs: RwLock<HandleTable<MethodKey>>,
}

impl Driver {
    pub fn new(engine: Arc<dyn HostEngine>, config: DriverConfig) -> Self {
        Driver {
            engine,
            config,
            types: RwLock::new(HandleTable::new()),
            funcs: RwLock::new(HandleTable::new()),
        }
    }

    pub fn engine(&self) -> &Arc<dyn HostEngine> {
        &self.engine
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn type_key(&self, ty: TypeRef) -> DriverResult<TypeKey> {
        self.types
            .read()
            .get(ty.raw())
            .copied()
            .ok_or(DriverError::InvalidHandle {
                kind: "type",
                bits: ty.to_bits(),
            })
    }

    pub fn method_key(&self, function: FuncRef) -> DriverResult<MethodKey> {
        self.funcs
            .read()
            .get(function.raw())
            .copied()
            .ok_or(DriverError::InvalidHandle {
                kind: "function",
                bits: function.to_bits(),
            })
    }

    /// Handle for an engine type, minting one on first sight.
    pub fn type_ref(&self, key: TypeKey) -> TypeRef {
        TypeRef::from_raw(self.types.write().intern(key))
    }

    /// Handle for an engine method, minting one on first sight.
    pub fn func_ref(&self, key: MethodKey) -> FuncRef {
        FuncRef::from_raw(self.funcs.write().intern(key))
    }

    fn type_keys(&self, type_args: &[TypeRef]) -> DriverResult<Vec<TypeKey>> {
        type_args.iter().map(|&ty| self.type_key(ty)).collect()
    }

    /// Resolves and compiles a method in one step. Ambiguity is always an error here,
    /// whatever the configured policy.
    pub fn precompile_function(
        &self,
        class: TypeRef,
        method_name: &str,
        signature: &[u8],
    ) -> DriverResult<CompileOutcome> {
        let owner = self.type_key(class)?;
        let mut scope = PinnedScope::enter(self.engine.as_ref());
        let method = resolver::resolve_function(
            self.engine.as_ref(),
            owner,
            method_name,
            signature,
            AmbiguityPolicy::Report,
        )?;
        compile_method(&mut scope, method)
    }
}

impl DriverInterface for Driver {
    fn resolve_class(&self, file_name: &str, class_name: &str) -> DriverResult<TypeRef> {
        log::debug!("resolve_class('{}', '{}')", file_name, class_name);
        let mut scope = PinnedScope::enter(self.engine.as_ref());
        let key = resolver::resolve_class(&mut scope, file_name, class_name)?;
        Ok(self.type_ref(key))
    }

    fn specialize_class(&self, generic: TypeRef, type_args: &[TypeRef]) -> DriverResult<TypeRef> {
        let generic = self.type_key(generic)?;
        let args = self.type_keys(type_args)?;
        let mut scope = PinnedScope::enter(self.engine.as_ref());
        let key = specializer::specialize_type(&mut scope, generic, &args)?;
        Ok(self.type_ref(key))
    }

    fn resolve_function(
        &self,
        class: TypeRef,
        method_name: &str,
        signature: &[u8],
    ) -> DriverResult<FuncRef> {
        let owner = self.type_key(class)?;
        let _scope = PinnedScope::enter(self.engine.as_ref());
        let key = resolver::resolve_function(
            self.engine.as_ref(),
            owner,
            method_name,
            signature,
            self.config.ambiguity,
        )?;
        Ok(self.func_ref(key))
    }

    fn specialize_function(
        &self,
        generic: FuncRef,
        type_args: &[TypeRef],
    ) -> DriverResult<FuncRef> {
        let generic = self.method_key(generic)?;
        let args = self.type_keys(type_args)?;
        let mut scope = PinnedScope::enter(self.engine.as_ref());
        let key = specializer::specialize_function(&mut scope, generic, &args)?;
        Ok(self.func_ref(key))
    }

    fn compile_function(&self, function: FuncRef) -> DriverResult<CompileOutcome> {
        let method = self.method_key(function)?;
        let mut scope = PinnedScope::enter(self.engine.as_ref());
        compile_method(&mut scope, method)
    }
}
