use std::sync::Arc;

use crate::error::EngineResult;
use crate::types::{
    CodeAddress, CodeRegion, MethodInfo, MethodKey, MethodLookup, ModuleId, PrepareConfig,
    TypeDefToken, TypeKey,
};

/// Contract of the host engine (type loader, metadata reader, generics engine, JIT).
///
/// Operations documented as "may suspend" can block on unrelated engine activity
/// (collection, lazy loading, type initializers). Callers must not hold the thread
/// pinned across them; see [`PinnedScope`](crate::PinnedScope).
pub trait HostEngine: Send + Sync {
    // --- Module and type loading --- //

    /// Loads, or finds the already loaded, module named `file_name`. Idempotent.
    /// May suspend.
    fn load_module(&self, file_name: &str) -> EngineResult<ModuleId>;

    /// Direct by-name type lookup. Nested type names are not understood by the
    /// metadata reader and fail as not found. May suspend.
    fn load_type_by_name(&self, module: ModuleId, name: &str) -> EngineResult<TypeKey>;

    /// Every type definition owned by `module`, in metadata order.
    fn type_definitions(&self, module: ModuleId) -> EngineResult<Vec<TypeDefToken>>;

    /// Loads one type definition. May fail for individual rows. May suspend.
    fn load_type_def(&self, module: ModuleId, token: TypeDefToken) -> EngineResult<TypeKey>;

    // --- Type inspection --- //

    fn module_of(&self, ty: TypeKey) -> EngineResult<ModuleId>;

    /// File identity of a module, as reported to observers.
    fn module_file(&self, module: ModuleId) -> EngineResult<String>;

    /// Fully qualified, nested-aware display name (`Ns.Outer+Inner`).
    fn qualified_name(&self, ty: TypeKey) -> EngineResult<String>;

    /// Generic type arguments in declaration order; empty for non-generic types.
    fn generic_arguments(&self, ty: TypeKey) -> EngineResult<Vec<TypeKey>>;

    /// Normalizes a generic argument to the form used for code sharing.
    fn canonicalize_generic_arg(&self, ty: TypeKey) -> TypeKey {
        ty
    }

    // --- Generics --- //

    /// Instantiates an open generic type. Canonical: equal inputs give equal keys.
    /// May suspend (runs type loading and initialization logic).
    fn instantiate_type(&self, generic: TypeKey, args: &[TypeKey]) -> EngineResult<TypeKey>;

    /// Binds the method's own generic parameters, keeping `owner` as declaring type.
    /// Canonical. May suspend.
    fn instantiate_method(
        &self,
        generic: MethodKey,
        owner: TypeKey,
        args: &[TypeKey],
    ) -> EngineResult<MethodKey>;

    // --- Methods --- //

    fn find_method(&self, ty: TypeKey, name: &str, signature: &[u8]) -> EngineResult<MethodLookup>;

    fn method_info(&self, method: MethodKey) -> EngineResult<MethodInfo>;

    // --- Code --- //

    /// Current native code of the method, if any.
    fn native_code(&self, method: MethodKey) -> EngineResult<Option<CodeAddress>>;

    /// Generates (or returns existing) native code. Fires the JIT listeners after a
    /// successful compilation. May suspend.
    fn prepare_code(
        &self,
        method: MethodKey,
        config: &PrepareConfig,
    ) -> EngineResult<Option<CodeAddress>>;

    /// Code region descriptor for an address; `None` if the descriptor is invalid.
    fn code_region(&self, address: CodeAddress) -> Option<CodeRegion>;

    // --- Thread mode --- //

    /// Declares that the calling thread's managed state is pinned.
    fn pin_thread(&self) {}

    /// Releases one level of pinning on the calling thread.
    fn unpin_thread(&self) {}

    // --- Lifecycle --- //

    fn add_jit_listener(&self, listener: Arc<dyn JitListener>);
}

/// Lifecycle hook invoked inline on the compiling thread after each successful
/// JIT compilation.
pub trait JitListener: Send + Sync {
    fn method_compiled(&self, engine: &dyn HostEngine, method: MethodKey);
}
