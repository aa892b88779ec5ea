use parking_lot::Mutex;
use std::sync::Arc;

use precomp_driver::{
    AmbiguityPolicy, CompileOutcome, Driver, DriverConfig, DriverError, DriverInterface, Status,
    UnableReason,
};
use precomp_engine::memory::pin_depth;
use precomp_engine::{
    CodeAddress, CodeRegion, EngineManifest, EngineResult, HostEngine, JitListener, MemoryEngine,
    MethodInfo, MethodKey, MethodLookup, ModuleId, PrepareConfig, TypeDefToken, TypeKey,
};
use precomp_handles::{FuncRef, TypeRef};

const NO_ARGS: &[u8] = &[0x00, 0x00, 0x01];
const GET_SIG: &[u8] = &[0x20, 0x00, 0x13, 0x00];
const MAP_SIG: &[u8] = &[0x30, 0x01, 0x00, 0x1e, 0x00];

const MANIFEST: &str = r#"
[[module]]
name = "App"

[[module.type]]
name = "int"
namespace = "System"

[[module.type]]
name = "string"
namespace = "System"

[[module.type]]
name = "Foo"

[[module.type.method]]
name = "Bar"
signature = [0, 0, 1]

[[module.type.method]]
name = "Stub"
signature = [0, 0, 1]
precode = true

[[module.type.method]]
name = "Slot"
signature = [0, 0, 1]
precode = true
native_code_slot = true

[[module.type.method]]
name = "Empty"
signature = [0, 0, 1]
jit = "fails"

[[module.type.method]]
name = "BadRegion"
signature = [0, 0, 1]
jit = "invalid-code-info"

[[module.type.method]]
name = "Throws"
signature = [0, 0, 1]
jit = "error"

[[module.type.method]]
name = "Twin"
signature = [0, 0, 1]

[[module.type.method]]
name = "Twin"
signature = [0, 0, 1]

[[module.type]]
name = "Box`1"
arity = 1

[[module.type.method]]
name = "Get"
signature = [32, 0, 19, 0]

[[module.type.method]]
name = "Map`1"
signature = [48, 1, 0, 30, 0]
arity = 1

[[module.type]]
name = "Outer"
namespace = "Ns"

[[module.type]]
name = "Inner"
enclosing = "Ns.Outer"
"#;

fn setup(config: DriverConfig) -> (Arc<MemoryEngine>, Driver) {
    let manifest = EngineManifest::from_toml_str(MANIFEST).unwrap();
    let engine = Arc::new(MemoryEngine::from_manifest(&manifest).unwrap());
    let driver = Driver::new(engine.clone(), config);
    (engine, driver)
}

fn foo_method(driver: &Driver, name: &str) -> FuncRef {
    let foo = driver.resolve_class("App", "Foo").unwrap();
    driver.resolve_function(foo, name, NO_ARGS).unwrap()
}

#[test]
fn test_resolve_and_compile() {
    let (_, driver) = setup(DriverConfig::default());
    let foo = driver.resolve_class("App", "Foo").unwrap();
    assert!(foo.is_valid());
    let bar = driver.resolve_function(foo, "Bar", NO_ARGS).unwrap();
    assert!(bar.is_valid());

    let outcome = driver.compile_function(bar).unwrap();
    assert_eq!(outcome.status(), Status::OK);
    assert!(outcome.code_size().unwrap() > 0);
}

#[test]
fn test_compile_is_idempotent() {
    let (engine, driver) = setup(DriverConfig::default());
    let bar = foo_method(&driver, "Bar");
    let key = driver.method_key(bar).unwrap();

    assert!(matches!(
        driver.compile_function(bar).unwrap(),
        CompileOutcome::Compiled { .. }
    ));
    let address = engine.native_code(key).unwrap();

    assert_eq!(
        driver.compile_function(bar).unwrap(),
        CompileOutcome::AlreadyCompiled
    );
    assert_eq!(engine.native_code(key).unwrap(), address);
    assert_eq!(engine.compile_count(key), 1);
}

#[test]
fn test_handles_are_stable() {
    let (_, driver) = setup(DriverConfig::default());
    let a = driver.resolve_class("App", "Foo").unwrap();
    let b = driver.resolve_class("App", "Foo").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, TypeRef::INVALID);
}

#[test]
fn test_specialization_is_deterministic() {
    let (engine, driver) = setup(DriverConfig::default());
    let boxed = driver.resolve_class("App", "Box`1").unwrap();
    let int = driver.resolve_class("App", "System.int").unwrap();

    let first = driver.specialize_class(boxed, &[int]).unwrap();
    let second = driver.specialize_class(boxed, &[int]).unwrap();
    assert_eq!(first, second);
    assert_ne!(first, boxed);

    let key = driver.type_key(first).unwrap();
    assert_eq!(engine.qualified_name(key).unwrap(), "Box`1<System.int>");

    let get = driver.resolve_function(first, "Get", GET_SIG).unwrap();
    let map = driver.resolve_function(first, "Map`1", MAP_SIG).unwrap();
    let string = driver.resolve_class("App", "System.string").unwrap();
    let m1 = driver.specialize_function(map, &[string]).unwrap();
    let m2 = driver.specialize_function(map, &[string]).unwrap();
    assert_eq!(m1, m2);
    assert_ne!(m1, get);
}

#[test]
fn test_specialized_method_keeps_its_owner() {
    let (engine, driver) = setup(DriverConfig::default());
    let boxed = driver.resolve_class("App", "Box`1").unwrap();
    let int = driver.resolve_class("App", "System.int").unwrap();
    let boxed_int = driver.specialize_class(boxed, &[int]).unwrap();

    // Resolved on the open definition: specializing the method leaves the owner open.
    let open_map = driver.resolve_function(boxed, "Map`1", MAP_SIG).unwrap();
    let on_open = driver.specialize_function(open_map, &[int]).unwrap();
    let info = engine
        .method_info(driver.method_key(on_open).unwrap())
        .unwrap();
    assert_eq!(info.owner, driver.type_key(boxed).unwrap());
    assert!(matches!(
        driver.compile_function(on_open),
        Err(DriverError::Engine(_))
    ));

    // Resolved on the instantiation: both steps done, the method compiles.
    let map = driver.resolve_function(boxed_int, "Map`1", MAP_SIG).unwrap();
    let on_closed = driver.specialize_function(map, &[int]).unwrap();
    let info = engine
        .method_info(driver.method_key(on_closed).unwrap())
        .unwrap();
    assert_eq!(info.owner, driver.type_key(boxed_int).unwrap());
    assert_eq!(info.method_args, vec![driver.type_key(int).unwrap()]);
    assert_eq!(driver.compile_function(on_closed).unwrap().status(), Status::OK);
}

#[test]
fn test_instantiation_errors() {
    let (_, driver) = setup(DriverConfig::default());
    let boxed = driver.resolve_class("App", "Box`1").unwrap();
    let int = driver.resolve_class("App", "System.int").unwrap();

    let arity = driver.specialize_class(boxed, &[int, int]).unwrap_err();
    assert!(matches!(arity, DriverError::Instantiation { .. }));
    assert_eq!(arity.status(), Status::INSTANTIATION);

    let not_generic = driver.specialize_class(int, &[int]).unwrap_err();
    assert_eq!(not_generic.status(), Status::INSTANTIATION);
}

#[test]
fn test_invalid_handles_are_rejected() {
    let (_, driver) = setup(DriverConfig::default());
    let boxed = driver.resolve_class("App", "Box`1").unwrap();

    let err = driver.specialize_class(boxed, &[TypeRef::INVALID]).unwrap_err();
    assert_eq!(err.status(), Status::INVALID_HANDLE);

    let forged = TypeRef::from_bits(0xdead_0001);
    assert!(matches!(
        driver.resolve_function(forged, "Bar", NO_ARGS),
        Err(DriverError::InvalidHandle { kind: "type", .. })
    ));
    assert!(matches!(
        driver.compile_function(FuncRef::INVALID),
        Err(DriverError::InvalidHandle {
            kind: "function",
            ..
        })
    ));
}

#[test]
fn test_unable_outcomes() {
    let (_, driver) = setup(DriverConfig::default());

    let stub = foo_method(&driver, "Stub");
    assert_eq!(
        driver.compile_function(stub).unwrap(),
        CompileOutcome::Unable(UnableReason::UnsupportedShape)
    );

    let slot = foo_method(&driver, "Slot");
    assert_eq!(driver.compile_function(slot).unwrap().status(), Status::OK);

    let empty = foo_method(&driver, "Empty");
    let outcome = driver.compile_function(empty).unwrap();
    assert_eq!(outcome, CompileOutcome::Unable(UnableReason::NoNativeCode));
    assert_eq!(outcome.status(), Status::UNABLE);
    assert_eq!(outcome.code_size(), None);

    let bad_region = foo_method(&driver, "BadRegion");
    assert_eq!(
        driver.compile_function(bad_region).unwrap(),
        CompileOutcome::Unable(UnableReason::InvalidCodeRegion)
    );
}

#[test]
fn test_jit_fault_is_an_error() {
    let (_, driver) = setup(DriverConfig::default());
    let throws = foo_method(&driver, "Throws");
    let err = driver.compile_function(throws).unwrap_err();
    assert!(matches!(err, DriverError::Engine(_)));
    assert_eq!(err.status(), Status::ENGINE_FAULT);
}

#[test]
fn test_ambiguity_follows_config() {
    let (_, driver) = setup(DriverConfig::default());
    let foo = driver.resolve_class("App", "Foo").unwrap();
    let err = driver.resolve_function(foo, "Twin", NO_ARGS).unwrap_err();
    assert_eq!(err.status(), Status::AMBIGUOUS);

    let (_, compat) = setup(DriverConfig {
        ambiguity: AmbiguityPolicy::TreatAsNotFound,
    });
    let foo = compat.resolve_class("App", "Foo").unwrap();
    let err = compat.resolve_function(foo, "Twin", NO_ARGS).unwrap_err();
    assert_eq!(err.status(), Status::METHOD_NOT_FOUND);

    // The one-step helper reports ambiguity regardless of policy.
    let err = compat.precompile_function(foo, "Twin", NO_ARGS).unwrap_err();
    assert!(matches!(err, DriverError::AmbiguousMethod { count: 2, .. }));
}

#[test]
fn test_precompile_function() {
    let (_, driver) = setup(DriverConfig::default());
    let foo = driver.resolve_class("App", "Foo").unwrap();
    let outcome = driver.precompile_function(foo, "Bar", NO_ARGS).unwrap();
    assert!(outcome.code_size().is_some());
    assert_eq!(
        driver.precompile_function(foo, "Bar", NO_ARGS).unwrap(),
        CompileOutcome::AlreadyCompiled
    );
}

#[test]
fn test_driver_config_from_toml() {
    let config: DriverConfig = toml::from_str("ambiguity = \"treat-as-not-found\"").unwrap();
    assert_eq!(config.ambiguity, AmbiguityPolicy::TreatAsNotFound);
    let config: DriverConfig = toml::from_str("").unwrap();
    assert_eq!(config, DriverConfig::default());
}

#[test]
fn test_nested_class_handle_matches_enumerated_definition() {
    let (engine, driver) = setup(DriverConfig::default());
    let nested = driver.resolve_class("App", "Ns.Outer+Inner").unwrap();

    let module = engine.load_module("App").unwrap();
    let inner = engine
        .type_definitions(module)
        .unwrap()
        .into_iter()
        .filter_map(|token| engine.load_type_def(module, token).ok())
        .find(|&ty| engine.qualified_name(ty).map_or(false, |name| name == "Ns.Outer+Inner"))
        .unwrap();
    assert_eq!(driver.type_ref(inner), nested);
    assert_eq!(driver.resolve_class("App", "Ns.Outer+Inner").unwrap(), nested);
}

/// Delegates to a [`MemoryEngine`] and notes the pin depth of every method lookup.
struct LookupWatch {
    inner: Arc<MemoryEngine>,
    lookup_depths: Mutex<Vec<u32>>,
}

impl HostEngine for LookupWatch {
    fn load_module(&self, file_name: &str) -> EngineResult<ModuleId> {
        self.inner.load_module(file_name)
    }
    fn load_type_by_name(&self, module: ModuleId, name: &str) -> EngineResult<TypeKey> {
        self.inner.load_type_by_name(module, name)
    }
    fn type_definitions(&self, module: ModuleId) -> EngineResult<Vec<TypeDefToken>> {
        self.inner.type_definitions(module)
    }
    fn load_type_def(&self, module: ModuleId, token: TypeDefToken) -> EngineResult<TypeKey> {
        self.inner.load_type_def(module, token)
    }
    fn module_of(&self, ty: TypeKey) -> EngineResult<ModuleId> {
        self.inner.module_of(ty)
    }
    fn module_file(&self, module: ModuleId) -> EngineResult<String> {
        self.inner.module_file(module)
    }
    fn qualified_name(&self, ty: TypeKey) -> EngineResult<String> {
        self.inner.qualified_name(ty)
    }
    fn generic_arguments(&self, ty: TypeKey) -> EngineResult<Vec<TypeKey>> {
        self.inner.generic_arguments(ty)
    }
    fn instantiate_type(&self, generic: TypeKey, args: &[TypeKey]) -> EngineResult<TypeKey> {
        self.inner.instantiate_type(generic, args)
    }
    fn instantiate_method(
        &self,
        generic: MethodKey,
        owner: TypeKey,
        args: &[TypeKey],
    ) -> EngineResult<MethodKey> {
        self.inner.instantiate_method(generic, owner, args)
    }
    fn find_method(&self, ty: TypeKey, name: &str, signature: &[u8]) -> EngineResult<MethodLookup> {
        self.lookup_depths.lock().push(pin_depth());
        self.inner.find_method(ty, name, signature)
    }
    fn method_info(&self, method: MethodKey) -> EngineResult<MethodInfo> {
        self.inner.method_info(method)
    }
    fn native_code(&self, method: MethodKey) -> EngineResult<Option<CodeAddress>> {
        self.inner.native_code(method)
    }
    fn prepare_code(
        &self,
        method: MethodKey,
        config: &PrepareConfig,
    ) -> EngineResult<Option<CodeAddress>> {
        self.inner.prepare_code(method, config)
    }
    fn code_region(&self, address: CodeAddress) -> Option<CodeRegion> {
        self.inner.code_region(address)
    }
    fn pin_thread(&self) {
        self.inner.pin_thread()
    }
    fn unpin_thread(&self) {
        self.inner.unpin_thread()
    }
    fn add_jit_listener(&self, listener: Arc<dyn JitListener>) {
        self.inner.add_jit_listener(listener)
    }
}

#[test]
fn test_method_lookup_runs_pinned_on_both_paths() {
    let manifest = EngineManifest::from_toml_str(MANIFEST).unwrap();
    let watch = Arc::new(LookupWatch {
        inner: Arc::new(MemoryEngine::from_manifest(&manifest).unwrap()),
        lookup_depths: Mutex::new(Vec::new()),
    });
    let driver = Driver::new(watch.clone(), DriverConfig::default());
    let base = pin_depth();

    let foo = driver.resolve_class("App", "Foo").unwrap();
    driver.resolve_function(foo, "Bar", NO_ARGS).unwrap();
    driver.precompile_function(foo, "Bar", NO_ARGS).unwrap();

    assert_eq!(*watch.lookup_depths.lock(), [base + 1, base + 1]);
    assert_eq!(pin_depth(), base);
}
