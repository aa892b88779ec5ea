use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use precomp_bridge::{
    CompilationHook, NoDiscovery, ObserverConfig, ObserverHandle, StaticDiscovery,
};
use precomp_driver::{Driver, DriverConfig, DriverInterface, Status};
use precomp_engine::{EngineManifest, HostEngine, MemoryEngine};
use precomp_recorder::{
    check_balance, ClassEvent, FunctionEvent, MemoryRecorder, Recorder, TraceEvent,
};

const NO_ARGS: &[u8] = &[0x00, 0x00, 0x01];
const GET_SIG: &[u8] = &[0x20, 0x00, 0x13, 0x00];

const MANIFEST: &str = r#"
[[module]]
name = "App"

[[module.type]]
name = "int"

[[module.type]]
name = "Foo"

[[module.type.method]]
name = "Bar"
signature = [0, 0, 1]

[[module.type.method]]
name = "Baz"
signature = [0, 0, 1]

[[module.type.method]]
name = "Thunk"
signature = [0, 0, 1]
il_stub = true

[[module.type.method]]
name = "Lambda"
signature = [0, 0, 1]
dynamic = true

[[module.type.method]]
name = "Prebuilt"
signature = [0, 0, 1]
pre_implemented = true

[[module.type.method]]
name = "Odd"
signature = [0, 0, 1]
jit = "invalid-code-info"

[[module.type]]
name = "Box`1"
arity = 1

[[module.type.method]]
name = "Get"
signature = [32, 0, 19, 0]

[[module.type]]
name = "Pair`2"
arity = 2

[[module.type.method]]
name = "Get"
signature = [32, 0, 19, 0]
"#;

struct Harness {
    engine: Arc<MemoryEngine>,
    driver: Arc<Driver>,
    observer: Arc<ObserverHandle>,
    hook: Arc<CompilationHook>,
}

fn harness(discovery: StaticDiscovery, config: ObserverConfig) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let manifest = EngineManifest::from_toml_str(MANIFEST).unwrap();
    let engine = Arc::new(MemoryEngine::from_manifest(&manifest).unwrap());
    let driver = Arc::new(Driver::new(engine.clone(), DriverConfig::default()));
    let observer = Arc::new(ObserverHandle::new(
        driver.clone(),
        Box::new(discovery),
        config,
    ));
    let hook = CompilationHook::install(observer.clone(), engine.as_ref());
    observer.engine_initialized();
    Harness {
        engine,
        driver,
        observer,
        hook,
    }
}

fn recording() -> (Arc<MemoryRecorder>, Harness) {
    let recorder = Arc::new(MemoryRecorder::new());
    let harness = harness(
        StaticDiscovery::recorder(recorder.clone()),
        ObserverConfig::default(),
    );
    (recorder, harness)
}

fn class(module: &str, name: &str, dep_count: u32) -> TraceEvent {
    TraceEvent::Class(ClassEvent {
        module: module.to_string(),
        name: name.to_string(),
        dep_count,
    })
}

fn function(name: &str, signature: &[u8], type_arg_count: u32) -> TraceEvent {
    TraceEvent::Function(FunctionEvent {
        name: name.to_string(),
        signature: signature.to_vec(),
        type_arg_count,
    })
}

#[test]
fn test_compile_plain_method() {
    let (recorder, h) = recording();
    let foo = h.driver.resolve_class("App", "Foo").unwrap();
    let bar = h.driver.resolve_function(foo, "Bar", NO_ARGS).unwrap();
    let outcome = h.driver.compile_function(bar).unwrap();

    assert_eq!(outcome.status(), Status::OK);
    assert!(outcome.code_size().unwrap() > 0);
    assert_eq!(
        recorder.events(),
        vec![class("App", "Foo", 0), function("Bar", NO_ARGS, 0)]
    );
}

#[test]
fn test_compile_generic_instantiation() {
    let (recorder, h) = recording();
    let boxed = h.driver.resolve_class("App", "Box`1").unwrap();
    let int = h.driver.resolve_class("App", "int").unwrap();
    let box_int = h.driver.specialize_class(boxed, &[int]).unwrap();
    let get = h.driver.resolve_function(box_int, "Get", GET_SIG).unwrap();
    assert_eq!(h.driver.compile_function(get).unwrap().status(), Status::OK);

    let events = recorder.events();
    assert_eq!(
        events,
        vec![
            class("App", "int", 0),
            class("App", "Box`1<int>", 1),
            function("Get", GET_SIG, 0),
        ]
    );
    let methods = check_balance(&events).unwrap();
    assert_eq!(methods[0].owner.args[0].name, "int");
}

#[test]
fn test_second_compile_records_nothing() {
    let (recorder, h) = recording();
    let foo = h.driver.resolve_class("App", "Foo").unwrap();
    let bar = h.driver.resolve_function(foo, "Bar", NO_ARGS).unwrap();
    h.driver.compile_function(bar).unwrap();
    h.driver.compile_function(bar).unwrap();
    assert_eq!(recorder.len(), 2);
    assert_eq!(h.hook.stats().recorded(), 1);
}

#[test]
fn test_ordinary_execution_is_recorded() {
    let (recorder, h) = recording();
    let foo = h.driver.resolve_class("App", "Foo").unwrap();
    let bar = h.driver.resolve_function(foo, "Bar", NO_ARGS).unwrap();
    h.engine.invoke(h.driver.method_key(bar).unwrap()).unwrap();
    assert_eq!(recorder.len(), 2);
}

#[test]
fn test_unrecordable_methods_are_skipped() {
    let (recorder, h) = recording();
    let foo = h.driver.resolve_class("App", "Foo").unwrap();
    for name in ["Thunk", "Lambda", "Prebuilt", "Odd"] {
        let method = h.driver.resolve_function(foo, name, NO_ARGS).unwrap();
        h.engine.invoke(h.driver.method_key(method).unwrap()).unwrap();
    }
    assert!(recorder.is_empty());
    assert_eq!(h.hook.stats().skipped(), 4);
    assert_eq!(h.hook.stats().recorded(), 0);
}

#[test]
fn test_no_recorder_path() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let h = harness(
        StaticDiscovery::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            None
        }),
        ObserverConfig::default(),
    );

    let foo = h.driver.resolve_class("App", "Foo").unwrap();
    let bar = h.driver.resolve_function(foo, "Bar", NO_ARGS).unwrap();
    assert_eq!(h.driver.compile_function(bar).unwrap().status(), Status::OK);
    assert!(h.observer.recorder().is_none());
    assert!(!h.observer.initialize());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.hook.stats().recorded(), 0);

    // The driver keeps working for holders of the handle.
    let driver = h.observer.driver();
    let again = driver.resolve_class("App", "Foo").unwrap();
    assert_eq!(again, foo);
}

#[test]
fn test_no_discovery_never_links() {
    let _ = env_logger::builder().is_test(true).try_init();
    let manifest = EngineManifest::from_toml_str(MANIFEST).unwrap();
    let engine = Arc::new(MemoryEngine::from_manifest(&manifest).unwrap());
    let driver = Arc::new(Driver::new(engine.clone(), DriverConfig::default()));
    let observer = ObserverHandle::new(driver, Box::new(NoDiscovery), ObserverConfig::default());
    observer.engine_initialized();
    assert!(!observer.initialize());
    assert!(observer.recorder().is_none());
}

#[test]
fn test_disabled_observer_skips_discovery() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let recorder: Arc<dyn Recorder> = Arc::new(MemoryRecorder::new());
    let h = harness(
        StaticDiscovery::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Some(recorder.clone())
        }),
        ObserverConfig {
            enabled: false,
            ..ObserverConfig::default()
        },
    );
    assert!(h.observer.recorder().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_nothing_recorded_before_engine_is_ready() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let recorder = Arc::new(MemoryRecorder::new());
    let registered: Arc<dyn Recorder> = recorder.clone();

    let manifest = EngineManifest::from_toml_str(MANIFEST).unwrap();
    let engine = Arc::new(MemoryEngine::from_manifest(&manifest).unwrap());
    let driver = Arc::new(Driver::new(engine.clone(), DriverConfig::default()));
    let observer = Arc::new(ObserverHandle::new(
        driver.clone(),
        Box::new(StaticDiscovery::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Some(registered.clone())
        })),
        ObserverConfig::default(),
    ));
    CompilationHook::install(observer.clone(), engine.as_ref());

    let foo = driver.resolve_class("App", "Foo").unwrap();
    let bar = driver.resolve_function(foo, "Bar", NO_ARGS).unwrap();
    driver.compile_function(bar).unwrap();
    assert!(recorder.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    observer.engine_initialized();
    let boxed = driver.resolve_class("App", "Box`1").unwrap();
    let box_foo = driver.specialize_class(boxed, &[foo]).unwrap();
    let get = driver.resolve_function(box_foo, "Get", GET_SIG).unwrap();
    driver.compile_function(get).unwrap();
    assert_eq!(recorder.len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_first_use_discovers_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let recorder: Arc<dyn Recorder> = Arc::new(MemoryRecorder::new());
    let h = harness(
        StaticDiscovery::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Some(recorder.clone())
        }),
        ObserverConfig::default(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let observer = h.observer.clone();
            thread::spawn(move || observer.recorder().is_some())
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_traces_do_not_interleave() {
    let (recorder, h) = recording();
    let pair = h.driver.resolve_class("App", "Pair`2").unwrap();
    let leaves = [
        h.driver.resolve_class("App", "int").unwrap(),
        h.driver.resolve_class("App", "Foo").unwrap(),
    ];

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let driver = h.driver.clone();
            let (a, b) = (leaves[i % 2], leaves[i / 2]);
            thread::spawn(move || {
                let ty = driver.specialize_class(pair, &[a, b]).unwrap();
                let get = driver.resolve_function(ty, "Get", GET_SIG).unwrap();
                driver.compile_function(get).unwrap().status()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Status::OK);
    }

    let methods = check_balance(&recorder.events()).unwrap();
    assert_eq!(methods.len(), 4);
    for method in methods {
        assert_eq!(method.owner.args.len(), 2);
    }
}

struct Exploding;

impl Recorder for Exploding {
    fn record_class(&self, _module: &str, _name: &str, _dep_count: u32) {
        panic!("tool crashed");
    }

    fn record_function(&self, _name: &str, _signature: &[u8], _type_arg_count: u32) {}
}

#[test]
fn test_recorder_failure_does_not_affect_compilation() {
    let h = harness(
        StaticDiscovery::recorder(Arc::new(Exploding)),
        ObserverConfig::default(),
    );
    let foo = h.driver.resolve_class("App", "Foo").unwrap();
    let bar = h.driver.resolve_function(foo, "Bar", NO_ARGS).unwrap();
    assert_eq!(h.driver.compile_function(bar).unwrap().status(), Status::OK);
    assert!(h
        .engine
        .native_code(h.driver.method_key(bar).unwrap())
        .unwrap()
        .is_some());
    assert_eq!(h.hook.stats().failed(), 1);
}

/// A tool that compiles `Foo::Baz` when it hears about `Foo::Bar`.
struct CompilingRecorder {
    driver: Arc<dyn DriverInterface>,
    events: MemoryRecorder,
    nested: Mutex<Option<Status>>,
}

impl Recorder for CompilingRecorder {
    fn record_class(&self, module: &str, name: &str, dep_count: u32) {
        self.events.record_class(module, name, dep_count);
    }

    fn record_function(&self, name: &str, signature: &[u8], type_arg_count: u32) {
        self.events.record_function(name, signature, type_arg_count);
        if name != "Bar" {
            return;
        }
        let foo = self.driver.resolve_class("App", "Foo").unwrap();
        let baz = self.driver.resolve_function(foo, "Baz", NO_ARGS).unwrap();
        let status = self.driver.compile_function(baz).unwrap().status();
        *self.nested.lock() = Some(status);
    }
}

#[test]
fn test_recorder_may_compile_while_recording() {
    let tool: Arc<OnceCell<Arc<CompilingRecorder>>> = Arc::new(OnceCell::new());
    let registered = tool.clone();
    let h = harness(
        StaticDiscovery::new(move |driver| {
            let recorder = registered.get_or_init(|| {
                Arc::new(CompilingRecorder {
                    driver,
                    events: MemoryRecorder::new(),
                    nested: Mutex::new(None),
                })
            });
            Some(recorder.clone() as Arc<dyn Recorder>)
        }),
        ObserverConfig::default(),
    );
    let foo = h.driver.resolve_class("App", "Foo").unwrap();
    let bar = h.driver.resolve_function(foo, "Bar", NO_ARGS).unwrap();

    let (done, finished) = mpsc::channel();
    let driver = h.driver.clone();
    thread::spawn(move || {
        let _ = done.send(driver.compile_function(bar).map(|outcome| outcome.status()));
    });
    let status = finished
        .recv_timeout(Duration::from_secs(5))
        .expect("compilation of Bar did not return");
    assert_eq!(status.unwrap(), Status::OK);

    let tool = tool.get().unwrap();
    assert_eq!(*tool.nested.lock(), Some(Status::OK));
    assert_eq!(
        tool.events.events(),
        vec![
            class("App", "Foo", 0),
            function("Bar", NO_ARGS, 0),
            class("App", "Foo", 0),
            function("Baz", NO_ARGS, 0),
        ]
    );
    assert_eq!(h.hook.stats().recorded(), 2);
}

#[test]
fn test_observer_config_from_toml() {
    let config: ObserverConfig = toml::from_str("record_before_ready = true").unwrap();
    assert!(config.enabled);
    assert!(config.record_before_ready);
    assert_eq!(config.symbol, precomp_bridge::DEFAULT_SYMBOL);
}
