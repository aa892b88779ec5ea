//! Postorder serialization of a compiled method's generic dependency tree.
//!
//! Every type contributes its arguments' subtrees followed by one class event whose
//! `dep_count` is its argument count, so each subtree nets exactly one unit on the
//! receiver's stack. The method's own type arguments come first, then its declaring
//! type, then the function event consuming all of them.

use precomp_engine::{EngineResult, HostEngine, MethodKey, TypeKey};

use crate::event::{ClassEvent, FunctionEvent, TraceEvent};
use crate::recorder::Recorder;

/// The complete trace of one compiled method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTrace {
    classes: Vec<ClassEvent>,
    function: FunctionEvent,
}

impl DependencyTrace {
    pub fn classes(&self) -> &[ClassEvent] {
        &self.classes
    }

    pub fn function(&self) -> &FunctionEvent {
        &self.function
    }

    /// Number of events, the function event included.
    pub fn event_count(&self) -> usize {
        self.classes.len() + 1
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.classes
            .iter()
            .cloned()
            .map(TraceEvent::Class)
            .chain(std::iter::once(TraceEvent::Function(self.function.clone())))
            .collect()
    }

    /// Delivers the trace to `recorder` in order.
    pub fn replay_into(&self, recorder: &dyn Recorder) {
        for class in &self.classes {
            recorder.record_class(&class.module, &class.name, class.dep_count);
        }
        recorder.record_function(
            &self.function.name,
            &self.function.signature,
            self.function.type_arg_count,
        );
    }
}

/// Builds [`DependencyTrace`]s by querying the engine.
pub struct DependencyWalker<'e> {
    engine: &'e dyn HostEngine,
    classes: Vec<ClassEvent>,
}

impl<'e> DependencyWalker<'e> {
    pub fn new(engine: &'e dyn HostEngine) -> Self {
        DependencyWalker {
            engine,
            classes: Vec::new(),
        }
    }

    /// Walks `method` completely. Nothing is delivered anywhere, so a failing walk
    /// leaves no partial trace behind.
    pub fn trace_method(
        engine: &'e dyn HostEngine,
        method: MethodKey,
    ) -> EngineResult<DependencyTrace> {
        let mut walker = DependencyWalker::new(engine);
        let info = engine.method_info(method)?;

        for &arg in &info.method_args {
            walker.type_subtree(engine.canonicalize_generic_arg(arg))?;
        }
        walker.type_subtree(info.owner)?;

        Ok(DependencyTrace {
            classes: walker.classes,
            function: FunctionEvent {
                name: info.name,
                signature: info.signature,
                type_arg_count: info.method_args.len() as u32,
            },
        })
    }

    /// Emits the subtree of `ty`: its arguments' subtrees, then `ty` itself.
    pub fn type_subtree(&mut self, ty: TypeKey) -> EngineResult<()> {
        let args = self.engine.generic_arguments(ty)?;
        for &arg in &args {
            let arg = self.engine.canonicalize_generic_arg(arg);
            self.type_subtree(arg)?;
        }

        let module = self.engine.module_of(ty)?;
        self.classes.push(ClassEvent {
            module: self.engine.module_file(module)?,
            name: self.engine.qualified_name(ty)?,
            dep_count: args.len() as u32,
        });
        Ok(())
    }
}
