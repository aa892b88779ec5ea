//! Textual resolution of classes and methods.
//!
//! Direct by-name lookup in the host engine does not understand nested type
//! names, so a name such as `Ns.Outer+Inner` is resolved by loading `Ns.Outer`
//! first and then scanning every type definition of its module for an exact
//! match on the nested-aware qualified name.

use precomp_engine::{
    EngineFault, FaultKind, HostEngine, MethodKey, MethodLookup, ModuleId, PinnedScope, TypeKey,
};

use crate::config::AmbiguityPolicy;
use crate::error::{DriverError, DriverResult};

/// Separator between an enclosing type and a nested type in qualified names.
pub const NESTED_SEPARATOR: char = '+';

/// Resolves `class_name` in the module `file_name`, loading the module if needed.
pub fn resolve_class(
    scope: &mut PinnedScope<'_>,
    file_name: &str,
    class_name: &str,
) -> DriverResult<TypeKey> {
    let engine = scope.engine();
    let module = scope
        .suspendable(|| engine.load_module(file_name))
        .map_err(|source| DriverError::ModuleNotFound {
            module: file_name.to_string(),
            source,
        })?;

    let Some((enclosing, _)) = class_name.split_once(NESTED_SEPARATOR) else {
        return scope
            .suspendable(|| engine.load_type_by_name(module, class_name))
            .map_err(|source| match source.kind {
                FaultKind::NotFound => DriverError::TypeNotFound {
                    module: file_name.to_string(),
                    name: class_name.to_string(),
                    source,
                },
                _ => DriverError::Engine(source),
            });
    };

    let outer = scope
        .suspendable(|| engine.load_type_by_name(module, enclosing))
        .map_err(|source| match source.kind {
            FaultKind::NotFound => DriverError::EnclosingTypeNotFound {
                module: file_name.to_string(),
                enclosing: enclosing.to_string(),
                name: class_name.to_string(),
                source,
            },
            _ => DriverError::Engine(source),
        })?;
    let outer_module = engine.module_of(outer)?;

    find_by_qualified_name(scope, outer_module, class_name)?.ok_or_else(|| {
        DriverError::NestedTypeNotFound {
            module: file_name.to_string(),
            name: class_name.to_string(),
        }
    })
}

/// Scans the type definitions of `module` in metadata order and returns the first
/// one whose qualified name equals `qualified_name`. Definitions that fail to load
/// are skipped.
fn find_by_qualified_name(
    scope: &mut PinnedScope<'_>,
    module: ModuleId,
    qualified_name: &str,
) -> DriverResult<Option<TypeKey>> {
    let engine = scope.engine();
    let tokens = engine.type_definitions(module)?;
    log::debug!(
        "scanning {} type definitions for '{}'",
        tokens.len(),
        qualified_name
    );

    let found = tokens
        .into_iter()
        .map(|token| (token, scope.suspendable(|| engine.load_type_def(module, token))))
        .filter_map(|(token, loaded)| match loaded {
            Ok(ty) => Some(ty),
            Err(fault) => {
                log::debug!("skipping type definition {}: {}", token, fault);
                None
            }
        })
        .find(|&ty| match engine.qualified_name(ty) {
            Ok(name) => name == qualified_name,
            Err(fault) => {
                log::debug!("skipping unnamed type {:?}: {}", ty, fault);
                false
            }
        });
    Ok(found)
}

/// Finds the method of `owner` whose name and signature blob match exactly.
pub fn resolve_function(
    engine: &dyn HostEngine,
    owner: TypeKey,
    method_name: &str,
    signature: &[u8],
    ambiguity: AmbiguityPolicy,
) -> DriverResult<MethodKey> {
    match engine.find_method(owner, method_name, signature)? {
        MethodLookup::Unique(method) => Ok(method),
        MethodLookup::NotFound => Err(DriverError::MethodNotFound {
            owner: describe_type(engine, owner),
            name: method_name.to_string(),
        }),
        MethodLookup::Ambiguous(count) => match ambiguity {
            AmbiguityPolicy::Report => Err(DriverError::AmbiguousMethod {
                owner: describe_type(engine, owner),
                name: method_name.to_string(),
                count,
            }),
            AmbiguityPolicy::TreatAsNotFound => {
                log::debug!(
                    "{} candidates for '{}', reporting not found",
                    count,
                    method_name
                );
                Err(DriverError::MethodNotFound {
                    owner: describe_type(engine, owner),
                    name: method_name.to_string(),
                })
            }
        },
    }
}

/// Display name for diagnostics; never fails.
pub(crate) fn describe_type(engine: &dyn HostEngine, ty: TypeKey) -> String {
    engine
        .qualified_name(ty)
        .unwrap_or_else(|_: EngineFault| format!("{:?}", ty))
}
