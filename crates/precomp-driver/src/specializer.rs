use precomp_engine::{MethodKey, PinnedScope, TypeKey};

use crate::error::{DriverError, DriverResult};
use crate::resolver::describe_type;

/// Instantiates the generic type definition `generic` with `args`.
///
/// The engine canonicalizes instantiations, so equal inputs give equal keys.
pub fn specialize_type(
    scope: &mut PinnedScope<'_>,
    generic: TypeKey,
    args: &[TypeKey],
) -> DriverResult<TypeKey> {
    let engine = scope.engine();
    scope
        .suspendable(|| engine.instantiate_type(generic, args))
        .map_err(|source| DriverError::Instantiation {
            target: describe_type(engine, generic),
            source,
        })
}

/// Binds the method's own generic parameters to `args`.
///
/// The instance keeps the declaring type recorded on `generic`. Specializing a
/// method never specializes its owner: to compile a generic method of a generic
/// type, resolve the method on the instantiated owner first.
pub fn specialize_function(
    scope: &mut PinnedScope<'_>,
    generic: MethodKey,
    args: &[TypeKey],
) -> DriverResult<MethodKey> {
    let engine = scope.engine();
    let info = engine.method_info(generic)?;
    scope
        .suspendable(|| engine.instantiate_method(generic, info.owner, args))
        .map_err(|source| DriverError::Instantiation {
            target: format!("{}::{}", describe_type(engine, info.owner), info.name),
            source,
        })
}
