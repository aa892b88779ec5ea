use std::fmt;

use precomp_engine::{MethodKey, PinnedScope, PrepareConfig};

use crate::error::DriverResult;
use crate::status::Status;

/// Why a compile request produced no code. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnableReason {
    /// The method can only be prepared lazily through its precode stub.
    UnsupportedShape,
    /// The JIT returned no code.
    NoNativeCode,
    /// Code was produced but its region descriptor is invalid.
    InvalidCodeRegion,
}

impl fmt::Display for UnableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnableReason::UnsupportedShape => "method cannot be prepared ahead of time",
            UnableReason::NoNativeCode => "no native code was produced",
            UnableReason::InvalidCodeRegion => "code region descriptor is invalid",
        })
    }
}

/// Result of a compile request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The method already had native code; nothing was done.
    AlreadyCompiled,
    Compiled { code_size: u64 },
    Unable(UnableReason),
}

impl CompileOutcome {
    pub fn status(&self) -> Status {
        match self {
            CompileOutcome::AlreadyCompiled | CompileOutcome::Compiled { .. } => Status::OK,
            CompileOutcome::Unable(_) => Status::UNABLE,
        }
    }

    /// Size of freshly generated code. Not reported for `AlreadyCompiled`.
    pub fn code_size(&self) -> Option<u64> {
        match self {
            CompileOutcome::Compiled { code_size } => Some(*code_size),
            _ => None,
        }
    }
}

/// Forces native code generation for `method` unless it already has code.
pub fn compile_method(
    scope: &mut PinnedScope<'_>,
    method: MethodKey,
) -> DriverResult<CompileOutcome> {
    let engine = scope.engine();
    if engine.native_code(method)?.is_some() {
        return Ok(CompileOutcome::AlreadyCompiled);
    }

    let info = engine.method_info(method)?;
    if !info.flags.supports_direct_preparation() {
        log::debug!("'{}' has only a precode entry point", info.name);
        return Ok(CompileOutcome::Unable(UnableReason::UnsupportedShape));
    }

    let config = PrepareConfig::aot();
    let Some(address) = scope.suspendable(|| engine.prepare_code(method, &config))? else {
        return Ok(CompileOutcome::Unable(UnableReason::NoNativeCode));
    };
    let Some(region) = engine.code_region(address) else {
        return Ok(CompileOutcome::Unable(UnableReason::InvalidCodeRegion));
    };

    log::info!("compiled '{}' ({} bytes)", info.name, region.size);
    Ok(CompileOutcome::Compiled {
        code_size: region.size,
    })
}
