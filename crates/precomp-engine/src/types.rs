//! Engine-side identities and descriptors.
//!
//! All keys are plain integers owned by the engine. Nothing here owns or frees the
//! objects they denote.

use std::fmt;

/// A loaded module (assembly / image).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

/// A loaded type: a definition or a canonical generic instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(pub u64);

/// A loaded method: a definition on some owner type, or a method instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey(pub u64);

/// A type definition row in a module's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeDefToken(pub u32);

impl TypeDefToken {
    /// Table tag of type definition tokens in the metadata token space.
    pub const TABLE: u32 = 0x0200_0000;

    pub fn from_row(row: u32) -> Self {
        TypeDefToken(Self::TABLE | (row + 1))
    }

    /// Zero-based row, or `None` if the token is not a type definition token.
    pub fn row(self) -> Option<u32> {
        if self.0 & 0xff00_0000 != Self::TABLE || self.0 & 0x00ff_ffff == 0 {
            return None;
        }
        Some((self.0 & 0x00ff_ffff) - 1)
    }
}

impl fmt::Display for TypeDefToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Entry address of generated native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeAddress(pub u64);

/// Descriptor of a generated code region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRegion {
    pub start: CodeAddress,
    pub size: u64,
}

/// Shape properties of a method that decide how it may be prepared and recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodFlags {
    /// Dynamically generated (lightweight codegen) method.
    pub dynamic: bool,
    /// Marshalling / IL stub.
    pub il_stub: bool,
    /// Code comes from a precompiled native image rather than the JIT.
    pub pre_implemented: bool,
    pub has_native_code_slot: bool,
    pub has_precode: bool,
    pub default_interface: bool,
}

impl MethodFlags {
    /// Whether the method can be prepared ahead of time directly.
    pub fn supports_direct_preparation(&self) -> bool {
        self.has_native_code_slot || !self.has_precode || self.default_interface
    }

    /// Methods whose compilation is never recorded.
    pub fn is_transient(&self) -> bool {
        self.dynamic || self.il_stub
    }
}

/// What the engine knows about a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub name: String,
    /// Raw binary signature blob.
    pub signature: Vec<u8>,
    /// Declaring type. For a method found on a generic instantiation this is the
    /// instantiated type.
    pub owner: TypeKey,
    /// The method's own generic arguments (empty for non-generic methods and for
    /// uninstantiated generic method definitions).
    pub method_args: Vec<TypeKey>,
    /// Number of generic parameters the method declares.
    pub arity: u32,
    pub flags: MethodFlags,
}

/// Outcome of a by-name, by-signature method lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodLookup {
    NotFound,
    Unique(MethodKey),
    Ambiguous(usize),
}

/// Optimization tier requested from the JIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationTier {
    #[default]
    Tier0,
    Tier1,
    Optimized,
}

/// Configuration passed to code preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareConfig {
    pub tier: OptimizationTier,
    pub may_backpatch: bool,
    /// Generate code now instead of installing a lazy precode stub.
    pub force_full_preparation: bool,
}

impl PrepareConfig {
    /// Fixed configuration used for ahead-of-time requests.
    pub fn aot() -> Self {
        Self {
            tier: OptimizationTier::Tier0,
            may_backpatch: true,
            force_full_preparation: true,
        }
    }

    /// Configuration of an ordinary first call.
    pub fn on_call() -> Self {
        Self {
            tier: OptimizationTier::Tier0,
            may_backpatch: true,
            force_full_preparation: false,
        }
    }
}
