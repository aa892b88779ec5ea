use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ManifestError;

/// Description of the modules loaded into a [`MemoryEngine`](super::MemoryEngine).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineManifest {
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDef {
    /// Name used to load the module (`App`).
    pub name: String,

    /// File identity reported to observers. Defaults to `name`.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default, rename = "type")]
    pub types: Vec<TypeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    /// Simple name, including any arity suffix (``Box`1``).
    pub name: String,

    /// Namespace of a top-level type. Ignored for nested types.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Qualified name of the enclosing type (`Ns.Outer`, `Ns.Outer+Mid`), which must
    /// be declared earlier in the same module.
    #[serde(default)]
    pub enclosing: Option<String>,

    /// Number of generic parameters.
    #[serde(default)]
    pub arity: u32,

    /// When set, loading this type fails with a type-load fault carrying the message.
    #[serde(default)]
    pub load_error: Option<String>,

    #[serde(default, rename = "method")]
    pub methods: Vec<MethodDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,

    /// Raw signature blob.
    #[serde(default)]
    pub signature: Vec<u8>,

    #[serde(default)]
    pub arity: u32,

    #[serde(default)]
    pub dynamic: bool,

    #[serde(default)]
    pub il_stub: bool,

    #[serde(default)]
    pub pre_implemented: bool,

    #[serde(default)]
    pub native_code_slot: bool,

    #[serde(default)]
    pub precode: bool,

    #[serde(default)]
    pub default_interface: bool,

    #[serde(default)]
    pub jit: JitBehavior,
}

/// How the simulated JIT treats a method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JitBehavior {
    #[default]
    Ok,
    /// Compilation produces no code.
    Fails,
    /// Code is produced but its region descriptor is invalid.
    InvalidCodeInfo,
    /// Compilation throws.
    Error,
}

impl EngineManifest {
    pub fn from_toml_str(source: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let source = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&source)
    }
}
