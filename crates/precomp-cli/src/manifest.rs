use std::path::Path;

use precomp_bridge::ObserverConfig;
use precomp_driver::DriverConfig;
use precomp_engine::EngineManifest;
use serde::Deserialize;

use crate::error::CliError;
use crate::io::read_file;

/// A `precomp` manifest: the engine's modules plus what to compile in them.
#[derive(Debug, Deserialize)]
pub struct PrecompManifest {
    #[serde(flatten)]
    pub engine: EngineManifest,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
    #[serde(default, rename = "request")]
    pub requests: Vec<CompileRequest>,
}

/// A type named in a request, optionally specialized.
///
/// Written either as a plain name resolved in the request's module, or as a table
/// `{ module = "...", class = "...", args = [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    Name(String),
    Generic {
        #[serde(default)]
        module: Option<String>,
        class: String,
        #[serde(default)]
        args: Vec<TypeSpec>,
    },
}

/// One method to bring to native code.
#[derive(Debug, Clone, Deserialize)]
pub struct CompileRequest {
    pub module: String,
    pub class: String,
    #[serde(default)]
    pub class_args: Vec<TypeSpec>,
    pub method: String,
    pub signature: Vec<u8>,
    #[serde(default)]
    pub method_args: Vec<TypeSpec>,
    /// Go through the engine's on-call path instead of the driver.
    #[serde(default)]
    pub invoke: bool,
}

impl CompileRequest {
    /// The owner type, specialized with `class_args`.
    pub fn owner(&self) -> TypeSpec {
        TypeSpec::Generic {
            module: Some(self.module.clone()),
            class: self.class.clone(),
            args: self.class_args.clone(),
        }
    }

    pub fn label(&self) -> String {
        let mut label = format!("{}!{}", self.module, self.class);
        if !self.class_args.is_empty() {
            label.push_str(&format!("<{}>", join(&self.class_args)));
        }
        label.push_str("::");
        label.push_str(&self.method);
        if !self.method_args.is_empty() {
            label.push_str(&format!("<{}>", join(&self.method_args)));
        }
        label
    }
}

fn join(specs: &[TypeSpec]) -> String {
    specs
        .iter()
        .map(TypeSpec::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl std::fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeSpec::Name(name) => f.write_str(name),
            TypeSpec::Generic { class, args, .. } if args.is_empty() => f.write_str(class),
            TypeSpec::Generic { class, args, .. } => write!(f, "{}<{}>", class, join(args)),
        }
    }
}

impl PrecompManifest {
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let source = read_file(path.to_path_buf())?;
        Self::from_toml_str(&source).map_err(|e| CliError::ManifestSyntax {
            path: path.to_path_buf(),
            message: e.message().to_string(),
            span: e.span().map(Into::into),
            src: source,
        })
    }
}
