use serde::{Deserialize, Serialize};

/// What `resolve_function` reports when more than one method matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Report [`DriverError::AmbiguousMethod`](crate::DriverError::AmbiguousMethod).
    #[default]
    Report,
    /// Fold ambiguity into "method not found", as older tools expect.
    TreatAsNotFound,
}

/// Driver settings, read from the `[driver]` table of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub ambiguity: AmbiguityPolicy,
}
