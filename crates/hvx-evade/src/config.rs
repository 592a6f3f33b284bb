use serde::{Deserialize, Serialize};

/// What `enable` does when some required routines did not resolve.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// Enable anyway and log a warning.
    #[default]
    AllowPartial,

    /// Refuse to enable.
    RequireFull,
}

/// Configuration of the [`TransparencyEngine`].
///
/// [`TransparencyEngine`]: crate::TransparencyEngine
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransparencyConfig {
    /// Policy applied by user-initiated enable. Default-mode enable always
    /// allows partial coverage.
    pub coverage_policy: CoveragePolicy,
}
