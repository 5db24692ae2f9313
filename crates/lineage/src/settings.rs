//! Evaluation settings and experimental feature flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Language features that have to be switched on explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentalFeature {
    /// `trackProvenance`, `getProvenance` and `removeProvenance`.
    ProvenanceTracking,
}

impl ExperimentalFeature {
    pub const ALL: &'static [ExperimentalFeature] = &[ExperimentalFeature::ProvenanceTracking];

    pub fn name(self) -> &'static str {
        match self {
            ExperimentalFeature::ProvenanceTracking => "provenance-tracking",
        }
    }
}

impl fmt::Display for ExperimentalFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown experimental feature '{0}'")]
pub struct UnknownFeature(pub String);

impl FromStr for ExperimentalFeature {
    type Err = UnknownFeature;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ExperimentalFeature::ALL
            .iter()
            .copied()
            .find(|feature| feature.name() == name)
            .ok_or_else(|| UnknownFeature(name.to_owned()))
    }
}

/// Per-session configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EvalSettings {
    pub experimental_features: BTreeSet<ExperimentalFeature>,
    /// How deeply thunk forcing may nest before evaluation gives up.
    pub max_call_depth: u32,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            experimental_features: BTreeSet::new(),
            max_call_depth: 10_000,
        }
    }
}

impl EvalSettings {
    pub fn with_feature(mut self, feature: ExperimentalFeature) -> Self {
        self.experimental_features.insert(feature);
        self
    }

    pub fn is_enabled(&self, feature: ExperimentalFeature) -> bool {
        self.experimental_features.contains(&feature)
    }
}
