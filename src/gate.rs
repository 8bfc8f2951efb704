//! Feature gate: may a named capability run right now?
//!
//! Table-driven and side-effect-free; call sites are expected to query it
//! before starting expensive or risk-prone operations (voice capture,
//! background sync), so the check must stay cheap at arbitrary call
//! frequency. Unknown feature names fail open for forward compatibility
//! with call sites added before their gate entry ships.

use std::collections::{BTreeMap, BTreeSet};

use crate::stability::{OperatingMode, StabilityLevel, StabilitySnapshot};

/// Stability requirements a feature declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRequirement {
    /// Minimum acceptable stability level (`Critical < Unstable < Stable`).
    pub min_level: StabilityLevel,
    /// Operating modes the feature may run in.
    pub modes: BTreeSet<OperatingMode>,
}

impl FeatureRequirement {
    /// Build a requirement from a level and a mode list.
    pub fn new(min_level: StabilityLevel, modes: impl IntoIterator<Item = OperatingMode>) -> Self {
        Self {
            min_level,
            modes: modes.into_iter().collect(),
        }
    }
}

/// Lookup table from feature name to requirement.
#[derive(Debug, Clone, Default)]
pub struct FeatureGate {
    table: BTreeMap<String, FeatureRequirement>,
}

impl FeatureGate {
    /// A gate with no entries; every query is allowed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The shipped default table.
    pub fn with_defaults() -> Self {
        use OperatingMode::{Normal, Safe};
        use StabilityLevel::{Stable, Unstable};

        let mut gate = Self::empty();
        gate.register("voice_recognition", FeatureRequirement::new(Stable, [Normal]));
        gate.register(
            "background_sync",
            FeatureRequirement::new(Unstable, [Normal, Safe]),
        );
        gate.register("media_prefetch", FeatureRequirement::new(Stable, [Normal]));
        gate.register(
            "speech_synthesis",
            FeatureRequirement::new(Unstable, [Normal, Safe]),
        );
        gate.register("crash_simulation", FeatureRequirement::new(Stable, [Normal]));
        gate
    }

    /// Register (or replace) a feature's requirement.
    pub fn register(&mut self, name: impl Into<String>, requirement: FeatureRequirement) {
        self.table.insert(name.into(), requirement);
    }

    /// The registered requirement for a feature, if any.
    pub fn requirement(&self, name: &str) -> Option<&FeatureRequirement> {
        self.table.get(name)
    }

    /// Number of registered features.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Whether the named feature may run under the given snapshot.
    ///
    /// Denied iff the current level is strictly below the feature's
    /// minimum, or the current mode is not in its allowed set. Unknown
    /// names are allowed.
    pub fn is_allowed(&self, name: &str, snapshot: StabilitySnapshot) -> bool {
        match self.table.get(name) {
            None => true,
            Some(req) => snapshot.level >= req.min_level && req.modes.contains(&snapshot.mode),
        }
    }
}
