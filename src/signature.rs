//! Signature catalog and fault classifier.
//!
//! A signature binds a case-insensitive pattern over `message + stack`
//! to a category, an action, a default severity, and (for recoverable
//! faults) a recovery strategy with an attempt budget. The catalog is an
//! **explicitly ordered** list and the first matching signature wins, so
//! specific patterns must be registered before generic ones. Matching is
//! deliberately permissive: a missed classification degrades to default
//! logging, never to a wrong recovery.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::fault::{FaultCategory, RawFault, Severity};

// ---------------------------------------------------------------------------
// Action and signature
// ---------------------------------------------------------------------------

/// What the orchestrator does with a classified fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultAction {
    /// Absorb silently; the event still feeds the stability picture.
    Ignore,
    /// Forward to the reporting sink and absorb.
    Log,
    /// Run the bound recovery strategy, subject to the attempt budget.
    Recover,
    /// Report and let the fault continue to the host's fatal path.
    Escalate,
}

impl std::fmt::Display for FaultAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ignore => "ignore",
            Self::Log => "log",
            Self::Recover => "recover",
            Self::Escalate => "escalate",
        };
        f.write_str(name)
    }
}

/// Errors from building signatures or catalogs.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The pattern failed to compile.
    #[error("signature {id}: invalid pattern: {source}")]
    InvalidPattern {
        /// Signature identifier the pattern belongs to.
        id: String,
        /// Underlying regex error.
        #[source]
        source: Box<regex::Error>,
    },
}

/// An immutable pattern-to-outcome binding.
///
/// Defined at process start and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FaultSignature {
    /// Stable identifier, used in reports and logs.
    pub id: String,
    /// Compiled case-insensitive matcher over `message + "\n" + stack`.
    matcher: Regex,
    /// Category assigned on match.
    pub category: FaultCategory,
    /// Action taken on match.
    pub action: FaultAction,
    /// Default severity; the orchestrator may escalate it under load.
    pub severity: Severity,
    /// Recovery strategy bound to `Recover` signatures.
    pub strategy: Option<String>,
    /// Per-signature attempt budget; engine default applies when absent.
    pub max_attempts: Option<u32>,
}

impl FaultSignature {
    /// Build a signature from a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidPattern`] if the pattern does not
    /// compile.
    pub fn new(
        id: impl Into<String>,
        pattern: &str,
        category: FaultCategory,
        action: FaultAction,
        severity: Severity,
    ) -> Result<Self, SignatureError> {
        let id = id.into();
        let matcher = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| SignatureError::InvalidPattern {
                id: id.clone(),
                source: Box::new(e),
            })?;
        Ok(Self {
            id,
            matcher,
            category,
            action,
            severity,
            strategy: None,
            max_attempts: None,
        })
    }

    /// Bind a recovery strategy and attempt budget to this signature.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl Into<String>, max_attempts: u32) -> Self {
        self.strategy = Some(strategy.into());
        self.max_attempts = Some(max_attempts);
        self
    }

    /// The pattern source this signature was built from.
    pub fn pattern(&self) -> &str {
        self.matcher.as_str()
    }

    /// Whether this signature matches the given fault text.
    pub fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Result of matching a fault against the catalog.
///
/// Immutable once produced. Carries everything the orchestrator needs
/// from the matched signature so it does not have to hold a catalog
/// borrow across suspension points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Identifier of the matched signature, or `None` for unmatched faults.
    pub signature_id: Option<String>,
    /// Assigned category.
    pub category: FaultCategory,
    /// Action the orchestrator branches on.
    pub action: FaultAction,
    /// Base severity before any stability escalation.
    pub severity: Severity,
    /// Bound recovery strategy, when the action is `Recover`.
    pub strategy: Option<String>,
    /// Attempt budget carried from the signature.
    pub max_attempts: Option<u32>,
}

impl Classification {
    /// Whether any signature matched.
    pub fn matched(&self) -> bool {
        self.signature_id.is_some()
    }

    /// The default classification for faults no signature recognises.
    pub fn unmatched() -> Self {
        Self {
            signature_id: None,
            category: FaultCategory::Unknown,
            action: FaultAction::Log,
            severity: Severity::Medium,
            strategy: None,
            max_attempts: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Ordered signature table; first match wins.
#[derive(Debug, Clone, Default)]
pub struct SignatureCatalog {
    signatures: Vec<FaultSignature>,
}

impl SignatureCatalog {
    /// An empty catalog. Every fault classifies as unmatched.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in signature table in registration order.
    ///
    /// Patterns are modeled on the failure telemetry this engine was
    /// built for: locale data gaps are the most frequent fatal pattern,
    /// followed by bridge faults and accessibility service failures.
    /// Specific patterns come first; `classify` falls back to the
    /// unmatched default, so no catch-all entry is needed.
    pub fn builtin() -> Self {
        type Def = (
            &'static str,
            &'static str,
            FaultCategory,
            FaultAction,
            Severity,
            Option<(&'static str, u32)>,
        );
        let defs: [Def; 12] = [
            (
                "locale_data_unavailable",
                r"locale data (missing|unavailable)|icu.*(data|resource).*(missing|not found)|unsupported locale",
                FaultCategory::Locale,
                FaultAction::Recover,
                Severity::High,
                Some(("locale_fallback", 2)),
            ),
            (
                "locale_string_op",
                r"tolocale(lower|upper)case|locale-?(aware|sensitive) (compar|sort|format)|collator",
                FaultCategory::Locale,
                FaultAction::Recover,
                Severity::Medium,
                Some(("locale_fallback", 3)),
            ),
            (
                "malformed_text",
                r"invalid utf-?8|malformed (unicode|surrogate)|string normaliz",
                FaultCategory::Locale,
                FaultAction::Recover,
                Severity::High,
                Some(("safe_string_guard", 2)),
            ),
            (
                "accessibility_service",
                r"accessibility (service|manager|node|event)|screen ?reader|talkback|voiceover",
                FaultCategory::Accessibility,
                FaultAction::Recover,
                Severity::Medium,
                Some(("accessibility_bypass", 2)),
            ),
            (
                "bridge_module_lost",
                r"native module .*(null|missing)|bridge (destroyed|dead|detached)|turbomodule|jsi (call|invoke)",
                FaultCategory::Bridge,
                FaultAction::Recover,
                Severity::High,
                Some(("bridge_isolation", 2)),
            ),
            (
                "bridge_payload",
                r"bridge.*(payload|message).*(invalid|corrupt|too large)|(serialize|deserialize).*bridge",
                FaultCategory::Bridge,
                FaultAction::Recover,
                Severity::Medium,
                Some(("bridge_isolation", 3)),
            ),
            (
                "audio_session",
                r"audio (session|focus|track|route)|avaudiosession|audio (device|capture).*(lost|fail)",
                FaultCategory::Audio,
                FaultAction::Recover,
                Severity::Medium,
                Some(("audio_reset", 2)),
            ),
            (
                "out_of_memory",
                r"out of memory|allocation fail|cannot allocate|oom",
                FaultCategory::Memory,
                FaultAction::Log,
                Severity::Critical,
                None,
            ),
            (
                "memory_pressure",
                r"memory (pressure|warning)|low memory",
                FaultCategory::Memory,
                FaultAction::Log,
                Severity::Medium,
                None,
            ),
            (
                "gc_pause",
                r"gc pause|garbage collect|heap (grow|compact)",
                FaultCategory::Gc,
                FaultAction::Ignore,
                Severity::Low,
                None,
            ),
            (
                "network_transient",
                r"network request failed|connection (reset|refused|timed out)|socket (closed|hang)|dns (lookup|resolution)",
                FaultCategory::Network,
                FaultAction::Ignore,
                Severity::Low,
                None,
            ),
            (
                "native_fatal",
                r"sigsegv|sigabrt|sigbus|sigill|fatal signal|stack overflow",
                FaultCategory::Unknown,
                FaultAction::Escalate,
                Severity::Critical,
                None,
            ),
        ];
        let signatures = defs
            .into_iter()
            .filter_map(|(id, pattern, category, action, severity, strategy)| {
                let signature =
                    FaultSignature::new(id, pattern, category, action, severity).ok()?;
                Some(match strategy {
                    Some((name, budget)) => signature.with_strategy(name, budget),
                    None => signature,
                })
            })
            .collect();
        Self { signatures }
    }

    /// Build a catalog with `extras` registered ahead of the built-ins.
    ///
    /// Host-supplied signatures are assumed to be more specific than the
    /// shipped table, so they get first-match priority.
    pub fn with_extras(extras: Vec<FaultSignature>) -> Self {
        let mut signatures = extras;
        signatures.extend(Self::builtin().signatures);
        Self { signatures }
    }

    /// Append a signature at the end of the match order.
    pub fn push(&mut self, signature: FaultSignature) {
        self.signatures.push(signature);
    }

    /// Signatures in registration (match) order.
    pub fn iter(&self) -> impl Iterator<Item = &FaultSignature> {
        self.signatures.iter()
    }

    /// Number of registered signatures.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the catalog has no signatures.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Classify a raw fault.
    ///
    /// Iterates in registration order and returns the first match; pure
    /// given the catalog, so a fixed input always classifies identically.
    pub fn classify(&self, raw: &RawFault) -> Classification {
        let text = raw.match_text();
        for signature in &self.signatures {
            if signature.matches(&text) {
                return Classification {
                    signature_id: Some(signature.id.clone()),
                    category: signature.category,
                    action: signature.action,
                    severity: signature.severity,
                    strategy: signature.strategy.clone(),
                    max_attempts: signature.max_attempts,
                };
            }
        }
        Classification::unmatched()
    }
}
