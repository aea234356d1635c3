#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;

use fo_core::ExecutionMode;
use fo_promote::PromotionPolicy;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_MAX_EVIDENCE_ENTRIES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Dispatch,
    Promotion,
    InPlace,
    Policy,
    Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub ts_unix_ms: u128,
    pub kind: EvidenceKind,
    pub summary: String,
}

/// Ring of the most recent evidence entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceLedger {
    entries: VecDeque<EvidenceEntry>,
    capacity: usize,
    evicted: u64,
}

impl Default for EvidenceLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVIDENCE_ENTRIES)
    }
}

impl EvidenceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_EVIDENCE_ENTRIES)),
            capacity,
            evicted: 0,
        }
    }

    pub fn record(&mut self, kind: EvidenceKind, summary: impl Into<String>) {
        if self.capacity == 0 {
            self.evicted += 1;
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(EvidenceEntry {
            ts_unix_ms: now_unix_ms(),
            kind,
            summary: summary.into(),
        });
    }

    /// Oldest first.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &EvidenceEntry> + '_ {
        self.entries.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&EvidenceEntry> {
        self.entries.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped to stay within capacity.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn default_record_evidence() -> bool {
    true
}

fn default_max_evidence_entries() -> usize {
    DEFAULT_MAX_EVIDENCE_ENTRIES
}

/// Session settings, usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub promotion_policy: PromotionPolicy,
    #[serde(default)]
    pub allow_in_place: bool,
    #[serde(default = "default_record_evidence")]
    pub record_evidence: bool,
    #[serde(default = "default_max_evidence_entries")]
    pub max_evidence_entries: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            promotion_policy: PromotionPolicy::default(),
            allow_in_place: false,
            record_evidence: default_record_evidence(),
            max_evidence_entries: default_max_evidence_entries(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input).map_err(|error| {
            let message = error.to_string();
            match extract_unknown_field(&message) {
                Some(field) => ConfigError::UnknownField { field },
                None => ConfigError::InvalidJson {
                    diagnostic: bounded(&message, 200),
                },
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.display().to_string(),
            diagnostic: error.to_string(),
        })?;
        Self::from_json_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.record_evidence && self.max_evidence_entries == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_evidence_entries must be positive when record_evidence is set",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io { path: String, diagnostic: String },
    InvalidJson { diagnostic: String },
    UnknownField { field: String },
    Invalid { reason: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, diagnostic } => write!(f, "cannot read config {path}: {diagnostic}"),
            Self::InvalidJson { diagnostic } => write!(f, "invalid config json: {diagnostic}"),
            Self::UnknownField { field } => write!(f, "unknown config field '{field}'"),
            Self::Invalid { reason } => write!(f, "invalid config: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Mode, policy and evidence for one operator session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContext {
    config: RuntimeConfig,
    ledger: EvidenceLedger,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl RuntimeContext {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let mut ctx = Self {
            ledger: EvidenceLedger::with_capacity(config.max_evidence_entries),
            config,
        };
        let summary = format!(
            "session initialized mode={} policy={} allow_in_place={}",
            ctx.config.mode.label(),
            ctx.config.promotion_policy.label(),
            ctx.config.allow_in_place
        );
        ctx.record(EvidenceKind::Policy, summary);
        ctx
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.config.mode
    }

    pub fn set_mode(&mut self, mode: ExecutionMode) {
        self.config.mode = mode;
        self.record(
            EvidenceKind::Policy,
            format!("mode switched to {}", mode.label()),
        );
    }

    #[must_use]
    pub fn promotion_policy(&self) -> PromotionPolicy {
        self.config.promotion_policy
    }

    #[must_use]
    pub fn allow_in_place(&self) -> bool {
        self.config.allow_in_place
    }

    pub fn set_allow_in_place(&mut self, allow: bool) {
        if self.config.allow_in_place && !allow {
            warn!("in-place operand reuse disabled for this session");
        }
        self.config.allow_in_place = allow;
        self.record(
            EvidenceKind::Policy,
            format!("allow_in_place set to {allow}"),
        );
    }

    /// Appends to the ledger unless evidence recording is off.
    pub fn record(&mut self, kind: EvidenceKind, summary: impl Into<String>) {
        if self.config.record_evidence {
            self.ledger.record(kind, summary);
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &EvidenceLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut EvidenceLedger {
        &mut self.ledger
    }
}

fn extract_unknown_field(message: &str) -> Option<String> {
    // serde_json message shape: "unknown field `x`, expected ..."
    let marker = "unknown field `";
    let start = message.find(marker)? + marker.len();
    let tail = &message[start..];
    let end = tail.find('`')?;
    Some(tail[..end].to_string())
}

fn bounded(input: &str, max_len: usize) -> String {
    if input.len() <= max_len {
        return input.to_string();
    }
    let mut boundary = max_len;
    while boundary > 0 && !input.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}...", &input[..boundary])
}

fn now_unix_ms() -> u128 {
    let now = std::time::SystemTime::now();
    now.duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}

#[cfg(test)]
mod tests {
    use fo_core::ExecutionMode;
    use fo_promote::PromotionPolicy;
    use proptest::prelude::*;

    use super::{
        ConfigError, DEFAULT_MAX_EVIDENCE_ENTRIES, EvidenceKind, EvidenceLedger, RuntimeConfig,
        RuntimeContext,
    };

    #[test]
    fn empty_object_uses_defaults() {
        let config = RuntimeConfig::from_json_str("{}").expect("defaults");
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.mode, ExecutionMode::Strict);
        assert_eq!(config.promotion_policy, PromotionPolicy::Lattice);
        assert!(!config.allow_in_place);
        assert!(config.record_evidence);
        assert_eq!(config.max_evidence_entries, DEFAULT_MAX_EVIDENCE_ENTRIES);
    }

    #[test]
    fn full_config_parses() {
        let config = RuntimeConfig::from_json_str(
            r#"{
                "mode": "hardened",
                "promotion_policy": "integer_dominant",
                "allow_in_place": true,
                "record_evidence": false,
                "max_evidence_entries": 8
            }"#,
        )
        .expect("full config");
        assert_eq!(config.mode, ExecutionMode::Hardened);
        assert_eq!(config.promotion_policy, PromotionPolicy::IntegerDominant);
        assert!(config.allow_in_place);
        assert!(!config.record_evidence);
        assert_eq!(config.max_evidence_entries, 8);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = RuntimeConfig::from_json_str(r#"{"mode": "strict", "fast_math": true}"#)
            .expect_err("unknown field");
        assert_eq!(
            err,
            ConfigError::UnknownField {
                field: "fast_math".to_string()
            }
        );
    }

    #[test]
    fn malformed_json_is_invalid() {
        let err = RuntimeConfig::from_json_str(r#"{"mode": "turbo"}"#).expect_err("bad mode");
        assert!(matches!(err, ConfigError::InvalidJson { .. }));
        assert!(err.to_string().starts_with("invalid config json"));
    }

    #[test]
    fn zero_capacity_with_recording_is_invalid() {
        let err = RuntimeConfig::from_json_str(r#"{"max_evidence_entries": 0}"#)
            .expect_err("nowhere to record");
        assert!(matches!(err, ConfigError::Invalid { .. }));
        RuntimeConfig::from_json_str(r#"{"max_evidence_entries": 0, "record_evidence": false}"#)
            .expect("recording disabled");
    }

    #[test]
    fn config_loads_from_path() {
        let path = std::env::temp_dir().join(format!("fo-runtime-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"allow_in_place": true}"#).expect("write config");
        let config = RuntimeConfig::from_path(&path).expect("read config");
        std::fs::remove_file(&path).expect("cleanup");
        assert!(config.allow_in_place);

        let err = RuntimeConfig::from_path(&path).expect_err("file is gone");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn config_survives_json_round_trip() {
        let config = RuntimeConfig {
            mode: ExecutionMode::Hardened,
            allow_in_place: true,
            ..RuntimeConfig::default()
        };
        assert_eq!(RuntimeConfig::from_json_str(&config.to_json()), Ok(config));
    }

    #[test]
    fn context_records_policy_events() {
        let mut ctx = RuntimeContext::default();
        ctx.set_mode(ExecutionMode::Hardened);
        ctx.set_allow_in_place(true);
        ctx.record(EvidenceKind::Dispatch, "add(dense int8, dense int8)");

        assert_eq!(ctx.mode(), ExecutionMode::Hardened);
        assert!(ctx.allow_in_place());
        assert_eq!(ctx.ledger().len(), 4);
        let kinds: Vec<EvidenceKind> = ctx.ledger().entries().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EvidenceKind::Policy,
                EvidenceKind::Policy,
                EvidenceKind::Policy,
                EvidenceKind::Dispatch
            ]
        );
    }

    #[test]
    fn disabled_recording_keeps_ledger_empty() {
        let ctx = RuntimeContext::new(RuntimeConfig {
            record_evidence: false,
            ..RuntimeConfig::default()
        });
        assert!(ctx.ledger().is_empty());
    }

    #[test]
    fn ledger_evicts_oldest_entries() {
        let mut ledger = EvidenceLedger::with_capacity(2);
        ledger.record(EvidenceKind::Dispatch, "first");
        ledger.record(EvidenceKind::Promotion, "second");
        ledger.record(EvidenceKind::InPlace, "third");
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.evicted(), 1);
        assert_eq!(ledger.entries().next().map(|entry| entry.summary.as_str()), Some("second"));
        assert_eq!(ledger.latest().map(|entry| entry.kind), Some(EvidenceKind::InPlace));
    }

    proptest! {
        #[test]
        fn prop_ledger_never_exceeds_capacity(capacity in 1usize..16, records in 0usize..64) {
            let mut ledger = EvidenceLedger::with_capacity(capacity);
            for index in 0..records {
                ledger.record(EvidenceKind::Diagnostic, format!("entry {index}"));
            }
            prop_assert_eq!(ledger.len(), records.min(capacity));
            prop_assert_eq!(ledger.evicted() as usize, records.saturating_sub(capacity));
        }
    }
}
