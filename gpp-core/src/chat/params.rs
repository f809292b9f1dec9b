//! Generation parameters and their precedence rules

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameter keys gpp knows how to interpret.
///
/// Any other key found in a parameter set is kept and forwarded to the API
/// untouched.
pub mod keys {
    pub const MODEL: &str = "model";
    pub const TEMPERATURE: &str = "temperature";
    pub const TOP_P: &str = "top_p";
    pub const MAX_TOKENS: &str = "max_tokens";
    pub const FREQUENCY_PENALTY: &str = "frequency_penalty";
    pub const PRESENCE_PENALTY: &str = "presence_penalty";

    pub const KNOWN: [&str; 6] = [
        MODEL,
        TEMPERATURE,
        TOP_P,
        MAX_TOKENS,
        FREQUENCY_PENALTY,
        PRESENCE_PENALTY,
    ];
}

/// Mapping from parameter name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(Map<String, Value>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set a value, replacing whatever was there
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`ParameterSet::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Copy every key from `defaults` that is not already present.
    ///
    /// Existing keys are never overwritten.
    pub fn fill_defaults(&mut self, defaults: &ParameterSet) {
        for (key, value) in &defaults.0 {
            if !self.0.contains_key(key) {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.0.get(keys::MODEL).and_then(Value::as_str)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.0.get(keys::TEMPERATURE).and_then(Value::as_f64)
    }

    pub fn top_p(&self) -> Option<f64> {
        self.0.get(keys::TOP_P).and_then(Value::as_f64)
    }

    pub fn max_tokens(&self) -> Option<u64> {
        self.0.get(keys::MAX_TOKENS).and_then(Value::as_u64)
    }

    /// Keys not in [`keys::KNOWN`]
    pub fn unknown_keys(&self) -> impl Iterator<Item = &str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(|key| !keys::KNOWN.contains(key))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Combine the four parameter sources into the effective set.
///
/// Precedence, highest first: `explicit`, `persona`, `continuation`,
/// `builtin`. A key set at a higher level is never replaced by a lower one.
pub fn merge(
    explicit: &ParameterSet,
    persona: &ParameterSet,
    continuation: &ParameterSet,
    builtin: &ParameterSet,
) -> ParameterSet {
    let mut merged = explicit.clone();
    merged.fill_defaults(persona);
    merged.fill_defaults(continuation);
    merged.fill_defaults(builtin);
    merged
}
