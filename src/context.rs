//! @ai:module:intent Read-only execution context (`zerg_state`) and secret redaction
//! @ai:module:layer domain
//! @ai:module:public_api ExecutionContext, ResolvedValue, SecretString, DeferredFunction, Redactor
//! @ai:module:stateless true

use crate::error::ConfigResolutionError;
use std::collections::BTreeMap;
use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// @ai:intent Environment-sourced value that must never reach logs or reports
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// @ai:intent Access the raw value; only the sandbox payload may call this
    /// @ai:effects pure
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// @ai:intent Candidate-language function bound at resolution time, never invoked by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredFunction {
    pub source: String,
}

/// @ai:intent Effective value of a config or constant after directive resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Literal(serde_json::Value),
    Secret(SecretString),
    /// Optional environment directive whose variable is unset
    Absent,
    Function(DeferredFunction),
}

impl ResolvedValue {
    /// @ai:intent Borrow as a string when the value is textual
    /// @ai:effects pure
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedValue::Literal(serde_json::Value::String(s)) => Some(s),
            ResolvedValue::Secret(secret) => Some(secret.expose()),
            _ => None,
        }
    }

    /// @ai:intent Interpret as an unsigned integer when numeric
    /// @ai:effects pure
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ResolvedValue::Literal(v) => v.as_u64(),
            _ => None,
        }
    }

    /// @ai:intent Render the value for the candidate process, secrets included
    /// @ai:effects pure
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            ResolvedValue::Literal(v) => v.clone(),
            ResolvedValue::Secret(secret) => serde_json::Value::String(secret.expose().to_string()),
            ResolvedValue::Absent | ResolvedValue::Function(_) => serde_json::Value::Null,
        }
    }
}

/// @ai:intent Mapping from config name to resolved value, exposed read-only to tests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    entries: BTreeMap<String, ResolvedValue>,
}

impl ExecutionContext {
    /// @ai:intent Build a context from resolved entries
    /// @ai:effects pure
    pub fn new(entries: BTreeMap<String, ResolvedValue>) -> Self {
        Self { entries }
    }

    /// @ai:intent Look up a value; undefined and absent both yield None
    /// @ai:effects pure
    pub fn get(&self, name: &str) -> Option<&ResolvedValue> {
        match self.entries.get(name) {
            Some(ResolvedValue::Absent) | None => None,
            Some(value) => Some(value),
        }
    }

    /// @ai:intent Look up a value that must be present
    /// @ai:effects pure
    pub fn require(&self, name: &str) -> Result<&ResolvedValue, ConfigResolutionError> {
        match self.entries.get(name) {
            None => Err(ConfigResolutionError::Undefined {
                name: name.to_string(),
            }),
            Some(ResolvedValue::Absent) => Err(ConfigResolutionError::Absent {
                name: name.to_string(),
            }),
            Some(value) => Ok(value),
        }
    }

    /// @ai:intent Whether a name is defined at all (absent values count as defined)
    /// @ai:effects pure
    pub fn is_defined(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// @ai:intent Iterate over names in order
    /// @ai:effects pure
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// @ai:intent Iterate over entries in name order
    /// @ai:effects pure
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// @ai:intent JSON handed to the candidate process: values plus function sources
    /// @ai:effects pure
    pub fn to_payload(&self) -> serde_json::Value {
        let mut values = serde_json::Map::new();
        let mut functions = serde_json::Map::new();

        for (name, value) in &self.entries {
            match value {
                ResolvedValue::Function(f) => {
                    functions.insert(name.clone(), serde_json::Value::String(f.source.clone()));
                }
                other => {
                    values.insert(name.clone(), other.to_payload());
                }
            }
        }

        serde_json::json!({ "values": values, "functions": functions })
    }

    /// @ai:intent Collect every secret value so messages can be scrubbed
    /// @ai:effects pure
    pub fn redactor(&self) -> Redactor {
        Redactor::new(self.entries.values().filter_map(|v| match v {
            ResolvedValue::Secret(secret) => Some(secret.expose().to_string()),
            _ => None,
        }))
    }
}

/// @ai:intent Replaces secret values in free text
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// @ai:intent Build a redactor; empty secrets are ignored
    /// @ai:effects pure
    pub fn new<I: IntoIterator<Item = String>>(secrets: I) -> Self {
        let mut secrets: Vec<String> = secrets.into_iter().filter(|s| !s.is_empty()).collect();
        // Longest first so a secret containing another is replaced whole.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }

    /// @ai:intent Replace every secret occurrence with a marker
    /// @ai:effects pure
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl fmt::Debug for Redactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecutionContext {
        let mut entries = BTreeMap::new();
        entries.insert(
            "page_limit".to_string(),
            ResolvedValue::Literal(serde_json::json!(50)),
        );
        entries.insert(
            "token".to_string(),
            ResolvedValue::Secret(SecretString::new("s3cr3t-value".to_string())),
        );
        entries.insert("optional".to_string(), ResolvedValue::Absent);
        entries.insert(
            "helper".to_string(),
            ResolvedValue::Function(DeferredFunction {
                source: "def helper():\n    return 1\n".to_string(),
            }),
        );
        ExecutionContext::new(entries)
    }

    #[test]
    fn test_get_treats_absent_as_none() {
        let ctx = sample();
        assert!(ctx.get("optional").is_none());
        assert!(ctx.is_defined("optional"));
        assert_eq!(ctx.get("page_limit").and_then(|v| v.as_u64()), Some(50));
    }

    #[test]
    fn test_require_distinguishes_undefined_and_absent() {
        let ctx = sample();
        assert!(matches!(
            ctx.require("missing"),
            Err(ConfigResolutionError::Undefined { .. })
        ));
        assert!(matches!(
            ctx.require("optional"),
            Err(ConfigResolutionError::Absent { .. })
        ));
        assert_eq!(ctx.require("token").unwrap().as_str(), Some("s3cr3t-value"));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let ctx = sample();
        let debug = format!("{ctx:?}");
        assert!(!debug.contains("s3cr3t-value"));
        assert!(debug.contains(REDACTED));
    }

    #[test]
    fn test_payload_separates_functions() {
        let payload = sample().to_payload();
        assert_eq!(payload["values"]["page_limit"], serde_json::json!(50));
        assert_eq!(payload["values"]["optional"], serde_json::Value::Null);
        assert!(payload["functions"]["helper"]
            .as_str()
            .unwrap()
            .contains("def helper"));
        assert!(payload["values"].get("helper").is_none());
    }

    #[test]
    fn test_redactor_scrubs_secrets() {
        let redactor = sample().redactor();
        let message = redactor.redact("login failed for token s3cr3t-value");
        assert_eq!(message, "login failed for token [REDACTED]");
    }

    #[test]
    fn test_redactor_prefers_longest_secret() {
        let redactor = Redactor::new(vec!["abc".to_string(), "abcdef".to_string()]);
        assert_eq!(redactor.redact("x abcdef y abc"), "x [REDACTED] y [REDACTED]");
    }
}
