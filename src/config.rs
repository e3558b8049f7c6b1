//! Redaction policy and the enumerations callers may choose from.
//!
//! A [`RedactionPolicy`] is loaded once per job and never mutated while the
//! job runs. Policy files are YAML; any field left out keeps its default,
//! and `text_policies` entries are merged over the built-in table.

use crate::error::{RedactorError, RedactorResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// What happens to a detected span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Fixed placeholder token derived from the type
    Anonymize,
    /// Synthetic value from the injected generator
    DummyReplacement,
    /// Deterministic format-preserving rewrite
    Rewrite,
    /// Deterministic keyed token
    Encrypt,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymize => "anonymize",
            Self::DummyReplacement => "dummy_replacement",
            Self::Rewrite => "rewrite",
            Self::Encrypt => "encrypt",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RedactorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anonymize" => Ok(Self::Anonymize),
            "dummy_replacement" | "dummy" => Ok(Self::DummyReplacement),
            "rewrite" => Ok(Self::Rewrite),
            "encrypt" => Ok(Self::Encrypt),
            other => Err(invalid("action", other)),
        }
    }
}

/// Global text mode chosen at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextRedactionMode {
    /// Honour the per-type policy table
    #[default]
    Dummy,
    /// Force every span to the anonymize action
    Anonymize,
}

impl FromStr for TextRedactionMode {
    type Err = RedactorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dummy" => Ok(Self::Dummy),
            "anonymize" => Ok(Self::Anonymize),
            other => Err(invalid("text_redaction_mode", other)),
        }
    }
}

/// How image elements are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualRedactionMode {
    /// Opaque box with a generic label
    #[default]
    #[serde(alias = "text_box")]
    Textbox,
    /// Neutral placeholder image
    #[serde(alias = "image")]
    Replacement,
}

impl FromStr for VisualRedactionMode {
    type Err = RedactorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "textbox" | "text_box" => Ok(Self::Textbox),
            "replacement" | "image" => Ok(Self::Replacement),
            other => Err(invalid("visual_redaction_mode", other)),
        }
    }
}

fn invalid(parameter: &str, value: &str) -> RedactorError {
    RedactorError::InvalidInput {
        parameter: parameter.to_string(),
        reason: format!("unsupported value '{}'", value),
    }
}

/// Per-job redaction policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionPolicy {
    /// PII/PHI type to action
    #[serde(default = "default_text_policies")]
    pub text_policies: BTreeMap<String, Action>,

    /// Spans strictly below this confidence are not redacted
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f32,

    #[serde(default = "default_true")]
    pub create_overlay: bool,

    #[serde(default)]
    pub visual_redaction_mode: VisualRedactionMode,

    #[serde(default)]
    pub text_redaction_mode: TextRedactionMode,

    /// Key for the encrypt and rewrite actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
}

/// YAML shape accepted by [`RedactionPolicy::from_yaml_str`].
#[derive(Debug, Default, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    text_policies: BTreeMap<String, Action>,
    confidence_threshold: Option<f32>,
    create_overlay: Option<bool>,
    visual_redaction_mode: Option<VisualRedactionMode>,
    text_redaction_mode: Option<TextRedactionMode>,
    encryption_key: Option<String>,
}

const DEFAULT_KEY: &str = "phi-redactor/default-key";

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            text_policies: default_text_policies(),
            confidence_threshold: default_threshold(),
            create_overlay: true,
            visual_redaction_mode: VisualRedactionMode::default(),
            text_redaction_mode: TextRedactionMode::default(),
            encryption_key: None,
        }
    }
}

impl RedactionPolicy {
    /// Parses a YAML policy, merging it over the defaults.
    pub fn from_yaml_str(yaml: &str, origin: &str) -> RedactorResult<Self> {
        let file: PolicyFile = serde_yaml::from_str(yaml).map_err(|e| RedactorError::Policy {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;

        let mut policy = Self::default();
        policy.text_policies.extend(file.text_policies);
        if let Some(threshold) = file.confidence_threshold {
            policy.confidence_threshold = threshold;
        }
        if let Some(overlay) = file.create_overlay {
            policy.create_overlay = overlay;
        }
        if let Some(mode) = file.visual_redaction_mode {
            policy.visual_redaction_mode = mode;
        }
        if let Some(mode) = file.text_redaction_mode {
            policy.text_redaction_mode = mode;
        }
        policy.encryption_key = file.encryption_key;

        policy.validate().map_err(|e| RedactorError::Policy {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;
        Ok(policy)
    }

    /// Loads a YAML policy file.
    pub fn load(path: &Path) -> RedactorResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| RedactorError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml_str(&yaml, &path.display().to_string())
    }

    /// Checks global settings are within range.
    pub fn validate(&self) -> RedactorResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(RedactorError::InvalidInput {
                parameter: "confidence_threshold".to_string(),
                reason: format!("{} is outside [0, 1]", self.confidence_threshold),
            });
        }
        Ok(())
    }

    pub fn with_text_mode(mut self, mode: TextRedactionMode) -> Self {
        self.text_redaction_mode = mode;
        self
    }

    pub fn with_visual_mode(mut self, mode: VisualRedactionMode) -> Self {
        self.visual_redaction_mode = mode;
        self
    }

    pub fn with_overlay(mut self, create_overlay: bool) -> Self {
        self.create_overlay = create_overlay;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Sets the action for a single type.
    pub fn with_action(mut self, pii_type: &str, action: Action) -> Self {
        self.text_policies.insert(pii_type.to_string(), action);
        self
    }

    /// Resolves the action for a type.
    ///
    /// Lookup is exact first, then case-insensitive; unknown types are
    /// anonymized.
    pub fn action_for(&self, pii_type: &str) -> Action {
        if self.text_redaction_mode == TextRedactionMode::Anonymize {
            return Action::Anonymize;
        }
        self.text_policies
            .get(pii_type)
            .or_else(|| {
                self.text_policies
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(pii_type))
                    .map(|(_, v)| v)
            })
            .copied()
            .unwrap_or(Action::Anonymize)
    }

    /// Key material for keyed actions.
    pub fn key(&self) -> &[u8] {
        self.encryption_key
            .as_deref()
            .unwrap_or(DEFAULT_KEY)
            .as_bytes()
    }
}

fn default_threshold() -> f32 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_text_policies() -> BTreeMap<String, Action> {
    use Action::*;

    [
        // PII
        ("Name", Anonymize),
        ("Address", DummyReplacement),
        ("Birthday", Anonymize),
        ("Email", DummyReplacement),
        ("Phone", DummyReplacement),
        ("SSN", Anonymize),
        ("Passport", Anonymize),
        ("Credit Card", Anonymize),
        ("Biometrics", Anonymize),
        ("Age", Anonymize),
        ("Gender", DummyReplacement),
        ("Race", DummyReplacement),
        ("Location", DummyReplacement),
        // PHI
        ("Medical Record Number", Anonymize),
        ("Health Plan Beneficiary Number", Anonymize),
        ("Account Number", Anonymize),
        ("Certificate License Number", Anonymize),
        ("Vehicle Identifier", Anonymize),
        ("Device Identifier", Anonymize),
        ("Web URL", DummyReplacement),
        ("IP Address", DummyReplacement),
        ("Biometric Identifier", Anonymize),
        ("Full Face Photo", Anonymize),
        ("Medical Condition", DummyReplacement),
        ("Medication", DummyReplacement),
        ("Doctor Name", DummyReplacement),
        ("Hospital Name", DummyReplacement),
        ("Insurance Info", Anonymize),
    ]
    .into_iter()
    .map(|(t, a)| (t.to_string(), a))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let policy = RedactionPolicy::default();
        assert_eq!(policy.action_for("SSN"), Action::Anonymize);
        assert_eq!(policy.action_for("Medication"), Action::DummyReplacement);
        assert_eq!(policy.action_for("ssn"), Action::Anonymize);
        assert_eq!(policy.action_for("Unheard Of"), Action::Anonymize);
    }

    #[test]
    fn test_anonymize_mode_overrides_table() {
        let policy = RedactionPolicy::default().with_text_mode(TextRedactionMode::Anonymize);
        assert_eq!(policy.action_for("Email"), Action::Anonymize);
    }

    #[test]
    fn test_yaml_merges_over_defaults() {
        let yaml = r#"
text_policies:
  Name: dummy_replacement
  Email: encrypt
confidence_threshold: 0.8
visual_redaction_mode: image
create_overlay: false
"#;
        let policy = RedactionPolicy::from_yaml_str(yaml, "inline").unwrap();
        assert_eq!(policy.action_for("Name"), Action::DummyReplacement);
        assert_eq!(policy.action_for("Email"), Action::Encrypt);
        assert_eq!(policy.action_for("SSN"), Action::Anonymize);
        assert_eq!(policy.visual_redaction_mode, VisualRedactionMode::Replacement);
        assert!(!policy.create_overlay);
        assert!((policy.confidence_threshold - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_yaml_rejects_unknown_action() {
        let yaml = "text_policies:\n  Name: shred\n";
        assert!(RedactionPolicy::from_yaml_str(yaml, "inline").is_err());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let yaml = "confidence_threshold: 1.5\n";
        let err = RedactionPolicy::from_yaml_str(yaml, "inline").unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("dummy".parse::<TextRedactionMode>().unwrap(), TextRedactionMode::Dummy);
        assert_eq!(
            "text_box".parse::<VisualRedactionMode>().unwrap(),
            VisualRedactionMode::Textbox
        );
        assert!("blur".parse::<VisualRedactionMode>().is_err());
        assert!("redact-all".parse::<TextRedactionMode>().is_err());
    }
}
