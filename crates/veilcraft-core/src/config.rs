//! Privacy configuration: tunable parameters shared by every sub-engine.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Policy tier governing how aggressively identifying fields are masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnonymizationLevel {
    /// Passthrough, no redaction.
    None,
    /// PII masked unless the caller role is privileged.
    Partial,
    /// PII redacted regardless of role.
    Full,
}

impl std::fmt::Display for AnonymizationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Partial => write!(f, "partial"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// Caller role tag, validated at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    SecurityOfficer,
    Operator,
    Viewer,
}

impl UserRole {
    /// Privileged roles see original values at the partial level.
    pub fn is_privileged(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SecurityOfficer)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "ADMIN"),
            Self::SecurityOfficer => write!(f, "SECURITY_OFFICER"),
            Self::Operator => write!(f, "OPERATOR"),
            Self::Viewer => write!(f, "VIEWER"),
        }
    }
}

/// Tunable privacy parameters. One instance per engine, mutated in place
/// by validated merges only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Differential-privacy budget, > 0.
    pub epsilon: f64,
    /// Failure probability for the Gaussian mechanism, in [0, 1).
    pub delta: f64,
    /// Minimum equivalence-class size, >= 1.
    #[serde(rename = "kValue")]
    pub k_value: usize,
    /// Level applied when a call does not specify one.
    #[serde(rename = "defaultAnonymizationLevel")]
    pub default_anonymization_level: AnonymizationLevel,
    /// Field names treated as PII (matched case-insensitively).
    #[serde(rename = "piiFields")]
    pub pii_fields: HashSet<String>,
    /// Ordered quasi-identifier field names for k-anonymity grouping.
    #[serde(rename = "quasiIdentifiers")]
    pub quasi_identifiers: Vec<String>,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            delta: 1e-5,
            k_value: 5,
            default_anonymization_level: AnonymizationLevel::Partial,
            pii_fields: [
                "name",
                "email",
                "phone",
                "address",
                "ssn",
                "student_id",
                "card_id",
                "date_of_birth",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            quasi_identifiers: ["age", "zip_code", "gender", "department"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl PrivacyConfig {
    /// Create configuration from environment overrides and defaults.
    ///
    /// Unset or out-of-domain variables fall back to the default value.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(epsilon) = read_env_f64("VEILCRAFT_EPSILON").filter(|e| *e > 0.0) {
            config.epsilon = epsilon;
        }
        if let Some(delta) = read_env_f64("VEILCRAFT_DELTA").filter(|d| (0.0..1.0).contains(d)) {
            config.delta = delta;
        }
        if let Some(k) = std::env::var("VEILCRAFT_K_VALUE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|k| *k >= 1)
        {
            config.k_value = k;
        }

        debug!(
            "Privacy config loaded: epsilon={}, delta={}, k={}",
            config.epsilon, config.delta, config.k_value
        );
        config
    }

    /// Apply a partial update. Validates every supplied field first; on any
    /// violation the whole update is rejected and `self` is left untouched.
    ///
    /// Returns the names of the fields that were merged.
    pub fn apply(&mut self, update: &ConfigUpdate) -> Result<Vec<&'static str>> {
        update.validate()?;

        let mut applied = Vec::new();
        if let Some(epsilon) = update.epsilon {
            self.epsilon = epsilon;
            applied.push("epsilon");
        }
        if let Some(delta) = update.delta {
            self.delta = delta;
            applied.push("delta");
        }
        if let Some(k_value) = update.k_value {
            self.k_value = k_value;
            applied.push("kValue");
        }
        if let Some(level) = update.default_anonymization_level {
            self.default_anonymization_level = level;
            applied.push("defaultAnonymizationLevel");
        }
        if let Some(fields) = &update.pii_fields {
            self.pii_fields = fields.iter().map(|f| f.to_lowercase()).collect();
            applied.push("piiFields");
        }
        if let Some(qi) = &update.quasi_identifiers {
            self.quasi_identifiers = qi.clone();
            applied.push("quasiIdentifiers");
        }
        Ok(applied)
    }

    /// Whether a field name is configured as PII.
    pub fn is_pii_field(&self, field: &str) -> bool {
        self.pii_fields.contains(&field.to_lowercase())
    }
}

fn read_env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|v| v.parse::<f64>().ok())
}

/// Partial configuration update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub epsilon: Option<f64>,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default, rename = "kValue")]
    pub k_value: Option<usize>,
    #[serde(default, rename = "defaultAnonymizationLevel")]
    pub default_anonymization_level: Option<AnonymizationLevel>,
    #[serde(default, rename = "piiFields")]
    pub pii_fields: Option<Vec<String>>,
    #[serde(default, rename = "quasiIdentifiers")]
    pub quasi_identifiers: Option<Vec<String>>,
}

impl ConfigUpdate {
    /// Check every supplied field against its domain.
    pub fn validate(&self) -> Result<()> {
        if let Some(epsilon) = self.epsilon {
            if !epsilon.is_finite() || epsilon <= 0.0 {
                return Err(Error::Config(format!(
                    "epsilon must be > 0, got {epsilon}"
                )));
            }
        }
        if let Some(delta) = self.delta {
            if !delta.is_finite() || !(0.0..1.0).contains(&delta) {
                return Err(Error::Config(format!(
                    "delta must be in [0, 1), got {delta}"
                )));
            }
        }
        if let Some(k_value) = self.k_value {
            if k_value < 1 {
                return Err(Error::Config(format!("kValue must be >= 1, got {k_value}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_in_domain() {
        let config = PrivacyConfig::default();
        assert!(config.epsilon > 0.0);
        assert!((0.0..1.0).contains(&config.delta));
        assert!(config.k_value >= 1);
        assert!(config.is_pii_field("email"));
        assert!(!config.quasi_identifiers.is_empty());
    }

    #[test]
    fn test_pii_field_match_is_case_insensitive() {
        let config = PrivacyConfig::default();
        assert!(config.is_pii_field("Email"));
        assert!(config.is_pii_field("SSN"));
        assert!(!config.is_pii_field("location"));
    }

    #[test]
    fn test_apply_merges_only_supplied_fields() {
        let mut config = PrivacyConfig::default();
        let prior_delta = config.delta;
        let applied = config
            .apply(&ConfigUpdate {
                epsilon: Some(2.5),
                k_value: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(applied, vec!["epsilon", "kValue"]);
        assert_eq!(config.epsilon, 2.5);
        assert_eq!(config.k_value, 3);
        assert_eq!(config.delta, prior_delta);
    }

    #[test]
    fn test_apply_rejects_out_of_domain_atomically() {
        let mut config = PrivacyConfig::default();
        let prior = config.clone();
        // Valid kValue alongside an invalid epsilon: nothing may merge.
        let err = config
            .apply(&ConfigUpdate {
                epsilon: Some(-1.0),
                k_value: Some(10),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), "CONFIG_ERROR");
        assert_eq!(config.epsilon, prior.epsilon);
        assert_eq!(config.k_value, prior.k_value);
    }

    #[test]
    fn test_apply_rejects_delta_of_one() {
        let mut config = PrivacyConfig::default();
        assert!(config
            .apply(&ConfigUpdate {
                delta: Some(1.0),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn test_pii_fields_update_lowercases() {
        let mut config = PrivacyConfig::default();
        config
            .apply(&ConfigUpdate {
                pii_fields: Some(vec!["Badge_Number".into()]),
                ..Default::default()
            })
            .unwrap();
        assert!(config.is_pii_field("badge_number"));
        assert!(!config.is_pii_field("email"));
    }

    #[test]
    fn test_update_deserializes_camel_case() {
        let update: ConfigUpdate = serde_json::from_str(
            r#"{"kValue": 4, "defaultAnonymizationLevel": "full", "piiFields": ["name"]}"#,
        )
        .unwrap();
        assert_eq!(update.k_value, Some(4));
        assert_eq!(
            update.default_anonymization_level,
            Some(AnonymizationLevel::Full)
        );
    }

    #[test]
    fn test_role_wire_format() {
        let role: UserRole = serde_json::from_str(r#""SECURITY_OFFICER""#).unwrap();
        assert_eq!(role, UserRole::SecurityOfficer);
        assert!(role.is_privileged());
        assert!(!UserRole::Viewer.is_privileged());
    }
}
