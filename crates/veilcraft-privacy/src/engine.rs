//! The privacy engine instance: shared configuration, counters and cache
//! behind one synchronization boundary.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};
use veilcraft_core::{AnonymizationLevel, ConfigUpdate, Error, PrivacyConfig, Result, UserRole};

use crate::kanonymity::{self, KAnonymityOutcome, KAnonymityReport, MemoKey};
use crate::metrics::{Metrics, PrivacyMetricsSnapshot};
use crate::minimize;
use crate::noise::{self, NoiseSeries, NoiseSummary, QueryType};
use crate::pseudonym::{self, PseudonymRecord};

/// Salt applied when an anonymized-ID call does not supply one.
const DEFAULT_SALT: &str = "default";

#[derive(Default)]
struct EngineCache {
    pseudonyms: HashMap<(String, String), String>,
    generalizations: HashMap<MemoKey, String>,
}

impl EngineCache {
    fn len(&self) -> usize {
        self.pseudonyms.len() + self.generalizations.len()
    }
}

/// Pure in-memory privacy engine. Create one per process, or isolated
/// instances for tests; every operation is synchronous and CPU-bound.
pub struct PrivacyEngine {
    config: RwLock<PrivacyConfig>,
    metrics: Metrics,
    cache: RwLock<EngineCache>,
}

impl PrivacyEngine {
    /// Create an engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(PrivacyConfig::default())
    }

    /// Create an engine from environment overrides.
    pub fn from_env() -> Self {
        Self::with_config(PrivacyConfig::from_env())
    }

    /// Create an engine with explicit configuration (isolated instances
    /// for testing).
    pub fn with_config(config: PrivacyConfig) -> Self {
        Self {
            config: RwLock::new(config),
            metrics: Metrics::default(),
            cache: RwLock::new(EngineCache::default()),
        }
    }

    /// Current configuration. External stores snapshot through this; the
    /// engine itself never performs I/O.
    pub fn config(&self) -> PrivacyConfig {
        self.config.read().clone()
    }

    /// Validate and merge a partial configuration update. On any
    /// out-of-domain field the whole update is rejected and the prior
    /// configuration is preserved.
    pub fn update_config(&self, update: &ConfigUpdate) -> Result<PrivacyConfig> {
        let mut config = self.config.write();
        let applied = config.apply(update)?;
        info!("Privacy config updated: {}", applied.join(", "));
        Ok(config.clone())
    }

    /// Read-only snapshot of configuration, counters and cache occupancy.
    pub fn metrics(&self) -> PrivacyMetricsSnapshot {
        PrivacyMetricsSnapshot {
            config: self.config.read().clone(),
            counters: self.metrics.counters(),
            cache_size: self.cache.read().len(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Discard all memoized pseudonyms and generalizations. Counters are
    /// untouched. Returns the number of evicted entries.
    pub fn clear_cache(&self) -> usize {
        let mut cache = self.cache.write();
        let evicted = cache.len();
        cache.pseudonyms.clear();
        cache.generalizations.clear();
        info!("Privacy cache cleared: {evicted} entries");
        evicted
    }

    /// Check k-anonymity of `dataset` without mutating it. Falls back to
    /// the configured quasi-identifiers when no override is supplied.
    pub fn check_k_anonymity(
        &self,
        dataset: &[Value],
        quasi_identifiers: Option<&[String]>,
    ) -> Result<KAnonymityReport> {
        let (qi, k) = self.grouping_params(quasi_identifiers);
        kanonymity::check(dataset, &qi, k)
    }

    /// Enforce k-anonymity by bounded generalization, suppressing records
    /// that cannot be grouped. Each suppression counts as a violation.
    pub fn apply_k_anonymity(
        &self,
        dataset: &[Value],
        quasi_identifiers: Option<&[String]>,
    ) -> Result<KAnonymityOutcome> {
        let (qi, k) = self.grouping_params(quasi_identifiers);

        let outcome = {
            let mut cache = self.cache.write();
            kanonymity::enforce(dataset, &qi, k, &mut cache.generalizations)?
        };

        if outcome.suppressed > 0 {
            warn!(
                "Suppressed {} record(s) that could not reach k={k}",
                outcome.suppressed
            );
            self.metrics
                .add_k_anonymity_violations(outcome.suppressed as u64);
        }
        Ok(outcome)
    }

    fn grouping_params(&self, quasi_identifiers: Option<&[String]>) -> (Vec<String>, usize) {
        let config = self.config.read();
        let qi = quasi_identifiers
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| config.quasi_identifiers.clone());
        (qi, config.k_value)
    }

    /// Perturb a numeric query result under the configured (epsilon,
    /// delta) budget.
    pub fn apply_differential_privacy(&self, value: f64, query_type: QueryType) -> Result<f64> {
        let (epsilon, delta) = {
            let config = self.config.read();
            (config.epsilon, config.delta)
        };
        let noisy = noise::sample(value, query_type, epsilon, delta)?;
        self.metrics.add_dp_queries(1);
        debug!("DP {query_type} query: epsilon={epsilon}");
        Ok(noisy)
    }

    /// Draw `count` noisy observations of `value` and summarize them.
    /// Each drawn sample counts as one differential-privacy query.
    pub fn sample_noise_series(
        &self,
        value: f64,
        query_type: QueryType,
        count: usize,
    ) -> Result<NoiseSeries> {
        if count == 0 {
            return Err(Error::Validation("sample count must be >= 1".into()));
        }
        let (epsilon, delta) = {
            let config = self.config.read();
            (config.epsilon, config.delta)
        };
        let samples = (0..count)
            .map(|_| noise::sample(value, query_type, epsilon, delta))
            .collect::<Result<Vec<f64>>>()?;
        self.metrics.add_dp_queries(count as u64);
        let summary = NoiseSummary::from_samples(&samples);
        Ok(NoiseSeries { samples, summary })
    }

    /// Minimize `data` for the given caller role. The level defaults to
    /// the configured one; the input is never mutated.
    pub fn apply_data_minimization(
        &self,
        data: &Value,
        level: Option<AnonymizationLevel>,
        role: UserRole,
    ) -> Value {
        let (level, pii_fields) = {
            let config = self.config.read();
            (
                level.unwrap_or(config.default_anonymization_level),
                config.pii_fields.clone(),
            )
        };
        let outcome = minimize::minimize(data, level, role, &pii_fields);
        if outcome.redactions > 0 {
            self.metrics.add_pii_redactions(outcome.redactions);
            debug!("Minimized {} field(s) at level {level}", outcome.redactions);
        }
        outcome.value
    }

    /// Derive the stable pseudonym for `(original_id, salt)`, serving
    /// repeats from cache.
    pub fn generate_anonymized_id(
        &self,
        original_id: &str,
        salt: Option<&str>,
    ) -> Result<PseudonymRecord> {
        if original_id.is_empty() {
            return Err(Error::Validation("originalId must not be empty".into()));
        }
        let salt = salt.unwrap_or(DEFAULT_SALT);
        let cache_key = (original_id.to_string(), salt.to_string());

        if let Some(cached) = self.cache.read().pseudonyms.get(&cache_key) {
            debug!("Pseudonym cache hit for salt {salt}");
            return Ok(PseudonymRecord {
                original_id: original_id.into(),
                anonymized_id: cached.clone(),
                salt_used: salt.into(),
            });
        }

        let anonymized_id = pseudonym::derive(original_id, salt);
        self.cache
            .write()
            .pseudonyms
            .insert(cache_key, anonymized_id.clone());
        Ok(PseudonymRecord {
            original_id: original_id.into(),
            anonymized_id,
            salt_used: salt.into(),
        })
    }
}

impl Default for PrivacyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine_with_k(k: usize) -> PrivacyEngine {
        let mut config = PrivacyConfig::default();
        config.k_value = k;
        PrivacyEngine::with_config(config)
    }

    #[test]
    fn test_apply_then_check_is_anonymous() {
        let engine = engine_with_k(3);
        let dataset: Vec<Value> = [18, 19, 23, 24, 25, 31, 33, 38, 2000]
            .iter()
            .map(|age| json!({"age": age, "zip_code": "90210", "gender": "F", "department": "math"}))
            .collect();
        let outcome = engine.apply_k_anonymity(&dataset, None).unwrap();
        let report = engine.check_k_anonymity(&outcome.records, None).unwrap();
        assert!(report.is_k_anonymous);
    }

    #[test]
    fn test_suppression_increments_violations() {
        let engine = engine_with_k(3);
        let dataset: Vec<Value> = [31, 34, 37, 5000]
            .iter()
            .map(|age| json!({"age": age}))
            .collect();
        let qi = vec!["age".to_string()];
        let outcome = engine.apply_k_anonymity(&dataset, Some(&qi)).unwrap();
        assert_eq!(outcome.suppressed, 1);
        assert_eq!(engine.metrics().counters.k_anonymity_violations, 1);
        // Generalization results were memoized.
        assert!(engine.metrics().cache_size > 0);
    }

    #[test]
    fn test_quasi_identifier_override() {
        let engine = engine_with_k(2);
        let dataset = vec![
            json!({"age": 10, "zip_code": "111"}),
            json!({"age": 99, "zip_code": "111"}),
        ];
        let qi = vec!["zip_code".to_string()];
        let report = engine.check_k_anonymity(&dataset, Some(&qi)).unwrap();
        assert!(report.is_k_anonymous);
    }

    #[test]
    fn test_dp_queries_are_counted() {
        let engine = PrivacyEngine::new();
        engine.apply_differential_privacy(10.0, QueryType::Count).unwrap();
        engine.sample_noise_series(10.0, QueryType::Sum, 5).unwrap();
        assert_eq!(engine.metrics().counters.differential_privacy_queries, 6);
    }

    #[test]
    fn test_failed_dp_query_counts_nothing() {
        let engine = PrivacyEngine::new();
        assert!(engine.apply_differential_privacy(f64::NAN, QueryType::Count).is_err());
        assert!(engine.sample_noise_series(1.0, QueryType::Count, 0).is_err());
        assert_eq!(engine.metrics().counters.differential_privacy_queries, 0);
    }

    #[test]
    fn test_noise_series_shape() {
        let engine = PrivacyEngine::new();
        let series = engine.sample_noise_series(100.0, QueryType::Count, 50).unwrap();
        assert_eq!(series.samples.len(), 50);
        assert!(series.summary.min <= series.summary.mean);
        assert!(series.summary.mean <= series.summary.max);
    }

    #[test]
    fn test_minimization_uses_configured_default_level() {
        // Default level is partial: a viewer sees masked PII.
        let engine = PrivacyEngine::new();
        let data = json!({"name": "Dana Reyes"});
        let out = engine.apply_data_minimization(&data, None, UserRole::Viewer);
        assert_eq!(out["name"], "D***s");
        assert_eq!(engine.metrics().counters.pii_redactions, 1);
    }

    #[test]
    fn test_minimization_level_override() {
        let engine = PrivacyEngine::new();
        let data = json!({"name": "Dana Reyes"});
        let out =
            engine.apply_data_minimization(&data, Some(AnonymizationLevel::None), UserRole::Viewer);
        assert_eq!(out, data);
        assert_eq!(engine.metrics().counters.pii_redactions, 0);
    }

    #[test]
    fn test_pseudonym_defaults_and_caches() {
        let engine = PrivacyEngine::new();
        let first = engine.generate_anonymized_id("student-42", None).unwrap();
        assert_eq!(first.salt_used, "default");
        assert_eq!(engine.metrics().cache_size, 1);

        let second = engine.generate_anonymized_id("student-42", None).unwrap();
        assert_eq!(first.anonymized_id, second.anonymized_id);
        assert_eq!(engine.metrics().cache_size, 1);
    }

    #[test]
    fn test_clear_cache_preserves_pseudonym_values() {
        let engine = PrivacyEngine::new();
        let before = engine.generate_anonymized_id("student-42", Some("s1")).unwrap();
        assert_eq!(engine.clear_cache(), 1);
        assert_eq!(engine.metrics().cache_size, 0);
        let after = engine.generate_anonymized_id("student-42", Some("s1")).unwrap();
        assert_eq!(before.anonymized_id, after.anonymized_id);
    }

    #[test]
    fn test_clear_cache_preserves_counters() {
        let engine = PrivacyEngine::new();
        engine.apply_differential_privacy(1.0, QueryType::Count).unwrap();
        engine.clear_cache();
        assert_eq!(engine.metrics().counters.differential_privacy_queries, 1);
    }

    #[test]
    fn test_empty_id_rejected() {
        let engine = PrivacyEngine::new();
        let err = engine.generate_anonymized_id("", None).unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_update_config_rejects_and_preserves() {
        let engine = PrivacyEngine::new();
        let prior = engine.config();
        let err = engine
            .update_config(&ConfigUpdate {
                epsilon: Some(-1.0),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), "CONFIG_ERROR");
        assert_eq!(engine.config().epsilon, prior.epsilon);
    }

    #[test]
    fn test_update_config_applies_to_operations() {
        let engine = PrivacyEngine::new();
        engine
            .update_config(&ConfigUpdate {
                k_value: Some(2),
                quasi_identifiers: Some(vec!["age".into()]),
                ..Default::default()
            })
            .unwrap();
        let dataset = vec![json!({"age": 30}), json!({"age": 30})];
        let report = engine.check_k_anonymity(&dataset, None).unwrap();
        assert!(report.is_k_anonymous);
        assert_eq!(report.min_class_size, 2);
    }

    #[test]
    fn test_isolated_instances_do_not_share_state() {
        let a = PrivacyEngine::new();
        let b = PrivacyEngine::new();
        a.apply_differential_privacy(1.0, QueryType::Count).unwrap();
        assert_eq!(b.metrics().counters.differential_privacy_queries, 0);
    }

    #[test]
    fn test_metrics_snapshot_includes_config() {
        let engine = engine_with_k(7);
        let snapshot = engine.metrics();
        assert_eq!(snapshot.config.k_value, 7);
        assert!(!snapshot.generated_at.is_empty());
    }
}
