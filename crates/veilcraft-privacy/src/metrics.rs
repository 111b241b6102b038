//! Cumulative operation counters and the read-only metrics snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use veilcraft_core::PrivacyConfig;

/// Increment-only counters shared by every sub-engine. Reset only by
/// process restart.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    dp_queries: AtomicU64,
    k_anonymity_violations: AtomicU64,
    pii_redactions: AtomicU64,
}

impl Metrics {
    pub(crate) fn add_dp_queries(&self, n: u64) {
        self.dp_queries.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_k_anonymity_violations(&self, n: u64) {
        self.k_anonymity_violations.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_pii_redactions(&self, n: u64) {
        self.pii_redactions.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn counters(&self) -> MetricsCounters {
        MetricsCounters {
            differential_privacy_queries: self.dp_queries.load(Ordering::Relaxed),
            k_anonymity_violations: self.k_anonymity_violations.load(Ordering::Relaxed),
            pii_redactions: self.pii_redactions.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsCounters {
    #[serde(rename = "differentialPrivacyQueries")]
    pub differential_privacy_queries: u64,
    #[serde(rename = "kAnonymityViolations")]
    pub k_anonymity_violations: u64,
    #[serde(rename = "piiRedactions")]
    pub pii_redactions: u64,
}

/// Read-only view of current config, counters and cache occupancy.
/// An external store snapshots engine state through this type.
#[derive(Debug, Clone, Serialize)]
pub struct PrivacyMetricsSnapshot {
    pub config: PrivacyConfig,
    pub counters: MetricsCounters,
    #[serde(rename = "cacheSize")]
    pub cache_size: usize,
    #[serde(rename = "generatedAt")]
    pub generated_at: String,
}
