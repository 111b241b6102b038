//! VeilCraft Privacy — the privacy engine protecting sensitive records
//! before they reach analytics and reporting consumers.
//!
//! Provides k-anonymity checking and enforcement, differential-privacy
//! noise injection, role-aware data minimization, deterministic pseudonym
//! derivation, and the shared configuration/metrics/cache state behind a
//! single [`PrivacyEngine`] instance.

pub mod engine;
pub mod kanonymity;
pub mod metrics;
pub mod minimize;
pub mod noise;
pub mod pseudonym;

pub use engine::PrivacyEngine;
pub use kanonymity::{
    EquivalenceClass, KAnonymityOutcome, KAnonymityReport, MAX_GENERALIZATION_DEPTH,
};
pub use metrics::{MetricsCounters, PrivacyMetricsSnapshot};
pub use minimize::REDACTED_PLACEHOLDER;
pub use noise::{NoiseSeries, NoiseSummary, QueryType};
pub use pseudonym::PseudonymRecord;
