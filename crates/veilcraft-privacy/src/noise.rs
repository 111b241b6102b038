//! Differential-privacy noise mechanisms.
//!
//! Count and sum queries use the Laplace mechanism with scale
//! `sensitivity / epsilon`; average queries use the Gaussian mechanism with
//! `sigma = sensitivity * sqrt(2 ln(1.25 / delta)) / epsilon`. Output is
//! intrinsically randomized and only meaningful statistically.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use veilcraft_core::{Error, Result};

/// Query shape; selects sensitivity and mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Count,
    Sum,
    Average,
}

impl QueryType {
    /// L1/L2 sensitivity assumed for the query shape. Counts change by at
    /// most 1 per record; sums are bounded by the per-record cap.
    pub fn sensitivity(&self) -> f64 {
        match self {
            QueryType::Count => 1.0,
            QueryType::Sum => 10.0,
            QueryType::Average => 1.0,
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Sum => write!(f, "sum"),
            Self::Average => write!(f, "average"),
        }
    }
}

/// Statistics derived from a batch of noisy samples.
#[derive(Debug, Clone, Serialize)]
pub struct NoiseSummary {
    pub mean: f64,
    pub variance: f64,
    #[serde(rename = "stdDev")]
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl NoiseSummary {
    pub(crate) fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            variance,
            std_dev: variance.sqrt(),
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// A batch of noisy samples plus derived statistics.
#[derive(Debug, Clone, Serialize)]
pub struct NoiseSeries {
    pub samples: Vec<f64>,
    pub summary: NoiseSummary,
}

/// Draw one noisy observation of `value` under the mechanism selected by
/// `query_type`.
pub(crate) fn sample(value: f64, query_type: QueryType, epsilon: f64, delta: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(Error::Validation(format!(
            "query value must be finite, got {value}"
        )));
    }
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(Error::Computation(format!(
            "epsilon must be > 0 to inject noise, got {epsilon}"
        )));
    }

    let sensitivity = query_type.sensitivity();
    match query_type {
        QueryType::Count | QueryType::Sum => Ok(value + laplace(sensitivity / epsilon)),
        QueryType::Average => {
            if delta <= 0.0 {
                return Err(Error::Computation(
                    "average queries use the Gaussian mechanism, which requires delta > 0".into(),
                ));
            }
            let sigma = sensitivity * (2.0 * (1.25 / delta).ln()).sqrt() / epsilon;
            let normal = Normal::new(0.0, sigma)
                .map_err(|e| Error::Computation(format!("gaussian mechanism: {e}")))?;
            Ok(value + normal.sample(&mut rand::thread_rng()))
        }
    }
}

/// Laplace(0, scale) via inverse CDF over a centered uniform draw.
fn laplace(scale: f64) -> f64 {
    let u: f64 = rand::thread_rng().gen::<f64>() - 0.5;
    let sign = if u >= 0.0 { 1.0 } else { -1.0 };
    let magnitude = (1.0 - 2.0 * u.abs()).max(1e-12);
    -scale * sign * magnitude.ln()
}
