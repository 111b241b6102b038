//! K-anonymity checking and enforcement over caller-defined records.
//!
//! Records group into equivalence classes by their quasi-identifier values.
//! Enforcement widens those values along a bounded generalization
//! hierarchy (numeric interval buckets, string prefix truncation) until
//! every class reaches the configured k, suppressing records that cannot
//! be grouped even at maximum generalization.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};
use veilcraft_core::{Error, Result};

/// Deepest generalization step. Depth 3 collapses strings entirely, so the
/// widening loop always terminates.
pub const MAX_GENERALIZATION_DEPTH: u8 = 3;

/// Memo key for a generalized quasi-identifier value: (field, raw, depth).
pub(crate) type MemoKey = (String, String, u8);

/// Records sharing identical generalized quasi-identifier values.
#[derive(Debug, Clone, Serialize)]
pub struct EquivalenceClass {
    pub key: String,
    pub size: usize,
    #[serde(rename = "recordIndices")]
    pub record_indices: Vec<usize>,
}

/// Outcome of a k-anonymity check. Derived, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct KAnonymityReport {
    #[serde(rename = "isKAnonymous")]
    pub is_k_anonymous: bool,
    #[serde(rename = "violatingClasses")]
    pub violating_classes: Vec<EquivalenceClass>,
    #[serde(rename = "minClassSize")]
    pub min_class_size: usize,
}

/// Result of enforcement: the generalized dataset plus diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct KAnonymityOutcome {
    #[serde(rename = "data")]
    pub records: Vec<Value>,
    pub suppressed: usize,
    #[serde(rename = "generalizationDepth")]
    pub generalization_depth: u8,
    pub report: KAnonymityReport,
}

fn require_objects(dataset: &[Value]) -> Result<()> {
    for (index, record) in dataset.iter().enumerate() {
        if !record.is_object() {
            return Err(Error::Validation(format!(
                "record {index} is not an object"
            )));
        }
    }
    Ok(())
}

/// Canonical string form of a quasi-identifier value for grouping.
fn canonical(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".into(),
        other => other.to_string(),
    }
}

fn class_key(record: &Map<String, Value>, quasi_identifiers: &[String]) -> String {
    quasi_identifiers
        .iter()
        .map(|field| record.get(field).map(canonical).unwrap_or_else(|| "null".into()))
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

fn group(dataset: &[Value], quasi_identifiers: &[String]) -> HashMap<String, Vec<usize>> {
    let mut classes: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, record) in dataset.iter().enumerate() {
        // Validated upstream; a non-object here is unreachable.
        if let Value::Object(map) = record {
            classes
                .entry(class_key(map, quasi_identifiers))
                .or_default()
                .push(index);
        }
    }
    classes
}

/// Check k-anonymity without mutating the dataset.
///
/// An empty dataset is trivially anonymous, `k <= 1` is always satisfied,
/// and an empty quasi-identifier list makes the whole dataset one class.
pub(crate) fn check(
    dataset: &[Value],
    quasi_identifiers: &[String],
    k: usize,
) -> Result<KAnonymityReport> {
    require_objects(dataset)?;
    if dataset.is_empty() {
        return Ok(KAnonymityReport {
            is_k_anonymous: true,
            violating_classes: Vec::new(),
            min_class_size: 0,
        });
    }

    let classes = group(dataset, quasi_identifiers);
    let min_class_size = classes.values().map(Vec::len).min().unwrap_or(0);

    let mut violating_classes: Vec<EquivalenceClass> = classes
        .into_iter()
        .filter(|(_, indices)| indices.len() < k)
        .map(|(key, record_indices)| EquivalenceClass {
            key,
            size: record_indices.len(),
            record_indices,
        })
        .collect();
    violating_classes.sort_by_key(|class| class.record_indices[0]);

    Ok(KAnonymityReport {
        is_k_anonymous: violating_classes.is_empty(),
        violating_classes,
        min_class_size,
    })
}

/// Generalize one quasi-identifier value to the given depth.
///
/// Numbers widen into half-open `10^depth` buckets rendered `"lo-hi"`;
/// strings truncate to a 3-char, then 1-char prefix, then `"*"`; other
/// values keep their canonical form until the final collapse.
pub(crate) fn generalize_value(value: &Value, depth: u8) -> Value {
    if depth == 0 {
        return value.clone();
    }
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() => {
                let width = 10f64.powi(depth as i32);
                let lo = (f / width).floor() * width;
                Value::String(format!("{}-{}", format_bound(lo), format_bound(lo + width)))
            }
            _ => Value::String("*".into()),
        },
        Value::String(s) => {
            let keep = match depth {
                1 => 3,
                2 => 1,
                _ => 0,
            };
            let chars: Vec<char> = s.chars().collect();
            if keep == 0 || chars.is_empty() {
                Value::String("*".into())
            } else if chars.len() <= keep {
                value.clone()
            } else {
                let prefix: String = chars[..keep].iter().collect();
                Value::String(format!("{prefix}*"))
            }
        }
        other => {
            if depth >= MAX_GENERALIZATION_DEPTH {
                Value::String("*".into())
            } else {
                Value::String(canonical(other))
            }
        }
    }
}

fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 && bound.abs() < 1e15 {
        format!("{}", bound as i64)
    } else {
        format!("{bound}")
    }
}

fn generalize_record(
    record: &Value,
    quasi_identifiers: &[String],
    depth: u8,
    memo: &mut HashMap<MemoKey, String>,
) -> Value {
    let Value::Object(map) = record else {
        return record.clone();
    };
    let mut out = map.clone();
    for field in quasi_identifiers {
        if let Some(raw) = map.get(field) {
            let memo_key = (field.clone(), canonical(raw), depth);
            let generalized = match memo.get(&memo_key) {
                Some(cached) => Value::String(cached.clone()),
                None => {
                    let generalized = generalize_value(raw, depth);
                    if let Value::String(s) = &generalized {
                        memo.insert(memo_key, s.clone());
                    }
                    generalized
                }
            };
            out.insert(field.clone(), generalized);
        }
    }
    Value::Object(out)
}

/// Enforce k-anonymity by iterative generalization, depth 0 through
/// [`MAX_GENERALIZATION_DEPTH`]. Classes still below k at maximum depth
/// are suppressed. The surviving records always check anonymous.
pub(crate) fn enforce(
    dataset: &[Value],
    quasi_identifiers: &[String],
    k: usize,
    memo: &mut HashMap<MemoKey, String>,
) -> Result<KAnonymityOutcome> {
    require_objects(dataset)?;

    let mut records = dataset.to_vec();
    let mut depth: u8 = 0;
    loop {
        let report = check(&records, quasi_identifiers, k)?;
        if report.is_k_anonymous {
            return Ok(KAnonymityOutcome {
                records,
                suppressed: 0,
                generalization_depth: depth,
                report,
            });
        }

        if depth == MAX_GENERALIZATION_DEPTH {
            let violating: HashSet<usize> = report
                .violating_classes
                .iter()
                .flat_map(|class| class.record_indices.iter().copied())
                .collect();
            let survivors: Vec<Value> = records
                .iter()
                .enumerate()
                .filter(|(index, _)| !violating.contains(index))
                .map(|(_, record)| record.clone())
                .collect();
            let report = check(&survivors, quasi_identifiers, k)?;
            return Ok(KAnonymityOutcome {
                records: survivors,
                suppressed: violating.len(),
                generalization_depth: depth,
                report,
            });
        }

        depth += 1;
        // Always widen from the raw values so buckets stay aligned.
        records = dataset
            .iter()
            .map(|record| generalize_record(record, quasi_identifiers, depth, memo))
            .collect();
    }
}
