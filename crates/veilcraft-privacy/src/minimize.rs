//! Role-aware data minimization over arbitrary JSON structures.
//!
//! Fields named in the configured PII set are masked or redacted according
//! to an explicit policy table keyed by anonymization level and caller
//! role. String values elsewhere in the structure are scanned for embedded
//! PII patterns (email, phone, SSN, credit card, IP address) whenever the
//! policy masks for this caller.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use veilcraft_core::{AnonymizationLevel, UserRole};

/// Placeholder written over fully redacted fields.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

// Compiled patterns for embedded PII in free-text values (compiled once,
// reused). Ordered so that more specific patterns claim their text first.
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());
static SSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{4}[-\s]?){3}\d{4}\b").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap()
});
static IP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\b")
        .unwrap()
});

static EMBEDDED_PATTERNS: Lazy<Vec<(&'static str, &'static Regex)>> = Lazy::new(|| {
    vec![
        ("[EMAIL]", &EMAIL_RE),
        ("[SSN]", &SSN_RE),
        ("[CREDIT_CARD]", &CC_RE),
        ("[PHONE]", &PHONE_RE),
        ("[IP_ADDRESS]", &IP_RE),
    ]
});

/// What the policy does to a PII-named field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldAction {
    Keep,
    Mask,
    Redact,
}

/// Policy table for PII-named fields. Privileged roles see originals at
/// the partial level and nothing more: full redaction has no role
/// override.
fn field_action(level: AnonymizationLevel, role: UserRole) -> FieldAction {
    use UserRole::*;
    match (level, role) {
        (AnonymizationLevel::None, _) => FieldAction::Keep,
        (AnonymizationLevel::Partial, Admin | SecurityOfficer) => FieldAction::Keep,
        (AnonymizationLevel::Partial, Operator | Viewer) => FieldAction::Mask,
        (AnonymizationLevel::Full, Admin | SecurityOfficer | Operator | Viewer) => {
            FieldAction::Redact
        }
    }
}

pub(crate) struct MinimizeOutcome {
    pub value: Value,
    pub redactions: u64,
}

/// Produce a minimized copy of `data`. The input is never mutated.
pub(crate) fn minimize(
    data: &Value,
    level: AnonymizationLevel,
    role: UserRole,
    pii_fields: &HashSet<String>,
) -> MinimizeOutcome {
    if level == AnonymizationLevel::None {
        return MinimizeOutcome {
            value: data.clone(),
            redactions: 0,
        };
    }

    let action = field_action(level, role);
    let scrub_text = action != FieldAction::Keep;
    let mut redactions = 0;
    let value = walk(data, action, scrub_text, pii_fields, &mut redactions);
    MinimizeOutcome { value, redactions }
}

fn walk(
    value: &Value,
    action: FieldAction,
    scrub_text: bool,
    pii_fields: &HashSet<String>,
    redactions: &mut u64,
) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                if pii_fields.contains(&key.to_lowercase()) {
                    out.insert(key.clone(), apply_action(val, action, redactions));
                } else {
                    out.insert(key.clone(), walk(val, action, scrub_text, pii_fields, redactions));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| walk(item, action, scrub_text, pii_fields, redactions))
                .collect(),
        ),
        Value::String(text) if scrub_text => match scrub(text) {
            Some(clean) => {
                *redactions += 1;
                Value::String(clean)
            }
            None => value.clone(),
        },
        other => other.clone(),
    }
}

fn apply_action(value: &Value, action: FieldAction, redactions: &mut u64) -> Value {
    match action {
        FieldAction::Keep => value.clone(),
        FieldAction::Mask => {
            *redactions += 1;
            Value::String(mask_value(value))
        }
        FieldAction::Redact => {
            *redactions += 1;
            Value::String(REDACTED_PLACEHOLDER.into())
        }
    }
}

/// Partially obscure a value: strings keep their first and last character,
/// everything else collapses to the mask.
fn mask_value(value: &Value) -> String {
    match value {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            if chars.len() > 2 {
                format!("{}***{}", chars[0], chars[chars.len() - 1])
            } else {
                "***".into()
            }
        }
        _ => "***".into(),
    }
}

/// Replace embedded PII patterns in free text. Returns `None` when the
/// text contains none.
fn scrub(text: &str) -> Option<String> {
    let mut out = text.to_string();
    let mut changed = false;
    for (label, regex) in EMBEDDED_PATTERNS.iter() {
        if regex.is_match(&out) {
            out = regex.replace_all(&out, *label).into_owned();
            changed = true;
        }
    }
    changed.then_some(out)
}
