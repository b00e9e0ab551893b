//! Blocking: cheap row-pair filtering before any similarity is computed.

use tracing::trace;

use crate::model::{Dataset, Record, Schema, SkippedField, Value};
use crate::ruleset::{CompatibilityRule, MissingPolicy, RuleKind};

/// True iff the pair satisfies every enabled rule.
pub fn is_compatible(row_a: &Record, row_b: &Record, rules: &[CompatibilityRule]) -> bool {
    rules
        .iter()
        .filter(|r| r.enabled)
        .all(|rule| rule_allows(row_a, row_b, rule))
}

/// Indices of the rows of `dataset_b` compatible with `row_a`, ascending.
pub fn compatible_rows(
    row_a: &Record,
    dataset_b: &Dataset,
    rules: &[CompatibilityRule],
) -> Vec<usize> {
    dataset_b
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row_b)| is_compatible(row_a, row_b, rules))
        .map(|(i, _)| i)
        .collect()
}

/// Enabled rule fields that one of the schemas lacks. Those fields are
/// ignored by [`is_compatible`]; this lists them so callers can report it.
pub fn unresolved_fields(
    rules: &[CompatibilityRule],
    left: &Schema,
    right: &Schema,
) -> Vec<SkippedField> {
    rules
        .iter()
        .filter(|r| r.enabled)
        .flat_map(|rule| {
            rule.fields
                .iter()
                .filter(move |f| !left.contains(f) || !right.contains(f))
                .map(move |f| SkippedField {
                    variable: rule.variable.clone(),
                    field: f.clone(),
                })
        })
        .collect()
}

fn rule_allows(row_a: &Record, row_b: &Record, rule: &CompatibilityRule) -> bool {
    for field in &rule.fields {
        let (Some(a), Some(b)) = (row_a.get(field), row_b.get(field)) else {
            continue;
        };
        if !field_allows(a, b, rule) {
            trace!(variable = %rule.variable, field = %field, "blocked");
            return false;
        }
    }
    true
}

fn field_allows(a: &Value, b: &Value, rule: &CompatibilityRule) -> bool {
    if a.is_missing() || b.is_missing() {
        return rule.missing == MissingPolicy::Allow;
    }
    match &rule.kind {
        RuleKind::Range { tolerance } => match (a.as_integer(), b.as_integer()) {
            (Some(x), Some(y)) => x.abs_diff(y) <= tolerance.unsigned_abs(),
            _ => false,
        },
        RuleKind::Categorical { equivalences } => match (a.key(), b.key()) {
            (Some(x), Some(y)) => x == y || equivalences.contains(&x, &y),
            _ => false,
        },
    }
}
