//! The subscriber filter evaluation engine.
//!
//! A filter accepts an event when three independent checks all pass: the
//! event-type list, the subject prefix/suffix bounds, and every advanced
//! filter. Evaluation is deliberately fail-closed: any key that does not
//! resolve and any operand that does not convert to the operator's type
//! rejects the event rather than raising an error. Partial evaluation is
//! never trusted: a single bad entry in an `In`/`NotIn` list rejects both
//! the membership and the non-membership form.
//!
//! Configuration-time rules (key shape, operand arity, list lengths) live in
//! `gridcast-types`; by the time a filter reaches this engine it has already
//! passed load-time validation.

use gridcast_events::EventFields;
use gridcast_types::{AdvancedFilter, FilterConfig, FilterOperator};
use serde_json::Value;

/// Evaluates a subscriber filter against an event. An absent filter accepts
/// everything.
pub fn accepts(filter: Option<&FilterConfig>, event: &dyn EventFields) -> bool {
    let Some(filter) = filter else { return true };

    event_type_matches(filter, event)
        && subject_matches(filter, event)
        && filter
            .advanced_filters
            .iter()
            .all(|advanced| advanced_accepts(advanced, event))
}

/// True when the type list is unset, contains the `"All"` wildcard, or
/// contains the event's exact type. Matching is case-sensitive; no other
/// wildcarding is applied.
fn event_type_matches(filter: &FilterConfig, event: &dyn EventFields) -> bool {
    match &filter.included_event_types {
        None => true,
        Some(types) => types
            .iter()
            .any(|t| t == "All" || t == event.event_type()),
    }
}

fn subject_matches(filter: &FilterConfig, event: &dyn EventFields) -> bool {
    let subject = event.subject().unwrap_or_default();

    if let Some(prefix) = &filter.subject_begins_with {
        let ok = if filter.subject_case_sensitive {
            subject.starts_with(prefix.as_str())
        } else {
            subject.to_uppercase().starts_with(&prefix.to_uppercase())
        };
        if !ok {
            return false;
        }
    }

    if let Some(suffix) = &filter.subject_ends_with {
        let ok = if filter.subject_case_sensitive {
            subject.ends_with(suffix.as_str())
        } else {
            subject.to_uppercase().ends_with(&suffix.to_uppercase())
        };
        if !ok {
            return false;
        }
    }

    true
}

/// Evaluates one advanced filter. An unresolvable key rejects.
fn advanced_accepts(filter: &AdvancedFilter, event: &dyn EventFields) -> bool {
    let Some(resolved) = event.lookup(&filter.key) else {
        return false;
    };

    let value = filter.value.as_ref();
    let values = filter.values.as_deref();

    match filter.operator {
        FilterOperator::NumberGreaterThan => number_compare(&resolved, value, |l, r| l > r),
        FilterOperator::NumberGreaterThanOrEqual => number_compare(&resolved, value, |l, r| l >= r),
        FilterOperator::NumberLessThan => number_compare(&resolved, value, |l, r| l < r),
        FilterOperator::NumberLessThanOrEqual => number_compare(&resolved, value, |l, r| l <= r),
        FilterOperator::NumberIn => number_membership(&resolved, values, true),
        FilterOperator::NumberNotIn => number_membership(&resolved, values, false),
        FilterOperator::BoolEquals => bool_equals(&resolved, value),
        FilterOperator::StringContains => {
            string_compare(&resolved, value, |l, r| l.contains(r))
        }
        FilterOperator::StringBeginsWith => {
            string_compare(&resolved, value, |l, r| l.starts_with(r))
        }
        FilterOperator::StringEndsWith => {
            string_compare(&resolved, value, |l, r| l.ends_with(r))
        }
        FilterOperator::StringIn => string_membership(&resolved, values, true),
        FilterOperator::StringNotIn => string_membership(&resolved, values, false),
    }
}

fn number_compare(resolved: &Value, operand: Option<&Value>, cmp: fn(f64, f64) -> bool) -> bool {
    match (as_f64(resolved), operand.and_then(as_f64)) {
        (Some(left), Some(right)) => cmp(left, right),
        _ => false,
    }
}

/// Membership test over a numeric list. If the resolved value or ANY list
/// entry fails numeric conversion the evaluation fails closed: both the
/// `In` and the `NotIn` form reject.
fn number_membership(resolved: &Value, values: Option<&[Value]>, want_member: bool) -> bool {
    let Some(left) = as_f64(resolved) else {
        return false;
    };

    let entries = values.unwrap_or_default();
    let mut converted = Vec::with_capacity(entries.len());
    for entry in entries {
        match as_f64(entry) {
            Some(number) => converted.push(number),
            None => return false,
        }
    }

    let member = converted.iter().any(|number| *number == left);
    member == want_member
}

fn bool_equals(resolved: &Value, operand: Option<&Value>) -> bool {
    match (as_bool(resolved), operand.and_then(as_bool)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

/// Case-insensitive string comparison. An empty or unconvertible operand on
/// either side can never match, so a filter value of `""` always rejects,
/// even against an empty subject.
fn string_compare(resolved: &Value, operand: Option<&Value>, test: fn(&str, &str) -> bool) -> bool {
    let Some(left) = as_string(resolved) else {
        return false;
    };
    let Some(right) = operand.and_then(as_string) else {
        return false;
    };
    if right.is_empty() {
        return false;
    }
    test(&left.to_uppercase(), &right.to_uppercase())
}

/// Case-insensitive set membership. A missing or empty list behaves as the
/// empty set: `In` always rejects and `NotIn` always accepts. An
/// unconvertible resolved value rejects both forms.
fn string_membership(resolved: &Value, values: Option<&[Value]>, want_member: bool) -> bool {
    let Some(left) = as_string(resolved) else {
        return false;
    };
    let left = left.to_uppercase();

    let member = values
        .unwrap_or_default()
        .iter()
        .filter_map(as_string)
        .any(|entry| entry.to_uppercase() == left);
    member == want_member
}

/// Numeric coercion: numbers as-is, numeric strings parsed, booleans as 0/1.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Boolean coercion: booleans as-is, `"true"`/`"false"` strings (any case),
/// numbers as zero/non-zero.
fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

/// String coercion for scalars; objects, arrays, and null never convert.
fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
