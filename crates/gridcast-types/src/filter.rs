//! Subscriber filter configuration and its load-time validation rules.
//!
//! Evaluation lives in `gridcast-filter`; this module only describes the
//! configured shape of a filter and enforces the constraints that must hold
//! before the server starts. Violations here are configuration errors, never
//! request-time errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ConfigError;

/// Maximum number of advanced filters a single subscriber may carry.
pub const MAX_ADVANCED_FILTERS: usize = 25;

/// Maximum number of entries in an `In`/`NotIn` value list.
pub const MAX_FILTER_VALUES: usize = 5;

/// Maximum length of any scalar string used as a filter operand.
pub const MAX_FILTER_STRING_LEN: usize = 512;

/// Per-subscriber filter configuration.
///
/// An absent filter accepts everything. All three checks (event type,
/// subject bounds, advanced filters) must pass for an event to be delivered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Event types to accept. `None` accepts all; the literal `"All"` acts
    /// as a wildcard entry. Matching is case-sensitive and exact.
    #[serde(default)]
    pub included_event_types: Option<Vec<String>>,

    /// Required subject prefix.
    #[serde(default)]
    pub subject_begins_with: Option<String>,

    /// Required subject suffix.
    #[serde(default)]
    pub subject_ends_with: Option<String>,

    /// Whether the subject prefix/suffix checks are case-sensitive.
    #[serde(default)]
    pub subject_case_sensitive: bool,

    /// Typed per-key predicates, all of which must accept the event.
    #[serde(default)]
    pub advanced_filters: Vec<AdvancedFilter>,
}

/// Comparison operators available to advanced filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    NumberGreaterThan,
    NumberGreaterThanOrEqual,
    NumberLessThan,
    NumberLessThanOrEqual,
    NumberIn,
    NumberNotIn,
    BoolEquals,
    StringContains,
    StringBeginsWith,
    StringEndsWith,
    StringIn,
    StringNotIn,
}

impl FilterOperator {
    /// Whether this operator compares against a list of values rather than
    /// a single scalar.
    pub fn is_multi_value(self) -> bool {
        matches!(
            self,
            Self::NumberIn | Self::NumberNotIn | Self::StringIn | Self::StringNotIn
        )
    }
}

/// A single typed predicate: key + operator + scalar value or value list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedFilter {
    /// Dotted path into the event (`Subject`, `Data.Key1`, ...).
    pub key: String,

    /// The comparison operator.
    pub operator: FilterOperator,

    /// Scalar operand for single-value operators.
    #[serde(default)]
    pub value: Option<Value>,

    /// Operand list for the `In`/`NotIn` operators.
    #[serde(default)]
    pub values: Option<Vec<Value>>,
}

impl FilterConfig {
    /// Validates the whole filter against the load-time rules.
    ///
    /// `owner` is the subscriber name, used only for error context.
    pub fn validate(&self, owner: &str) -> Result<(), ConfigError> {
        if self.advanced_filters.len() > MAX_ADVANCED_FILTERS {
            return Err(ConfigError::InvalidFilter {
                subscriber: owner.to_string(),
                message: format!(
                    "at most {MAX_ADVANCED_FILTERS} advanced filters are allowed, got {}",
                    self.advanced_filters.len()
                ),
            });
        }
        for filter in &self.advanced_filters {
            filter.validate(owner)?;
        }
        Ok(())
    }
}

impl AdvancedFilter {
    /// Validates a single advanced filter against the load-time rules:
    /// non-empty key with at most one `'.'`, exactly one of `value` /
    /// non-empty `values` matching the operator arity, bounded value-list
    /// length, and bounded operand string lengths.
    pub fn validate(&self, owner: &str) -> Result<(), ConfigError> {
        let fail = |message: String| ConfigError::InvalidFilter {
            subscriber: owner.to_string(),
            message,
        };

        if self.key.trim().is_empty() {
            return Err(fail("advanced filter key must not be empty".to_string()));
        }
        if self.key.matches('.').count() > 1 {
            return Err(fail(format!(
                "advanced filter key '{}' may contain at most one '.'",
                self.key
            )));
        }

        let has_value = self.value.is_some();
        let has_values = self.values.as_ref().is_some_and(|v| !v.is_empty());
        if has_value == has_values {
            return Err(fail(format!(
                "advanced filter on '{}' must supply exactly one of 'value' or a non-empty 'values'",
                self.key
            )));
        }

        if self.operator.is_multi_value() {
            let Some(values) = self.values.as_ref().filter(|v| !v.is_empty()) else {
                return Err(fail(format!(
                    "operator {:?} requires a 'values' list",
                    self.operator
                )));
            };
            if values.len() > MAX_FILTER_VALUES {
                return Err(fail(format!(
                    "operator {:?} allows at most {MAX_FILTER_VALUES} values, got {}",
                    self.operator,
                    values.len()
                )));
            }
            for value in values {
                check_scalar_len(value).map_err(fail)?;
            }
        } else {
            let Some(value) = self.value.as_ref() else {
                return Err(fail(format!(
                    "operator {:?} requires a scalar 'value'",
                    self.operator
                )));
            };
            check_scalar_len(value).map_err(fail)?;
        }

        Ok(())
    }
}

fn check_scalar_len(value: &Value) -> Result<(), String> {
    if let Value::String(s) = value {
        if s.len() > MAX_FILTER_STRING_LEN {
            return Err(format!(
                "filter string operands are limited to {MAX_FILTER_STRING_LEN} characters, got {}",
                s.len()
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(key: &str, operator: FilterOperator) -> AdvancedFilter {
        AdvancedFilter {
            key: key.to_string(),
            operator,
            value: Some(json!("x")),
            values: None,
        }
    }

    #[test]
    fn empty_key_is_rejected() {
        let f = filter("", FilterOperator::StringContains);
        assert!(f.validate("sub").is_err());
    }

    #[test]
    fn key_with_two_dots_is_rejected() {
        let f = filter("Data.a.b", FilterOperator::StringContains);
        assert!(f.validate("sub").is_err());
    }

    #[test]
    fn key_with_one_dot_is_accepted() {
        let f = filter("Data.a", FilterOperator::StringContains);
        assert!(f.validate("sub").is_ok());
    }

    #[test]
    fn value_and_values_together_are_rejected() {
        let mut f = filter("Subject", FilterOperator::StringIn);
        f.values = Some(vec![json!("a")]);
        assert!(f.validate("sub").is_err());
    }

    #[test]
    fn neither_value_nor_values_is_rejected() {
        let mut f = filter("Subject", FilterOperator::StringContains);
        f.value = None;
        assert!(f.validate("sub").is_err());
    }

    #[test]
    fn multi_value_operator_requires_values() {
        let f = filter("Subject", FilterOperator::StringIn);
        assert!(f.validate("sub").is_err());
    }

    #[test]
    fn too_many_values_are_rejected() {
        let f = AdvancedFilter {
            key: "Subject".to_string(),
            operator: FilterOperator::StringIn,
            value: None,
            values: Some((0..6).map(|i| json!(i.to_string())).collect()),
        };
        assert!(f.validate("sub").is_err());
    }

    #[test]
    fn long_string_operand_is_rejected() {
        let mut f = filter("Subject", FilterOperator::StringContains);
        f.value = Some(json!("x".repeat(MAX_FILTER_STRING_LEN + 1)));
        assert!(f.validate("sub").is_err());
    }

    #[test]
    fn filter_count_limit_is_enforced() {
        let config = FilterConfig {
            advanced_filters: (0..MAX_ADVANCED_FILTERS + 1)
                .map(|_| filter("Subject", FilterOperator::StringContains))
                .collect(),
            ..Default::default()
        };
        assert!(config.validate("sub").is_err());
    }

    #[test]
    fn default_filter_config_is_valid() {
        assert!(FilterConfig::default().validate("sub").is_ok());
    }
}
