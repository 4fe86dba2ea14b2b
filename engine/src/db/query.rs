//! Store queries
//!
//! A query selects entities of one kind, optionally restricted to the
//! descendants of an ancestor key and to records whose top-level body
//! fields satisfy simple comparisons.

use regex::Regex;
use sdk::errors::StoreError;
use sdk::key::Key;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::OnceLock;

static FIELD_PATTERN: OnceLock<Regex> = OnceLock::new();

fn field_pattern() -> &'static Regex {
    FIELD_PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("Invalid field pattern"))
}

/// Comparison operator of a field filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
}

impl FilterOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Gt => ">",
        }
    }
}

/// Filter on a top-level body field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// True if `body` satisfies this filter
    ///
    /// Numbers compare numerically, strings lexically; a missing field or
    /// mismatched types never match.
    pub fn matches(&self, body: &Value) -> bool {
        let Some(actual) = body.get(&self.field) else {
            return false;
        };

        let ordering = match (actual, &self.value) {
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        };

        match (self.op, ordering) {
            (FilterOp::Eq, Some(Ordering::Equal)) => true,
            (FilterOp::Gt, Some(Ordering::Greater)) => true,
            _ => false,
        }
    }
}

/// Query over entities of one kind
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub kind: String,
    pub ancestor: Option<Key>,
    pub filters: Vec<Filter>,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ancestor: None,
            filters: Vec::new(),
        }
    }

    /// Restrict to the ancestor itself and all of its descendants
    pub fn ancestor(mut self, key: &Key) -> Self {
        self.ancestor = Some(key.clone());
        self
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn filter_gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::Gt,
            value: value.into(),
        });
        self
    }

    /// Reject field names that are not plain snake_case identifiers
    pub fn validate(&self) -> Result<(), StoreError> {
        for filter in &self.filters {
            if !field_pattern().is_match(&filter.field) {
                return Err(StoreError::InvalidQuery(format!(
                    "unsupported filter field '{}'",
                    filter.field
                )));
            }
            if matches!(filter.value, Value::Array(_) | Value::Object(_)) {
                return Err(StoreError::InvalidQuery(format!(
                    "filter on '{}' must compare a scalar",
                    filter.field
                )));
            }
        }
        Ok(())
    }

    /// True if an entity with `key` and `body` is selected by this query
    pub fn matches(&self, key: &Key, body: &Value) -> bool {
        if key.kind() != self.kind {
            return false;
        }
        if let Some(ancestor) = &self.ancestor {
            if !key.has_ancestor(ancestor) {
                return false;
            }
        }
        self.filters.iter().all(|f| f.matches(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ancestor_and_filter_match() {
        let meeting = Key::new("Meeting", "1", None).unwrap();
        let item = Key::new("AgendaItem", "5", Some(&meeting)).unwrap();
        let direct = Key::new("Attachment", "a", Some(&meeting)).unwrap();
        let nested = Key::new("Attachment", "b", Some(&item)).unwrap();

        let query = Query::new("Attachment")
            .ancestor(&meeting)
            .filter_eq("agenda_item_id", 0);

        assert!(query.matches(&direct, &json!({"agenda_item_id": 0})));
        assert!(!query.matches(&nested, &json!({"agenda_item_id": 5})));
        assert!(!query.matches(&item, &json!({"agenda_item_id": 0})));
    }

    #[test]
    fn test_gt_filter_numeric() {
        let filter = Filter {
            field: "start".to_string(),
            op: FilterOp::Gt,
            value: json!(100),
        };

        assert!(filter.matches(&json!({"start": 101})));
        assert!(!filter.matches(&json!({"start": 100})));
        assert!(!filter.matches(&json!({"start": "101"})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn test_validate_rejects_path_like_fields() {
        let query = Query::new("AgendaItem").filter_eq("votes.approve", 1);
        assert!(query.validate().is_err());

        let query = Query::new("AgendaItem").filter_eq("proposal_id", 12);
        assert!(query.validate().is_ok());
    }
}
