//! Entities whose writes go through the mutation pipeline.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::permission::ModelKind;

/// A persisted row the pipeline can check and log.
///
/// The snapshot is the serde view of the row: relations appear as their
/// primary keys and datetimes as RFC 3339 strings.
pub trait Tracked: Serialize + Send + Sync {
    const KIND: ModelKind;

    fn pk(&self) -> i64;

    fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// Fields whose value differs between two snapshots, as `(field, old, new)`.
pub(crate) fn diff(previous: &Value, next: &Value) -> Vec<(String, Value, Value)> {
    let empty = Map::new();
    let previous = previous.as_object().unwrap_or(&empty);
    let next = next.as_object().unwrap_or(&empty);

    let mut changed: Vec<(String, Value, Value)> = next
        .iter()
        .filter(|(field, _)| field.as_str() != "id")
        .filter_map(|(field, value)| {
            let old = previous.get(field).cloned().unwrap_or(Value::Null);
            (old != *value).then(|| (field.clone(), old, value.clone()))
        })
        .collect();
    changed.sort_by(|a, b| a.0.cmp(&b.0));
    changed
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn diff_reports_only_changed_fields() {
        let before = json!({"id": 1, "balance": 10, "is_active": true, "reason": ""});
        let after = json!({"id": 1, "balance": 25, "is_active": true, "reason": "x"});
        let changed = diff(&before, &after);
        assert_eq!(
            changed,
            vec![
                ("balance".to_string(), json!(10), json!(25)),
                ("reason".to_string(), json!(""), json!("x")),
            ]
        );
    }

    #[test]
    fn diff_of_identical_rows_is_empty() {
        let row = json!({"id": 3, "name": "bde"});
        assert!(diff(&row, &row).is_empty());
    }
}
