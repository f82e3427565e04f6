//! Helpers for working with JSON array responses.

use serde_json::{Map, Value};

/// First element whose `field` equals `value`.
pub fn find_by_field<'a>(items: &'a [Value], field: &str, value: &Value) -> Option<&'a Value> {
    items.iter().find(|item| item.get(field) == Some(value))
}

/// Whether `item` satisfies every entry of `filter`.
///
/// A dotted key such as `owner.name` walks nested objects. When the item's
/// field is an array, the filter value has to be one of its elements;
/// otherwise the values must be equal. Missing fields never match.
pub fn matches_filter(item: &Value, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, expected)| {
        match lookup_path(item, key) {
            Some(Value::Array(values)) if !expected.is_array() => values.contains(expected),
            Some(actual) => actual == expected,
            None => false,
        }
    })
}

fn lookup_path<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(item, |current, segment| current.get(segment))
}

/// Copy of `items` where every element whose `field` equals the
/// replacement's `field` is swapped for `replacement`.
pub fn replace_by_field(items: &[Value], replacement: &Value, field: &str) -> Vec<Value> {
    let id = replacement.get(field);
    items
        .iter()
        .map(|item| {
            if id.is_some() && item.get(field) == id {
                replacement.clone()
            } else {
                item.clone()
            }
        })
        .collect()
}

/// Rows of selected columns, ready for tabular display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Project the objects in `items` onto `keys`.
///
/// The column named `id_key` is renamed `_id`. Missing and null fields
/// become `Value::Null`. Elements that are not objects, or that fail
/// `filter`, are skipped.
pub fn project_rows(
    items: &[Value],
    keys: &[&str],
    id_key: &str,
    filter: Option<&Map<String, Value>>,
) -> Table {
    let columns = keys
        .iter()
        .map(|key| {
            if key.eq_ignore_ascii_case(id_key) {
                "_id".to_string()
            } else {
                key.to_string()
            }
        })
        .collect();

    let rows = items
        .iter()
        .filter(|item| item.is_object())
        .filter(|item| filter.is_none_or(|f| matches_filter(item, f)))
        .map(|item| {
            keys.iter()
                .map(|key| item.get(*key).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Table { columns, rows }
}
