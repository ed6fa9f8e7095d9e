//! Response-shape normalization.
//!
//! Backend reads come back as a bare array, an `{ "data": [...] }` envelope, or for
//! card reads a single object. Everything is turned into one `Vec` here so nothing
//! past the client ever sees the ambiguity. Entries without an id are dropped with
//! a warning.

use log::warn;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Flattens a raw response into its entries.
///
/// `allow_single` accepts a bare object (or `{ "data": {...} }`) as a one-entry list.
pub fn into_entries(raw: Value, kind: &str, allow_single: bool) -> Vec<Value> {
    match raw {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => Vec::new(),
            Some(single @ Value::Object(_)) if allow_single => vec![single],
            Some(other) => {
                warn!("Unexpected `data` payload in {} response: {}", kind, other);
                Vec::new()
            }
            None if allow_single => vec![Value::Object(obj)],
            None => {
                warn!("Unexpected {} response: object without `data`", kind);
                Vec::new()
            }
        },
        other => {
            warn!("Unexpected {} response: {}", kind, other);
            Vec::new()
        }
    }
}

/// Decodes entries into `T`, dropping malformed ones.
///
/// Null fields are removed so defaults apply, numeric ids become strings, and
/// `fixup` may patch each entry before decoding.
pub fn decode_entries<T, F>(entries: Vec<Value>, kind: &str, fixup: F) -> Vec<T>
where
    T: DeserializeOwned,
    F: Fn(&mut Map<String, Value>),
{
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let mut obj = match entry {
                Value::Object(obj) => obj,
                other => {
                    warn!("Dropping non-object {} entry #{}: {}", kind, index, other);
                    return None;
                }
            };
            obj.retain(|_, value| !value.is_null());
            coerce_id(&mut obj, "id");
            if !has_id(&obj, "id") {
                warn!("Dropping {} entry #{} without an id", kind, index);
                return None;
            }
            fixup(&mut obj);
            match serde_json::from_value(Value::Object(obj)) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    warn!("Dropping malformed {} entry #{}: {}", kind, index, e);
                    None
                }
            }
        })
        .collect()
}

/// Card-specific fixups: placement defaults to the fetched column and the
/// original `assignments` list stands in for a missing `assigned_to`.
pub fn card_fixup(fetched_column: Option<&str>) -> impl Fn(&mut Map<String, Value>) + '_ {
    move |obj| {
        coerce_id(obj, "column_id");
        if !has_id(obj, "column_id") {
            if let Some(column) = fetched_column {
                obj.insert("column_id".into(), Value::String(column.to_string()));
            }
        }
        if !obj.contains_key("assigned_to") {
            if let Some(Value::Array(assignments)) = obj.get("assignments") {
                let members: Vec<Value> = assignments
                    .iter()
                    .filter_map(|a| a.get("user_id"))
                    .filter_map(id_string)
                    .map(Value::String)
                    .collect();
                obj.insert("assigned_to".into(), Value::Array(members));
            }
        }
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_id(obj: &mut Map<String, Value>, field: &str) {
    match obj.get(field).map(id_string) {
        Some(Some(id)) => {
            obj.insert(field.to_string(), Value::String(id));
        }
        Some(None) => {
            obj.remove(field);
        }
        None => {}
    }
}

fn has_id(obj: &Map<String, Value>, field: &str) -> bool {
    matches!(obj.get(field), Some(Value::String(s)) if !s.is_empty())
}
