use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::{MatrixError, MatrixResult};

/// Storage collaborator the interpreter performs effects through.
///
/// Implementations are owned by the caller and injected per run.
pub trait EffectHandler {
    /// Record whose `id` equals `key`, if any.
    fn get(&mut self, store: &str, key: &JsonValue) -> MatrixResult<Option<JsonValue>>;

    /// Store `value` and return the record as stored.
    fn put(&mut self, store: &str, value: &JsonValue) -> MatrixResult<JsonValue>;

    /// Rows matching `spec`, in store order.
    fn query(&mut self, store: &str, spec: &JsonValue) -> MatrixResult<Vec<JsonValue>>;
}

/// One write observed by [`MemoryStore`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WriteRecord {
    pub op: String,
    pub store: String,
    pub value: JsonValue,
}

type Row = Map<String, JsonValue>;

/// Deterministic in-memory store with a write trace.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    stores: BTreeMap<String, Vec<Row>>,
    writes: Vec<WriteRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from `{store: [row, ...]}`. Stores whose value is not a list start empty.
    pub fn from_seed(seed: &JsonValue) -> MatrixResult<Self> {
        let mut memory = Self::new();
        let Some(entries) = seed.as_object() else {
            if seed.is_null() {
                return Ok(memory);
            }
            return Err(MatrixError::validation("store seed must be an object"));
        };
        for (store, rows) in entries {
            let rows = match rows.as_array() {
                Some(rows) => rows
                    .iter()
                    .map(|row| {
                        row.as_object().cloned().ok_or_else(|| {
                            MatrixError::validation(format!("seed rows of '{store}' must be objects"))
                        })
                    })
                    .collect::<MatrixResult<Vec<_>>>()?,
                None => Vec::new(),
            };
            memory.stores.insert(store.clone(), rows);
        }
        Ok(memory)
    }

    pub fn writes(&self) -> &[WriteRecord] {
        &self.writes
    }

    pub fn rows(&self, store: &str) -> &[Row] {
        self.stores.get(store).map(Vec::as_slice).unwrap_or(&[])
    }

    fn ensure(&mut self, store: &str) -> &mut Vec<Row> {
        self.stores.entry(store.to_string()).or_default()
    }
}

impl EffectHandler for MemoryStore {
    fn get(&mut self, store: &str, key: &JsonValue) -> MatrixResult<Option<JsonValue>> {
        Ok(self
            .ensure(store)
            .iter()
            .find(|row| row.get("id") == Some(key))
            .map(|row| JsonValue::Object(row.clone())))
    }

    fn put(&mut self, store: &str, value: &JsonValue) -> MatrixResult<JsonValue> {
        let mut record = value
            .as_object()
            .cloned()
            .ok_or_else(|| MatrixError::validation("idb.put value must be an object"))?;
        let rows = self.ensure(store);
        if record.get("id").map_or(true, is_falsy) {
            record.insert("id".to_string(), JsonValue::String((rows.len() + 1).to_string()));
        }
        rows.push(record.clone());
        let stored = JsonValue::Object(record);
        self.writes.push(WriteRecord {
            op: "idb.put".to_string(),
            store: store.to_string(),
            value: stored.clone(),
        });
        Ok(stored)
    }

    fn query(&mut self, store: &str, spec: &JsonValue) -> MatrixResult<Vec<JsonValue>> {
        let fields = projection(spec)?;
        let rows = self.ensure(store);
        let limit = row_limit(spec, rows.len())?;
        Ok(rows
            .iter()
            .take(limit)
            .map(|row| match &fields {
                Some(fields) => JsonValue::Object(
                    fields
                        .iter()
                        .filter_map(|field| row.get(*field).map(|v| (field.to_string(), v.clone())))
                        .collect(),
                ),
                None => JsonValue::Object(row.clone()),
            })
            .collect())
    }
}

fn is_falsy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::Bool(flag) => !flag,
        JsonValue::Number(number) => number.as_f64() == Some(0.0),
        JsonValue::String(text) => text.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => false,
    }
}

/// `SELECT.fields`; an absent or empty list selects whole rows.
fn projection(spec: &JsonValue) -> MatrixResult<Option<Vec<&str>>> {
    let Some(fields) = spec.pointer("/SELECT/fields").filter(|f| !f.is_null()) else {
        return Ok(None);
    };
    let fields = fields
        .as_array()
        .ok_or_else(|| MatrixError::validation("SELECT.fields must be an array"))?
        .iter()
        .map(|field| {
            field
                .as_str()
                .ok_or_else(|| MatrixError::validation("SELECT.fields entries must be strings"))
        })
        .collect::<MatrixResult<Vec<_>>>()?;
    Ok((!fields.is_empty()).then_some(fields))
}

fn row_limit(spec: &JsonValue, available: usize) -> MatrixResult<usize> {
    match spec.get("LIMIT") {
        None | Some(JsonValue::Null) => Ok(available),
        Some(limit) => limit
            .as_f64()
            .filter(|limit| *limit >= 0.0)
            .map(|limit| limit as usize)
            .ok_or_else(|| MatrixError::validation("LIMIT must be a non-negative number")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EffectHandler, MemoryStore};

    #[test]
    fn get_finds_seeded_rows_by_id() {
        let mut store =
            MemoryStore::from_seed(&json!({"users": [{"id": "1", "name": "ada"}]})).expect("seed");
        assert_eq!(
            store.get("users", &json!("1")).expect("get"),
            Some(json!({"id": "1", "name": "ada"}))
        );
        assert_eq!(store.get("users", &json!("2")).expect("get"), None);
        assert_eq!(store.get("missing", &json!("1")).expect("get"), None);
    }

    #[test]
    fn put_assigns_ids_and_records_writes() {
        let mut store = MemoryStore::from_seed(&json!({"users": [{"id": "1"}]})).expect("seed");
        let stored = store.put("users", &json!({"name": "bob"})).expect("put");
        assert_eq!(stored, json!({"id": "2", "name": "bob"}));
        let kept = store.put("users", &json!({"id": "x9"})).expect("put");
        assert_eq!(kept, json!({"id": "x9"}));
        assert_eq!(store.rows("users").len(), 3);
        assert_eq!(store.writes().len(), 2);
        assert_eq!(store.writes()[0].op, "idb.put");
        assert!(store.put("users", &json!([1])).is_err());
    }

    #[test]
    fn query_projects_and_limits() {
        let mut store = MemoryStore::from_seed(&json!({"items": [
            {"id": "1", "a": 1, "b": 2},
            {"id": "2", "b": 3},
            {"id": "3", "a": 4}
        ]}))
        .expect("seed");
        let rows = store
            .query("items", &json!({"SELECT": {"fields": ["a"]}, "LIMIT": 2}))
            .expect("query");
        assert_eq!(rows, vec![json!({"a": 1}), json!({})]);

        let all = store.query("items", &json!({})).expect("query");
        assert_eq!(all.len(), 3);
        assert!(store.query("items", &json!({"LIMIT": -1})).is_err());
    }
}
