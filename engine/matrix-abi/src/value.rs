use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::error::{MatrixError, MatrixResult};

/// The canonical data model every hash in the crate is computed over.
///
/// Numbers are finite `f64` with negative zero folded to zero, matching the
/// value space of the JSON documents exchanged with other ABI producers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Bool(bool),
    Number(OrderedFloat<f64>),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a number, rejecting NaN and infinities.
    pub fn number(raw: f64) -> MatrixResult<Self> {
        if !raw.is_finite() {
            return Err(MatrixError::validation(format!(
                "non-finite number not allowed: {raw}"
            )));
        }
        // -0.0 == 0.0, so this folds negative zero without touching other values.
        let normalized = if raw == 0.0 { 0.0 } else { raw };
        Ok(Value::Number(OrderedFloat(normalized)))
    }

    /// Build a map from `(key, value)` pairs; later duplicates win.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl TryFrom<&serde_json::Value> for Value {
    type Error = MatrixError;

    fn try_from(json: &serde_json::Value) -> MatrixResult<Self> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Bool(*flag),
            serde_json::Value::Number(number) => {
                let raw = number.as_f64().ok_or_else(|| {
                    MatrixError::validation(format!("unsupported number {number}"))
                })?;
                Value::number(raw)?
            }
            serde_json::Value::String(text) => Value::String(text.clone()),
            serde_json::Value::Array(items) => Value::List(
                items
                    .iter()
                    .map(Value::try_from)
                    .collect::<MatrixResult<Vec<_>>>()?,
            ),
            serde_json::Value::Object(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), Value::try_from(value)?);
                }
                Value::Map(map)
            }
        })
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(flag) => serde_json::Value::Bool(flag),
            Value::Number(number) => {
                let raw = number.into_inner();
                if raw.fract() == 0.0 && raw.abs() < 9_007_199_254_740_992.0 {
                    serde_json::Value::from(raw as i64)
                } else {
                    serde_json::Number::from_f64(raw)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(text) => serde_json::Value::String(text),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}
