//! Policy documents and the options that configure expression compilation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::canonical::sort_utf16;
use crate::error::{MatrixError, MatrixResult};
use crate::hash::{canonical_digest, namespaced_digest};

pub const POLICY_VERSION: u32 = 1;
pub const MAX_DEPTH_LIMIT: u32 = 4096;
pub const DEFAULT_PROGRAM_MAX_DEPTH: u32 = 64;
pub const DEFAULT_EXPRESSION_MAX_DEPTH: u32 = 32;

/// Normalized MATRIX policy.
///
/// Field names and order mirror the wire document so the policy hash is
/// identical to the one computed by other producers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub matrix_policy_version: u32,
    pub max_depth: u32,
    pub allow_network: bool,
    pub allow_exec: bool,
    pub allow_fs_read: bool,
    pub allow_fs_write: bool,
    /// Storage capability (`idb.*` blocks).
    #[serde(rename = "allow_idb")]
    pub allow_storage: bool,
    pub allow_crypto: bool,
    pub allowed_routes: Vec<String>,
    pub allowed_plugins: Vec<String>,
    pub field_allowlist: Vec<String>,
    pub param_allowlist: Vec<String>,
}

impl Policy {
    /// Validate a raw policy document and bring it into canonical shape.
    pub fn normalize(raw: &JsonValue) -> MatrixResult<Self> {
        let doc = raw
            .as_object()
            .ok_or_else(|| MatrixError::validation("policy must be an object"))?;

        let version = doc.get("matrix_policy_version").and_then(JsonValue::as_f64);
        if version != Some(f64::from(POLICY_VERSION)) {
            return Err(MatrixError::validation(
                "policy must be matrix_policy_version=1",
            ));
        }

        Ok(Policy {
            matrix_policy_version: POLICY_VERSION,
            max_depth: read_depth(doc.get("max_depth"), DEFAULT_PROGRAM_MAX_DEPTH, "max_depth")?,
            allow_network: read_flag(doc, "allow_network")?,
            allow_exec: read_flag(doc, "allow_exec")?,
            allow_fs_read: read_flag(doc, "allow_fs_read")?,
            allow_fs_write: read_flag(doc, "allow_fs_write")?,
            allow_storage: read_flag(doc, "allow_idb")?,
            allow_crypto: read_flag(doc, "allow_crypto")?,
            allowed_routes: read_list(doc, "allowed_routes")?,
            allowed_plugins: read_list(doc, "allowed_plugins")?,
            field_allowlist: read_list(doc, "field_allowlist")?,
            param_allowlist: read_list(doc, "param_allowlist")?,
        })
    }

    /// `H({policy: self})`
    pub fn digest(&self) -> MatrixResult<String> {
        namespaced_digest("policy", self)
    }

    pub fn allows_route(&self, op: &str) -> bool {
        self.allowed_routes.iter().any(|route| route == op)
    }
}

fn read_flag(doc: &Map<String, JsonValue>, key: &str) -> MatrixResult<bool> {
    match doc.get(key) {
        None | Some(JsonValue::Null) => Ok(false),
        Some(JsonValue::Bool(flag)) => Ok(*flag),
        Some(other) => Err(MatrixError::validation(format!(
            "policy.{key} must be a boolean, found {other}"
        ))),
    }
}

fn read_list(doc: &Map<String, JsonValue>, key: &str) -> MatrixResult<Vec<String>> {
    let items = match doc.get(key) {
        None | Some(JsonValue::Null) => return Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items,
        Some(other) => {
            return Err(MatrixError::validation(format!(
                "policy.{key} must be an array of strings, found {other}"
            )))
        }
    };
    let mut out = items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                MatrixError::validation(format!("policy.{key} entries must be strings"))
            })
        })
        .collect::<MatrixResult<Vec<_>>>()?;
    sort_utf16(&mut out);
    Ok(out)
}

fn read_depth(raw: Option<&JsonValue>, default: u32, label: &str) -> MatrixResult<u32> {
    let depth = match raw {
        None | Some(JsonValue::Null) => return Ok(default),
        Some(value) => value.as_f64(),
    };
    match depth {
        Some(depth) if depth.fract() == 0.0 && (1.0..=f64::from(MAX_DEPTH_LIMIT)).contains(&depth) => {
            Ok(depth as u32)
        }
        _ => Err(MatrixError::validation(format!(
            "policy.{label} out of bounds (1..={MAX_DEPTH_LIMIT})"
        ))),
    }
}

fn check_depth(depth: u32) -> MatrixResult<u32> {
    if (1..=MAX_DEPTH_LIMIT).contains(&depth) {
        Ok(depth)
    } else {
        Err(MatrixError::validation(format!(
            "maxDepth {depth} out of bounds (1..={MAX_DEPTH_LIMIT})"
        )))
    }
}

/// Caller configuration for [`crate::expr::compile`].
///
/// Accepts both the camelCase keys used in golden files and snake_case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    #[serde(alias = "max_depth")]
    pub max_depth: u32,
    pub fields: Vec<String>,
    pub params: Vec<String>,
    #[serde(alias = "include_abi", skip_serializing)]
    pub include_abi: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_EXPRESSION_MAX_DEPTH,
            fields: Vec::new(),
            params: Vec::new(),
            include_abi: true,
        }
    }
}

impl CompileOptions {
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn without_abi(mut self) -> Self {
        self.include_abi = false;
        self
    }

    pub fn normalize(&self) -> MatrixResult<ExpressionPolicy> {
        ExpressionPolicy::new(self.max_depth, self.fields.clone(), self.params.clone())
    }
}

/// Normalized restrictions the expression compiler enforces and hashes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionPolicy {
    pub max_depth: u32,
    pub fields: Vec<String>,
    pub params: Vec<String>,
}

impl ExpressionPolicy {
    pub fn new(max_depth: u32, mut fields: Vec<String>, mut params: Vec<String>) -> MatrixResult<Self> {
        sort_utf16(&mut fields);
        sort_utf16(&mut params);
        Ok(Self {
            max_depth: check_depth(max_depth)?,
            fields,
            params,
        })
    }

    pub fn allows_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field == name)
    }

    pub fn allows_param(&self, name: &str) -> bool {
        self.params.iter().any(|param| param == name)
    }

    /// `H({maxDepth, fields, params})`, not namespaced.
    pub fn digest(&self) -> MatrixResult<String> {
        canonical_digest(self)
    }
}

impl From<&Policy> for ExpressionPolicy {
    fn from(policy: &Policy) -> Self {
        // A normalized policy already holds a bounded depth and sorted lists.
        Self {
            max_depth: policy.max_depth,
            fields: policy.field_allowlist.clone(),
            params: policy.param_allowlist.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CompileOptions, ExpressionPolicy, Policy};

    #[test]
    fn normalize_fills_defaults_and_sorts() {
        let policy = Policy::normalize(&json!({
            "matrix_policy_version": 1,
            "allow_idb": true,
            "allowed_routes": ["idb.put", "idb.get", "event.reply"]
        }))
        .expect("normalize");
        assert_eq!(policy.max_depth, 64);
        assert!(policy.allow_storage);
        assert!(!policy.allow_network);
        assert_eq!(
            policy.allowed_routes,
            vec!["event.reply", "idb.get", "idb.put"]
        );
        assert!(policy.field_allowlist.is_empty());
    }

    #[test]
    fn normalize_rejects_bad_documents() {
        let cases = [
            json!(null),
            json!({"matrix_policy_version": 2}),
            json!({"matrix_policy_version": 1, "max_depth": 0}),
            json!({"matrix_policy_version": 1, "max_depth": 4097}),
            json!({"matrix_policy_version": 1, "max_depth": 2.5}),
            json!({"matrix_policy_version": 1, "allow_idb": "yes"}),
            json!({"matrix_policy_version": 1, "allow_idb": 1}),
            json!({"matrix_policy_version": 1, "allowed_routes": "idb.get"}),
            json!({"matrix_policy_version": 1, "allowed_routes": [1]}),
        ];
        for raw in cases {
            let err = Policy::normalize(&raw).expect_err("must reject");
            assert_eq!(err.code(), "VALIDATION", "input {raw}");
        }
    }

    #[test]
    fn key_order_does_not_change_policy_hash() {
        let left = Policy::normalize(&json!({
            "allowed_routes": ["b", "a"],
            "matrix_policy_version": 1
        }))
        .expect("normalize");
        let right = Policy::normalize(&json!({
            "matrix_policy_version": 1,
            "allowed_routes": ["a", "b"]
        }))
        .expect("normalize");
        assert_eq!(left.digest().expect("hash"), right.digest().expect("hash"));
    }

    #[test]
    fn compile_options_accept_camel_and_snake_case() {
        let camel: CompileOptions =
            serde_json::from_value(json!({"maxDepth": 5, "fields": ["b", "a"], "includeAbi": false}))
                .expect("deserialize");
        let snake: CompileOptions =
            serde_json::from_value(json!({"max_depth": 5, "fields": ["b", "a"], "include_abi": false}))
                .expect("deserialize");
        assert_eq!(camel, snake);
        assert!(!camel.include_abi);

        let policy = camel.normalize().expect("normalize");
        assert_eq!(policy.fields, vec!["a", "b"]);
        assert_eq!(policy.max_depth, 5);
    }

    #[test]
    fn expression_policy_bounds_depth() {
        assert!(ExpressionPolicy::new(0, vec![], vec![]).is_err());
        assert!(ExpressionPolicy::new(4097, vec![], vec![]).is_err());
        assert!(ExpressionPolicy::new(4096, vec![], vec![]).is_ok());
    }

    #[test]
    fn expression_policy_derives_from_program_policy() {
        let policy = Policy::normalize(&json!({
            "matrix_policy_version": 1,
            "max_depth": 10,
            "field_allowlist": ["score", "rating"]
        }))
        .expect("normalize");
        let derived = ExpressionPolicy::from(&policy);
        assert_eq!(derived.max_depth, 10);
        assert_eq!(derived.fields, vec!["rating", "score"]);
    }
}
