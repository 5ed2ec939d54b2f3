//! ABI envelopes: versioned records binding every component identity of a
//! program or expression into one hash.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canonical::{sort_utf16, to_canonical_string};
use crate::error::MatrixResult;
use crate::expr::ast::Expr;
use crate::hash::{canonical_digest, namespaced_digest};
use crate::policy::{ExpressionPolicy, Policy};
use crate::program::ProgramPack;
use crate::serde_support::to_value;
use crate::symbols::{EXPRESSION_SYMBOLS_V1, MATRIX_SYMBOLS_V1};
use crate::value::Value;

pub const PROGRAM_ABI: &str = "matrix";
pub const PROGRAM_SURFACE: &str = "matrix.v1";
pub const DEFAULT_TARGET: &str = "host_agnostic";
pub const TRANSPILER_ID: &str = "matrix-runtime:ast:v0.1.0";

pub const EXPRESSION_ABI: &str = "scxq2->es_painless";
pub const EXPRESSION_TARGET: &str = "es_painless";
pub const EXPRESSION_TARGET_VERSION_MAJOR: u32 = 1;

pub const ABI_VERSION: u32 = 1;

/// Schema identifiers bound into `io_schema_hash`.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct IoSchema {
    pub event: &'static str,
    pub policy: &'static str,
    pub program: &'static str,
    pub abi: &'static str,
}

pub static IO_SCHEMA_V1: IoSchema = IoSchema {
    event: "kuhul://schema/matrix/event/v1",
    policy: "kuhul://schema/matrix/policy/v1",
    program: "kuhul://schema/matrix/program/v1",
    abi: "kuhul://schema/matrix/abi/v1",
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEnvelope {
    pub abi: String,
    pub abi_version: u32,
    pub surface: String,
    pub target: String,
    pub symbols_hash: String,
    pub policy_hash: String,
    pub transpiler_hash: String,
    pub program_hash: String,
    pub io_schema_hash: String,
    pub capabilities_hash: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionEnvelope {
    pub abi: String,
    pub abi_version: u32,
    pub target: String,
    pub target_version_major: u32,
    pub symbols_hash: String,
    pub policy_hash: String,
    pub ast_hash: String,
}

/// An envelope paired with its hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiStamp<E> {
    pub envelope: E,
    pub hash: String,
}

/// Plugin inventory and target a program envelope is issued for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramAbiOptions {
    pub plugins: Vec<String>,
    pub target: String,
}

impl Default for ProgramAbiOptions {
    fn default() -> Self {
        Self {
            plugins: vec!["idb".to_string(), "kql".to_string()],
            target: DEFAULT_TARGET.to_string(),
        }
    }
}

pub fn io_schema_hash() -> MatrixResult<String> {
    namespaced_digest("io", &IO_SCHEMA_V1)
}

pub fn transpiler_hash() -> MatrixResult<String> {
    namespaced_digest("transpiler", TRANSPILER_ID)
}

pub fn capabilities_hash(plugins: &[String]) -> MatrixResult<String> {
    let mut sorted = plugins.to_vec();
    sort_utf16(&mut sorted);
    namespaced_digest("plugins", &sorted)
}

pub fn program_envelope(
    policy: &Policy,
    program: &ProgramPack,
    options: &ProgramAbiOptions,
) -> MatrixResult<ProgramEnvelope> {
    Ok(ProgramEnvelope {
        abi: PROGRAM_ABI.to_string(),
        abi_version: ABI_VERSION,
        surface: PROGRAM_SURFACE.to_string(),
        target: options.target.clone(),
        symbols_hash: MATRIX_SYMBOLS_V1.digest()?,
        policy_hash: policy.digest()?,
        transpiler_hash: transpiler_hash()?,
        program_hash: program.digest()?,
        io_schema_hash: io_schema_hash()?,
        capabilities_hash: capabilities_hash(&options.plugins)?,
        timestamp: 0,
    })
}

pub fn expression_envelope(ast: &Expr, policy: &ExpressionPolicy) -> MatrixResult<ExpressionEnvelope> {
    Ok(ExpressionEnvelope {
        abi: EXPRESSION_ABI.to_string(),
        abi_version: ABI_VERSION,
        target: EXPRESSION_TARGET.to_string(),
        target_version_major: EXPRESSION_TARGET_VERSION_MAJOR,
        symbols_hash: EXPRESSION_SYMBOLS_V1.digest()?,
        policy_hash: policy.digest()?,
        ast_hash: canonical_digest(ast)?,
    })
}

/// `H(envelope)`
pub fn abi_hash<E: Serialize>(envelope: &E) -> MatrixResult<String> {
    canonical_digest(envelope)
}

/// Build an envelope and hash it in one step.
pub fn stamp<E: Serialize>(envelope: E) -> MatrixResult<AbiStamp<E>> {
    let hash = abi_hash(&envelope)?;
    debug!(abi_hash = %hash, "computed ABI envelope");
    Ok(AbiStamp { envelope, hash })
}

/// A single differing envelope field: `(field, expected, actual)`.
pub type FieldMismatch = (String, String, String);

/// First field whose canonical encoding differs between two envelopes.
pub fn first_field_mismatch<E: Serialize>(
    expected: &E,
    actual: &E,
) -> MatrixResult<Option<FieldMismatch>> {
    let (Value::Map(expected), Value::Map(actual)) = (to_value(expected)?, to_value(actual)?)
    else {
        return Ok(None);
    };
    for (field, want) in &expected {
        let got = actual.get(field).unwrap_or(&Value::Null);
        if got != want {
            return Ok(Some((
                field.clone(),
                to_canonical_string(want),
                to_canonical_string(got),
            )));
        }
    }
    Ok(actual
        .iter()
        .find(|(field, _)| !expected.contains_key(*field))
        .map(|(field, got)| (field.clone(), "null".to_string(), to_canonical_string(got))))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        capabilities_hash, first_field_mismatch, program_envelope, stamp, ProgramAbiOptions,
    };
    use crate::policy::Policy;
    use crate::program::ProgramPack;

    fn fixture() -> (Policy, ProgramPack) {
        let policy = Policy::normalize(&json!({
            "matrix_policy_version": 1,
            "allow_idb": true,
            "allowed_routes": ["idb.get"]
        }))
        .expect("policy");
        let program = ProgramPack::normalize(&json!({
            "format": "matrix.program.v1",
            "program": {"name": "p", "entry": "main", "blocks": [
                {"op": "idb.get", "args": {"store": "users", "key": "1"}}
            ]}
        }))
        .expect("program");
        (policy, program)
    }

    #[test]
    fn program_envelope_is_idempotent() {
        let (policy, program) = fixture();
        let options = ProgramAbiOptions::default();
        let first = stamp(program_envelope(&policy, &program, &options).expect("env")).expect("stamp");
        let second = stamp(program_envelope(&policy, &program, &options).expect("env")).expect("stamp");
        assert_eq!(first, second);
        assert_eq!(first.envelope.timestamp, 0);
        assert_eq!(first.envelope.target, "host_agnostic");
    }

    #[test]
    fn policy_change_propagates_to_abi_hash() {
        let (policy, program) = fixture();
        let mut widened = policy.clone();
        widened.allowed_routes.push("idb.put".into());
        let options = ProgramAbiOptions::default();
        let narrow = program_envelope(&policy, &program, &options).expect("env");
        let wide = program_envelope(&widened, &program, &options).expect("env");
        assert_ne!(narrow.policy_hash, wide.policy_hash);
        assert_eq!(narrow.program_hash, wide.program_hash);
        assert_ne!(
            stamp(narrow).expect("stamp").hash,
            stamp(wide).expect("stamp").hash
        );
    }

    #[test]
    fn capabilities_hash_ignores_plugin_order() {
        let left = capabilities_hash(&["kql".into(), "idb".into()]).expect("hash");
        let right = capabilities_hash(&["idb".into(), "kql".into()]).expect("hash");
        assert_eq!(left, right);
    }

    #[test]
    fn field_mismatch_names_the_field() {
        let (policy, program) = fixture();
        let expected = program_envelope(&policy, &program, &ProgramAbiOptions::default()).expect("env");
        let mut actual = expected.clone();
        actual.surface = "matrix.v2".into();
        let (field, want, got) = first_field_mismatch(&expected, &actual)
            .expect("compare")
            .expect("mismatch");
        assert_eq!(field, "surface");
        assert_eq!(want, "\"matrix.v1\"");
        assert_eq!(got, "\"matrix.v2\"");
        assert!(first_field_mismatch(&expected, &expected).expect("compare").is_none());
    }
}
