//! SCXQ2-ES expression compiler: tokenize, parse, enforce, lower to Painless
//! and stamp the result with its ABI envelope.

pub mod ast;
pub mod bridge;
pub mod emit;
pub mod enforce;
pub mod lexer;
pub mod parser;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::abi::{expression_envelope, stamp, AbiStamp, ExpressionEnvelope};
use crate::error::MatrixResult;
use crate::policy::{CompileOptions, ExpressionPolicy, Policy};

pub use ast::Expr;

/// Result of [`compile`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutput {
    pub painless: String,
    pub ast: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<AbiStamp<ExpressionEnvelope>>,
}

pub fn compile(source: &str, options: &CompileOptions) -> MatrixResult<CompileOutput> {
    compile_with(source, &options.normalize()?, options.include_abi)
}

/// Compile an expression embedded in a program under the restrictions its
/// program policy carries (`max_depth`, `field_allowlist`, `param_allowlist`).
pub fn compile_under_policy(source: &str, policy: &Policy) -> MatrixResult<CompileOutput> {
    compile_with(source, &ExpressionPolicy::from(policy), true)
}

fn compile_with(
    source: &str,
    policy: &ExpressionPolicy,
    include_abi: bool,
) -> MatrixResult<CompileOutput> {
    let ast = parser::parse(source)?;
    enforce::enforce(&ast, policy)?;
    let painless = emit::emit_script(&ast)?;

    let abi = if include_abi {
        Some(stamp(expression_envelope(&ast, policy)?)?)
    } else {
        None
    };
    debug!(
        painless_len = painless.len(),
        abi_hash = abi.as_ref().map(|stamp| stamp.hash.as_str()),
        "compiled expression"
    );
    Ok(CompileOutput { painless, ast, abi })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{compile, compile_under_policy};
    use crate::policy::{CompileOptions, Policy};

    #[test]
    fn compile_stamps_abi_by_default() {
        let out = compile("@v('rating') + 1", &CompileOptions::default().with_fields(["rating"]))
            .expect("compile");
        let stamp = out.abi.expect("abi stamp");
        assert_eq!(stamp.envelope.abi, "scxq2->es_painless");
        assert_eq!(stamp.hash.len(), 64);
    }

    #[test]
    fn abi_can_be_omitted() {
        let out = compile("_score * 2", &CompileOptions::default().without_abi()).expect("compile");
        assert!(out.abi.is_none());
        assert_eq!(out.painless, "return (_score * 2);");
    }

    #[test]
    fn invalid_depth_option_is_a_validation_error() {
        let err = compile("1", &CompileOptions::default().with_max_depth(0)).expect_err("bounds");
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn program_policy_allowlists_govern_embedded_expressions() {
        let policy = Policy::normalize(&json!({
            "matrix_policy_version": 1,
            "max_depth": 8,
            "field_allowlist": ["rating"],
            "param_allowlist": ["boost"]
        }))
        .expect("policy");
        let out = compile_under_policy("@v('rating') * params.boost", &policy).expect("compile");
        let expected = compile(
            "@v('rating') * params.boost",
            &CompileOptions::default()
                .with_fields(["rating"])
                .with_params(["boost"])
                .with_max_depth(8),
        )
        .expect("compile");
        assert_eq!(out, expected);

        let err = compile_under_policy("@v('secret')", &policy).expect_err("field");
        assert_eq!(err.code(), "POLICY_VIOLATION");
    }
}
