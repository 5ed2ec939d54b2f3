//! Routing of host-provided inputs to compilation targets.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::abi::{AbiStamp, ExpressionEnvelope, EXPRESSION_ABI, EXPRESSION_TARGET};
use crate::error::{MatrixError, MatrixResult};
use crate::expr::ast::Expr;
use crate::expr::compile;
use crate::policy::CompileOptions;

/// Known carrier shapes for expression source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeInput {
    Text(String),
    /// `{source}`
    Source(String),
    /// `{scxq2}`
    Scxq2(String),
    /// `{"@scxq2"}`
    TaggedScxq2(String),
    /// `{script: {source}}`
    Script(String),
    /// `{body}`
    Body(String),
}

impl BridgeInput {
    /// Classify a JSON carrier. Object shapes are tried in a fixed order and
    /// the first key holding a string wins.
    pub fn from_json(raw: &JsonValue) -> MatrixResult<Self> {
        let doc = match raw {
            JsonValue::String(text) => return Ok(BridgeInput::Text(text.clone())),
            JsonValue::Object(doc) => doc,
            other => {
                return Err(MatrixError::validation(format!(
                    "bridge input must be a string or an object, found {other}"
                )))
            }
        };
        let text = |key: &str| doc.get(key).and_then(JsonValue::as_str).map(str::to_string);

        if let Some(source) = text("source") {
            return Ok(BridgeInput::Source(source));
        }
        if let Some(source) = text("scxq2") {
            return Ok(BridgeInput::Scxq2(source));
        }
        if let Some(source) = text("@scxq2") {
            return Ok(BridgeInput::TaggedScxq2(source));
        }
        if let Some(source) = doc
            .get("script")
            .and_then(|script| script.get("source"))
            .and_then(JsonValue::as_str)
        {
            return Ok(BridgeInput::Script(source.to_string()));
        }
        if let Some(source) = text("body") {
            return Ok(BridgeInput::Body(source));
        }
        Err(MatrixError::validation(
            "could not find expression source in bridge input",
        ))
    }

    pub fn source(&self) -> &str {
        match self {
            BridgeInput::Text(source)
            | BridgeInput::Source(source)
            | BridgeInput::Scxq2(source)
            | BridgeInput::TaggedScxq2(source)
            | BridgeInput::Script(source)
            | BridgeInput::Body(source) => source,
        }
    }
}

impl From<&str> for BridgeInput {
    fn from(source: &str) -> Self {
        BridgeInput::Text(source.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Target {
    pub id: &'static str,
    pub abi: &'static str,
    pub version_major: u32,
}

pub static TARGETS: &[Target] = &[Target {
    id: EXPRESSION_TARGET,
    abi: EXPRESSION_ABI,
    version_major: 1,
}];

pub fn target(id: &str) -> Option<&'static Target> {
    TARGETS.iter().find(|target| target.id == id)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TargetOutput {
    pub target: String,
    pub painless: String,
    pub ast: Expr,
    pub abi: Option<AbiStamp<ExpressionEnvelope>>,
}

pub fn compile_for_target(
    target_id: &str,
    input: &BridgeInput,
    options: &CompileOptions,
) -> MatrixResult<TargetOutput> {
    let target = target(target_id)
        .ok_or_else(|| MatrixError::validation(format!("unknown target '{target_id}'")))?;
    let out = compile(input.source(), options)?;
    Ok(TargetOutput {
        target: target.id.to_string(),
        painless: out.painless,
        ast: out.ast,
        abi: out.abi,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{compile_for_target, BridgeInput};
    use crate::policy::CompileOptions;

    #[test]
    fn resolves_shapes_in_priority_order() {
        let cases = [
            (json!("_score"), BridgeInput::Text("_score".into())),
            (
                json!({"body": "b", "source": "s", "scxq2": "x"}),
                BridgeInput::Source("s".into()),
            ),
            (
                json!({"@scxq2": "t", "scxq2": "x"}),
                BridgeInput::Scxq2("x".into()),
            ),
            (json!({"@scxq2": "t", "body": "b"}), BridgeInput::TaggedScxq2("t".into())),
            (
                json!({"script": {"source": "s"}, "body": "b"}),
                BridgeInput::Script("s".into()),
            ),
            (json!({"source": 1, "body": "b"}), BridgeInput::Body("b".into())),
        ];
        for (raw, expected) in cases {
            assert_eq!(BridgeInput::from_json(&raw).expect("classify"), expected, "{raw}");
        }
    }

    #[test]
    fn rejects_unknown_shapes() {
        for raw in [json!(1), json!({"script": "x"}), json!(null)] {
            assert_eq!(
                BridgeInput::from_json(&raw).expect_err("reject").code(),
                "VALIDATION"
            );
        }
    }

    #[test]
    fn compiles_for_known_target_only() {
        let input = BridgeInput::from("_score + 1");
        let out = compile_for_target("es_painless", &input, &CompileOptions::default())
            .expect("compile");
        assert_eq!(out.target, "es_painless");
        assert_eq!(out.painless, "return (_score + 1);");
        assert!(out.abi.is_some());

        let err = compile_for_target("sql", &input, &CompileOptions::default())
            .expect_err("unknown target");
        assert!(err.to_string().contains("sql"));
    }
}
