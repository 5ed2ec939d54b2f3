use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{MatrixError, MatrixResult};
use crate::hash::namespaced_digest;

pub const PROGRAM_FORMAT: &str = "matrix.program.v1";

/// A normalized program pack: `{format, program: {name, entry, blocks}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgramPack {
    pub format: String,
    pub program: Program,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub entry: String,
    pub blocks: Vec<Block>,
}

/// One operation and its argument record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub op: String,
    pub args: Map<String, JsonValue>,
}

impl Block {
    pub fn arg(&self, key: &str) -> Option<&JsonValue> {
        self.args.get(key).filter(|value| !value.is_null())
    }

    pub fn str_arg(&self, key: &str) -> MatrixResult<&str> {
        self.arg(key).and_then(JsonValue::as_str).ok_or_else(|| {
            MatrixError::validation(format!("{} missing string args.{key}", self.op))
        })
    }
}

impl ProgramPack {
    pub fn normalize(raw: &JsonValue) -> MatrixResult<Self> {
        if raw.get("format").and_then(JsonValue::as_str) != Some(PROGRAM_FORMAT) {
            return Err(MatrixError::validation(format!(
                "program pack must be format={PROGRAM_FORMAT}"
            )));
        }
        let program = raw
            .get("program")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| MatrixError::validation("missing program object"))?;

        let name = required_text(program, "name")?;
        let entry = required_text(program, "entry")?;
        let raw_blocks = program
            .get("blocks")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| MatrixError::validation("program.blocks must be an array"))?;

        let blocks = raw_blocks
            .iter()
            .enumerate()
            .map(|(index, block)| normalize_block(index, block))
            .collect::<MatrixResult<Vec<_>>>()?;

        Ok(ProgramPack {
            format: PROGRAM_FORMAT.to_string(),
            program: Program {
                name,
                entry,
                blocks,
            },
        })
    }

    /// `H({program: self})`
    pub fn digest(&self) -> MatrixResult<String> {
        namespaced_digest("program", self)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.program.blocks
    }
}

fn required_text(program: &Map<String, JsonValue>, key: &str) -> MatrixResult<String> {
    program
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| MatrixError::validation(format!("program.{key} must be a string")))
}

fn normalize_block(index: usize, raw: &JsonValue) -> MatrixResult<Block> {
    let block = raw
        .as_object()
        .ok_or_else(|| MatrixError::validation(format!("block {index} must be an object")))?;
    let op = match block.get("op").and_then(JsonValue::as_str) {
        Some(op) if !op.is_empty() => op.to_string(),
        _ => {
            return Err(MatrixError::validation(format!(
                "block {index}: op must be a non-empty string"
            )))
        }
    };
    let args = block
        .get("args")
        .and_then(JsonValue::as_object)
        .cloned()
        .ok_or_else(|| MatrixError::validation(format!("block {index}: args must be an object")))?;
    Ok(Block { op, args })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ProgramPack;

    fn pack(blocks: serde_json::Value) -> serde_json::Value {
        json!({
            "format": "matrix.program.v1",
            "program": {"name": "p", "entry": "main", "blocks": blocks}
        })
    }

    #[test]
    fn normalizes_valid_pack() {
        let program = ProgramPack::normalize(&pack(json!([
            {"op": "idb.get", "args": {"store": "users", "key": "1"}, "extra": true}
        ])))
        .expect("normalize");
        assert_eq!(program.blocks().len(), 1);
        assert_eq!(program.blocks()[0].op, "idb.get");
        assert_eq!(program.blocks()[0].str_arg("store").expect("store"), "users");
    }

    #[test]
    fn rejects_malformed_blocks_with_index() {
        for blocks in [
            json!([{"op": "", "args": {}}]),
            json!([{"op": "idb.get"}]),
            json!([{"op": "idb.get", "args": []}]),
            json!([{"op": "idb.get", "args": null}]),
            json!([7]),
        ] {
            let err = ProgramPack::normalize(&pack(blocks.clone())).expect_err("reject");
            assert!(err.to_string().contains("block 0"), "{blocks}: {err}");
        }
    }

    #[test]
    fn rejects_wrong_format_and_missing_blocks() {
        assert!(ProgramPack::normalize(&json!({"format": "other", "program": {}})).is_err());
        assert!(ProgramPack::normalize(&json!({
            "format": "matrix.program.v1",
            "program": {"name": "p", "entry": "main"}
        }))
        .is_err());
    }

    #[test]
    fn changing_a_block_changes_program_hash() {
        let first = ProgramPack::normalize(&pack(json!([{"op": "idb.get", "args": {"key": "1"}}])))
            .expect("normalize");
        let second = ProgramPack::normalize(&pack(json!([{"op": "idb.get", "args": {"key": "2"}}])))
            .expect("normalize");
        assert_ne!(
            first.digest().expect("hash"),
            second.digest().expect("hash")
        );
    }
}
