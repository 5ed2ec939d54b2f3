use tracing::warn;

use crate::error::{MatrixError, MatrixResult};
use crate::policy::Policy;
use crate::program::ProgramPack;

/// Reject the program unless every block's op is in `allowed_routes`.
///
/// Runs after normalization and ABI verification, before execution.
pub fn admit(program: &ProgramPack, policy: &Policy) -> MatrixResult<()> {
    if let Some(block) = program.blocks().iter().find(|block| !policy.allows_route(&block.op)) {
        warn!(op = %block.op, program = %program.program.name, "admission denied");
        return Err(MatrixError::AdmissionDenied {
            op: block.op.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::admit;
    use crate::policy::Policy;
    use crate::program::ProgramPack;

    fn program() -> ProgramPack {
        ProgramPack::normalize(&json!({
            "format": "matrix.program.v1",
            "program": {"name": "writer", "entry": "main", "blocks": [
                {"op": "idb.get", "args": {"store": "s", "key": "1"}},
                {"op": "idb.put", "args": {"store": "s", "value": {}}}
            ]}
        }))
        .expect("program")
    }

    fn policy(routes: &[&str]) -> Policy {
        Policy::normalize(&json!({"matrix_policy_version": 1, "allowed_routes": routes}))
            .expect("policy")
    }

    #[test]
    fn denies_first_unlisted_op() {
        let err = admit(&program(), &policy(&["idb.get"])).expect_err("deny");
        assert_eq!(err.to_string(), "POLICY_DENY op='idb.put'");
    }

    #[test]
    fn admits_when_every_op_is_listed() {
        assert!(admit(&program(), &policy(&["idb.get", "idb.put"])).is_ok());
    }
}
