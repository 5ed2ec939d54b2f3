use thiserror::Error;

/// Result alias used across the crate.
pub type MatrixResult<T> = Result<T, MatrixError>;

/// Error variants surfaced while canonicalizing, compiling, verifying or executing.
///
/// Every variant is terminal for the call that produced it; nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("syntax error: {message}")]
    Syntax {
        message: String,
        /// Offending token as written in the source, if one was reached.
        token: Option<String>,
    },
    #[error("call arity error: @{name} expects {} args, got {got}", arity_range(.min, .max))]
    CallArity {
        name: String,
        min: usize,
        max: usize,
        got: usize,
    },
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    #[error("ABI_MISMATCH {subject}\nexpected: {expected}\n     got: {actual}")]
    AbiMismatch {
        subject: String,
        expected: String,
        actual: String,
    },
    #[error("POLICY_DENY op='{op}'")]
    AdmissionDenied { op: String },
    #[error("capability '{capability}' is disabled by policy (op '{op}')")]
    CapabilityDisabled { capability: String, op: String },
    #[error("UNSUPPORTED_OP '{0}'")]
    UnsupportedOperation(String),
    #[error("capability '{0}' is not available")]
    CapabilityUnavailable(String),
}

impl MatrixError {
    /// Stable machine-readable code for the error class.
    pub fn code(&self) -> &'static str {
        match self {
            MatrixError::Validation(_) => "VALIDATION",
            MatrixError::Syntax { .. } => "SYNTAX",
            MatrixError::CallArity { .. } => "CALL_ARITY",
            MatrixError::PolicyViolation(_) => "POLICY_VIOLATION",
            MatrixError::AbiMismatch { .. } => "ABI_MISMATCH",
            MatrixError::AdmissionDenied { .. } => "POLICY_DENY",
            MatrixError::CapabilityDisabled { .. } => "CAPABILITY_DISABLED",
            MatrixError::UnsupportedOperation(_) => "UNSUPPORTED_OP",
            MatrixError::CapabilityUnavailable(_) => "CAPABILITY_UNAVAILABLE",
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        MatrixError::Validation(message.into())
    }

    pub(crate) fn abi_mismatch(
        subject: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        MatrixError::AbiMismatch {
            subject: subject.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

fn arity_range(min: &usize, max: &usize) -> String {
    if min == max {
        min.to_string()
    } else {
        format!("{min}..{max}")
    }
}
