//! Golden vector sets: pinned inputs and outputs recorded against a specific
//! symbol table, used to detect drift between library versions.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::abi::{AbiStamp, ExpressionEnvelope, ProgramEnvelope};
use crate::error::{MatrixError, MatrixResult};
use crate::expr::compile;
use crate::policy::CompileOptions;
use crate::symbols::{expression_symbols_hash, matrix_symbols_hash};

pub const EXPRESSION_GOLDEN_FORMAT: &str = "scxq2-es.golden.v1";
pub const CONFORMANCE_FORMAT: &str = "matrix.conformance.v1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpressionGoldenSet {
    pub format: String,
    pub symbols_hash: String,
    pub vectors: Vec<GoldenVector>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoldenVector {
    pub name: String,
    pub scx: String,
    #[serde(default)]
    pub opts: CompileOptions,
    pub expect: GoldenExpectation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoldenExpectation {
    pub painless: String,
    pub abi: AbiStamp<ExpressionEnvelope>,
}

impl ExpressionGoldenSet {
    /// Compile every `(name, source, options)` case with the current library
    /// and pin the results.
    pub fn record<'a, I>(cases: I) -> MatrixResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str, CompileOptions)>,
    {
        let vectors = cases
            .into_iter()
            .map(|(name, scx, mut opts)| {
                opts.include_abi = true;
                let out = compile(scx, &opts)?;
                let abi = out.abi.ok_or_else(|| {
                    MatrixError::validation(format!("vector '{name}' produced no ABI stamp"))
                })?;
                Ok(GoldenVector {
                    name: name.to_string(),
                    scx: scx.to_string(),
                    opts,
                    expect: GoldenExpectation {
                        painless: out.painless,
                        abi,
                    },
                })
            })
            .collect::<MatrixResult<Vec<_>>>()?;
        Ok(Self {
            format: EXPRESSION_GOLDEN_FORMAT.to_string(),
            symbols_hash: expression_symbols_hash()?,
            vectors,
        })
    }
}

/// Program conformance vectors executed against [`crate::effects::MemoryStore`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConformanceSet {
    pub format: String,
    pub symbols_hash: String,
    pub vectors: Vec<ConformanceVector>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConformanceVector {
    pub name: String,
    pub program: JsonValue,
    pub policy: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<String>>,
    #[serde(default)]
    pub pre_state: PreState,
    #[serde(default)]
    pub expect: ConformanceExpectation,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PreState {
    /// `{store: [row, ...]}`
    #[serde(default)]
    pub idb: JsonValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConformanceExpectation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_event: Option<ExpectedReply>,
    #[serde(default)]
    pub emits: Vec<JsonValue>,
    #[serde(default)]
    pub writes: Vec<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<AbiStamp<ProgramEnvelope>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default)]
    pub input: JsonValue,
}

impl ConformanceSet {
    pub fn new(vectors: Vec<ConformanceVector>) -> MatrixResult<Self> {
        let mut set = Self {
            format: CONFORMANCE_FORMAT.to_string(),
            symbols_hash: String::new(),
            vectors,
        };
        set.stamp_symbols()?;
        Ok(set)
    }

    /// Tag the set with the current MATRIX symbol table hash.
    pub fn stamp_symbols(&mut self) -> MatrixResult<()> {
        self.symbols_hash = matrix_symbols_hash()?;
        Ok(())
    }
}
