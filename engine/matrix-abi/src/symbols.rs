//! Frozen symbol tables.
//!
//! These tables are the "meaning inventory" bound into every ABI identity.
//! Adding, removing or renaming an entry changes the table hash and therefore
//! invalidates every envelope issued against the previous table.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::MatrixResult;
use crate::hash::namespaced_digest;

/// Operation and effect vocabulary of MATRIX programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MatrixSymbols {
    pub version: u32,
    pub ops: &'static [&'static str],
    pub effects: &'static [&'static str],
}

pub static MATRIX_SYMBOLS_V1: MatrixSymbols = MatrixSymbols {
    version: 1,
    ops: &[
        "event.reply",
        "event.emit",
        "event.stream.subscribe",
        "idb.get",
        "idb.put",
        "idb.query",
        "kql.compile",
    ],
    effects: &["reply", "emit", "write", "read"],
};

impl MatrixSymbols {
    pub fn digest(&self) -> MatrixResult<String> {
        namespaced_digest("symbols", self)
    }

    pub fn contains_op(&self, op: &str) -> bool {
        self.ops.contains(&op)
    }
}

/// Lowering contract of one built-in expression call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CallSpec {
    #[serde(skip)]
    pub name: &'static str,
    pub arity_min: usize,
    pub arity_max: usize,
    pub signature: &'static str,
    pub lowers_to: &'static str,
}

/// Declarative operator and call table of the expression language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpressionSymbols {
    pub ops: &'static [(&'static str, &'static str)],
    pub calls: &'static [CallSpec],
}

pub static EXPRESSION_SYMBOLS_V1: ExpressionSymbols = ExpressionSymbols {
    ops: &[
        ("or", "||"),
        ("and", "&&"),
        ("not", "!"),
        ("ternary", "?:"),
        ("add", "+"),
        ("sub", "-"),
        ("mul", "*"),
        ("div", "/"),
        ("mod", "%"),
    ],
    calls: &[
        CallSpec {
            name: "v",
            arity_min: 1,
            arity_max: 2,
            signature: "@v(fieldName[, default])",
            lowers_to: "(doc.containsKey(field) && !doc[field].empty ? doc[field].value : default)",
        },
        CallSpec {
            name: "exists",
            arity_min: 1,
            arity_max: 1,
            signature: "@exists(fieldName)",
            lowers_to: "(doc.containsKey(field) && !doc[field].empty)",
        },
        CallSpec {
            name: "clamp",
            arity_min: 3,
            arity_max: 3,
            signature: "@clamp(x, lo, hi)",
            lowers_to: "Math.min(hi, Math.max(lo, x))",
        },
        CallSpec {
            name: "min",
            arity_min: 2,
            arity_max: 2,
            signature: "@min(a,b)",
            lowers_to: "Math.min(a,b)",
        },
        CallSpec {
            name: "max",
            arity_min: 2,
            arity_max: 2,
            signature: "@max(a,b)",
            lowers_to: "Math.max(a,b)",
        },
        CallSpec {
            name: "abs",
            arity_min: 1,
            arity_max: 1,
            signature: "@abs(x)",
            lowers_to: "Math.abs(x)",
        },
        CallSpec {
            name: "floor",
            arity_min: 1,
            arity_max: 1,
            signature: "@floor(x)",
            lowers_to: "Math.floor(x)",
        },
        CallSpec {
            name: "ceil",
            arity_min: 1,
            arity_max: 1,
            signature: "@ceil(x)",
            lowers_to: "Math.ceil(x)",
        },
        CallSpec {
            name: "round",
            arity_min: 1,
            arity_max: 1,
            signature: "@round(x)",
            lowers_to: "Math.round(x)",
        },
        CallSpec {
            name: "log",
            arity_min: 1,
            arity_max: 1,
            signature: "@log(x)",
            lowers_to: "Math.log(x)",
        },
        CallSpec {
            name: "sqrt",
            arity_min: 1,
            arity_max: 1,
            signature: "@sqrt(x)",
            lowers_to: "Math.sqrt(x)",
        },
        CallSpec {
            name: "pow",
            arity_min: 2,
            arity_max: 2,
            signature: "@pow(a,b)",
            lowers_to: "Math.pow(a,b)",
        },
    ],
};

/// Calls the policy walker accepts.
pub static ALLOWED_CALLS: &[&str] = &[
    "v", "exists", "clamp", "min", "max", "abs", "floor", "ceil", "round", "log", "sqrt", "pow",
];

impl ExpressionSymbols {
    pub fn call(&self, name: &str) -> Option<&CallSpec> {
        self.calls.iter().find(|spec| spec.name == name)
    }

    /// Hash of the table bound together with the sorted allowed-call list.
    pub fn digest(&self) -> MatrixResult<String> {
        let mut allowed_calls: Vec<&str> = ALLOWED_CALLS.to_vec();
        allowed_calls.sort_unstable();
        let binding = SymbolBinding {
            symbol_table_v1: self,
            allowed_calls,
        };
        crate::hash::canonical_digest(&binding)
    }
}

impl Serialize for ExpressionSymbols {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut table = serializer.serialize_map(Some(2))?;
        table.serialize_entry("ops", &NamedEntries(self.ops))?;
        table.serialize_entry("calls", &CallEntries(self.calls))?;
        table.end()
    }
}

struct NamedEntries(&'static [(&'static str, &'static str)]);

impl Serialize for NamedEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, symbol) in self.0 {
            map.serialize_entry(name, symbol)?;
        }
        map.end()
    }
}

struct CallEntries(&'static [CallSpec]);

impl Serialize for CallEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for spec in self.0 {
            map.serialize_entry(spec.name, spec)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct SymbolBinding<'a> {
    symbol_table_v1: &'a ExpressionSymbols,
    allowed_calls: Vec<&'static str>,
}

pub fn matrix_symbols_hash() -> MatrixResult<String> {
    MATRIX_SYMBOLS_V1.digest()
}

pub fn expression_symbols_hash() -> MatrixResult<String> {
    EXPRESSION_SYMBOLS_V1.digest()
}

pub fn is_allowed_call(name: &str) -> bool {
    ALLOWED_CALLS.contains(&name)
}
