/* Copyright (c) 2026 Olle Mårtensson. This Source Code Form is subject to the terms of the Eclipse Public License, v. 2.0. */
//! matrix-abi: hash-verified compilation and execution of untrusted programs.
//!
//! Inputs are canonicalized, each semantically distinct component is hashed,
//! and the hashes are composed into a versioned ABI envelope. Consumers
//! recompute the envelope and compare it with the identity they expect before
//! compiling an expression to Painless or running a MATRIX program.
//!
//! # Examples
//! ```
//! use matrix_abi::{compile, verify_compile_result, CompileOptions};
//!
//! let options = CompileOptions::default().with_fields(["rating"]);
//! let out = compile("@v('rating') + 1", &options).expect("compile");
//! assert_eq!(
//!     out.painless,
//!     "return ((doc.containsKey('rating') && !doc['rating'].empty ? doc['rating'].value : 0.0) + 1);"
//! );
//! verify_compile_result(&out, &options).expect("verify");
//! ```

mod error;
pub mod value;

pub mod abi;
pub mod admission;
pub mod canonical;
pub mod codec;
pub mod effects;
pub mod expr;
pub mod golden;
pub mod hash;
pub mod interpreter;
pub mod policy;
pub mod program;
pub mod serde_support;
pub mod symbols;
pub mod verify;

pub use abi::{
    abi_hash, expression_envelope, program_envelope, stamp, AbiStamp, ExpressionEnvelope,
    ProgramAbiOptions, ProgramEnvelope,
};
pub use admission::admit;
pub use canonical::{canonicalize, to_canonical_string};
pub use codec::{OptionalCodec, PackCodec};
pub use effects::{EffectHandler, MemoryStore, WriteRecord};
pub use error::{MatrixError, MatrixResult};
pub use expr::bridge::{compile_for_target, BridgeInput, TargetOutput};
pub use expr::{compile, compile_under_policy, CompileOutput, Expr};
pub use golden::{ConformanceSet, ExpressionGoldenSet};
pub use hash::{canonical_digest, namespaced_digest, sha256_hex};
pub use interpreter::{run_program, EventRecord, RunFailure, RunOutcome};
pub use policy::{CompileOptions, ExpressionPolicy, Policy};
pub use program::{Block, ProgramPack};
pub use serde_support::to_value;
pub use symbols::{expression_symbols_hash, matrix_symbols_hash};
pub use value::Value;
pub use verify::{
    verify_compile_result, verify_conformance_set, verify_golden_set, verify_program_abi,
    ProgramVerifyRequest, VerifiedProgram,
};
