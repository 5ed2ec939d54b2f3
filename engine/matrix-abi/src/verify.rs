//! Recompute-and-compare verification of ABI stamps and golden vector sets.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::abi::{
    abi_hash, expression_envelope, first_field_mismatch, program_envelope, ProgramAbiOptions,
    ProgramEnvelope,
};
use crate::admission::admit;
use crate::canonical::canonicalize;
use crate::effects::MemoryStore;
use crate::error::{MatrixError, MatrixResult};
use crate::expr::{compile, CompileOutput};
use crate::golden::{
    ConformanceSet, ConformanceVector, ExpressionGoldenSet, CONFORMANCE_FORMAT,
    EXPRESSION_GOLDEN_FORMAT,
};
use crate::interpreter::run_program;
use crate::policy::{CompileOptions, Policy};
use crate::program::ProgramPack;
use crate::symbols::{expression_symbols_hash, matrix_symbols_hash};

fn mismatch(subject: impl Into<String>, expected: &str, actual: &str) -> MatrixError {
    let subject = subject.into();
    warn!(%subject, expected, actual, "ABI mismatch");
    MatrixError::abi_mismatch(subject, expected, actual)
}

fn check_envelope<E: Serialize>(subject: &str, expected: &E, actual: &E) -> MatrixResult<()> {
    match first_field_mismatch(expected, actual)? {
        Some((field, want, got)) => Err(mismatch(format!("{subject}.{field}"), &want, &got)),
        None => Ok(()),
    }
}

/// Recompute the envelope of a compile result from its AST and options.
pub fn verify_compile_result(out: &CompileOutput, options: &CompileOptions) -> MatrixResult<()> {
    let stamp = out
        .abi
        .as_ref()
        .ok_or_else(|| MatrixError::validation("compile result carries no ABI stamp"))?;
    let policy = options.normalize()?;
    let envelope = expression_envelope(&out.ast, &policy)?;
    let hash = abi_hash(&envelope)?;

    if stamp.hash != hash {
        return Err(mismatch("abi.hash", &hash, &stamp.hash));
    }
    check_envelope("abi.envelope", &envelope, &stamp.envelope)?;

    let policy_hash = policy.digest()?;
    if stamp.envelope.policy_hash != policy_hash {
        return Err(mismatch(
            "abi.policy_hash",
            &policy_hash,
            &stamp.envelope.policy_hash,
        ));
    }
    let symbols_hash = expression_symbols_hash()?;
    if stamp.envelope.symbols_hash != symbols_hash {
        return Err(mismatch(
            "abi.symbols_hash",
            &symbols_hash,
            &stamp.envelope.symbols_hash,
        ));
    }
    Ok(())
}

/// Raw program, policy and the identity a caller expects them to have.
#[derive(Clone, Debug)]
pub struct ProgramVerifyRequest<'a> {
    pub program: &'a JsonValue,
    pub policy: &'a JsonValue,
    pub options: ProgramAbiOptions,
    pub expected_hash: Option<&'a str>,
    pub claimed_envelope: Option<&'a ProgramEnvelope>,
}

impl<'a> ProgramVerifyRequest<'a> {
    pub fn new(program: &'a JsonValue, policy: &'a JsonValue) -> Self {
        Self {
            program,
            policy,
            options: ProgramAbiOptions::default(),
            expected_hash: None,
            claimed_envelope: None,
        }
    }

    pub fn with_options(mut self, options: ProgramAbiOptions) -> Self {
        self.options = options;
        self
    }

    pub fn expect_hash(mut self, hash: &'a str) -> Self {
        self.expected_hash = Some(hash);
        self
    }

    pub fn claim_envelope(mut self, envelope: &'a ProgramEnvelope) -> Self {
        self.claimed_envelope = Some(envelope);
        self
    }
}

/// A program whose identity has been recomputed and, where requested, matched.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedProgram {
    pub envelope: ProgramEnvelope,
    pub hash: String,
    pub policy: Policy,
    pub program: ProgramPack,
}

pub fn verify_program_abi(request: &ProgramVerifyRequest<'_>) -> MatrixResult<VerifiedProgram> {
    let policy = Policy::normalize(request.policy)?;
    let program = ProgramPack::normalize(request.program)?;
    let envelope = program_envelope(&policy, &program, &request.options)?;
    let hash = abi_hash(&envelope)?;

    if let Some(expected) = request.expected_hash {
        if expected != hash {
            return Err(mismatch("abi.hash", expected, &hash));
        }
    }
    if let Some(claimed) = request.claimed_envelope {
        check_envelope("abi.envelope", &envelope, claimed)?;
    }
    debug!(abi_hash = %hash, program = %program.program.name, "verified program ABI");
    Ok(VerifiedProgram {
        envelope,
        hash,
        policy,
        program,
    })
}

/// Check every vector of an expression golden set. Returns the number of
/// vectors verified.
pub fn verify_golden_set(set: &ExpressionGoldenSet) -> MatrixResult<usize> {
    if set.format != EXPRESSION_GOLDEN_FORMAT {
        return Err(MatrixError::validation(format!(
            "golden set must be format={EXPRESSION_GOLDEN_FORMAT}, found '{}'",
            set.format
        )));
    }
    let current = expression_symbols_hash()?;
    if set.symbols_hash != current {
        return Err(mismatch(
            "golden symbols_hash (library drift)",
            &set.symbols_hash,
            &current,
        ));
    }

    for vector in &set.vectors {
        let mut options = vector.opts.clone();
        options.include_abi = true;
        let out = compile(&vector.scx, &options)?;
        verify_compile_result(&out, &options)?;

        let subject = |what: &str| format!("vector '{}' {what}", vector.name);
        if out.painless != vector.expect.painless {
            return Err(mismatch(
                subject("painless"),
                &vector.expect.painless,
                &out.painless,
            ));
        }
        let Some(stamp) = out.abi.as_ref() else {
            return Err(MatrixError::validation(subject("produced no ABI stamp")));
        };
        if stamp.hash != vector.expect.abi.hash {
            return Err(mismatch(
                subject("abi.hash"),
                &vector.expect.abi.hash,
                &stamp.hash,
            ));
        }
        check_envelope(
            &subject("abi.envelope"),
            &vector.expect.abi.envelope,
            &stamp.envelope,
        )?;
        debug!(vector = %vector.name, "golden vector verified");
    }
    Ok(set.vectors.len())
}

/// Verify, admit and execute every conformance vector. Returns the number of
/// vectors verified.
pub fn verify_conformance_set(set: &ConformanceSet) -> MatrixResult<usize> {
    if set.format != CONFORMANCE_FORMAT {
        return Err(MatrixError::validation(format!(
            "conformance set must be format={CONFORMANCE_FORMAT}, found '{}'",
            set.format
        )));
    }
    let current = matrix_symbols_hash()?;
    if set.symbols_hash != current {
        return Err(mismatch(
            "conformance symbols_hash (library drift)",
            &set.symbols_hash,
            &current,
        ));
    }
    for vector in &set.vectors {
        verify_vector(vector)?;
        debug!(vector = %vector.name, "conformance vector verified");
    }
    Ok(set.vectors.len())
}

fn verify_vector(vector: &ConformanceVector) -> MatrixResult<()> {
    let mut options = ProgramAbiOptions::default();
    if let Some(plugins) = &vector.plugins {
        options.plugins = plugins.clone();
    }
    let mut request =
        ProgramVerifyRequest::new(&vector.program, &vector.policy).with_options(options);
    if let Some(stamp) = &vector.expect.abi {
        request = request
            .expect_hash(&stamp.hash)
            .claim_envelope(&stamp.envelope);
    }
    let verified = verify_program_abi(&request)?;
    admit(&verified.program, &verified.policy)?;

    let mut store = MemoryStore::from_seed(&vector.pre_state.idb)?;
    let outcome = run_program(&verified.program, &verified.policy, &mut store)?;

    let subject = |what: &str| format!("vector '{}' {what}", vector.name);
    if let Some(expected) = &vector.expect.reply_event {
        let Some(reply) = &outcome.reply else {
            return Err(mismatch(subject("reply"), "a reply event", "none"));
        };
        if let Some(event) = &expected.event {
            if event != &reply.event {
                return Err(mismatch(subject("reply.event"), event, &reply.event));
            }
        }
        compare(
            &subject("reply.input"),
            &empty_if_null(&expected.input),
            &empty_if_null(&reply.input),
        )?;
    }
    compare(&subject("emits"), &vector.expect.emits, &outcome.emits)?;
    compare(&subject("writes"), &vector.expect.writes, store.writes())?;
    Ok(())
}

fn empty_if_null(value: &JsonValue) -> JsonValue {
    if value.is_null() {
        JsonValue::Object(Map::new())
    } else {
        value.clone()
    }
}

fn compare<A, B>(subject: &str, expected: &A, actual: &B) -> MatrixResult<()>
where
    A: Serialize + ?Sized,
    B: Serialize + ?Sized,
{
    let expected = canonicalize(expected)?;
    let actual = canonicalize(actual)?;
    if expected == actual {
        Ok(())
    } else {
        Err(mismatch(subject, &expected, &actual))
    }
}
