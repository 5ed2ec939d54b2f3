//! Sequential block interpreter.
//!
//! Blocks run strictly in order with a single `last` slot carrying the result
//! of the previous storage effect. All storage goes through the injected
//! [`EffectHandler`]; the interpreter itself performs no I/O.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::debug;

use crate::effects::EffectHandler;
use crate::error::{MatrixError, MatrixResult};
use crate::policy::Policy;
use crate::program::{Block, ProgramPack};

pub const EVENT_VERSION: u32 = 1;

/// A reply or emission: `{event, v, input}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventRecord {
    pub event: String,
    pub v: u32,
    pub input: JsonValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunOutcome {
    pub reply: Option<EventRecord>,
    pub emits: Vec<EventRecord>,
}

/// A run that stopped at a failing block. `outcome` holds what the blocks
/// before it produced; nothing is rolled back.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: MatrixError,
    pub outcome: RunOutcome,
}

impl From<RunFailure> for MatrixError {
    fn from(failure: RunFailure) -> Self {
        failure.error
    }
}

pub fn run_program(
    program: &ProgramPack,
    policy: &Policy,
    handler: &mut dyn EffectHandler,
) -> Result<RunOutcome, RunFailure> {
    let mut machine = Machine {
        policy,
        handler,
        last: JsonValue::Null,
        outcome: RunOutcome::default(),
    };
    for (index, block) in program.blocks().iter().enumerate() {
        debug!(index, op = %block.op, "executing block");
        if let Err(error) = machine.step(block) {
            return Err(RunFailure {
                error,
                outcome: machine.outcome,
            });
        }
    }
    Ok(machine.outcome)
}

struct Machine<'a> {
    policy: &'a Policy,
    handler: &'a mut dyn EffectHandler,
    last: JsonValue,
    outcome: RunOutcome,
}

impl Machine<'_> {
    fn step(&mut self, block: &Block) -> MatrixResult<()> {
        match block.op.as_str() {
            "idb.get" => {
                self.require_storage(block)?;
                let store = block.str_arg("store")?;
                let key = block
                    .arg("key")
                    .ok_or_else(|| MatrixError::validation("idb.get missing args.key"))?;
                self.last = self.handler.get(store, key)?.unwrap_or(JsonValue::Null);
            }
            "idb.put" => {
                self.require_storage(block)?;
                let store = block.str_arg("store")?;
                let value = block
                    .arg("value")
                    .ok_or_else(|| MatrixError::validation("idb.put missing args.value"))?;
                self.last = self.handler.put(store, value)?;
            }
            "idb.query" => {
                self.require_storage(block)?;
                let store = block.str_arg("store")?;
                let spec = block.arg("kql").unwrap_or(&JsonValue::Null);
                let rows = self.handler.query(store, spec)?;
                let mut result = Map::new();
                result.insert("rows".to_string(), JsonValue::Array(rows));
                self.last = JsonValue::Object(result);
            }
            "event.reply" => {
                let record = self.event_record(block)?;
                self.outcome.reply = Some(record);
            }
            "event.emit" => {
                let record = self.event_record(block)?;
                self.outcome.emits.push(record);
            }
            other => return Err(MatrixError::UnsupportedOperation(other.to_string())),
        }
        Ok(())
    }

    fn require_storage(&self, block: &Block) -> MatrixResult<()> {
        if self.policy.allow_storage {
            Ok(())
        } else {
            Err(MatrixError::CapabilityDisabled {
                capability: "allow_idb".to_string(),
                op: block.op.clone(),
            })
        }
    }

    fn event_record(&self, block: &Block) -> MatrixResult<EventRecord> {
        let event = block.str_arg("event")?;
        if event.is_empty() {
            return Err(MatrixError::validation(format!(
                "{} args.event must not be empty",
                block.op
            )));
        }
        let input = if block.arg("body_from").and_then(JsonValue::as_str) == Some("last") {
            self.last.clone()
        } else {
            block
                .arg("body")
                .cloned()
                .unwrap_or_else(|| JsonValue::Object(Map::new()))
        };
        Ok(EventRecord {
            event: event.to_string(),
            v: EVENT_VERSION,
            input,
        })
    }
}
