//! Procedure scripts and their in-store interpreter.
//!
//! # Responsibility
//! - Define the script format installed as a procedure body.
//! - Execute a script against a document array inside the store, one
//!   replace at a time, under the store's per-invocation write budget.
//!
//! Input documents only address their targets through `_self`. The field is
//! set on the stored body at replace time, so edits made after the caller
//! fetched its candidates are kept.
//!
//! # Invariants
//! - Documents are processed strictly in array order; replace `i + 1` is
//!   only attempted after replace `i` is acknowledged.
//! - A not-accepted replace ends the invocation and reports the count of
//!   acknowledged replacements, excluding the rejected one.
//! - A failed replace raises `ProcedureError::ReplaceFailed`; later
//!   documents are never touched.
//! - The reported count is always within `0..=docs.len()`.

use super::document::{Document, SELF_LINK_PROPERTY};
use super::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Script installed as a procedure body.
///
/// Serialized as JSON tagged by `op`, e.g.
/// `{"op":"set_field","field":"isComplete","value":true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProcedureScript {
    /// Sets one top-level field on every input document and replaces it.
    SetField { field: String, value: Value },
}

impl ProcedureScript {
    /// Parses and validates a stored body.
    pub fn parse(body: &str) -> Result<Self, ProcedureError> {
        let script: Self = serde_json::from_str(body)
            .map_err(|err| ProcedureError::InvalidScript(err.to_string()))?;
        script.validate()?;
        Ok(script)
    }

    /// Serializes the script into an installable body.
    pub fn to_body(&self) -> Result<String, ProcedureError> {
        serde_json::to_string(self).map_err(|err| ProcedureError::InvalidScript(err.to_string()))
    }

    fn validate(&self) -> Result<(), ProcedureError> {
        match self {
            Self::SetField { field, .. } => {
                if field.trim().is_empty() {
                    return Err(ProcedureError::InvalidScript(
                        "set_field requires a non-empty field".to_string(),
                    ));
                }
                if field.starts_with('_') || field == "id" {
                    return Err(ProcedureError::InvalidScript(format!(
                        "set_field cannot overwrite reserved field `{field}`"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Result of asking the store to start one replace.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceOutcome {
    /// The replace ran and was acknowledged.
    Acknowledged(Document),
    /// The invocation budget is exhausted; the replace never started.
    NotAccepted,
}

/// Store-side services available to an executing procedure.
pub trait ProcedureContext {
    /// Sets one top-level field on the stored document at `self_link` and
    /// replaces it. Links outside the procedure's collection are rejected.
    fn try_set_field(
        &mut self,
        self_link: &str,
        field: &str,
        value: &Value,
    ) -> Result<ReplaceOutcome, StoreError>;
}

/// Error raised by a procedure invocation.
#[derive(Debug)]
pub enum ProcedureError {
    InvalidScript(String),
    InvalidArgument(String),
    ReplaceFailed {
        index: usize,
        id: Option<String>,
        source: Box<StoreError>,
    },
}

impl Display for ProcedureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidScript(message) => write!(f, "invalid procedure script: {message}"),
            Self::InvalidArgument(message) => write!(f, "invalid procedure argument: {message}"),
            Self::ReplaceFailed { index, id, source } => write!(
                f,
                "replace of document #{index} ({}) failed: {source}",
                id.as_deref().unwrap_or("<no id>")
            ),
        }
    }
}

impl Error for ProcedureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ReplaceFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Runs `script` with the invocation arguments and returns the response body.
pub fn execute_script(
    script: &ProcedureScript,
    args: &[Value],
    ctx: &mut dyn ProcedureContext,
) -> Result<Value, ProcedureError> {
    let docs = match args.first() {
        Some(Value::Array(docs)) => docs,
        _ => {
            return Err(ProcedureError::InvalidArgument(
                "the document array is undefined or null".to_string(),
            ))
        }
    };

    match script {
        ProcedureScript::SetField { field, value } => {
            let count = set_field_in_order(docs, field, value, ctx)?;
            Ok(Value::from(count))
        }
    }
}

fn set_field_in_order(
    docs: &[Value],
    field: &str,
    value: &Value,
    ctx: &mut dyn ProcedureContext,
) -> Result<usize, ProcedureError> {
    let mut count = 0;

    for (index, doc) in docs.iter().enumerate() {
        let Value::Object(body) = doc else {
            return Err(ProcedureError::InvalidArgument(format!(
                "element #{index} is not a document"
            )));
        };
        let self_link = body
            .get(SELF_LINK_PROPERTY)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProcedureError::InvalidArgument(format!("element #{index} has no self link"))
            })?;

        match ctx.try_set_field(self_link, field, value) {
            Ok(ReplaceOutcome::Acknowledged(_)) => count += 1,
            Ok(ReplaceOutcome::NotAccepted) => return Ok(count),
            Err(source) => {
                return Err(ProcedureError::ReplaceFailed {
                    index,
                    id: body.get("id").and_then(Value::as_str).map(str::to_string),
                    source: Box::new(source),
                })
            }
        }
    }

    Ok(count)
}
