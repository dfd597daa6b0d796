//! Server-side procedures used by the core.
//!
//! # Responsibility
//! - Define the bulk-completion procedure installed into the store.
//! - Provide get-or-install access through [`registry::ProcedureRegistry`].

use crate::error::{CoreError, CoreResult};
use crate::model::item::COMPLETED_FIELD;
use crate::store::ProcedureScript;
use serde_json::Value;

pub mod registry;

/// Fixed name of the bulk-completion procedure.
pub const MARK_ALL_PROCEDURE_ID: &str = "MarkAll";

/// Script that sets `isComplete = true` on each input document, in order.
pub fn mark_all_script() -> ProcedureScript {
    ProcedureScript::SetField {
        field: COMPLETED_FIELD.to_string(),
        value: Value::Bool(true),
    }
}

/// Installable body of [`mark_all_script`].
pub fn mark_all_body() -> CoreResult<String> {
    mark_all_script()
        .to_body()
        .map_err(|err| CoreError::InvalidData(err.to_string()))
}
