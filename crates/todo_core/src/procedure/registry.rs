//! Named procedure installation.
//!
//! # Responsibility
//! - Ensure a procedure exists on the resolved collection, installing the
//!   given body on first use.
//!
//! # Invariants
//! - Lookup by name always precedes creation.
//! - The body is passed through to the store untouched.
//! - Install failures are not retried; a lost duplicate-name race re-reads
//!   the winner's procedure.

use crate::error::CoreResult;
use crate::resolver::{get_or_create, ResourceResolver};
use crate::store::ProcedureHandle;
use std::sync::Arc;

/// Get-or-install access to procedures on one collection.
pub struct ProcedureRegistry {
    resolver: Arc<ResourceResolver>,
}

impl ProcedureRegistry {
    pub fn new(resolver: Arc<ResourceResolver>) -> Self {
        Self { resolver }
    }

    /// Returns the procedure named `name`, installing `body` when absent.
    ///
    /// An existing procedure is returned as-is even if its body differs.
    pub fn get_or_install(&self, name: &str, body: &str) -> CoreResult<ProcedureHandle> {
        let collection = self.resolver.collection()?;
        let store = self.resolver.store();

        get_or_create(
            "procedure",
            || store.find_procedure(collection, name),
            || store.create_procedure(collection, name, body),
        )
    }
}
