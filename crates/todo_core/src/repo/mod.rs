//! Repository layer over the document store.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for items.
//! - Keep store links, etags and filters out of service orchestration.
//!
//! # Invariants
//! - Repository APIs return typed absence (`Option`) for reads and
//!   `CoreError::NotFound` for writes against missing items.

pub mod item_repo;
