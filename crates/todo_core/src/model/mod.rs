//! Domain model for todo items.
//!
//! # Responsibility
//! - Define the typed shape the application reads and writes.
//!
//! # Invariants
//! - Every item is identified by a store-unique string `id`.
//! - Deletion is a hard delete in the store; there are no tombstones.

pub mod item;
