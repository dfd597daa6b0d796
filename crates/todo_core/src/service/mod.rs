//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and procedure calls into the operations the
//!   application calls.
//! - Keep callers decoupled from store links, etags and procedure bodies.

pub mod batch_driver;
pub mod todo_service;
