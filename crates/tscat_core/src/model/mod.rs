//! Entity and attribute model for events and catalogues.
//!
//! # Responsibility
//! - Define the fixed schema fields and open attribute maps of both entity
//!   kinds.
//! - Enforce field and attribute constraints before anything is stored.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID.
//! - A handle whose entity was hard-deleted rejects every read.

pub mod attributes;
pub mod catalogue;
pub mod entity;
pub mod event;
pub mod validation;
pub mod value;
