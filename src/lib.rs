//! Warden - authorization decision point
//!
//! Answers "may these principals perform this action on this resource"
//! against audience-scoped policies that can be hot-reloaded.
//! It exposes all modules for testing purposes.

pub mod authz;
pub mod settings;
pub mod web;
