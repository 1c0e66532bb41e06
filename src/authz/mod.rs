//! Audience-scoped authorization decisions.
//!
//! A request is resolved to an audience (its `Origin`), its principals are
//! merged and expanded with that audience's mappings, and the result is
//! evaluated against the audience's rules under default deny. Policies live in
//! a [`store::PolicyStore`] that can be replaced wholesale while decisions run.

pub mod audience;
pub mod engine;
pub mod errors;
pub mod jwt;
pub mod loader;
pub mod policy;
pub mod principals;
pub mod service;
pub mod store;
pub mod types;
pub mod web;
