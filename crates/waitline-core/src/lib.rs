//! Core types and trait definitions for the Waitline enrollment pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod attempt;
pub mod bounce;
pub mod delivery;
pub mod error;
pub mod guard;
pub mod identity;
pub mod mailer;
pub mod service;
pub mod store;
pub mod submission;
pub mod suppression;
pub mod template;

pub use error::{Error, Result};
