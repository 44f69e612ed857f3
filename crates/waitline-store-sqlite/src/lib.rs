//! SQLite backend for the Waitline store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. The uniqueness constraint on
//! `submissions.email_normalized` is what makes concurrent duplicate
//! enrollments safe.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
