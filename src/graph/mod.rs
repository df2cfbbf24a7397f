//! Knowledge-graph storage and search.
//!
//! The write path and CRUD contracts live in [`store`], keyword and hybrid
//! ranking in [`search`], and the wire-facing record shapes in [`types`].
//! All functions operate on a borrowed [`rusqlite::Connection`] (or a
//! transaction derefing to one); callers own transaction boundaries.

pub mod search;
pub mod store;
pub mod types;
