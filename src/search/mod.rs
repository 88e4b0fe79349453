//! Search engine access.
//!
//! - **[`client`]**: the `IndexClient` trait and the HTTP client for Solr.
//! - **[`memory`]**: an in-process index with the same commit semantics.

pub mod client;
pub mod memory;
