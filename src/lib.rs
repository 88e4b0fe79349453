//! Keeps a search index in step with a hierarchical metadata repository.
//!
//! Containers nest into a tree, records live in containers and files live
//! in records. [`indexer::Indexer`] projects each of them onto a flat search
//! document (with materialized ancestor paths for subtree filtering) and
//! pushes it through an [`search::client::IndexClient`]. Repository
//! mutations trigger targeted reindexing on background workers; the
//! repository stays authoritative when the index falls behind.

pub mod admin;
pub mod cli;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod indexer;
pub mod logging;
pub mod model;
pub mod remediation;
pub mod repository;
pub mod search;

pub use cli::{Cli, Commands};
