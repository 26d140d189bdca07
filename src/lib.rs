//! Incremental embedding index for a source tree.
//!
//! Files are split into overlapping line windows ([`chunker`]), fingerprinted
//! ([`fingerprint`]), embedded ([`embedder`]) and stored with line provenance
//! in a persisted vector store ([`store`]). The [`watcher`] polls the tree and
//! re-embeds changed files through the [`indexer`]; [`search`] answers
//! natural-language queries against the store. [`server`] exposes these
//! operations over HTTP.

pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod fingerprint;
pub mod indexer;
pub mod routes;
pub mod search;
pub mod server;
pub mod state;
pub mod store;
pub mod watcher;
