//! # minhchung
//!
//! Server, CLI and HTTP client for the evidence-code registry.
//!
//! - `api`: axum REST API over [`minhchung_core::Registry`]
//! - `cli`: clap commands, run against a local database
//! - `client`: reqwest client for a running server
//! - `config`: `minhchung.toml` plus environment overrides

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;

pub use config::Config;
pub use error::AppError;
