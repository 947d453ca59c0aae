//! # acme-wfe
//!
//! The public HTTP face of an ACME certificate authority. Clients register
//! accounts, request authorizations, answer challenges, obtain and revoke
//! certificates through it; every state-changing request is a JWS-signed POST
//! carrying a single-use anti-replay nonce.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum) → dispatcher stages → envelope verifier → handlers
//!                                                         ↓
//!                               RegistrationAuthority / StorageGetter
//! ```
//!
//! The front end owns no persistent state apart from the nonce registry;
//! issuance and storage live behind the traits in [`services`].

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod jose;
pub mod nonce;
pub mod observability;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
