//! Provider/model catalog and credential store for Scribe
//!
//! Everything backed by the relational store lives here: the provider
//! and model registry with its lookup caches, the encrypted credential
//! resolver, and the pure URL-normalization rules shared by both.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod credentials;
pub mod crypto;
pub mod error;
pub mod registry;
pub mod store;
pub mod urls;

pub use credentials::{CredentialInfo, CredentialResolver, CredentialSummary, EnvCredential, SaveCredential};
pub use crypto::KeyCipher;
pub use error::CatalogError;
pub use registry::{ModelRecord, NewModel, NewProvider, ProviderRecord, ProviderRegistry};
pub use urls::normalize_api_base;
