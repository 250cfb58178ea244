//! # Herald Cache
//!
//! Read-through caching for tenant channel credentials and branding, with
//! positive/negative TTLs and per-key single-flight fetch collapse.
//!
//! This crate also owns the encryption boundary: sensitive credential
//! fields are stored encrypted and decrypted views exist in memory only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod branding;
pub mod credentials;
pub mod crypto;
pub mod ttl;

pub use branding::{BrandingCache, BrandingProvider, HttpIdentityClient, StaticBrandingProvider};
pub use credentials::{CredentialCache, sensitive_fields};
pub use crypto::Cipher;
pub use ttl::TtlCache;
