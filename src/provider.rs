//! Provider configuration (data) and tenant-aware endpoint derivation.
//!
//! `config` owns [`ProviderConfig`], its builder, and the `configure` step the host calls
//! once at startup. `endpoint` holds the URL templates for the Microsoft identity platform
//! v2.0 and the [`Tenant`] sentinel handling.

pub mod config;
pub mod endpoint;

pub use config::*;
pub use endpoint::*;
