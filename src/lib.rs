//! Microsoft identity platform v2.0 adapter for OAuth 2.0 proxies: tenant-aware endpoint
//! derivation and verified, fail-closed identity resolution from access tokens.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod error;
pub mod http;
pub mod obs;
pub mod profile;
pub mod provider;
pub mod resolver;
pub mod verify;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
	use jsonwebtoken::{Algorithm, EncodingKey, Header, jwk::JwkSet};
	use serde_json::{Value, json};
	// self
	#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
	use crate::{auth::AccessToken, provider::ProviderConfig};

	/// Key id stamped on tokens minted by [`signed_token`].
	pub const TEST_KEY_ID: &str = "test-key-1";
	/// HS256 secret behind [`signed_token`] and [`test_jwk_set`].
	pub const TEST_SECRET: &[u8] = b"test-signing-secret-for-identity-resolution";
	/// Tenant id stamped by [`issued_claims`].
	pub const TEST_TENANT_ID: &str = "4f1c2d3e-5a6b-4c7d-8e9f-0a1b2c3d4e5f";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Provider configured for the `common` tenant with the default authority.
	pub fn configured_provider() -> ProviderConfig {
		let mut config = ProviderConfig::default();

		config.configure("");

		config
	}

	/// `iss` the default authority stamps on tokens of [`TEST_TENANT_ID`].
	pub fn test_issuer() -> String {
		format!("https://login.microsoftonline.com/{TEST_TENANT_ID}/v2.0")
	}

	/// Adds `iss`, `tid` and `exp` for [`TEST_TENANT_ID`] to `claims` where they are absent.
	pub fn issued_claims(mut claims: Value) -> Value {
		if let Some(object) = claims.as_object_mut() {
			object.entry("iss").or_insert_with(|| test_issuer().into());
			object.entry("tid").or_insert_with(|| TEST_TENANT_ID.into());
			object.entry("exp").or_insert_with(|| future_exp().into());
		}

		claims
	}

	/// Mints an HS256 token signed with [`TEST_SECRET`] under [`TEST_KEY_ID`].
	pub fn signed_token(claims: Value) -> AccessToken {
		let mut header = Header::new(Algorithm::HS256);

		header.kid = Some(TEST_KEY_ID.into());

		jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(TEST_SECRET))
			.map(AccessToken::from)
			.expect("Failed to sign test token.")
	}

	/// Builds an unsecured (`alg: none`) token carrying `claims`.
	pub fn unsigned_token(claims: Value) -> AccessToken {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
		let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

		AccessToken::new(format!("{header}.{payload}.unsigned"))
	}

	/// `exp` value one hour from now.
	pub fn future_exp() -> i64 {
		(OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp()
	}

	/// JWK set body publishing [`TEST_SECRET`] under `key_id`.
	pub fn jwk_set_body(key_id: &str) -> Value {
		json!({
			"keys": [{
				"kty": "oct",
				"kid": key_id,
				"alg": "HS256",
				"k": URL_SAFE_NO_PAD.encode(TEST_SECRET),
			}]
		})
	}

	/// JWK set publishing [`TEST_SECRET`] under [`TEST_KEY_ID`].
	pub fn test_jwk_set() -> JwkSet {
		serde_json::from_value(jwk_set_body(TEST_KEY_ID)).expect("Failed to build test JWK set.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use jsonwebtoken;
pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use httpmock as _;
