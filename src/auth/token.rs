//! Bearer access tokens and their compact JWS segments.

// self
use crate::_prelude::*;

/// Redacted bearer token handed over by the host session; callers must never log it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);
impl AccessToken {
	/// Wraps a bearer token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when no token material was supplied.
	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}

	/// Splits the token into its compact JWS segments.
	pub fn segments(&self) -> Option<TokenSegments<'_>> {
		TokenSegments::split(self.expose())
	}
}
impl From<String> for AccessToken {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<&str> for AccessToken {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}
impl AsRef<str> for AccessToken {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("AccessToken").field(&"<redacted>").finish()
	}
}
impl Display for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Borrowed `header.payload.signature` view over a compact JWS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenSegments<'a> {
	/// Base64url-encoded JOSE header.
	pub header: &'a str,
	/// Base64url-encoded claims payload.
	pub payload: &'a str,
	/// Base64url-encoded signature (may be empty for unsecured tokens).
	pub signature: &'a str,
}
impl<'a> TokenSegments<'a> {
	/// Splits a compact JWS; returns `None` unless exactly three segments are present.
	pub fn split(raw: &'a str) -> Option<Self> {
		let mut parts = raw.trim().split('.');
		let header = parts.next()?;
		let payload = parts.next()?;
		let signature = parts.next()?;

		if parts.next().is_some() || header.is_empty() || payload.is_empty() {
			return None;
		}

		Some(Self { header, payload, signature })
	}
}
