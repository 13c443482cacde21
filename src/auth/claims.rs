//! Claim payload decoding and ordered claim lookup.
//!
//! [`ClaimSet::decode`] only parses the payload segment; it never checks the signature.
//! Signature checks live in [`crate::verify`] and are applied by the resolver according to
//! its [`SignaturePolicy`](crate::verify::SignaturePolicy).

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
// self
use crate::{_prelude::*, auth::AccessToken};

/// Failures raised while turning a token into a [`ClaimSet`].
#[derive(Debug, ThisError)]
pub enum ClaimDecodeError {
	/// Token is not a compact `header.payload.signature` JWS.
	#[error("Access token is not a compact JWS.")]
	MalformedToken,
	/// Payload segment is not valid base64url.
	#[error("Claim payload is not valid base64url.")]
	InvalidEncoding(#[from] base64::DecodeError),
	/// Payload segment is not a JSON object.
	#[error("Claim payload is not a JSON object.")]
	InvalidJson(#[from] serde_json::Error),
}

/// Claims decoded from an access token payload.
///
/// Rebuilt on every resolution; nothing caches it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(BTreeMap<String, Value>);
impl ClaimSet {
	/// Decodes the payload segment of `token` without verifying it.
	pub fn decode(token: &AccessToken) -> Result<Self, ClaimDecodeError> {
		let segments = token.segments().ok_or(ClaimDecodeError::MalformedToken)?;

		Self::from_segment(segments.payload)
	}

	/// Decodes a single base64url payload segment. Trailing padding is tolerated.
	pub fn from_segment(payload: &str) -> Result<Self, ClaimDecodeError> {
		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;

		Ok(Self(serde_json::from_slice(&bytes)?))
	}

	/// Returns the raw claim value.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	/// Returns the claim as a string when it is a non-blank JSON string.
	pub fn string(&self, key: &str) -> Option<&str> {
		match self.0.get(key)? {
			Value::String(value) if !value.trim().is_empty() => Some(value.as_str()),
			_ => None,
		}
	}

	/// Token issuer (`iss`), when present.
	pub fn issuer(&self) -> Option<&str> {
		self.string("iss")
	}

	/// Tenant identifier (`tid`), when present.
	pub fn tenant_id(&self) -> Option<&str> {
		self.string("tid")
	}

	/// Number of claims in the set.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when the payload carried no claims.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl From<BTreeMap<String, Value>> for ClaimSet {
	fn from(value: BTreeMap<String, Value>) -> Self {
		Self(value)
	}
}
impl FromIterator<(String, Value)> for ClaimSet {
	fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

/// Priority list of claim keys, checked in order; the first usable value wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimChain(&'static [&'static str]);
impl ClaimChain {
	/// Email chain for access-token claims.
	pub const EMAIL: Self = Self(&["email", "unique_name"]);
	/// Stable object identifier of the signed-in user.
	pub const USER_ID: Self = Self(&["oid"]);

	/// Builds a chain from a static key list.
	pub const fn new(keys: &'static [&'static str]) -> Self {
		Self(keys)
	}

	/// Keys in priority order.
	pub fn keys(&self) -> &'static [&'static str] {
		self.0
	}

	/// Returns the first key with a usable value. Later keys are never consulted.
	pub fn resolve<'c>(&self, claims: &'c ClaimSet) -> Option<ClaimHit<'c>> {
		self.0.iter().find_map(|&key| claims.string(key).map(|value| ClaimHit { key, value }))
	}
}

/// Claim selected by a [`ClaimChain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimHit<'c> {
	/// Key that produced the value.
	pub key: &'static str,
	/// Claim value.
	pub value: &'c str,
}
