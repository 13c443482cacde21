//! Pinned verification keys.

// crates.io
use jsonwebtoken::{DecodingKey, jwk::JwkSet};
// self
use crate::{
	_prelude::*,
	verify::{KeyFuture, KeyLookup, KeyResolver, VerificationError},
};

/// [`KeyResolver`] serving a fixed set of keys, addressed by key id.
#[derive(Clone, Default)]
pub struct StaticKeyResolver {
	keys: HashMap<String, DecodingKey>,
	fallback: Option<DecodingKey>,
}
impl StaticKeyResolver {
	/// Adds a key served for tokens whose `kid` equals `key_id`.
	pub fn with_key(mut self, key_id: impl Into<String>, key: DecodingKey) -> Self {
		self.keys.insert(key_id.into(), key);

		self
	}

	/// Sets the key served for tokens without a `kid`.
	pub fn with_fallback(mut self, key: DecodingKey) -> Self {
		self.fallback = Some(key);

		self
	}

	/// Pins every keyed entry of a JWK set.
	pub fn from_jwks(set: &JwkSet) -> Result<Self, VerificationError> {
		let mut resolver = Self::default();

		for jwk in &set.keys {
			if let Some(key_id) = jwk.common.key_id.as_ref() {
				let key = DecodingKey::from_jwk(jwk).map_err(VerificationError::InvalidKey)?;

				resolver.keys.insert(key_id.clone(), key);
			}
		}

		Ok(resolver)
	}

	fn lookup(&self, lookup: &KeyLookup) -> Result<DecodingKey, VerificationError> {
		let key = match lookup.key_id.as_deref() {
			Some(key_id) => self.keys.get(key_id),
			None => self.fallback.as_ref(),
		};

		key.cloned().ok_or_else(|| VerificationError::KeyNotFound { key_id: lookup.key_id.clone() })
	}
}
impl KeyResolver for StaticKeyResolver {
	fn resolve_key<'a>(&'a self, lookup: &'a KeyLookup) -> KeyFuture<'a, DecodingKey> {
		let resolved = self.lookup(lookup).map_err(Error::from);

		Box::pin(async move { resolved })
	}
}
impl Debug for StaticKeyResolver {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StaticKeyResolver")
			.field("key_ids", &self.keys.keys().collect::<Vec<_>>())
			.field("fallback", &self.fallback.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use jsonwebtoken::Algorithm;
	// self
	use super::*;
	use crate::_preludet::*;

	fn lookup(key_id: Option<&str>) -> KeyLookup {
		KeyLookup { issuer: None, key_id: key_id.map(Into::into), algorithm: Algorithm::HS256 }
	}

	#[tokio::test]
	async fn keys_are_selected_by_key_id() {
		let resolver =
			StaticKeyResolver::default().with_key("k1", DecodingKey::from_secret(TEST_SECRET));

		resolver.resolve_key(&lookup(Some("k1"))).await.expect("Known key id should resolve.");

		let Err(err) = resolver.resolve_key(&lookup(Some("k2"))).await else {
			panic!("Unknown key id should fail.");
		};

		assert!(matches!(
			err,
			Error::Verification(VerificationError::KeyNotFound { key_id: Some(ref id) })
				if id == "k2"
		));
		assert!(resolver.resolve_key(&lookup(None)).await.is_err(), "No fallback is configured.");
	}

	#[tokio::test]
	async fn fallback_serves_tokens_without_key_id() {
		let resolver =
			StaticKeyResolver::default().with_fallback(DecodingKey::from_secret(TEST_SECRET));

		resolver.resolve_key(&lookup(None)).await.expect("Fallback key should resolve.");
	}

	#[test]
	fn pins_keyed_entries_of_a_jwk_set() {
		let set = test_jwk_set();
		let resolver = StaticKeyResolver::from_jwks(&set).expect("Octet JWK set should load.");

		assert!(resolver.lookup(&lookup(Some(TEST_KEY_ID))).is_ok());
		assert!(format!("{resolver:?}").contains(TEST_KEY_ID));
	}
}
