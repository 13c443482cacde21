//! Identity values handed back to the host proxy.

// self
use crate::_prelude::*;

/// Identity resolved from one access token.
///
/// The email is always lower-cased so downstream allow-lists can compare it directly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedIdentity {
	/// Lower-cased email address; empty only for [`ResolvedIdentity::empty`].
	pub email: String,
	/// Stable object identifier, independent of email changes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
}
impl ResolvedIdentity {
	/// Builds an identity, normalizing the email.
	pub fn new(email: impl AsRef<str>, user_id: Option<String>) -> Self {
		Self { email: email.as_ref().trim().to_lowercase(), user_id }
	}

	/// Identity carrying nothing; hosts must treat it as an authorization failure.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Returns `true` when an email was resolved.
	pub fn is_resolved(&self) -> bool {
		!self.email.is_empty()
	}

	/// Converts an empty identity into [`Error::UnresolvedIdentity`].
	pub fn require(self) -> Result<Self> {
		if self.is_resolved() { Ok(self) } else { Err(Error::UnresolvedIdentity) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn email_is_lower_cased() {
		let identity = ResolvedIdentity::new(" User@Example.COM ", Some("oid-1".into()));

		assert_eq!(identity.email, "user@example.com");
		assert_eq!(identity.user_id.as_deref(), Some("oid-1"));
		assert!(identity.is_resolved());
	}

	#[test]
	fn empty_identity_fails_closed() {
		assert!(!ResolvedIdentity::empty().is_resolved());
		assert!(matches!(ResolvedIdentity::empty().require(), Err(Error::UnresolvedIdentity)));
	}
}
