//! Token signature verification.
//!
//! Verification is an explicit [`SignaturePolicy`].
//! [`SignaturePolicy::verify`] checks the signature with a key supplied by an injected
//! [`KeyResolver`] and validates `exp`/`nbf`, the issuer per [`IssuerRule`], and an optional
//! audience allow-list. Signing keys are shared by every tenant of an authority, so a valid
//! signature alone proves nothing about who the token was issued for; the issuer check is
//! what ties a token to the configured tenant.
//! [`SignaturePolicy::Unverified`] trusts any well-formed token and is meant for hosts that
//! verify tokens elsewhere; resolvers built with it log a warning.
//!
//! `jwks` fetches and caches the platform's published key set; `fixed` serves pinned keys.

pub mod fixed;
pub mod jwks;

pub use fixed::*;
pub use jwks::*;

// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ClaimSet},
	provider::{EndpointTemplate, ProviderConfig, Tenant},
};

/// Future returned by [`KeyResolver`] implementations.
pub type KeyFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Capability that produces the key a token must be verified with.
pub trait KeyResolver
where
	Self: Send + Sync,
{
	/// Resolves the verification key for the token described by `lookup`.
	fn resolve_key<'a>(&'a self, lookup: &'a KeyLookup) -> KeyFuture<'a, DecodingKey>;
}

/// Token facts a [`KeyResolver`] selects a key by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyLookup {
	/// Unverified `iss` claim.
	pub issuer: Option<String>,
	/// JOSE `kid` header.
	pub key_id: Option<String>,
	/// JOSE `alg` header.
	pub algorithm: Algorithm,
}

/// Failures raised while verifying a token.
#[derive(Debug, ThisError)]
pub enum VerificationError {
	/// JOSE header is missing or malformed.
	#[error("Token header could not be decoded.")]
	Header(#[source] jsonwebtoken::errors::Error),
	/// Header algorithm is not in the allow-list.
	#[error("Token algorithm {algorithm:?} is not allowed.")]
	AlgorithmNotAllowed {
		/// Algorithm named by the token.
		algorithm: Algorithm,
	},
	/// No key matches the token's key id.
	#[error("No signing key matches key id {key_id:?}.")]
	KeyNotFound {
		/// Key id named by the token.
		key_id: Option<String>,
	},
	/// Key material could not be turned into a verification key.
	#[error("Signing key could not be used.")]
	InvalidKey(#[source] jsonwebtoken::errors::Error),
	/// Signature does not match.
	#[error("Token signature is invalid.")]
	InvalidSignature,
	/// `exp` is in the past.
	#[error("Token has expired.")]
	Expired,
	/// `nbf` is in the future.
	#[error("Token is not valid yet.")]
	NotYetValid,
	/// `iss` is not trusted.
	#[error("Token issuer is not trusted.")]
	InvalidIssuer,
	/// `aud` is not accepted.
	#[error("Token audience is not accepted.")]
	InvalidAudience,
	/// Any other rejection reported by the JWT library.
	#[error("Token was rejected.")]
	Rejected(#[source] jsonwebtoken::errors::Error),
	/// Key set endpoint answered with a non-success status.
	#[error("Signing key set endpoint returned HTTP {status}.")]
	KeySetStatus {
		/// HTTP status code.
		status: u16,
	},
	/// Key set body exceeded the configured size limit.
	#[error("Signing key set exceeds {max} bytes.")]
	KeySetTooLarge {
		/// Maximum accepted body size.
		max: usize,
	},
	/// Key set body is not a JWK set.
	#[error("Signing key set is malformed.")]
	KeySetDecode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl From<jsonwebtoken::errors::Error> for VerificationError {
	fn from(e: jsonwebtoken::errors::Error) -> Self {
		match e.kind() {
			ErrorKind::InvalidSignature => Self::InvalidSignature,
			ErrorKind::ExpiredSignature => Self::Expired,
			ErrorKind::ImmatureSignature => Self::NotYetValid,
			ErrorKind::InvalidIssuer => Self::InvalidIssuer,
			ErrorKind::InvalidAudience => Self::InvalidAudience,
			ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => Self::InvalidIssuer,
			ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => Self::InvalidAudience,
			_ => Self::Rejected(e),
		}
	}
}

/// How the `iss` claim is checked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum IssuerRule {
	/// Derived from the provider when the resolver is built; rejects every token until then.
	#[default]
	Provider,
	/// `iss` must be one of these values.
	AllowList(Vec<String>),
	/// `iss` must equal `{authority}/{tid}/v2.0` for the token's own `tid` claim.
	TenantBound(EndpointTemplate),
	/// Any issuer is accepted.
	Any,
}
impl IssuerRule {
	/// Issuer rule for tokens of `config`'s tenant.
	///
	/// A specific tenant pins the single issuer `{authority}/{tenant}/v2.0`; the platform
	/// stamps tenant ids there, so tenants configured by domain name need an explicit
	/// [`IssuerRule::AllowList`]. Multi-tenant aliases bind the issuer to the token's `tid`.
	pub fn for_provider(config: &ProviderConfig) -> Self {
		if config.tenant.is_multi_tenant() {
			Self::TenantBound(config.authority.clone())
		} else {
			Self::AllowList(vec![config.authority.issuer(&config.tenant).to_string()])
		}
	}

	fn expected(&self, claims: &ClaimSet) -> Result<Option<Vec<String>>, VerificationError> {
		match self {
			Self::Provider => Err(VerificationError::InvalidIssuer),
			Self::AllowList(issuers) => Ok(Some(issuers.clone())),
			Self::TenantBound(authority) => {
				let tenant_id = claims.tenant_id().ok_or(VerificationError::InvalidIssuer)?;

				Ok(Some(vec![authority.issuer(&Tenant::new(tenant_id)).to_string()]))
			},
			Self::Any => Ok(None),
		}
	}
}

/// Claim checks applied on top of the signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationRules {
	/// Accepted signature algorithms.
	pub algorithms: Vec<Algorithm>,
	/// Issuer check.
	pub issuer: IssuerRule,
	/// Accepted audiences; empty skips the audience check.
	pub audiences: Vec<String>,
	/// Clock skew tolerated for `exp` and `nbf`.
	pub leeway: Duration,
}
impl ValidationRules {
	/// Restricts accepted issuers to `issuers`.
	pub fn with_issuers<I, S>(self, issuers: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.with_issuer_rule(IssuerRule::AllowList(issuers.into_iter().map(Into::into).collect()))
	}

	/// Replaces the issuer check.
	pub fn with_issuer_rule(mut self, rule: IssuerRule) -> Self {
		self.issuer = rule;

		self
	}

	/// Restricts accepted audiences.
	pub fn with_audiences<I, S>(mut self, audiences: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.audiences = audiences.into_iter().map(Into::into).collect();

		self
	}

	/// Replaces the accepted algorithms.
	pub fn with_algorithms(mut self, algorithms: impl Into<Vec<Algorithm>>) -> Self {
		self.algorithms = algorithms.into();

		self
	}

	/// Overrides the tolerated clock skew.
	pub fn with_leeway(mut self, leeway: Duration) -> Self {
		self.leeway = if leeway.is_negative() { Duration::ZERO } else { leeway };

		self
	}

	/// Replaces an unbound [`IssuerRule::Provider`] with the rule for `config`.
	pub fn bind_to(mut self, config: &ProviderConfig) -> Self {
		if self.issuer == IssuerRule::Provider {
			self.issuer = IssuerRule::for_provider(config);
		}

		self
	}

	fn validation(
		&self,
		algorithm: Algorithm,
		claims: &ClaimSet,
	) -> Result<Validation, VerificationError> {
		let mut validation = Validation::new(algorithm);

		validation.algorithms = self.algorithms.clone();
		validation.leeway = self.leeway.whole_seconds().unsigned_abs();
		validation.validate_nbf = true;

		if self.audiences.is_empty() {
			validation.validate_aud = false;
		} else {
			validation.set_audience(&self.audiences);
			validation.required_spec_claims.insert("aud".into());
		}
		if let Some(issuers) = self.issuer.expected(claims)? {
			validation.set_issuer(&issuers);
			validation.required_spec_claims.insert("iss".into());
		}

		Ok(validation)
	}
}
impl Default for ValidationRules {
	fn default() -> Self {
		Self {
			algorithms: vec![Algorithm::RS256],
			issuer: IssuerRule::default(),
			audiences: Vec::new(),
			leeway: Duration::seconds(60),
		}
	}
}

/// How the resolver treats token signatures.
#[derive(Clone)]
pub enum SignaturePolicy {
	/// Verify every token with a key from `keys`.
	Verify {
		/// Key source.
		keys: Arc<dyn KeyResolver>,
		/// Claim checks applied after the signature.
		rules: ValidationRules,
	},
	/// Trust any well-formed token. Only for hosts that verify tokens upstream.
	Unverified,
}
impl SignaturePolicy {
	/// Verifies tokens with `keys` and the default [`ValidationRules`].
	pub fn verify(keys: Arc<dyn KeyResolver>) -> Self {
		Self::Verify { keys, rules: ValidationRules::default() }
	}

	/// Replaces the validation rules; no effect on [`SignaturePolicy::Unverified`].
	pub fn with_rules(self, rules: ValidationRules) -> Self {
		self.map_rules(|_| rules)
	}

	/// Binds provider-derived rules to `config`; see [`ValidationRules::bind_to`].
	pub fn bind_to(self, config: &ProviderConfig) -> Self {
		self.map_rules(|rules| rules.bind_to(config))
	}

	pub(crate) fn map_rules(self, f: impl FnOnce(ValidationRules) -> ValidationRules) -> Self {
		match self {
			Self::Verify { keys, rules } => Self::Verify { keys, rules: f(rules) },
			Self::Unverified => Self::Unverified,
		}
	}

	/// Returns `true` when signatures are checked.
	pub fn is_verified(&self) -> bool {
		matches!(self, Self::Verify { .. })
	}

	/// Checks `token`, whose payload already decoded into `claims`.
	pub async fn check(&self, token: &AccessToken, claims: &ClaimSet) -> Result<()> {
		let Self::Verify { keys, rules } = self else {
			return Ok(());
		};
		let header =
			jsonwebtoken::decode_header(token.expose()).map_err(VerificationError::Header)?;

		if !rules.algorithms.contains(&header.alg) {
			return Err(VerificationError::AlgorithmNotAllowed { algorithm: header.alg }.into());
		}

		let validation = rules.validation(header.alg, claims)?;
		let lookup = KeyLookup {
			issuer: claims.issuer().map(ToOwned::to_owned),
			key_id: header.kid,
			algorithm: header.alg,
		};
		let key = keys.resolve_key(&lookup).await?;

		jsonwebtoken::decode::<ClaimSet>(token.expose(), &key, &validation)
			.map_err(VerificationError::from)?;

		Ok(())
	}
}
impl Debug for SignaturePolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Verify { rules, .. } =>
				f.debug_struct("Verify").field("rules", rules).finish_non_exhaustive(),
			Self::Unverified => f.write_str("Unverified"),
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::_preludet::*;

	fn hs256_rules() -> ValidationRules {
		ValidationRules::default().with_algorithms([Algorithm::HS256])
	}

	fn hs256_policy(secret: &[u8]) -> SignaturePolicy {
		let keys =
			StaticKeyResolver::default().with_key(TEST_KEY_ID, DecodingKey::from_secret(secret));

		SignaturePolicy::verify(Arc::new(keys))
			.with_rules(hs256_rules())
			.bind_to(&configured_provider())
	}

	async fn check(policy: &SignaturePolicy, token: &AccessToken) -> Result<()> {
		let claims = ClaimSet::decode(token).expect("Test token payload should decode.");

		policy.check(token, &claims).await
	}

	fn tenant_provider(tenant: &str) -> ProviderConfig {
		let mut config = ProviderConfig::default();

		config.configure(tenant);

		config
	}

	#[tokio::test]
	async fn valid_signature_is_accepted() {
		let token = signed_token(issued_claims(json!({ "email": "a@b.c" })));

		check(&hs256_policy(TEST_SECRET), &token).await.expect("Signed token should verify.");
	}

	#[tokio::test]
	async fn wrong_key_is_rejected() {
		let token = signed_token(issued_claims(json!({ "email": "a@b.c" })));
		let err = check(&hs256_policy(b"another-secret-another-secret-00"), &token)
			.await
			.expect_err("Token signed with another key should be rejected.");

		assert!(matches!(err, Error::Verification(VerificationError::InvalidSignature)));
	}

	#[tokio::test]
	async fn expired_tokens_are_rejected() {
		let token = signed_token(issued_claims(json!({ "email": "a@b.c", "exp": 1_000 })));
		let err = check(&hs256_policy(TEST_SECRET), &token)
			.await
			.expect_err("Expired token should be rejected.");

		assert!(matches!(err, Error::Verification(VerificationError::Expired)));
	}

	#[tokio::test]
	async fn disallowed_algorithms_never_reach_the_key_resolver() {
		let token = signed_token(issued_claims(json!({ "email": "a@b.c" })));
		let policy = SignaturePolicy::verify(Arc::new(StaticKeyResolver::default()));
		let err = check(&policy, &token).await.expect_err("HS256 is not allowed by default.");

		assert!(matches!(
			err,
			Error::Verification(VerificationError::AlgorithmNotAllowed {
				algorithm: Algorithm::HS256
			})
		));
	}

	#[tokio::test]
	async fn unbound_issuer_rule_rejects_everything() {
		let token = signed_token(issued_claims(json!({ "email": "a@b.c" })));
		let keys = StaticKeyResolver::default()
			.with_key(TEST_KEY_ID, DecodingKey::from_secret(TEST_SECRET));
		let policy = SignaturePolicy::verify(Arc::new(keys)).with_rules(hs256_rules());
		let err = check(&policy, &token).await.expect_err("Unbound issuer rule should reject.");

		assert!(matches!(err, Error::Verification(VerificationError::InvalidIssuer)));
		assert_eq!(
			hs256_rules().with_issuer_rule(IssuerRule::Any).bind_to(&configured_provider()).issuer,
			IssuerRule::Any
		);
	}

	#[test]
	fn provider_rules_follow_the_tenant() {
		assert_eq!(
			IssuerRule::for_provider(&tenant_provider(TEST_TENANT_ID)),
			IssuerRule::AllowList(vec![test_issuer()])
		);

		for alias in ["", "organizations", "consumers"] {
			assert_eq!(
				IssuerRule::for_provider(&tenant_provider(alias)),
				IssuerRule::TenantBound(EndpointTemplate::default())
			);
		}
	}

	#[tokio::test]
	async fn multi_tenant_issuer_must_match_the_token_tenant() {
		let policy = hs256_policy(TEST_SECRET);

		for claims in [
			json!({ "email": "a@b.c", "tid": "other-tenant" }),
			json!({ "email": "a@b.c", "iss": "https://sts.windows.net/attacker/" }),
			json!({ "email": "a@b.c", "iss": null, "tid": TEST_TENANT_ID }),
		] {
			let mut claims = issued_claims(claims);

			if let Some(object) = claims.as_object_mut() {
				object.retain(|_, value| !value.is_null());
			}

			let err = check(&policy, &signed_token(claims))
				.await
				.expect_err("Issuer outside the token tenant should be rejected.");

			assert!(matches!(err, Error::Verification(VerificationError::InvalidIssuer)));
		}

		let no_tenant = json!({ "email": "a@b.c", "iss": test_issuer(), "exp": future_exp() });
		let err = check(&policy, &signed_token(no_tenant))
			.await
			.expect_err("Token without a tenant id should be rejected.");

		assert!(matches!(err, Error::Verification(VerificationError::InvalidIssuer)));
	}

	#[tokio::test]
	async fn issuer_and_audience_allow_lists_apply() {
		let token = signed_token(issued_claims(json!({
			"email": "a@b.c",
			"iss": "https://login.microsoftonline.com/tenant-1/v2.0",
			"aud": "api://proxy",
		})));
		let rules = hs256_rules().with_issuers(["https://login.microsoftonline.com/tenant-2/v2.0"]);
		let err = check(&hs256_policy(TEST_SECRET).with_rules(rules.clone()), &token)
			.await
			.expect_err("Untrusted issuer should be rejected.");

		assert!(matches!(err, Error::Verification(VerificationError::InvalidIssuer)));

		let rules = rules
			.with_issuers(["https://login.microsoftonline.com/tenant-1/v2.0"])
			.with_audiences(["api://other"]);
		let err = check(&hs256_policy(TEST_SECRET).with_rules(rules.clone()), &token)
			.await
			.expect_err("Unexpected audience should be rejected.");

		assert!(matches!(err, Error::Verification(VerificationError::InvalidAudience)));

		check(&hs256_policy(TEST_SECRET).with_rules(rules.with_audiences(["api://proxy"])), &token)
			.await
			.expect("Matching issuer and audience should verify.");
	}

	#[tokio::test]
	async fn allow_listed_claims_are_required() {
		let rules = hs256_rules().with_issuers([test_issuer()]).with_audiences(["api://proxy"]);
		let policy = hs256_policy(TEST_SECRET).with_rules(rules);
		let no_issuer = json!({ "email": "a@b.c", "aud": "api://proxy", "exp": future_exp() });
		let err = check(&policy, &signed_token(no_issuer))
			.await
			.expect_err("Missing issuer should be rejected.");

		assert!(matches!(err, Error::Verification(VerificationError::InvalidIssuer)));

		let err = check(&policy, &signed_token(issued_claims(json!({ "email": "a@b.c" }))))
			.await
			.expect_err("Missing audience should be rejected.");

		assert!(matches!(err, Error::Verification(VerificationError::InvalidAudience)));
	}

	#[tokio::test]
	async fn unverified_policy_accepts_unsigned_tokens() {
		let token = unsigned_token(json!({ "email": "a@b.c" }));

		check(&SignaturePolicy::Unverified, &token)
			.await
			.expect("Unverified policy should accept.");
		assert!(!SignaturePolicy::Unverified.is_verified());
	}
}
