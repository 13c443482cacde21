// crates.io
use serde_json::json;
// self
use azure_v2_identity::{
	_preludet::*,
	auth::{AccessToken, ResolvedIdentity},
	jsonwebtoken::{Algorithm, DecodingKey},
	obs::{Diagnostic, MemorySink},
	resolver::{IdentityResolver, ReqwestIdentityResolver, ResolutionMode, UnresolvedPolicy},
	provider::ProviderConfig,
	verify::{SignaturePolicy, StaticKeyResolver, ValidationRules, VerificationError},
};

fn unverified(policy: UnresolvedPolicy, sink: &MemorySink) -> ReqwestIdentityResolver {
	IdentityResolver::builder(configured_provider())
		.signature(SignaturePolicy::Unverified)
		.unresolved(policy)
		.sink(Arc::new(sink.clone()))
		.build_with_http_client(test_reqwest_http_client())
		.expect("Unverified resolver should build.")
}

fn hs256_policy() -> SignaturePolicy {
	let keys =
		StaticKeyResolver::default().with_key(TEST_KEY_ID, DecodingKey::from_secret(TEST_SECRET));

	SignaturePolicy::verify(Arc::new(keys))
		.with_rules(ValidationRules::default().with_algorithms([Algorithm::HS256]))
}

fn verified_for(config: ProviderConfig, sink: &MemorySink) -> ReqwestIdentityResolver {
	IdentityResolver::builder(config)
		.signature(hs256_policy())
		.sink(Arc::new(sink.clone()))
		.build_with_http_client(test_reqwest_http_client())
		.expect("Verified resolver should build.")
}

fn verified(sink: &MemorySink) -> ReqwestIdentityResolver {
	verified_for(configured_provider(), sink)
}

fn tenant_provider(tenant: &str) -> ProviderConfig {
	let mut config = ProviderConfig::default();

	config.configure(tenant);

	config
}

#[tokio::test]
async fn email_claim_is_lower_cased_and_wins() {
	let sink = MemorySink::default();
	let resolver = verified(&sink);
	let token = signed_token(issued_claims(json!({
		"email": "User@Example.com",
		"unique_name": "other@example.com",
		"oid": "00000000-0000-0000-0000-000000000001",
	})));
	let identity = resolver.resolve(&token).await.expect("Signed token should resolve.");

	assert_eq!(identity.email, "user@example.com");
	assert_eq!(identity.user_id.as_deref(), Some("00000000-0000-0000-0000-000000000001"));
	assert!(sink.diagnostics().is_empty());
}

#[tokio::test]
async fn unique_name_is_the_fallback() {
	let sink = MemorySink::default();
	let resolver = unverified(UnresolvedPolicy::FailClosed, &sink);

	for claims in [
		json!({ "unique_name": "A@B.com" }),
		json!({ "email": "", "unique_name": "A@B.com" }),
		json!({ "email": null, "unique_name": "A@B.com" }),
	] {
		let identity = resolver
			.resolve(&unsigned_token(claims))
			.await
			.expect("Token with unique_name should resolve.");

		assert_eq!(identity, ResolvedIdentity::new("a@b.com", None));
	}
}

#[tokio::test]
async fn missing_email_fails_closed_by_default() {
	let sink = MemorySink::default();
	let resolver = unverified(UnresolvedPolicy::FailClosed, &sink);
	let err = resolver
		.resolve(&unsigned_token(json!({ "oid": "oid-1", "name": "No Mail" })))
		.await
		.expect_err("Token without email claims should be rejected.");

	assert!(matches!(err, Error::UnresolvedIdentity));
	assert_eq!(sink.lines().last().map(String::as_str), Some("failed to get email address"));
}

#[tokio::test]
async fn missing_email_can_fall_through_with_an_empty_identity() {
	let sink = MemorySink::default();
	let resolver = unverified(UnresolvedPolicy::EmptyIdentity, &sink);
	let identity = resolver
		.resolve(&unsigned_token(json!({ "oid": "oid-1" })))
		.await
		.expect("Empty identity policy should not fail.");

	assert_eq!(identity, ResolvedIdentity::empty());
	assert!(!identity.is_resolved());
	assert_eq!(
		sink.diagnostics().last(),
		Some(&(ResolutionMode::Claims, Diagnostic::EmailUnresolved))
	);
}

#[tokio::test]
async fn empty_token_fails_fast() {
	let sink = MemorySink::default();
	let resolver = verified(&sink);

	for raw in ["", "  "] {
		let err = resolver
			.resolve(&AccessToken::new(raw))
			.await
			.expect_err("Empty token should be rejected.");

		assert!(matches!(err, Error::MissingCredential));
	}

	// The empty-identity policy only covers missing claims.
	let resolver = unverified(UnresolvedPolicy::EmptyIdentity, &sink);

	assert!(matches!(
		resolver.resolve(&AccessToken::new("")).await,
		Err(Error::MissingCredential)
	));
}

#[tokio::test]
async fn malformed_tokens_are_claim_decode_failures() {
	let sink = MemorySink::default();
	let resolver = unverified(UnresolvedPolicy::EmptyIdentity, &sink);

	for raw in ["not-a-jwt", "a.%%%.c", "e30.bm90LWpzb24.sig", "e30.WzFd.sig"] {
		let err = resolver
			.resolve(&AccessToken::new(raw))
			.await
			.expect_err("Malformed token should be rejected.");

		assert!(matches!(err, Error::ClaimDecode(_)), "Unexpected error for {raw}: {err:?}.");
	}
}

#[tokio::test]
async fn forged_and_expired_tokens_are_rejected() {
	let sink = MemorySink::default();
	let resolver = verified(&sink);
	let forged = unsigned_token(issued_claims(json!({ "email": "admin@example.com" })));

	assert!(matches!(resolver.resolve(&forged).await, Err(Error::Verification(_))));

	let expired = signed_token(issued_claims(json!({ "email": "user@example.com", "exp": 1_000 })));

	assert!(matches!(resolver.resolve(&expired).await, Err(Error::Verification(_))));
	assert!(sink.lines().iter().all(|line| line.starts_with("access token rejected")));
}

#[tokio::test]
async fn tokens_from_other_tenants_are_rejected() {
	let sink = MemorySink::default();
	let resolver = verified_for(tenant_provider("contoso"), &sink);
	let foreign = signed_token(issued_claims(json!({
		"email": "ceo@contoso.com",
		"iss": "https://login.microsoftonline.com/attacker-tenant/v2.0",
		"tid": "attacker-tenant",
		"aud": "api://some-other-app",
	})));
	let err = resolver
		.resolve(&foreign)
		.await
		.expect_err("Token issued by another tenant should be rejected.");

	assert!(matches!(err, Error::Verification(VerificationError::InvalidIssuer)));

	let resolver = verified_for(tenant_provider(TEST_TENANT_ID), &sink);
	let identity = resolver
		.resolve(&signed_token(issued_claims(json!({ "email": "ceo@contoso.com" }))))
		.await
		.expect("Token issued by the configured tenant should resolve.");

	assert_eq!(identity.email, "ceo@contoso.com");
}

#[tokio::test]
async fn multi_tenant_resolvers_bind_the_issuer_to_the_token_tenant() {
	let sink = MemorySink::default();
	let resolver = verified(&sink);
	let mismatched = signed_token(issued_claims(json!({
		"email": "ceo@contoso.com",
		"iss": "https://login.microsoftonline.com/attacker-tenant/v2.0",
	})));

	assert!(matches!(
		resolver.resolve(&mismatched).await,
		Err(Error::Verification(VerificationError::InvalidIssuer))
	));

	let other_tenant = signed_token(json!({
		"email": "user@fabrikam.com",
		"iss": "https://login.microsoftonline.com/fabrikam-tenant/v2.0",
		"tid": "fabrikam-tenant",
		"exp": future_exp(),
	}));
	let identity = resolver
		.resolve(&other_tenant)
		.await
		.expect("Self-consistent token of any tenant should resolve on common.");

	assert_eq!(identity.email, "user@fabrikam.com");
}

#[tokio::test]
async fn configured_audiences_are_enforced() {
	let sink = MemorySink::default();
	let resolver = IdentityResolver::builder(configured_provider())
		.signature(hs256_policy())
		.audiences(["api://proxy"])
		.sink(Arc::new(sink.clone()))
		.build_with_http_client(test_reqwest_http_client())
		.expect("Verified resolver should build.");

	for claims in [json!({ "email": "a@b.c", "aud": "api://other" }), json!({ "email": "a@b.c" })] {
		let err = resolver
			.resolve(&signed_token(issued_claims(claims)))
			.await
			.expect_err("Token for another audience should be rejected.");

		assert!(matches!(err, Error::Verification(VerificationError::InvalidAudience)));
	}

	resolver
		.resolve(&signed_token(issued_claims(json!({ "email": "a@b.c", "aud": "api://proxy" }))))
		.await
		.expect("Token for the proxy audience should resolve.");
}

#[tokio::test]
async fn resolution_is_deterministic() {
	let sink = MemorySink::default();
	let resolver = verified(&sink);
	let token = signed_token(issued_claims(json!({ "email": "Same@Example.com" })));
	let first = resolver.resolve(&token).await.expect("First resolution should succeed.");
	let second = resolver.resolve(&token).await.expect("Second resolution should succeed.");

	assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolutions_do_not_interfere() {
	let sink = MemorySink::default();
	let resolver = verified(&sink);
	let handles = (0..32)
		.map(|i| {
			let resolver = resolver.clone();
			let token = signed_token(issued_claims(json!({
				"email": format!("User{i}@Example.com"),
				"oid": format!("oid-{i}"),
			})));

			tokio::spawn(async move { (i, resolver.resolve(&token).await) })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let (i, result) = handle.await.expect("Resolution task should not panic.");
		let identity = result.expect("Concurrent resolution should succeed.");

		assert_eq!(identity.email, format!("user{i}@example.com"));
		assert_eq!(identity.user_id, Some(format!("oid-{i}")));
	}
}
