//! Identity resolution: access token in, [`ResolvedIdentity`] out.
//!
//! [`IdentityResolver`] is built once from a configured [`ProviderConfig`] and then shared
//! across sessions. Each call is independent: no identity is cached, nothing is retried, and
//! the same token always yields the same result.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ClaimChain, ClaimSet, ResolvedIdentity},
	error::ConfigError,
	http::IdentityHttpClient,
	obs::{self, Diagnostic, ResolutionOutcome, ResolutionSink, ResolutionSpan, TracingSink},
	profile,
	provider::{ProviderConfig, ProviderEndpoints},
	verify::{JwksConfig, JwksKeyResolver, KeyResolver, SignaturePolicy},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Resolver backed by the crate's default reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestIdentityResolver = IdentityResolver<ReqwestHttpClient>;

/// Source the identity is read from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
	/// Decode the token's own claims (`email`, then `unique_name`; `oid`).
	#[default]
	Claims,
	/// Ask the profile endpoint (`mail`, `otherMails[0]`, then `userPrincipalName`; `id`).
	ProfileLookup,
}
impl ResolutionMode {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ResolutionMode::Claims => "claims",
			ResolutionMode::ProfileLookup => "profile_lookup",
		}
	}
}
impl Display for ResolutionMode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// What a resolution returns when no email could be found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
	/// Return [`Error::UnresolvedIdentity`].
	#[default]
	FailClosed,
	/// Return [`ResolvedIdentity::empty`] so the host can try another mechanism.
	EmptyIdentity,
}

/// Request-scoped limits for one resolution.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
	/// Deadline for the whole resolution, network calls included.
	pub timeout: Option<StdDuration>,
	/// Token the caller cancels to abandon the resolution.
	pub cancellation: Option<CancellationToken>,
}
impl RequestContext {
	/// Sets the deadline.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Attaches a cancellation token.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancellation = Some(token);

		self
	}

	/// Runs `fut` under this context.
	///
	/// Cancellation is checked first and wins over completion; an elapsed deadline yields
	/// [`Error::Timeout`]. `fut` is dropped in both cases.
	pub async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let bounded = async {
			match self.timeout {
				Some(limit) => match tokio::time::timeout(limit, fut).await {
					Ok(result) => result,
					Err(_) => Err(Error::Timeout),
				},
				None => fut.await,
			}
		};

		match &self.cancellation {
			Some(token) => tokio::select! {
				biased;
				_ = token.cancelled() => Err(Error::Cancelled),
				result = bounded => result,
			},
			None => bounded.await,
		}
	}
}

/// Resolves identities from access tokens for one configured provider.
pub struct IdentityResolver<C>
where
	C: ?Sized + IdentityHttpClient,
{
	/// HTTP client used for profile lookups.
	pub http_client: Arc<C>,
	/// Frozen provider configuration.
	pub config: Arc<ProviderConfig>,
	/// Identity source.
	pub mode: ResolutionMode,
	/// Signature handling for [`ResolutionMode::Claims`].
	pub signature: SignaturePolicy,
	/// Outcome when no email is found.
	pub unresolved: UnresolvedPolicy,
	/// Receiver of diagnostics.
	pub sink: Arc<dyn ResolutionSink>,
	endpoints: ProviderEndpoints,
}
impl<C> IdentityResolver<C>
where
	C: ?Sized + IdentityHttpClient,
{
	/// Login and redeem endpoints of the configured tenant.
	pub fn endpoints(&self) -> &ProviderEndpoints {
		&self.endpoints
	}

	/// Resolves the identity carried by `token`.
	pub async fn resolve(&self, token: &AccessToken) -> Result<ResolvedIdentity> {
		self.resolve_with(token, &RequestContext::default()).await
	}

	/// Resolves the identity carried by `token`, honoring `ctx`.
	pub async fn resolve_with(
		&self,
		token: &AccessToken,
		ctx: &RequestContext,
	) -> Result<ResolvedIdentity> {
		let span = ResolutionSpan::new(self.mode, "resolve");

		span.instrument(async {
			obs::record_resolution_outcome(self.mode, ResolutionOutcome::Attempt);

			let outcome = ctx.run(self.lookup(token)).await;

			self.finish(outcome)
		})
		.await
	}

	async fn lookup(&self, token: &AccessToken) -> Result<ResolvedIdentity> {
		if token.is_empty() {
			return Err(Error::MissingCredential);
		}

		match self.mode {
			ResolutionMode::Claims => self.resolve_claims(token).await,
			ResolutionMode::ProfileLookup => self.resolve_profile(token).await,
		}
	}

	async fn resolve_claims(&self, token: &AccessToken) -> Result<ResolvedIdentity> {
		let claims = ClaimSet::decode(token)?;

		self.signature.check(token, &claims).await?;

		let email = ClaimChain::EMAIL.resolve(&claims).ok_or(Error::UnresolvedIdentity)?;
		let user_id = ClaimChain::USER_ID.resolve(&claims).map(|hit| hit.value.to_owned());

		Ok(ResolvedIdentity::new(email.value, user_id))
	}

	async fn resolve_profile(&self, token: &AccessToken) -> Result<ResolvedIdentity> {
		let document =
			profile::fetch_profile(self.http_client.as_ref(), &self.config.profile_url, token)
				.await?;
		let email = document.email().ok_or(Error::UnresolvedIdentity)?;

		Ok(ResolvedIdentity::new(email, document.user_id().map(ToOwned::to_owned)))
	}

	fn finish(&self, outcome: Result<ResolvedIdentity>) -> Result<ResolvedIdentity> {
		match outcome {
			Ok(identity) => {
				obs::record_resolution_outcome(self.mode, ResolutionOutcome::Success);
				self.sink.resolved(self.mode, &identity);

				Ok(identity)
			},
			Err(err) => {
				obs::record_resolution_outcome(self.mode, ResolutionOutcome::Failure);
				self.sink.diagnostic(self.mode, &Diagnostic::from_error(&err));

				match (err, self.unresolved) {
					(Error::UnresolvedIdentity, UnresolvedPolicy::EmptyIdentity) =>
						Ok(ResolvedIdentity::empty()),
					(err, _) => Err(err),
				}
			},
		}
	}
}
#[cfg(feature = "reqwest")]
impl IdentityResolver<ReqwestHttpClient> {
	/// Starts a builder for `config`, which must already be configured.
	///
	/// Use [`IdentityResolverBuilder::build_with_http_client`] for other transports.
	pub fn builder(config: ProviderConfig) -> IdentityResolverBuilder {
		IdentityResolverBuilder::new(config)
	}
}
impl<C> Clone for IdentityResolver<C>
where
	C: ?Sized + IdentityHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			config: self.config.clone(),
			mode: self.mode,
			signature: self.signature.clone(),
			unresolved: self.unresolved,
			sink: self.sink.clone(),
			endpoints: self.endpoints.clone(),
		}
	}
}
impl<C> Debug for IdentityResolver<C>
where
	C: ?Sized + IdentityHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityResolver")
			.field("provider", &self.config.provider_name)
			.field("tenant", &self.config.tenant)
			.field("mode", &self.mode)
			.field("signature", &self.signature)
			.field("unresolved", &self.unresolved)
			.finish()
	}
}

/// Builder for [`IdentityResolver`].
///
/// Without an explicit [`SignaturePolicy`], claims-mode resolvers verify tokens against the
/// tenant's published signing keys, fetched through the resolver's own HTTP client. Issuer
/// rules left at [`IssuerRule::Provider`](crate::verify::IssuerRule::Provider) are bound to
/// the provider's tenant on build.
pub struct IdentityResolverBuilder {
	config: ProviderConfig,
	mode: ResolutionMode,
	signature: Option<SignaturePolicy>,
	audiences: Option<Vec<String>>,
	unresolved: UnresolvedPolicy,
	sink: Option<Arc<dyn ResolutionSink>>,
}
impl IdentityResolverBuilder {
	/// Creates a builder with the default claims mode and fail-closed policy.
	pub fn new(config: ProviderConfig) -> Self {
		Self {
			config,
			mode: ResolutionMode::default(),
			signature: None,
			audiences: None,
			unresolved: UnresolvedPolicy::default(),
			sink: None,
		}
	}

	/// Selects the identity source.
	pub fn mode(mut self, mode: ResolutionMode) -> Self {
		self.mode = mode;

		self
	}

	/// Overrides signature handling.
	pub fn signature(mut self, policy: SignaturePolicy) -> Self {
		self.signature = Some(policy);

		self
	}

	/// Verifies tokens with keys from `keys` and default validation rules.
	pub fn key_resolver(self, keys: Arc<dyn KeyResolver>) -> Self {
		self.signature(SignaturePolicy::verify(keys))
	}

	/// Accepts only tokens whose `aud` is one of `audiences`, typically the proxy's client id.
	///
	/// Overrides the audiences of whichever verifying policy the resolver ends up with.
	pub fn audiences<I, S>(mut self, audiences: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.audiences = Some(audiences.into_iter().map(Into::into).collect());

		self
	}

	/// Selects the outcome for tokens without an email.
	pub fn unresolved(mut self, policy: UnresolvedPolicy) -> Self {
		self.unresolved = policy;

		self
	}

	/// Routes diagnostics to `sink` instead of [`TracingSink`].
	pub fn sink(mut self, sink: Arc<dyn ResolutionSink>) -> Self {
		self.sink = Some(sink);

		self
	}

	/// Builds the resolver on the caller-provided transport.
	pub fn build_with_http_client<C>(
		self,
		http_client: impl Into<Arc<C>>,
	) -> Result<IdentityResolver<C>, ConfigError>
	where
		C: ?Sized + IdentityHttpClient,
	{
		let Self { config, mode, signature, audiences, unresolved, sink } = self;
		let endpoints = config.endpoints()?;
		let http_client = http_client.into();
		let sink = sink.unwrap_or_else(|| Arc::new(TracingSink));
		let signature = match (signature, mode) {
			(Some(policy), _) => policy,
			(None, ResolutionMode::Claims) => {
				let keys = JwksKeyResolver::<C>::with_http_client(
					JwksConfig::for_provider(&config),
					http_client.clone(),
				)?;

				SignaturePolicy::verify(Arc::new(keys))
			},
			// The profile endpoint authenticates the token itself.
			(None, ResolutionMode::ProfileLookup) => SignaturePolicy::Unverified,
		};
		let signature = signature.bind_to(&config).map_rules(|rules| match audiences {
			Some(audiences) => rules.with_audiences(audiences),
			None => rules,
		});

		if mode == ResolutionMode::Claims && !signature.is_verified() {
			sink.diagnostic(mode, &Diagnostic::VerificationDisabled);
		}

		Ok(IdentityResolver {
			http_client,
			config: Arc::new(config),
			mode,
			signature,
			unresolved,
			sink,
			endpoints,
		})
	}

	/// Builds the resolver with its own reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn build(self) -> Result<ReqwestIdentityResolver, ConfigError> {
		self.build_with_http_client(ReqwestHttpClient::try_default()?)
	}
}
impl Debug for IdentityResolverBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityResolverBuilder")
			.field("config", &self.config)
			.field("mode", &self.mode)
			.field("signature", &self.signature)
			.field("audiences", &self.audiences)
			.field("unresolved", &self.unresolved)
			.field("sink_set", &self.sink.is_some())
			.finish()
	}
}
