//! Caching fetcher for the platform's published signing keys.
//!
//! The key set is cached for the `Cache-Control: max-age` the endpoint advertises (clamped
//! to `[min_ttl, max_ttl]`), or `default_ttl` when absent. A token naming an unknown `kid`
//! forces one refetch to pick up key rollover, at most once per `rollover_cooldown`.
//! Concurrent refreshes collapse into a single request. Resolvers built for a provider only
//! serve keys to tokens whose `iss` sits under that provider's authority.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use jsonwebtoken::{
	DecodingKey,
	jwk::{Jwk, JwkSet},
};
use oauth2::http::{
	HeaderMap, Method, Request,
	header::{ACCEPT, CACHE_CONTROL},
};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{self, IdentityHttpClient},
	provider::{EndpointTemplate, ProviderConfig, ProviderConfigError},
	verify::{KeyFuture, KeyLookup, KeyResolver, VerificationError},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// JWKS resolver backed by the crate's default reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestJwksKeyResolver = JwksKeyResolver<ReqwestHttpClient>;

/// Fetch and cache settings for [`JwksKeyResolver`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwksConfig {
	/// Key set location.
	pub jwks_url: Url,
	/// TTL used when the endpoint sends no `max-age`.
	pub default_ttl: Duration,
	/// Lower clamp for advertised TTLs.
	pub min_ttl: Duration,
	/// Upper clamp for advertised TTLs.
	pub max_ttl: Duration,
	/// Minimum age of the cached set before an unknown `kid` triggers a refetch.
	pub rollover_cooldown: Duration,
	/// Largest accepted response body.
	///
	/// Checked once the transport has buffered the body, so it bounds what is parsed and
	/// cached rather than transport memory; cap the latter on the HTTP client.
	pub max_response_bytes: usize,
	/// Authority whose issuers may use this key set; `None` serves any issuer.
	pub issuer_authority: Option<EndpointTemplate>,
	/// Accept plain-HTTP key set URLs; for tests only.
	pub allow_http: bool,
}
impl JwksConfig {
	/// Settings for the tenant-scoped key set of `config`.
	pub fn for_provider(config: &ProviderConfig) -> Self {
		Self {
			jwks_url: config.jwks_url(),
			issuer_authority: Some(config.authority.clone()),
			..Self::default()
		}
	}

	/// Settings for an explicit key set URL.
	pub fn new(jwks_url: Url) -> Self {
		Self { jwks_url, ..Self::default() }
	}

	/// Overrides the rollover cooldown.
	pub fn with_rollover_cooldown(mut self, cooldown: Duration) -> Self {
		self.rollover_cooldown = cooldown;

		self
	}

	/// Overrides the response size limit.
	pub fn with_max_response_bytes(mut self, max: usize) -> Self {
		self.max_response_bytes = max;

		self
	}

	/// Restricts the key set to tokens issued under `authority`.
	pub fn with_issuer_authority(mut self, authority: EndpointTemplate) -> Self {
		self.issuer_authority = Some(authority);

		self
	}

	/// Allows plain-HTTP key set URLs.
	pub fn with_allow_http(mut self, allow: bool) -> Self {
		self.allow_http = allow;

		self
	}

	fn ttl_from(&self, headers: &HeaderMap) -> Duration {
		match max_age(headers) {
			Some(advertised) => advertised.clamp(self.min_ttl, self.max_ttl),
			None => self.default_ttl,
		}
	}
}
impl Default for JwksConfig {
	fn default() -> Self {
		Self {
			jwks_url: ProviderConfig::default().jwks_url(),
			default_ttl: Duration::hours(1),
			min_ttl: Duration::minutes(5),
			max_ttl: Duration::hours(24),
			rollover_cooldown: Duration::minutes(5),
			max_response_bytes: 1024 * 1024,
			issuer_authority: None,
			allow_http: false,
		}
	}
}

#[derive(Clone, Debug)]
struct CachedKeySet {
	keys: JwkSet,
	fetched_at: OffsetDateTime,
	expires_at: OffsetDateTime,
}

enum CacheProbe {
	Hit(Box<Jwk>),
	Unknown { fetched_at: OffsetDateTime },
	Stale,
}

/// [`KeyResolver`] that fetches the platform's JWK set over HTTP and caches it.
pub struct JwksKeyResolver<C>
where
	C: ?Sized + IdentityHttpClient,
{
	http_client: Arc<C>,
	config: JwksConfig,
	cache: RwLock<Option<CachedKeySet>>,
	refresh: AsyncMutex<()>,
	fetches: AtomicU64,
}
impl<C> JwksKeyResolver<C>
where
	C: ?Sized + IdentityHttpClient,
{
	/// Creates a resolver using the caller-provided transport.
	pub fn with_http_client(
		config: JwksConfig,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self, ConfigError> {
		if config.jwks_url.scheme() != "https" && !config.allow_http {
			return Err(ProviderConfigError::InsecureEndpoint {
				endpoint: "jwks",
				url: config.jwks_url.to_string(),
			}
			.into());
		}

		Ok(Self {
			http_client: http_client.into(),
			config,
			cache: RwLock::new(None),
			refresh: AsyncMutex::new(()),
			fetches: AtomicU64::new(0),
		})
	}

	/// Active settings.
	pub fn config(&self) -> &JwksConfig {
		&self.config
	}

	/// Number of settled key set requests so far.
	pub fn fetch_count(&self) -> u64 {
		self.fetches.load(Ordering::Acquire)
	}

	/// Drops the cached key set; the next lookup refetches.
	pub fn invalidate(&self) {
		*self.cache.write() = None;
	}

	async fn resolve(&self, lookup: &KeyLookup) -> Result<DecodingKey> {
		if !self.serves(lookup) {
			return Err(VerificationError::InvalidIssuer.into());
		}

		let observed = self.fetch_count();
		let now = OffsetDateTime::now_utc();

		match self.probe(lookup, now) {
			CacheProbe::Hit(jwk) => return decoding_key(&jwk),
			CacheProbe::Unknown { fetched_at }
				if now - fetched_at < self.config.rollover_cooldown =>
				return Err(key_not_found(lookup)),
			_ => {},
		}

		let _refresh = self.refresh.lock().await;

		// Another caller may have refreshed while this one waited.
		if self.fetch_count() == observed {
			self.refetch().await?;
		}

		match self.probe(lookup, OffsetDateTime::now_utc()) {
			CacheProbe::Hit(jwk) => decoding_key(&jwk),
			_ => Err(key_not_found(lookup)),
		}
	}

	fn serves(&self, lookup: &KeyLookup) -> bool {
		self.config.issuer_authority.as_ref().is_none_or(|authority| {
			lookup.issuer.as_deref().is_some_and(|issuer| authority.issues(issuer))
		})
	}

	fn probe(&self, lookup: &KeyLookup, now: OffsetDateTime) -> CacheProbe {
		let guard = self.cache.read();
		let Some(entry) = guard.as_ref() else {
			return CacheProbe::Stale;
		};

		if now >= entry.expires_at {
			return CacheProbe::Stale;
		}

		match find_jwk(&entry.keys, lookup) {
			Some(jwk) => CacheProbe::Hit(Box::new(jwk.clone())),
			None => CacheProbe::Unknown { fetched_at: entry.fetched_at },
		}
	}

	async fn refetch(&self) -> Result<()> {
		let fetched = self.fetch().await;

		// Bumped after the attempt settles; queued callers compare against it and skip.
		self.fetches.fetch_add(1, Ordering::AcqRel);

		fetched
	}

	async fn fetch(&self) -> Result<()> {
		let request = Request::builder()
			.method(Method::GET)
			.uri(self.config.jwks_url.as_str())
			.header(ACCEPT, "application/json")
			.body(Vec::new())
			.map_err(ConfigError::from)?;
		let response = http::send(self.http_client.as_ref(), "jwks", request).await?;
		let status = response.status();

		if !status.is_success() {
			return Err(VerificationError::KeySetStatus { status: status.as_u16() }.into());
		}
		if response.body().len() > self.config.max_response_bytes {
			return Err(
				VerificationError::KeySetTooLarge { max: self.config.max_response_bytes }.into()
			);
		}

		let keys: JwkSet = http::decode_json(response.body())
			.map_err(|source| VerificationError::KeySetDecode { source })?;
		let fetched_at = OffsetDateTime::now_utc();
		let expires_at = fetched_at + self.config.ttl_from(response.headers());

		#[cfg(feature = "tracing")]
		tracing::debug!(
			target: "azure_v2_identity",
			jwks_url = %self.config.jwks_url,
			keys = keys.keys.len(),
			"signing key set refreshed"
		);

		*self.cache.write() = Some(CachedKeySet { keys, fetched_at, expires_at });

		Ok(())
	}
}
#[cfg(feature = "reqwest")]
impl JwksKeyResolver<ReqwestHttpClient> {
	/// Creates a resolver backed by its own reqwest transport.
	pub fn new(config: JwksConfig) -> Result<Self, ConfigError> {
		Self::with_http_client(config, ReqwestHttpClient::try_default()?)
	}
}
impl<C> KeyResolver for JwksKeyResolver<C>
where
	C: ?Sized + IdentityHttpClient,
{
	fn resolve_key<'a>(&'a self, lookup: &'a KeyLookup) -> KeyFuture<'a, DecodingKey> {
		Box::pin(self.resolve(lookup))
	}
}
impl<C> Debug for JwksKeyResolver<C>
where
	C: ?Sized + IdentityHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JwksKeyResolver")
			.field("config", &self.config)
			.field("cached", &self.cache.read().is_some())
			.field("fetches", &self.fetch_count())
			.finish()
	}
}

fn find_jwk<'s>(set: &'s JwkSet, lookup: &KeyLookup) -> Option<&'s Jwk> {
	match lookup.key_id.as_deref() {
		Some(key_id) => set.find(key_id),
		None => set.keys.first(),
	}
}

fn decoding_key(jwk: &Jwk) -> Result<DecodingKey> {
	Ok(DecodingKey::from_jwk(jwk).map_err(VerificationError::InvalidKey)?)
}

fn key_not_found(lookup: &KeyLookup) -> Error {
	VerificationError::KeyNotFound { key_id: lookup.key_id.clone() }.into()
}

fn max_age(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers.get(CACHE_CONTROL)?.to_str().ok()?;

	raw.split(',').find_map(|directive| {
		let seconds = directive.trim().strip_prefix("max-age=")?.parse::<i64>().ok()?;

		Some(Duration::seconds(seconds))
	})
}
