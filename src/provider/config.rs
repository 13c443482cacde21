//! Provider configuration, its builder, and the tenant-aware `configure` step.

// self
use crate::{
	_prelude::*,
	provider::{EndpointTemplate, ProviderEndpoints, Tenant},
};

/// Provider name reported to the host's plugin registry.
pub const PROVIDER_NAME: &str = "azure.v2";
/// Scope requested when none is configured.
pub const DEFAULT_SCOPE: &str = "openid";
/// Microsoft Graph profile of the signed-in user.
pub const DEFAULT_PROFILE_URL: &str = "https://graph.microsoft.com/me";

/// Errors raised while constructing or reading provider configuration.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ProviderConfigError {
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Authority cannot carry path segments.
	#[error("Authority cannot be used as a base URL: {url}.")]
	InvalidAuthority {
		/// Authority URL that failed validation.
		url: String,
	},
	/// Login/redeem endpoints were read before [`ProviderConfig::configure`] ran.
	#[error("Provider endpoints are not configured; call `configure` first.")]
	NotConfigured,
}

/// Provider configuration shared with the host proxy.
///
/// Built once at registration, configured once with the tenant, then frozen (typically
/// behind an `Arc`). `configure` takes `&mut self`, so no request handler can observe a
/// half-configured value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
	/// Name reported to the host's provider registry.
	pub provider_name: String,
	/// Tenant the endpoints were derived for.
	pub tenant: Tenant,
	/// Authorization endpoint; `None` until configured unless supplied explicitly.
	pub login_url: Option<Url>,
	/// Token endpoint; `None` until configured unless supplied explicitly.
	pub redeem_url: Option<Url>,
	/// Profile endpoint used by the remote lookup mode.
	pub profile_url: Url,
	/// Scope requested at login.
	pub scope: String,
	/// Authority the endpoints are templated from.
	pub authority: EndpointTemplate,
}
impl ProviderConfig {
	/// Creates a new builder.
	pub fn builder() -> ProviderConfigBuilder {
		ProviderConfigBuilder::default()
	}

	/// Sets the tenant and derives any login/redeem URL not supplied explicitly.
	///
	/// A blank tenant becomes [`Tenant::COMMON`]. URLs already present are preserved, so
	/// calling this more than once never overwrites an earlier derivation.
	pub fn configure(&mut self, tenant: &str) {
		self.tenant = Tenant::new(tenant);

		if self.login_url.is_none() {
			self.login_url = Some(self.authority.authorize_url(&self.tenant));
		}
		if self.redeem_url.is_none() {
			self.redeem_url = Some(self.authority.token_url(&self.tenant));
		}
	}

	/// Returns `true` once both login and redeem URLs exist.
	pub fn is_configured(&self) -> bool {
		self.login_url.is_some() && self.redeem_url.is_some()
	}

	/// Login and redeem endpoints for the host's code exchange.
	pub fn endpoints(&self) -> Result<ProviderEndpoints, ProviderConfigError> {
		match (&self.login_url, &self.redeem_url) {
			(Some(authorization), Some(token)) => Ok(ProviderEndpoints {
				authorization: authorization.clone(),
				token: token.clone(),
			}),
			_ => Err(ProviderConfigError::NotConfigured),
		}
	}

	/// Signing key set for the configured tenant.
	pub fn jwks_url(&self) -> Url {
		self.authority.jwks_url(&self.tenant)
	}
}
impl Default for ProviderConfig {
	fn default() -> Self {
		Self {
			provider_name: PROVIDER_NAME.into(),
			tenant: Tenant::default(),
			login_url: None,
			redeem_url: None,
			profile_url: Url::parse(DEFAULT_PROFILE_URL)
				.expect("Default profile URL must be a valid URL."),
			scope: DEFAULT_SCOPE.into(),
			authority: EndpointTemplate::default(),
		}
	}
}

/// Builder for [`ProviderConfig`] values.
#[derive(Debug, Default)]
pub struct ProviderConfigBuilder {
	/// Explicit authorization endpoint, kept by `configure`.
	pub login_url: Option<Url>,
	/// Explicit token endpoint, kept by `configure`.
	pub redeem_url: Option<Url>,
	/// Profile endpoint override.
	pub profile_url: Option<Url>,
	/// Scope override; blank values fall back to [`DEFAULT_SCOPE`].
	pub scope: Option<String>,
	/// Authority override.
	pub authority: Option<EndpointTemplate>,
}
impl ProviderConfigBuilder {
	/// Sets an explicit authorization endpoint.
	pub fn login_url(mut self, url: Url) -> Self {
		self.login_url = Some(url);

		self
	}

	/// Sets an explicit token endpoint.
	pub fn redeem_url(mut self, url: Url) -> Self {
		self.redeem_url = Some(url);

		self
	}

	/// Overrides the profile endpoint.
	pub fn profile_url(mut self, url: Url) -> Self {
		self.profile_url = Some(url);

		self
	}

	/// Overrides the requested scope.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Overrides the authority used for endpoint templating.
	pub fn authority(mut self, authority: EndpointTemplate) -> Self {
		self.authority = Some(authority);

		self
	}

	/// Consumes the builder, applying provider defaults and validating explicit endpoints.
	///
	/// The result is not configured yet; call [`ProviderConfig::configure`] with the tenant.
	pub fn build(self) -> Result<ProviderConfig, ProviderConfigError> {
		let defaults = ProviderConfig::default();
		let config = ProviderConfig {
			login_url: self.login_url,
			redeem_url: self.redeem_url,
			profile_url: self.profile_url.unwrap_or(defaults.profile_url),
			scope: self.scope.filter(|scope| !scope.trim().is_empty()).unwrap_or(defaults.scope),
			authority: self.authority.unwrap_or(defaults.authority),
			..defaults
		};

		if let Some(url) = config.login_url.as_ref() {
			validate_endpoint("login", url)?;
		}
		if let Some(url) = config.redeem_url.as_ref() {
			validate_endpoint("redeem", url)?;
		}

		validate_endpoint("profile", &config.profile_url)?;

		Ok(config)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderConfigError> {
	if url.scheme() != "https" {
		Err(ProviderConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}
