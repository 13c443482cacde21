//! Tenant-aware endpoint templating for the Microsoft identity platform v2.0.
//!
//! Every endpoint is derived as `{authority}/{tenant}/{tail}`. The tenant is inserted as a
//! single percent-encoded path segment and is otherwise not validated; the platform rejects
//! unknown tenants at authorization time.

// crates.io
use oauth2::{AuthUrl, TokenUrl};
// self
use crate::{_prelude::*, provider::ProviderConfigError};

/// Default authority for the global Azure cloud.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/";

const AUTHORIZE_TAIL: [&str; 3] = ["oauth2", "v2.0", "authorize"];
const TOKEN_TAIL: [&str; 3] = ["oauth2", "v2.0", "token"];
const KEYS_TAIL: [&str; 3] = ["discovery", "v2.0", "keys"];
const ISSUER_TAIL: [&str; 1] = ["v2.0"];

/// Tenant path segment; blank input collapses to [`Tenant::COMMON`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Tenant(String);
impl Tenant {
	/// Multi-tenant alias accepted by the platform for work, school, and personal accounts.
	pub const COMMON: &'static str = "common";
	/// Multi-tenant alias for work and school accounts.
	pub const ORGANIZATIONS: &'static str = "organizations";
	/// Alias for personal Microsoft accounts.
	pub const CONSUMERS: &'static str = "consumers";

	/// Wraps a tenant, substituting [`Tenant::COMMON`] when `value` is blank.
	pub fn new(value: impl AsRef<str>) -> Self {
		let view = value.as_ref().trim();

		if view.is_empty() { Self::common() } else { Self(view.to_owned()) }
	}

	/// The multi-tenant alias.
	pub fn common() -> Self {
		Self(Self::COMMON.to_owned())
	}

	/// Returns `true` for the multi-tenant alias.
	pub fn is_common(&self) -> bool {
		self.0 == Self::COMMON
	}

	/// Returns `true` for aliases that admit tokens issued by more than one tenant.
	pub fn is_multi_tenant(&self) -> bool {
		[Self::COMMON, Self::ORGANIZATIONS, Self::CONSUMERS]
			.iter()
			.any(|alias| self.0.eq_ignore_ascii_case(alias))
	}

	/// Tenant segment as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Default for Tenant {
	fn default() -> Self {
		Self::common()
	}
}
impl From<String> for Tenant {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}
impl From<Tenant> for String {
	fn from(value: Tenant) -> Self {
		value.0
	}
}
impl AsRef<str> for Tenant {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Debug for Tenant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Tenant({})", self.0)
	}
}
impl Display for Tenant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Authority the per-tenant endpoints are templated from.
///
/// Sovereign clouds (for example `https://login.microsoftonline.us/`) override the default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Url", into = "Url")]
pub struct EndpointTemplate {
	authority: Url,
}
impl EndpointTemplate {
	/// Validates and wraps an authority URL.
	pub fn new(authority: Url) -> Result<Self, ProviderConfigError> {
		if authority.scheme() != "https" {
			return Err(ProviderConfigError::InsecureEndpoint {
				endpoint: "authority",
				url: authority.to_string(),
			});
		}
		if authority.cannot_be_a_base() {
			return Err(ProviderConfigError::InvalidAuthority { url: authority.to_string() });
		}

		Ok(Self { authority })
	}

	/// Authority root.
	pub fn authority(&self) -> &Url {
		&self.authority
	}

	/// `{authority}/{tenant}/oauth2/v2.0/authorize`.
	pub fn authorize_url(&self, tenant: &Tenant) -> Url {
		self.templated(tenant, &AUTHORIZE_TAIL)
	}

	/// `{authority}/{tenant}/oauth2/v2.0/token`.
	pub fn token_url(&self, tenant: &Tenant) -> Url {
		self.templated(tenant, &TOKEN_TAIL)
	}

	/// `{authority}/{tenant}/discovery/v2.0/keys`, the tenant's signing key set.
	pub fn jwks_url(&self, tenant: &Tenant) -> Url {
		self.templated(tenant, &KEYS_TAIL)
	}

	/// `{authority}/{tenant}/v2.0`, the `iss` of v2.0 tokens issued by `tenant`.
	pub fn issuer(&self, tenant: &Tenant) -> Url {
		self.templated(tenant, &ISSUER_TAIL)
	}

	/// Returns `true` when `issuer` sits under this authority (same origin and path prefix).
	pub fn issues(&self, issuer: &str) -> bool {
		let Ok(issuer) = Url::parse(issuer) else {
			return false;
		};

		if issuer.origin() != self.authority.origin() {
			return false;
		}

		let base = self.authority.path().trim_end_matches('/');

		issuer.path().strip_prefix(base).is_some_and(|rest| rest.starts_with('/'))
	}

	/// Authorization and token endpoints for `tenant`.
	pub fn resolve(&self, tenant: &Tenant) -> ProviderEndpoints {
		ProviderEndpoints {
			authorization: self.authorize_url(tenant),
			token: self.token_url(tenant),
		}
	}

	fn templated(&self, tenant: &Tenant, tail: &[&str]) -> Url {
		let mut url = self.authority.clone();

		// Always succeeds: `new` rejects cannot-be-a-base authorities.
		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty().push(tenant.as_str()).extend(tail);
		}

		url
	}
}
impl Default for EndpointTemplate {
	fn default() -> Self {
		Self {
			authority: Url::parse(DEFAULT_AUTHORITY)
				.expect("Default authority must be a valid URL."),
		}
	}
}
impl TryFrom<Url> for EndpointTemplate {
	type Error = ProviderConfigError;

	fn try_from(value: Url) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl From<EndpointTemplate> for Url {
	fn from(value: EndpointTemplate) -> Self {
		value.authority
	}
}

/// Login (authorization) and redeem (token) endpoints consumed by the host's code exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint the browser is redirected to.
	pub authorization: Url,
	/// Token endpoint used to redeem authorization codes.
	pub token: Url,
}
impl ProviderEndpoints {
	/// Authorization endpoint as an `oauth2` client URL.
	pub fn auth_url(&self) -> AuthUrl {
		AuthUrl::from_url(self.authorization.clone())
	}

	/// Token endpoint as an `oauth2` client URL.
	pub fn token_url(&self) -> TokenUrl {
		TokenUrl::from_url(self.token.clone())
	}
}
