//! Adapter-level error types shared by endpoint derivation and identity resolution.

// self
use crate::_prelude::*;

/// Adapter-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical adapter error exposed by public APIs.
///
/// No variant is fatal to the host process. Hosts must treat every error, and every
/// unresolved identity, as an authorization denial.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token payload could not be parsed as claims.
	#[error("Access token claims could not be decoded.")]
	ClaimDecode(#[from] crate::auth::ClaimDecodeError),
	/// Signature, lifetime, issuer, or audience checks rejected the token.
	#[error(transparent)]
	Verification(#[from] crate::verify::VerificationError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Profile endpoint answered with an unusable response.
	#[error(transparent)]
	Profile(#[from] crate::profile::ProfileError),

	/// Empty access token supplied; nothing was decoded or fetched.
	#[error("Access token is missing.")]
	MissingCredential,
	/// Claims decoded but no source yielded an email address.
	#[error("No identity could be resolved from the access token.")]
	UnresolvedIdentity,
	/// Request-scoped deadline elapsed before resolution finished.
	#[error("Identity resolution timed out.")]
	Timeout,
	/// Caller cancelled the resolution.
	#[error("Identity resolution was cancelled.")]
	Cancelled,
}
impl Error {
	/// Returns a stable label suitable for log or metric fields.
	pub const fn label(&self) -> &'static str {
		match self {
			Error::Config(_) => "config",
			Error::ClaimDecode(_) => "claim_decode_failure",
			Error::Verification(_) => "verification_failure",
			Error::Transport(_) => "transport_failure",
			Error::Profile(_) => "profile_failure",
			Error::MissingCredential => "missing_credential",
			Error::UnresolvedIdentity => "unresolved_identity",
			Error::Timeout => "timeout",
			Error::Cancelled => "cancelled",
		}
	}
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider configuration is invalid or not configured yet.
	#[error(transparent)]
	Provider(#[from] crate::provider::ProviderConfigError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {endpoint} endpoint.")]
	Network {
		/// Endpoint label (`profile`, `jwks`).
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}
}
