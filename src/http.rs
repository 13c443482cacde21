//! Transport primitives for the profile and signing-key lookups.
//!
//! [`IdentityHttpClient`] is the adapter's only dependency on an HTTP stack. Requests and
//! responses use the `oauth2` crate's `http`-based types so custom transports never see
//! reqwest. The default [`ReqwestHttpClient`] never follows redirects: a redirected
//! profile or key-set request would replay the bearer token to another origin.

// std
#[cfg(feature = "reqwest")] use std::{ops::Deref, time::Duration as StdDuration};
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Abstraction over HTTP transports able to execute identity lookups.
///
/// Implementations must be `Send + Sync + 'static` so one client can back many resolvers,
/// and the handles they return must own whatever state their request futures need, so
/// those futures stay `Send` while in flight.
pub trait IdentityHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle used for a single lookup.
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds a handle for one request.
	fn handle(&self) -> Self::Handle;

	/// Returns `true` when `error` means the transport's own deadline elapsed.
	///
	/// The default implementation reports every failure as a network error.
	fn is_timeout(_error: &Self::TransportError) -> bool {
		false
	}
}

/// Thin wrapper around [`ReqwestClient`] configured for identity lookups.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`]. Disable redirect following on it.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that never follows redirects.
	///
	/// Fails when the TLS backend cannot be initialized; there is no silent fallback to a
	/// client that would follow redirects.
	pub fn try_default() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Builds a client that never follows redirects and gives up after `timeout`.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.timeout(timeout)
			.build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl IdentityHttpClient for ReqwestHttpClient {
	type Handle = ReqwestHandle;
	type TransportError = ReqwestError;

	fn handle(&self) -> Self::Handle {
		ReqwestHandle(self.0.clone())
	}

	fn is_timeout(error: &Self::TransportError) -> bool {
		error.is_timeout()
	}
}

/// Handle returned by [`ReqwestHttpClient`] that satisfies [`IdentityHttpClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHandle(ReqwestClient);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for ReqwestHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.0.clone();

		Box::pin(async move {
			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Executes `request` through `client`, mapping transport failures for `endpoint`.
pub(crate) async fn send<C>(
	client: &C,
	endpoint: &'static str,
	request: HttpRequest,
) -> Result<HttpResponse>
where
	C: ?Sized + IdentityHttpClient,
{
	let handle = client.handle();

	handle.call(request).await.map_err(|err| map_client_error::<C>(endpoint, err))
}

/// Decodes a JSON body, keeping the path of the first failing field.
pub(crate) fn decode_json<T>(
	body: &[u8],
) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de)
}

fn map_client_error<C>(endpoint: &'static str, err: HttpClientError<C::TransportError>) -> Error
where
	C: ?Sized + IdentityHttpClient,
{
	match err {
		HttpClientError::Reqwest(inner) =>
			if C::is_timeout(&inner) {
				Error::Timeout
			} else {
				TransportError::Network { endpoint, source: inner }.into()
			},
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) =>
			TransportError::network(endpoint, std::io::Error::other(message)).into(),
		other => TransportError::network(
			endpoint,
			std::io::Error::other(format!("Unhandled HTTP client error: {other:?}")),
		)
		.into(),
	}
}
