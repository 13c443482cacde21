//! Remote profile lookup against the platform's user-info endpoint.
//!
//! Used by [`ResolutionMode::ProfileLookup`](crate::resolver::ResolutionMode). The access
//! token is sent as a bearer credential to the configured profile URL (Microsoft Graph
//! `/me` by default) and the email is read from the returned document in the order
//! `mail`, `otherMails[0]`, `userPrincipalName`.

// crates.io
use oauth2::{
	HttpRequest,
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION},
	},
};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::ConfigError,
	http::{self, IdentityHttpClient},
};

const BODY_PREVIEW_LIMIT: usize = 256;

/// Failures reported by the profile endpoint itself.
#[derive(Debug, ThisError)]
pub enum ProfileError {
	/// Endpoint answered with a non-success status.
	#[error("Profile endpoint returned HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Truncated response body, for diagnostics.
		body_preview: Option<String>,
	},
	/// Endpoint answered with a body that is not a profile document.
	#[error("Profile endpoint returned malformed JSON.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Subset of the Microsoft Graph user resource the adapter reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
	/// Primary SMTP address; often `null` for accounts without a mailbox.
	#[serde(default)]
	pub mail: Option<String>,
	/// Additional addresses; only the first entry is considered.
	#[serde(default)]
	pub other_mails: Option<Vec<String>>,
	/// Sign-in name, used when no mail address exists.
	#[serde(default)]
	pub user_principal_name: Option<String>,
	/// Stable object identifier.
	#[serde(default)]
	pub id: Option<String>,
}
impl ProfileDocument {
	/// First usable email in `mail`, `otherMails[0]`, `userPrincipalName` order.
	pub fn email(&self) -> Option<&str> {
		let other_mail = self.other_mails.as_deref().and_then(<[String]>::first);

		[self.mail.as_ref(), other_mail, self.user_principal_name.as_ref()]
			.into_iter()
			.flatten()
			.map(String::as_str)
			.find(|value| !value.trim().is_empty())
	}

	/// Object identifier, when present and non-blank.
	pub fn user_id(&self) -> Option<&str> {
		self.id.as_deref().filter(|value| !value.trim().is_empty())
	}
}

/// Builds the profile request: `GET {profile_url}` with `Authorization: Bearer <token>`.
pub fn build_request(profile_url: &Url, token: &AccessToken) -> Result<HttpRequest, ConfigError> {
	let request = Request::builder()
		.method(Method::GET)
		.uri(profile_url.as_str())
		.header(AUTHORIZATION, format!("Bearer {}", token.expose()))
		.header(ACCEPT, "application/json")
		.body(Vec::new())?;

	Ok(request)
}

/// Fetches and decodes the signed-in user's profile document.
pub async fn fetch_profile<C>(
	client: &C,
	profile_url: &Url,
	token: &AccessToken,
) -> Result<ProfileDocument>
where
	C: ?Sized + IdentityHttpClient,
{
	let request = build_request(profile_url, token)?;
	let response = http::send(client, "profile", request).await?;
	let status = response.status();

	if !status.is_success() {
		return Err(ProfileError::Status {
			status: status.as_u16(),
			body_preview: preview(response.body()),
		}
		.into());
	}

	http::decode_json(response.body()).map_err(|source| ProfileError::Decode { source }.into())
}

fn preview(body: &[u8]) -> Option<String> {
	if body.is_empty() {
		return None;
	}

	let text = String::from_utf8_lossy(body);

	if text.chars().count() <= BODY_PREVIEW_LIMIT {
		return Some(text.into_owned());
	}

	let mut buf = text.chars().take(BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	Some(buf)
}
