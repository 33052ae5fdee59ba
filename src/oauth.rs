//! Refresh handshake against the upstream authorization service.
//!
//! [`OAuthProxy`] owns the `grant_type=refresh_token` exchange: admission against the
//! shared rate window, the timeout-bounded HTTP call, and mapping the response into a
//! fresh [`CredentialSet`]. Failures never mutate storage; persisting the renewed set
//! stays with the caller so a rejected refresh leaves the prior record intact.

// crates.io
#[cfg(feature = "reqwest")]
use oauth2::{
	ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RefreshToken,
	RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{CredentialSet, SubjectId, TokenSecret},
};
#[cfg(feature = "reqwest")]
use crate::{
	config::{CLIENT_ID_VAR, Config},
	error::{ConfigError, UpstreamError},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	rate_limit::FixedWindowLimiter,
};

/// Boxed future returned by [`RefreshHandshake::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<CredentialSet>> + 'a + Send>>;

/// Contract for the upstream token-exchange call.
///
/// The trait takes the refresh secret explicitly, so only credential sets that carry
/// one (`RefreshMode::Refreshable`) can ever reach a handshake implementation.
pub trait RefreshHandshake
where
	Self: Send + Sync,
{
	/// Exchanges the refresh token for a renewed credential set.
	fn refresh<'a>(
		&'a self,
		subject: &'a SubjectId,
		refresh_token: &'a TokenSecret,
		scope: Option<&'a str>,
	) -> RefreshFuture<'a>;
}

#[cfg(feature = "reqwest")]
type ConfiguredRefreshClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Bounded timeout for a single token-endpoint call.
#[cfg(feature = "reqwest")]
const REFRESH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Performs refresh-token grants against the upstream token endpoint.
#[cfg(feature = "reqwest")]
pub struct OAuthProxy {
	oauth_client: ConfiguredRefreshClient,
	http_client: ReqwestClient,
	limiter: Arc<FixedWindowLimiter>,
}
#[cfg(feature = "reqwest")]
impl OAuthProxy {
	/// Creates a proxy for the provided token endpoint and client credentials.
	pub fn new(
		token_endpoint: Url,
		client_id: impl Into<String>,
		client_secret: Option<&str>,
		limiter: Arc<FixedWindowLimiter>,
	) -> Result<Self, ConfigError> {
		let token_url =
			TokenUrl::new(token_endpoint.to_string()).map_err(|e| ConfigError::InvalidVar {
				name: crate::config::TOKEN_ENDPOINT_VAR,
				reason: e.to_string(),
			})?;
		let mut oauth_client =
			BasicClient::new(ClientId::new(client_id.into())).set_token_uri(token_url);

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}

		// Token endpoints answer directly; following a redirect would leak credentials.
		let http_client = ReqwestClient::builder()
			.timeout(REFRESH_TIMEOUT)
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self { oauth_client, http_client, limiter })
	}

	/// Creates a proxy from startup configuration.
	pub fn from_config(
		config: &Config,
		limiter: Arc<FixedWindowLimiter>,
	) -> Result<Self, ConfigError> {
		let client_id = config
			.client_id
			.as_deref()
			.ok_or(ConfigError::MissingVar { name: CLIENT_ID_VAR })?;

		Self::new(
			config.token_endpoint.clone(),
			client_id,
			config.client_secret.as_deref(),
			limiter,
		)
	}

	async fn exchange(
		&self,
		subject: &SubjectId,
		refresh_token: &TokenSecret,
		scope: Option<&str>,
	) -> Result<CredentialSet> {
		self.limiter.admit()?;

		let secret = RefreshToken::new(refresh_token.expose().to_owned());
		let mut request = self.oauth_client.exchange_refresh_token(&secret);

		if let Some(scope) = scope {
			for part in scope.split_whitespace() {
				request = request.add_scope(Scope::new(part.to_owned()));
			}
		}

		let response =
			request.request_async(&self.http_client).await.map_err(map_refresh_error)?;

		credential_from_response(subject.clone(), refresh_token, scope, response)
	}
}
#[cfg(feature = "reqwest")]
impl RefreshHandshake for OAuthProxy {
	fn refresh<'a>(
		&'a self,
		subject: &'a SubjectId,
		refresh_token: &'a TokenSecret,
		scope: Option<&'a str>,
	) -> RefreshFuture<'a> {
		Box::pin(async move {
			const KIND: FlowKind = FlowKind::Refresh;

			let span = FlowSpan::new(KIND, "refresh");

			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

			let result = span.instrument(self.exchange(subject, refresh_token, scope)).await;

			match &result {
				Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
				Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
			}

			result
		})
	}
}
#[cfg(feature = "reqwest")]
impl Debug for OAuthProxy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthProxy").field("limiter", &self.limiter).finish_non_exhaustive()
	}
}

#[cfg(feature = "reqwest")]
fn credential_from_response(
	subject: SubjectId,
	previous_refresh: &TokenSecret,
	requested_scope: Option<&str>,
	response: BasicTokenResponse,
) -> Result<CredentialSet> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	// Upstream APIs typically invalidate the old refresh token on rotation; when the
	// response omits a replacement, the previous secret stays valid and is carried
	// forward so the set remains renewable.
	let rotated_refresh = response
		.refresh_token()
		.map(|token| token.secret().to_owned())
		.unwrap_or_else(|| previous_refresh.expose().to_owned());
	let granted_scope = response
		.scopes()
		.map(|scopes| {
			scopes.iter().map(|scope| scope.as_ref()).collect::<Vec<_>>().join(" ")
		})
		.or_else(|| requested_scope.map(str::to_owned));
	let mut builder = CredentialSet::builder(subject)
		.access_token(response.access_token().secret().to_owned())
		.refresh_token(rotated_refresh)
		.issued_now()
		.expires_in(Duration::seconds(expires_in));

	if let Some(scope) = granted_scope {
		builder = builder.scope(scope);
	}

	builder.build().map_err(|e| ConfigError::from(e).into())
}

#[cfg(feature = "reqwest")]
fn map_refresh_error(err: BasicRequestTokenError<HttpClientError<ReqwestError>>) -> Error {
	match err {
		RequestTokenError::ServerResponse(response) => map_rejection(&response),
		RequestTokenError::Request(error) => map_transport_error(error),
		RequestTokenError::Parse(source, _body) => UpstreamError::ResponseParse { source }.into(),
		RequestTokenError::Other(message) => UpstreamError::Endpoint { message }.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_rejection(response: &BasicErrorResponse) -> Error {
	let code: &str = response.error().as_ref();
	let reason = match response.error_description() {
		Some(description) => format!("{code}: {description}"),
		None => code.to_owned(),
	};

	if is_transient_rejection(code) {
		UpstreamError::Endpoint { message: reason }.into()
	} else {
		Error::RefreshFailed { reason }
	}
}

#[cfg(feature = "reqwest")]
fn is_transient_rejection(code: &str) -> bool {
	code.eq_ignore_ascii_case("temporarily_unavailable") || code.eq_ignore_ascii_case("server_error")
}

#[cfg(feature = "reqwest")]
fn map_transport_error(err: HttpClientError<ReqwestError>) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => UpstreamError::from(*inner).into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => UpstreamError::Io(inner).into(),
		HttpClientError::Other(message) => UpstreamError::Endpoint { message }.into(),
		_ => UpstreamError::Endpoint {
			message: "HTTP client error occurred while calling the token endpoint".into(),
		}
		.into(),
	}
}
