//! Client-credentials token requests and the DPoP nonce challenge.
//!
//! A request is sent at most twice. The first attempt carries a DPoP proof without a nonce; if the
//! server answers `use_dpop_nonce` with a `DPoP-Nonce` header, the identical request is resent
//! once with a proof echoing that nonce. Whatever the second attempt returns is final.

// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{
		Method,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	dpop::DpopProofBuilder,
	endpoints,
	error::{ConfigError, ProtocolError},
	http::{self, HelseIdHttpClient, TransportErrorMapper},
	obs::{self, FlowKind, FlowSpan},
};

/// `grant_type` of every request.
pub const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";
/// `client_assertion_type` for `private_key_jwt`.
pub const CLIENT_ASSERTION_TYPE_JWT_BEARER: &str =
	"urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
/// OAuth error code of the nonce challenge.
pub const USE_DPOP_NONCE: &str = "use_dpop_nonce";
/// Response header carrying the server nonce.
pub const DPOP_NONCE_HEADER: &str = "dpop-nonce";
/// Request header carrying the DPoP proof.
pub const DPOP_HEADER: &str = "dpop";
/// `token_type` reported when the server omits it.
pub const UNKNOWN_TOKEN_TYPE: &str = "UNKNOWN";

/// Parameters of one client-credentials token request.
#[derive(Clone, Debug, Default)]
pub struct TokenRequest {
	client_assertion: String,
	scope: ScopeSet,
	resources: Vec<String>,
	custom_parameters: BTreeMap<String, Vec<String>>,
}
impl TokenRequest {
	/// Request authenticated with the signed `client_assertion`.
	pub fn new(client_assertion: impl Into<String>) -> Self {
		Self { client_assertion: client_assertion.into(), ..Default::default() }
	}

	/// Requested scopes; an empty set omits the `scope` parameter.
	pub fn with_scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Adds a `resource` indicator.
	pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
		self.resources.push(resource.into());

		self
	}

	/// Adds one value of a custom form parameter; repeated calls accumulate values.
	pub fn with_custom_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.custom_parameters.entry(name.into()).or_default().push(value.into());

		self
	}

	/// Requested scopes.
	pub fn scope(&self) -> &ScopeSet {
		&self.scope
	}

	/// `application/x-www-form-urlencoded` body of the request.
	pub fn form_body(&self) -> String {
		let mut form = form_urlencoded::Serializer::new(String::new());

		form.append_pair("grant_type", GRANT_TYPE_CLIENT_CREDENTIALS)
			.append_pair("client_assertion_type", CLIENT_ASSERTION_TYPE_JWT_BEARER)
			.append_pair("client_assertion", &self.client_assertion);

		if !self.scope.is_empty() {
			form.append_pair("scope", &self.scope.normalized());
		}
		for resource in &self.resources {
			form.append_pair("resource", resource);
		}
		for (name, values) in &self.custom_parameters {
			for value in values {
				form.append_pair(name, value);
			}
		}

		form.finish()
	}
}

/// Successful token response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessTokenResponse {
	access_token: TokenSecret,
	token_type: String,
	expires_in_seconds: i64,
	scope: Vec<String>,
	status: u16,
	raw_body: String,
}
impl AccessTokenResponse {
	/// The access token.
	pub fn access_token(&self) -> &TokenSecret {
		&self.access_token
	}

	/// `token_type`, `"UNKNOWN"` when the server omitted it.
	pub fn token_type(&self) -> &str {
		&self.token_type
	}

	/// Lifetime in seconds, `0` when the server omitted it.
	pub fn expires_in_seconds(&self) -> i64 {
		self.expires_in_seconds
	}

	/// Granted scopes, empty when the server omitted them.
	pub fn scope(&self) -> &[String] {
		&self.scope
	}

	/// HTTP status of the response.
	pub fn status(&self) -> u16 {
		self.status
	}

	/// Raw response body. Contains the access token.
	pub fn raw_body(&self) -> &str {
		&self.raw_body
	}
}

/// OAuth error response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
	error: Option<String>,
	error_description: Option<String>,
	status: u16,
	raw_body: String,
}
impl ErrorResponse {
	/// OAuth `error` code; `None` when the body was not an error object.
	pub fn error(&self) -> Option<&str> {
		self.error.as_deref()
	}

	/// OAuth `error_description`.
	pub fn error_description(&self) -> Option<&str> {
		self.error_description.as_deref()
	}

	/// HTTP status of the response.
	pub fn status(&self) -> u16 {
		self.status
	}

	/// Raw response body.
	pub fn raw_body(&self) -> &str {
		&self.raw_body
	}
}

/// Final result of a token request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenResponse {
	/// The server issued a token.
	Success(AccessTokenResponse),
	/// The server answered with an error.
	Failure(ErrorResponse),
}
impl TokenResponse {
	/// Returns true for [`TokenResponse::Success`].
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success(_))
	}

	/// HTTP status of the response.
	pub fn status(&self) -> u16 {
		match self {
			Self::Success(success) => success.status,
			Self::Failure(failure) => failure.status,
		}
	}

	/// Raw response body.
	pub fn raw_body(&self) -> &str {
		match self {
			Self::Success(success) => &success.raw_body,
			Self::Failure(failure) => &failure.raw_body,
		}
	}
}

#[derive(Deserialize)]
struct WireTokenResponse {
	access_token: String,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	scope: Option<String>,
}

#[derive(Deserialize)]
struct WireErrorResponse {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

/// Sends token requests through a [`HelseIdHttpClient`].
pub struct TokenEndpoint<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> TokenEndpoint<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an endpoint client over the given transport.
	pub fn new(http_client: impl Into<Arc<C>>, error_mapper: impl Into<Arc<M>>) -> Self {
		Self { http_client: http_client.into(), error_mapper: error_mapper.into() }
	}

	/// Executes `request` against `endpoint`, answering at most one nonce challenge.
	pub async fn send_request(
		&self,
		endpoint: &Url,
		dpop: &DpopProofBuilder,
		request: &TokenRequest,
	) -> Result<TokenResponse> {
		let body = request.form_body();
		let initial = FlowSpan::new(FlowKind::TokenEndpoint, "initial");
		let response = initial.instrument(self.attempt(endpoint, dpop, &body, None)).await?;
		let failure = match interpret(&response)? {
			TokenResponse::Failure(failure) if failure.error() == Some(USE_DPOP_NONCE) => failure,
			done => return Ok(done),
		};
		let nonce = response
			.headers()
			.get(DPOP_NONCE_HEADER)
			.and_then(|value| value.to_str().ok())
			.filter(|value| !value.is_empty())
			.ok_or(ProtocolError::MissingDpopNonce)?;

		#[cfg(feature = "tracing")]
		tracing::debug!(status = failure.status(), "token endpoint issued a DPoP nonce challenge");
		#[cfg(not(feature = "tracing"))]
		let _ = failure;

		obs::record_nonce_retry();

		let retry = FlowSpan::new(FlowKind::TokenEndpoint, "nonce_retry");
		let response = retry.instrument(self.attempt(endpoint, dpop, &body, Some(nonce))).await?;

		interpret(&response)
	}

	async fn attempt(
		&self,
		endpoint: &Url,
		dpop: &DpopProofBuilder,
		body: &str,
		nonce: Option<&str>,
	) -> Result<HttpResponse> {
		let proof = dpop.proof_with_nonce(&Method::POST, endpoint, nonce)?;
		let request: HttpRequest = oauth2::http::Request::builder()
			.method(Method::POST)
			.uri(endpoint.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json")
			.header(DPOP_HEADER, proof)
			.body(body.as_bytes().to_vec())
			.map_err(ConfigError::from)?;

		http::execute(&*self.http_client, &*self.error_mapper, "token", request).await
	}
}
impl<C, M> Clone for TokenEndpoint<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { http_client: self.http_client.clone(), error_mapper: self.error_mapper.clone() }
	}
}

fn interpret(response: &HttpResponse) -> Result<TokenResponse> {
	let status = response.status().as_u16();
	let raw_body = endpoints::body_text(response);

	if response.status().is_success() {
		let mut deserializer = serde_json::Deserializer::from_slice(response.body());
		let wire: WireTokenResponse = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ProtocolError::MalformedTokenResponse {
				status,
				content_length: response.body().len(),
				source,
			})?;

		return Ok(TokenResponse::Success(AccessTokenResponse {
			access_token: TokenSecret::new(wire.access_token),
			token_type: wire.token_type.unwrap_or_else(|| UNKNOWN_TOKEN_TYPE.into()),
			expires_in_seconds: wire.expires_in.unwrap_or_default(),
			scope: wire
				.scope
				.map(|scope| scope.split(' ').filter(|s| !s.is_empty()).map(Into::into).collect())
				.unwrap_or_default(),
			status,
			raw_body,
		}));
	}

	let (error, error_description) = match serde_json::from_slice::<WireErrorResponse>(response.body())
	{
		Ok(wire) => (Some(wire.error), wire.error_description),
		Err(_) => (None, None),
	};

	Ok(TokenResponse::Failure(ErrorResponse { error, error_description, status, raw_body }))
}
