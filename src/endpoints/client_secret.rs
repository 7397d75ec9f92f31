//! Self-service client-secret endpoint: registers a new public key for the client.

// crates.io
use oauth2::http::{
	Method,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	dpop::DpopProofBuilder,
	endpoints::{self, token::DPOP_HEADER},
	error::{ConfigError, ProtocolError, UpstreamError},
	http::{self, HelseIdHttpClient, TransportErrorMapper},
	signing::Jwk,
};

/// RFC 7807 problem details returned for a rejected rotation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ClientSecretErrorResponse {
	/// Problem type URI.
	#[serde(default, rename = "type")]
	pub problem_type: Option<String>,
	/// Short summary.
	#[serde(default)]
	pub title: Option<String>,
	/// HTTP status reported in the body.
	#[serde(default)]
	pub status: Option<u16>,
	/// Human readable explanation.
	#[serde(default)]
	pub detail: Option<String>,
	/// URI of this occurrence.
	#[serde(default)]
	pub instance: Option<String>,
}

/// Result of a client-secret registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientSecretResponse {
	/// The key was registered and expires at `expiration`.
	Success {
		/// Expiry of the newly registered key.
		expiration: OffsetDateTime,
	},
	/// The endpoint rejected the request.
	Failure(ClientSecretErrorResponse),
}

/// Sends client-secret registrations through a [`HelseIdHttpClient`].
pub struct ClientSecretEndpoint<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> ClientSecretEndpoint<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an endpoint client over the given transport.
	pub fn new(http_client: impl Into<Arc<C>>, error_mapper: impl Into<Arc<M>>) -> Self {
		Self { http_client: http_client.into(), error_mapper: error_mapper.into() }
	}

	/// Posts the public half of `new_key` to `endpoint`, authorized by a DPoP-bound
	/// `access_token`.
	pub async fn send_request(
		&self,
		endpoint: &Url,
		dpop: &DpopProofBuilder,
		access_token: &str,
		new_key: &Jwk,
	) -> Result<ClientSecretResponse> {
		let proof = dpop.proof_for_access_token(&Method::POST, endpoint, access_token)?;
		let request = oauth2::http::Request::builder()
			.method(Method::POST)
			.uri(endpoint.as_str())
			.header(AUTHORIZATION, format!("DPoP {access_token}"))
			.header(DPOP_HEADER, proof)
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json")
			.body(new_key.to_public().to_json()?.into_bytes())
			.map_err(ConfigError::from)?;
		let response =
			http::execute(&*self.http_client, &*self.error_mapper, "client_secret", request).await?;
		let status = response.status();

		if status.is_server_error() {
			return Err(UpstreamError::SelfService { status: status.as_u16() }.into());
		}

		let malformed = |reason: String| ProtocolError::MalformedClientSecretResponse { reason };
		let body: Value = serde_json::from_slice(response.body()).map_err(|e| {
			malformed(format!("{e} in body `{}`", endpoints::body_text(&response)))
		})?;

		if status.is_client_error() {
			let failure = serde_json::from_value(body).map_err(|e| malformed(e.to_string()))?;

			return Ok(ClientSecretResponse::Failure(failure));
		}

		let expiration = body
			.get("expiration")
			.and_then(Value::as_str)
			.ok_or_else(|| malformed("missing `expiration`".into()))?;
		let expiration =
			OffsetDateTime::parse(expiration, &Rfc3339).map_err(|e| malformed(e.to_string()))?;

		Ok(ClientSecretResponse::Success { expiration })
	}
}
