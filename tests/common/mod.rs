//! Scripted in-process transport and fixtures shared by the integration suites.

#![allow(dead_code)]

// std
use std::{
	collections::{HashMap, VecDeque},
	future::Future,
	io::Error as IoError,
	pin::Pin,
	sync::Arc,
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use serde_json::{Value, json};
// self
use helseid_client::{
	auth::ScopeSet,
	config::Client,
	error::Error,
	http::{
		HelseIdHttpClient, ResponseMetadata, ResponseMetadataSlot, TransportErrorMapper,
		map_generic_error,
	},
	jose,
	metadata::MetadataRegistry,
	oauth2::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
		http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
	},
	signing::{Algorithm, KeyReference},
};

pub const AUTHORITY: &str = "https://helseid-sts.test.nhn.no";
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const TOKEN_PATH: &str = "/connect/token";
pub const CLIENT_ID: &str = "helseid-test-client";
pub const NONCE: &str = "server-nonce-1";

pub type ScriptedRegistry = MetadataRegistry<ScriptedHttpClient, ScriptedErrorMapper>;

/// Canned response returned by [`ScriptedHttpClient`].
#[derive(Clone, Debug)]
pub struct ScriptedResponse {
	pub status: u16,
	pub headers: Vec<(&'static str, String)>,
	pub body: String,
	pub delay: Option<StdDuration>,
}
impl ScriptedResponse {
	pub fn json(status: u16, body: Value) -> Self {
		Self {
			status,
			headers: vec![("content-type", "application/json".into())],
			body: body.to_string(),
			delay: None,
		}
	}

	pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
		self.headers.push((name, value.into()));

		self
	}

	pub fn delayed(mut self, delay: StdDuration) -> Self {
		self.delay = Some(delay);

		self
	}
}

/// Request as seen by [`ScriptedHttpClient`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
	pub method: String,
	pub path: String,
	pub headers: HeaderMap,
	pub body: String,
}
impl RecordedRequest {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// Claims of the DPoP proof the request carried.
	pub fn dpop_claims(&self) -> Value {
		let proof = self.header("dpop").expect("Request should carry a DPoP proof.");

		jose::decode_unverified(proof).expect("DPoP proof should decode.").claims
	}

	/// Decoded form parameters of the request body.
	pub fn form(&self) -> Vec<(String, String)> {
		url::form_urlencoded::parse(self.body.as_bytes()).into_owned().collect()
	}

	pub fn form_value(&self, name: &str) -> Option<String> {
		self.form().into_iter().find(|(key, _)| key == name).map(|(_, value)| value)
	}
}

/// Transport answering from per-path response queues.
///
/// Each request pops the head of its path's queue; the last response repeats forever.
#[derive(Clone, Default)]
pub struct ScriptedHttpClient {
	routes: Arc<Mutex<HashMap<String, VecDeque<ScriptedResponse>>>>,
	requests: Arc<Mutex<Vec<RecordedRequest>>>,
}
impl ScriptedHttpClient {
	pub fn route(self, path: &str, responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
		self.routes.lock().insert(path.into(), responses.into_iter().collect());

		self
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.requests.lock().clone()
	}

	pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
		self.requests().into_iter().filter(|request| request.path == path).collect()
	}

	fn next_response(&self, path: &str) -> Option<ScriptedResponse> {
		let mut routes = self.routes.lock();
		let queue = routes.get_mut(path)?;

		if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() }
	}
}
impl HelseIdHttpClient for ScriptedHttpClient {
	type Handle = ScriptedHandle;
	type TransportError = IoError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { client: self.clone(), slot }
	}
}

pub struct ScriptedHandle {
	client: ScriptedHttpClient,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<IoError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			assert!(
				self.slot.take().is_none(),
				"ResponseMetadataSlot must be clear before dispatching a request."
			);

			let path = request.uri().path().to_owned();

			self.client.requests.lock().push(RecordedRequest {
				method: request.method().to_string(),
				path: path.clone(),
				headers: request.headers().clone(),
				body: String::from_utf8_lossy(request.body()).into_owned(),
			});

			let scripted = self
				.client
				.next_response(&path)
				.ok_or_else(|| HttpClientError::Other(format!("No scripted route for {path}.")))?;

			if let Some(delay) = scripted.delay {
				tokio::time::sleep(delay).await;
			}

			let status = StatusCode::from_u16(scripted.status)
				.map_err(|e| HttpClientError::Other(e.to_string()))?;
			let mut response = HttpResponse::new(scripted.body.into_bytes());

			*response.status_mut() = status;

			for (name, value) in scripted.headers {
				response.headers_mut().insert(
					HeaderName::from_static(name),
					HeaderValue::from_str(&value).map_err(|e| HttpClientError::Other(e.to_string()))?,
				);
			}

			self.slot.store(ResponseMetadata { status: Some(scripted.status) });

			Ok(response)
		})
	}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptedErrorMapper;
impl TransportErrorMapper<IoError> for ScriptedErrorMapper {
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<IoError>,
	) -> Error {
		map_generic_error(endpoint, metadata, error)
	}
}

pub fn registry(http: &ScriptedHttpClient) -> ScriptedRegistry {
	MetadataRegistry::new(http.clone(), ScriptedErrorMapper)
}

pub fn discovery_document(authority: &str) -> Value {
	json!({
		"issuer": authority,
		"token_endpoint": format!("{authority}{TOKEN_PATH}"),
		"jwks_uri": format!("{authority}/.well-known/openid-configuration/jwks"),
		"token_endpoint_auth_methods_supported": ["private_key_jwt"],
	})
}

pub fn discovery() -> ScriptedResponse {
	ScriptedResponse::json(200, discovery_document(AUTHORITY))
}

pub fn token_success(access_token: &str, expires_in: i64) -> ScriptedResponse {
	ScriptedResponse::json(
		200,
		json!({
			"access_token": access_token,
			"token_type": "DPoP",
			"expires_in": expires_in,
			"scope": "nhn:test/api",
		}),
	)
}

pub fn token_error(status: u16, error: &str) -> ScriptedResponse {
	ScriptedResponse::json(status, json!({ "error": error, "error_description": "scripted" }))
}

pub fn nonce_challenge(nonce: Option<&str>) -> ScriptedResponse {
	let response = token_error(400, "use_dpop_nonce");

	match nonce {
		Some(nonce) => response.with_header("dpop-nonce", nonce),
		None => response,
	}
}

pub fn client(algorithm: Algorithm) -> Client {
	let key = KeyReference::generate(algorithm).expect("Key generation should succeed.");

	Client::builder(CLIENT_ID)
		.key_reference(key)
		.scope(ScopeSet::new(["nhn:test/api"]).expect("Scopes should be valid."))
		.build()
		.expect("Client should build.")
}
