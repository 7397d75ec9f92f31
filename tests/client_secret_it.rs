// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use helseid_client::{
	auth::ScopeSet,
	config::Client,
	error::{BindingError, Error, UpstreamError},
	flows::{ClientCredentials, ClientSecretUpdater, ReqwestClientCredentials, UpdatedClientSecret},
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	jose::{self, JwsHeader},
	metadata::{MetadataRegistry, ReqwestMetadataRegistry},
	reqwest::Client as ReqwestClient,
	signing::{Algorithm, KeyReference},
	url::Url,
};

const CLIENT_ID: &str = "selfservice-client";
const SELF_SERVICE_SCOPE: &str = "nhn:selvbetjening/client";
const CLIENT_SECRET_PATH: &str = "/v1/client-secret";

/// Reqwest transport that accepts the self-signed certificates served by `httpmock`.
fn test_reqwest_http_client() -> ReqwestHttpClient {
	let client = ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestHttpClient::with_client(client)
}

struct Fixture {
	server: MockServer,
	registry: ReqwestMetadataRegistry,
	client: Client,
}
impl Fixture {
	async fn start() -> Self {
		let server = MockServer::start_async().await;
		let authority = server.base_url();

		server
			.mock_async(|when, then| {
				when.method(GET).path("/.well-known/openid-configuration");
				then.status(200).header("content-type", "application/json").body(
					json!({
						"issuer": authority,
						"token_endpoint": format!("{authority}/connect/token"),
					})
					.to_string(),
				);
			})
			.await;

		let key = KeyReference::generate(Algorithm::ES256).expect("Key generation should succeed.");
		let client = Client::builder(CLIENT_ID)
			.key_reference(key)
			.scopes([SELF_SERVICE_SCOPE])
			.expect("Scopes should be valid.")
			.build()
			.expect("Client should build.");
		let registry: ReqwestMetadataRegistry =
			MetadataRegistry::new(test_reqwest_http_client(), ReqwestTransportErrorMapper);

		Self { server, registry, client }
	}

	fn updater(&self) -> ClientSecretUpdater<ReqwestHttpClient, ReqwestTransportErrorMapper> {
		let engine: ReqwestClientCredentials =
			ClientCredentials::builder(&self.registry, self.server.base_url())
				.client(self.client.clone())
				.build()
				.expect("Engine should build.");
		let endpoint = Url::parse(&self.server.url(CLIENT_SECRET_PATH))
			.expect("Client-secret URL should parse.");
		let scope = ScopeSet::new([SELF_SERVICE_SCOPE]).expect("Scopes should be valid.");

		ClientSecretUpdater::new(endpoint, Arc::new(engine), scope)
	}

	/// Access token bound (`cnf.jkt`) to `jkt`.
	fn access_token(&self, jkt: &str) -> String {
		let key = self.client.key_reference();

		jose::sign_compact(
			key,
			&JwsHeader::for_key("at+jwt", key),
			&json!({ "sub": CLIENT_ID, "cnf": { "jkt": jkt } }),
			"access token",
		)
		.expect("Access token should sign.")
	}

	async fn mock_token(&self, access_token: &str) -> httpmock::Mock<'_> {
		let body = json!({ "access_token": access_token, "token_type": "DPoP", "expires_in": 60 });

		self.server
			.mock_async(|when, then| {
				when.method(POST).path("/connect/token").header_exists("dpop");
				then.status(200).header("content-type", "application/json").body(body.to_string());
			})
			.await
	}
}

#[tokio::test]
async fn rotation_registers_the_public_key() {
	let fixture = Fixture::start().await;
	let token = fixture.access_token(&fixture.client.key_reference().thumbprint());
	let token_mock = fixture.mock_token(&token).await;
	let new_key = KeyReference::generate(Algorithm::ES384).expect("Key generation should succeed.");
	let secret_mock = fixture
		.server
		.mock_async(|when, then| {
			when.method(POST)
				.path(CLIENT_SECRET_PATH)
				.header("authorization", format!("DPoP {token}"))
				.header("content-type", "application/json")
				.header_exists("dpop")
				.body_includes(format!("\"kid\":\"{}\"", new_key.key_id()))
				.body_excludes("\"d\":");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"expiration\":\"2026-12-31T12:00:00Z\"}");
		})
		.await;
	let updated = fixture
		.updater()
		.update_client_secret(&new_key)
		.await
		.expect("Rotation should succeed.");
	let UpdatedClientSecret::Success { json_web_key, expiration } = &updated else {
		panic!("Expected a successful rotation, got {updated:?}.");
	};
	let stored = KeyReference::from_jwk(json_web_key).expect("Returned JWK should parse back.");

	assert_eq!(*expiration, time::macros::datetime!(2026-12-31 12:00 UTC));
	assert_eq!(stored.thumbprint(), new_key.thumbprint());
	assert_eq!(stored.key_id(), new_key.key_id());

	token_mock.assert_calls_async(1).await;
	secret_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn rejected_rotation_returns_problem_details() {
	let fixture = Fixture::start().await;
	let token = fixture.access_token(&fixture.client.key_reference().thumbprint());

	fixture.mock_token(&token).await;
	fixture
		.server
		.mock_async(|when, then| {
			when.method(POST).path(CLIENT_SECRET_PATH);
			then.status(400).header("content-type", "application/problem+json").body(
				json!({
					"type": "https://tools.ietf.org/html/rfc7231#section-6.5.1",
					"title": "Invalid key",
					"status": 400,
					"detail": "The key is too weak.",
					"instance": "/v1/client-secret",
				})
				.to_string(),
			);
		})
		.await;

	let new_key = KeyReference::generate(Algorithm::ES256).expect("Key generation should succeed.");
	let updater = fixture.updater();
	let updated =
		updater.update_client_secret(&new_key).await.expect("A 4xx rejection is a value.");
	let UpdatedClientSecret::ClientSecretFailure(failure) = &updated else {
		panic!("Expected a client-secret failure, got {updated:?}.");
	};

	assert_eq!(failure.title.as_deref(), Some("Invalid key"));
	assert_eq!(failure.status, Some(400));
	assert_eq!(failure.detail.as_deref(), Some("The key is too weak."));

	let err = updater
		.generate_new_client_secret()
		.await
		.expect_err("Generating a secret treats rejections as errors.");

	assert!(matches!(err, Error::Upstream(UpstreamError::ClientSecretUpdate)));
	assert_eq!(err.to_string(), "Update of client secret failed");
}

#[tokio::test]
async fn server_errors_from_the_secret_endpoint_are_errors() {
	let fixture = Fixture::start().await;
	let token = fixture.access_token(&fixture.client.key_reference().thumbprint());

	fixture.mock_token(&token).await;
	fixture
		.server
		.mock_async(|when, then| {
			when.method(POST).path(CLIENT_SECRET_PATH);
			then.status(502).body("bad gateway");
		})
		.await;

	let new_key = KeyReference::generate(Algorithm::ES256).expect("Key generation should succeed.");
	let err = fixture
		.updater()
		.update_client_secret(&new_key)
		.await
		.expect_err("A 5xx answer must be an error.");

	assert!(matches!(err, Error::Upstream(UpstreamError::SelfService { status: 502 })));
}

#[tokio::test]
async fn token_failures_skip_the_secret_endpoint() {
	let fixture = Fixture::start().await;
	let token_mock = fixture
		.server
		.mock_async(|when, then| {
			when.method(POST).path("/connect/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_scope\"}");
		})
		.await;
	let secret_mock = fixture
		.server
		.mock_async(|when, then| {
			when.method(POST).path(CLIENT_SECRET_PATH);
			then.status(200).body("{\"expiration\":\"2026-12-31T12:00:00Z\"}");
		})
		.await;
	let new_key = KeyReference::generate(Algorithm::ES256).expect("Key generation should succeed.");
	let updated = fixture
		.updater()
		.update_client_secret(&new_key)
		.await
		.expect("Token failures are values.");

	assert!(matches!(
		&updated,
		UpdatedClientSecret::TokenFailure(failure) if failure.error() == Some("invalid_scope")
	));

	token_mock.assert_calls_async(1).await;
	secret_mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn tokens_bound_to_another_key_are_refused() {
	let fixture = Fixture::start().await;
	let other = KeyReference::generate(Algorithm::ES256).expect("Key generation should succeed.");
	let token = fixture.access_token(&other.thumbprint());

	fixture.mock_token(&token).await;

	let secret_mock = fixture
		.server
		.mock_async(|when, then| {
			when.method(POST).path(CLIENT_SECRET_PATH);
			then.status(200).body("{\"expiration\":\"2026-12-31T12:00:00Z\"}");
		})
		.await;
	let new_key = KeyReference::generate(Algorithm::ES256).expect("Key generation should succeed.");
	let err = fixture
		.updater()
		.update_client_secret(&new_key)
		.await
		.expect_err("A token bound to another key cannot be presented.");

	assert!(matches!(err, Error::Binding(BindingError::ThumbprintMismatch)));
	assert_eq!(
		err.to_string(),
		"The JWK thumbprint in the access token does not match the thumbprint of the private key JWK"
	);

	secret_mock.assert_calls_async(0).await;
}
