//! Demonstrates self-service client-secret rotation: fetch a DPoP-bound token for the self-service
//! scope, register a freshly generated key, and print what must be stored.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
// self
use helseid_client::{
	auth::ScopeSet,
	config::Client,
	flows::{ClientCredentials, ClientSecretUpdater, ReqwestClientCredentials, UpdatedClientSecret},
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	jose::{self, JwsHeader},
	metadata::{MetadataRegistry, ReqwestMetadataRegistry},
	reqwest::Client as ReqwestClient,
	signing::{Algorithm, KeyReference},
	url::Url,
};

const SELF_SERVICE_SCOPE: &str = "nhn:selvbetjening/client";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let authority = server.base_url();
	let key = KeyReference::generate(Algorithm::ES256)?;
	// Stands in for the token HelseID would bind to the client's DPoP key.
	let access_token = jose::sign_compact(
		&key,
		&JwsHeader::for_key("at+jwt", &key),
		&json!({ "cnf": { "jkt": key.thumbprint() } }),
		"access token",
	)?;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/openid-configuration");
			then.status(200).header("content-type", "application/json").body(
				json!({ "issuer": authority, "token_endpoint": format!("{authority}/connect/token") })
					.to_string(),
			);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/connect/token");
			then.status(200).header("content-type", "application/json").body(
				json!({ "access_token": access_token, "token_type": "DPoP", "expires_in": 60 })
					.to_string(),
			);
		})
		.await;

	let secret_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/client-secret").header_exists("dpop");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"expiration\":\"2027-01-01T00:00:00Z\"}");
		})
		.await;
	let client = Client::builder("demo-helseid-client")
		.key_reference(key)
		.scopes([SELF_SERVICE_SCOPE])?
		.build()?;
	// httpmock serves a self-signed certificate.
	let http_client = ReqwestHttpClient::with_client(
		ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let registry: ReqwestMetadataRegistry =
		MetadataRegistry::new(http_client, ReqwestTransportErrorMapper);
	let engine: ReqwestClientCredentials =
		ClientCredentials::builder(&registry, &authority).client(client).build()?;
	let updater = ClientSecretUpdater::new(
		Url::parse(&server.url("/v1/client-secret"))?,
		Arc::new(engine),
		ScopeSet::new([SELF_SERVICE_SCOPE])?,
	);

	match updater.update_client_secret(&KeyReference::generate(Algorithm::ES384)?).await? {
		UpdatedClientSecret::Success { json_web_key, expiration } => {
			println!("New key registered until {expiration}; store it securely.");
			println!("{} bytes of private JWK to persist.", json_web_key.len());
		},
		UpdatedClientSecret::TokenFailure(failure) =>
			println!("Token endpoint refused the self-service scope: {:?}.", failure.error()),
		UpdatedClientSecret::ClientSecretFailure(failure) =>
			println!("Client-secret endpoint rejected the key: {:?}.", failure.detail),
	}

	secret_mock.assert_async().await;

	Ok(())
}
