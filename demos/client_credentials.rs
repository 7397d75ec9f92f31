//! Demonstrates the client-credentials engine over reqwest against a mocked
//! HelseID authority, reusing the cached token on the second call.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use helseid_client::{
	assertion::{Tenancy, TokenRequestDetails},
	config::Client,
	endpoints::TokenResponse,
	flows::{ClientCredentials, ReqwestClientCredentials},
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	metadata::{MetadataRegistry, ReqwestMetadataRegistry},
	reqwest::Client as ReqwestClient,
	signing::{Algorithm, KeyReference},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let authority = server.base_url();
	let discovery_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/openid-configuration");
			then.status(200).header("content-type", "application/json").body(format!(
				"{{\"issuer\":\"{authority}\",\"token_endpoint\":\"{authority}/connect/token\"}}"
			));
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/connect/token").header_exists("dpop");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"DPoP\",\"expires_in\":900}",
			);
		})
		.await;
	let client = Client::builder("demo-helseid-client")
		.key_reference(KeyReference::generate(Algorithm::ES256)?)
		.scopes(["nhn:demo/api"])?
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
	let details = TokenRequestDetails::builder()
		.tenancy(Tenancy::MultiTenant)
		.parent_organization_number("994598759")
		.child_organization_number("999977775")
		.build()?;

	for attempt in 1..=2 {
		match engine.get_access_token(None, Some(&details)).await? {
			TokenResponse::Success(token) => println!(
				"Attempt {attempt}: {} token valid for {}s.",
				token.token_type(),
				token.expires_in_seconds()
			),
			TokenResponse::Failure(failure) =>
				println!("Attempt {attempt}: token endpoint refused: {:?}.", failure.error()),
		}
	}

	discovery_mock.assert_async().await;
	token_mock.assert_async().await;

	Ok(())
}
