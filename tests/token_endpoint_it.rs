mod common;

// self
use common::*;
use helseid_client::{
	auth::ScopeSet,
	dpop::DpopProofBuilder,
	endpoints::{TokenEndpoint, TokenRequest, TokenResponse},
	error::{Error, ProtocolError},
	signing::{Algorithm, KeyReference},
	url::Url,
};

type ScriptedTokenEndpoint = TokenEndpoint<ScriptedHttpClient, ScriptedErrorMapper>;

fn setup(http: &ScriptedHttpClient) -> (ScriptedTokenEndpoint, DpopProofBuilder, Url) {
	let endpoint: ScriptedTokenEndpoint = TokenEndpoint::new(http.clone(), ScriptedErrorMapper);
	let key = KeyReference::generate(Algorithm::ES256).expect("Key generation should succeed.");
	let url = Url::parse(&format!("{AUTHORITY}{TOKEN_PATH}")).expect("Token URL should parse.");

	(endpoint, DpopProofBuilder::new(key), url)
}

fn request() -> TokenRequest {
	TokenRequest::new("signed.client.assertion")
		.with_scope(ScopeSet::new(["nhn:test/api"]).expect("Scopes should be valid."))
}

#[tokio::test]
async fn nonce_challenge_is_answered_once() {
	let http = ScriptedHttpClient::default()
		.route(TOKEN_PATH, [nonce_challenge(Some(NONCE)), token_success("bound-token", 300)]);
	let (endpoint, dpop, url) = setup(&http);
	let response = endpoint
		.send_request(&url, &dpop, &request())
		.await
		.expect("Nonce challenge should be answered.");
	let TokenResponse::Success(success) = response else {
		panic!("Expected a success response after the nonce retry.");
	};

	assert_eq!(success.access_token().expose(), "bound-token");
	assert_eq!(success.expires_in_seconds(), 300);

	let requests = http.requests_to(TOKEN_PATH);

	assert_eq!(requests.len(), 2, "Exactly one retry should follow the challenge.");
	assert!(requests[0].dpop_claims().get("nonce").is_none(), "First proof must carry no nonce.");
	assert_eq!(requests[1].dpop_claims()["nonce"], NONCE);
	assert_eq!(requests[0].body, requests[1].body, "The retry should resend the same form.");
	assert_ne!(
		requests[0].dpop_claims()["jti"],
		requests[1].dpop_claims()["jti"],
		"Every proof should get a fresh jti."
	);
	assert_eq!(requests[1].dpop_claims()["htm"], "POST");
	assert_eq!(requests[1].dpop_claims()["htu"], url.as_str());
}

#[tokio::test]
async fn challenge_without_nonce_header_is_fatal() {
	let http = ScriptedHttpClient::default().route(TOKEN_PATH, [nonce_challenge(None)]);
	let (endpoint, dpop, url) = setup(&http);
	let err = endpoint
		.send_request(&url, &dpop, &request())
		.await
		.expect_err("A challenge without a nonce cannot be answered.");

	assert!(matches!(err, Error::Protocol(ProtocolError::MissingDpopNonce)));
	assert_eq!(http.requests_to(TOKEN_PATH).len(), 1);
}

#[tokio::test]
async fn other_errors_are_returned_without_retry() {
	let http = ScriptedHttpClient::default().route(TOKEN_PATH, [token_error(400, "invalid_client")]);
	let (endpoint, dpop, url) = setup(&http);
	let response = endpoint
		.send_request(&url, &dpop, &request())
		.await
		.expect("OAuth errors should be values.");
	let TokenResponse::Failure(failure) = response else {
		panic!("Expected a failure response.");
	};

	assert_eq!(failure.error(), Some("invalid_client"));
	assert_eq!(failure.status(), 400);
	assert_eq!(http.requests_to(TOKEN_PATH).len(), 1);
}

#[tokio::test]
async fn second_challenge_is_final() {
	let http = ScriptedHttpClient::default()
		.route(TOKEN_PATH, [nonce_challenge(Some(NONCE)), nonce_challenge(Some("second-nonce"))]);
	let (endpoint, dpop, url) = setup(&http);
	let response = endpoint
		.send_request(&url, &dpop, &request())
		.await
		.expect("The second challenge should be returned as a value.");

	assert!(
		matches!(&response, TokenResponse::Failure(failure) if failure.error() == Some("use_dpop_nonce"))
	);
	assert_eq!(http.requests_to(TOKEN_PATH).len(), 2, "Only one nonce retry is allowed.");
}

#[tokio::test]
async fn malformed_success_body_is_a_protocol_error() {
	let http = ScriptedHttpClient::default().route(
		TOKEN_PATH,
		[ScriptedResponse::json(200, serde_json::json!({ "token_type": "DPoP" }))],
	);
	let (endpoint, dpop, url) = setup(&http);
	let err = endpoint
		.send_request(&url, &dpop, &request())
		.await
		.expect_err("A success without an access token is malformed.");

	assert!(matches!(
		err,
		Error::Protocol(ProtocolError::MalformedTokenResponse { status: 200, .. })
	));
}

#[tokio::test]
async fn unreachable_endpoint_maps_to_transport_error() {
	let http = ScriptedHttpClient::default();
	let (endpoint, dpop, url) = setup(&http);
	let err = endpoint
		.send_request(&url, &dpop, &request())
		.await
		.expect_err("A route-less transport should fail.");

	assert!(matches!(err, Error::Transport(_)), "Unexpected error: {err:?}");
}
