mod common;

// std
use std::{sync::Arc, time::Duration as StdDuration};
// self
use common::*;
use helseid_client::{
	assertion::{Tenancy, TokenRequestDetails},
	auth::ScopeSet,
	cache::{ExpiringCache, InMemoryExpiringCache},
	endpoints::{AccessTokenResponse, TokenResponse},
	error::{ConfigError, Error},
	flows::{ClientCredentials, cache_key},
	jose,
	metadata::{Metadata, StaticMetadataProvider},
	signing::Algorithm,
	url::Url,
};

type ScriptedEngine = ClientCredentials<ScriptedHttpClient, ScriptedErrorMapper>;

fn engine(registry: &ScriptedRegistry) -> ScriptedEngine {
	ClientCredentials::builder(registry, AUTHORITY)
		.client(client(Algorithm::ES256))
		.build()
		.expect("Engine should build.")
}

fn access_token(response: &TokenResponse) -> &str {
	match response {
		TokenResponse::Success(success) => success.access_token().expose(),
		TokenResponse::Failure(failure) => panic!("Expected a token, got {failure:?}."),
	}
}

#[tokio::test]
async fn sequential_calls_reuse_the_cached_token() {
	let http = ScriptedHttpClient::default()
		.route(DISCOVERY_PATH, [discovery()])
		.route(TOKEN_PATH, [nonce_challenge(Some(NONCE)), token_success("cached-token", 300)]);
	let registry = registry(&http);
	let engine = engine(&registry);
	let first = engine.get_access_token(None, None).await.expect("First call should succeed.");
	let second = engine.get_access_token(None, None).await.expect("Second call should succeed.");

	assert_eq!(access_token(&first), "cached-token");
	assert_eq!(first, second, "The cached response should be returned unchanged.");
	assert_eq!(http.requests_to(DISCOVERY_PATH).len(), 1);
	assert_eq!(
		http.requests_to(TOKEN_PATH).len(),
		2,
		"Only the first call should reach the token endpoint, nonce handshake included."
	);
}

#[tokio::test]
async fn assertion_and_form_follow_the_discovered_issuer() {
	let http = ScriptedHttpClient::default()
		.route(DISCOVERY_PATH, [discovery()])
		.route(TOKEN_PATH, [token_success("token", 300)]);
	let registry = registry(&http);
	let engine = engine(&registry);
	let details = TokenRequestDetails::builder()
		.tenancy(Tenancy::MultiTenant)
		.parent_organization_number("994598759")
		.child_organization_number("999977775")
		.build()
		.expect("Details should build.");

	engine.get_access_token(None, Some(&details)).await.expect("Call should succeed.");

	let request = &http.requests_to(TOKEN_PATH)[0];
	let assertion = request.form_value("client_assertion").expect("Form should carry an assertion.");
	let public_key = engine.client().key_reference().public_key();
	let assertion =
		jose::verify_compact(&assertion, &public_key).expect("Assertion should verify.");

	assert_eq!(request.form_value("grant_type").as_deref(), Some("client_credentials"));
	assert_eq!(request.form_value("scope").as_deref(), Some("nhn:test/api"));
	assert_eq!(assertion.claims["aud"], AUTHORITY);
	assert_eq!(assertion.claims["iss"], CLIENT_ID);
	assert_eq!(assertion.claims["sub"], CLIENT_ID);
	assert_eq!(assertion.header["typ"], "client-authentication+jwt");
	assert_eq!(&assertion.claims["assertion_details"], details.assertion_details());
}

#[tokio::test]
async fn child_organizations_get_independent_entries() {
	let http = ScriptedHttpClient::default()
		.route(DISCOVERY_PATH, [discovery()])
		.route(TOKEN_PATH, [token_success("token", 300)]);
	let registry = registry(&http);
	let engine = engine(&registry);
	let details = |child: &str| {
		TokenRequestDetails::builder()
			.child_organization_number(child)
			.build()
			.expect("Details should build.")
	};
	let first = details("111111111");
	let second = details("222222222");

	engine.get_access_token(None, Some(&first)).await.expect("First org should succeed.");
	engine.get_access_token(None, Some(&second)).await.expect("Second org should succeed.");
	engine.get_access_token(None, Some(&first)).await.expect("Cached org should succeed.");

	assert_eq!(http.requests_to(TOKEN_PATH).len(), 2);
	assert_eq!(http.requests_to(DISCOVERY_PATH).len(), 1);
}

#[tokio::test]
async fn failures_are_not_cached() {
	let http = ScriptedHttpClient::default()
		.route(DISCOVERY_PATH, [discovery()])
		.route(TOKEN_PATH, [token_error(400, "invalid_scope"), token_success("token", 300)]);
	let registry = registry(&http);
	let engine = engine(&registry);
	let first = engine.get_access_token(None, None).await.expect("Failure should be a value.");
	let second = engine.get_access_token(None, None).await.expect("Retry should succeed.");

	assert!(!first.is_success());
	assert_eq!(access_token(&second), "token");
	assert_eq!(http.requests_to(TOKEN_PATH).len(), 2, "A failure must not stick in the cache.");
}

#[tokio::test]
async fn expired_tokens_are_fetched_again() {
	let http = ScriptedHttpClient::default()
		.route(DISCOVERY_PATH, [discovery()])
		.route(TOKEN_PATH, [token_success("short-lived", 0)]);
	let registry = registry(&http);
	let engine = engine(&registry);

	engine.get_access_token(None, None).await.expect("First call should succeed.");
	engine.get_access_token(None, None).await.expect("Second call should succeed.");

	assert_eq!(http.requests_to(TOKEN_PATH).len(), 2);
}

#[tokio::test]
async fn huge_lifetimes_are_cached_without_overflow() {
	let http = ScriptedHttpClient::default()
		.route(DISCOVERY_PATH, [discovery()])
		.route(TOKEN_PATH, [token_success("long-lived", i64::MAX)]);
	let registry = registry(&http);
	let engine = engine(&registry);
	let first = engine.get_access_token(None, None).await.expect("First call should succeed.");
	let second = engine.get_access_token(None, None).await.expect("Second call should succeed.");

	assert_eq!(access_token(&first), "long-lived");
	assert_eq!(first, second);
	assert_eq!(
		http.requests_to(TOKEN_PATH).len(),
		1,
		"A token with a huge lifetime should stay cached."
	);
}

#[tokio::test]
async fn concurrent_misses_both_exchange() {
	let http = ScriptedHttpClient::default().route(DISCOVERY_PATH, [discovery()]).route(
		TOKEN_PATH,
		[token_success("token", 300).delayed(StdDuration::from_millis(50))],
	);
	let registry = registry(&http);
	let engine = Arc::new(engine(&registry));
	let (first, second) =
		tokio::join!(engine.get_access_token(None, None), engine.get_access_token(None, None));

	assert_eq!(access_token(&first.expect("First caller should get a token.")), "token");
	assert_eq!(access_token(&second.expect("Second caller should get a token.")), "token");
	assert_eq!(
		http.requests_to(TOKEN_PATH).len(),
		2,
		"Concurrent misses are not coalesced into one exchange."
	);

	engine.get_access_token(None, None).await.expect("Cached call should succeed.");

	assert_eq!(http.requests_to(TOKEN_PATH).len(), 2);
}

#[tokio::test]
async fn explicit_scope_overrides_details_and_client_scope() {
	let http = ScriptedHttpClient::default()
		.route(DISCOVERY_PATH, [discovery()])
		.route(TOKEN_PATH, [token_success("token", 300)]);
	let registry = registry(&http);
	let engine = engine(&registry);
	let explicit = ScopeSet::new(["nhn:explicit/a", "nhn:explicit/b"]).expect("Scopes.");
	let details = TokenRequestDetails::builder()
		.child_organization_number("111111111")
		.scope("nhn:details/a")
		.build()
		.expect("Details should build.");

	engine.get_access_token(Some(&explicit), Some(&details)).await.expect("Explicit scope.");
	engine.get_access_token(None, Some(&details)).await.expect("Details scope.");
	engine.get_access_token(Some(&ScopeSet::default()), None).await.expect("Client scope.");

	let scopes = http
		.requests_to(TOKEN_PATH)
		.iter()
		.map(|request| request.form_value("scope").unwrap_or_default())
		.collect::<Vec<_>>();

	assert_eq!(scopes, ["nhn:explicit/a nhn:explicit/b", "nhn:details/a", "nhn:test/api"]);
}

#[tokio::test]
async fn shared_token_cache_is_keyed_by_key_scope_and_details() {
	let http = ScriptedHttpClient::default()
		.route(DISCOVERY_PATH, [discovery()])
		.route(TOKEN_PATH, [token_success("token", 300)]);
	let registry = registry(&http);
	let cache = Arc::new(InMemoryExpiringCache::<AccessTokenResponse>::new());
	let client = client(Algorithm::ES256);
	let engine: ScriptedEngine = ClientCredentials::builder(&registry, AUTHORITY)
		.client(client.clone())
		.token_cache(cache.clone())
		.build()
		.expect("Engine should build.");

	engine.get_access_token(None, None).await.expect("Call should succeed.");

	assert_eq!(cache.len(), 1);

	let key = cache_key(client.key_reference().key_id(), client.scope(), None);
	let cached = cache.get(&key).await;

	assert_eq!(
		cached.map(|token| token.access_token().expose().to_owned()).as_deref(),
		Some("token")
	);
}

#[tokio::test]
async fn injected_metadata_provider_skips_discovery() {
	let http = ScriptedHttpClient::default().route(TOKEN_PATH, [token_success("token", 300)]);
	let registry = registry(&http);
	let metadata = Metadata::new(
		AUTHORITY,
		Url::parse(&format!("{AUTHORITY}{TOKEN_PATH}")).expect("Token URL should parse."),
	);
	let engine: ScriptedEngine = ClientCredentials::builder(&registry, AUTHORITY)
		.client(client(Algorithm::ES256))
		.metadata_provider(Arc::new(StaticMetadataProvider::new(metadata)))
		.build()
		.expect("Engine should build.");

	engine.get_access_token(None, None).await.expect("Call should succeed.");

	assert!(http.requests_to(DISCOVERY_PATH).is_empty());
	assert!(registry.is_empty(), "An injected provider should not touch the registry.");
}

#[test]
fn engine_requires_a_client() {
	let http = ScriptedHttpClient::default();
	let registry = registry(&http);
	let err = ClientCredentials::builder(&registry, AUTHORITY)
		.build()
		.expect_err("An engine without a client is invalid.");

	assert!(matches!(err, ConfigError::MissingClient));
	assert_eq!(err.to_string(), "No client is provided");
}

#[tokio::test]
async fn discovery_failures_abort_the_call() {
	let http = ScriptedHttpClient::default()
		.route(DISCOVERY_PATH, [ScriptedResponse::json(503, serde_json::json!({}))]);
	let registry = registry(&http);
	let engine = engine(&registry);
	let err = engine.get_access_token(None, None).await.expect_err("Discovery must succeed first.");

	assert!(matches!(err, Error::Upstream(_)), "Unexpected error: {err:?}");
	assert!(http.requests_to(TOKEN_PATH).is_empty());
}
