//! Client Credentials engine with an in-memory token cache.
//!
//! [`ClientCredentials::get_access_token`] resolves discovery metadata, picks the effective scope,
//! and looks the token up under a key derived from the signing key id, the scope fingerprint and
//! the assertion-details identity. Only successful responses are cached, until
//! `now + expires_in`. Concurrent callers missing the same key each run their own exchange; the
//! last write wins.

// self
use crate::{
	_prelude::*,
	assertion::{ClientAssertionBuilder, TokenRequestDetails},
	auth::ScopeSet,
	cache::{self, ExpiringCache, InMemoryExpiringCache},
	config::Client,
	dpop::DpopProofBuilder,
	endpoints::{AccessTokenResponse, TokenEndpoint, TokenRequest, TokenResponse},
	error::ConfigError,
	http::{HelseIdHttpClient, TransportErrorMapper},
	metadata::{MetadataProvider, MetadataRegistry},
	obs::{self, CacheOutcome, FlowKind, FlowOutcome, FlowSpan},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

/// Cache-key segment used when a request carries no assertion details.
pub const NO_DETAILS_IDENTITY: &str = "-";

#[cfg(feature = "reqwest")]
/// Engine specialized for the crate's default reqwest transport stack.
pub type ReqwestClientCredentials = ClientCredentials<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Acquires DPoP-bound client-credentials tokens for one client against one authority.
///
/// The engine is immutable after [`ClientCredentialsBuilder::build`]; share it behind an `Arc` and
/// call it from as many tasks as needed.
pub struct ClientCredentials<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	client: Client,
	metadata_provider: Arc<dyn MetadataProvider>,
	token_cache: Arc<dyn ExpiringCache<AccessTokenResponse>>,
	dpop_proof_builder: DpopProofBuilder,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	token_endpoint: TokenEndpoint<C, M>,
}
impl<C, M> ClientCredentials<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts a builder whose metadata provider and transport come from `registry`.
	pub fn builder<'r>(
		registry: &'r MetadataRegistry<C, M>,
		authority: impl Into<String>,
	) -> ClientCredentialsBuilder<'r, C, M> {
		ClientCredentialsBuilder {
			registry,
			authority: authority.into(),
			client: None,
			token_cache: None,
			dpop_proof_builder: None,
			metadata_provider: None,
		}
	}

	/// Configured client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Builder signing every DPoP proof of this engine.
	pub fn dpop_proof_builder(&self) -> &DpopProofBuilder {
		&self.dpop_proof_builder
	}

	/// Metadata source of this engine.
	pub fn metadata_provider(&self) -> &Arc<dyn MetadataProvider> {
		&self.metadata_provider
	}

	/// Shared HTTP client.
	pub fn http_client(&self) -> &Arc<C> {
		&self.http_client
	}

	/// Shared transport error mapper.
	pub fn error_mapper(&self) -> &Arc<M> {
		&self.error_mapper
	}

	/// Returns a token for `scope` (or the configured default), from cache when possible.
	///
	/// OAuth error responses come back as [`TokenResponse::Failure`] and are never cached.
	pub async fn get_access_token(
		&self,
		scope: Option<&ScopeSet>,
		details: Option<&TokenRequestDetails>,
	) -> Result<TokenResponse> {
		let span = FlowSpan::new(FlowKind::ClientCredentials, "get_access_token");

		span.instrument(async {
			span.record(FlowOutcome::Attempt);

			span.finish(self.exchange(scope, details).await)
		})
		.await
	}

	async fn exchange(
		&self,
		scope: Option<&ScopeSet>,
		details: Option<&TokenRequestDetails>,
	) -> Result<TokenResponse> {
		let metadata = self.metadata_provider.get_metadata().await?;
		let scope = self.effective_scope(scope, details);
		let key = cache_key(self.client.key_reference().key_id(), scope, details);

		if let Some(cached) = self.token_cache.get(&key).await {
			obs::record_token_cache(CacheOutcome::Hit);

			return Ok(TokenResponse::Success(cached));
		}

		obs::record_token_cache(CacheOutcome::Miss);

		let assertion =
			ClientAssertionBuilder::new(metadata.issuer(), &self.client).details(details).sign()?;
		let request = TokenRequest::new(assertion).with_scope(scope.clone());
		let response = self
			.token_endpoint
			.send_request(metadata.token_endpoint(), &self.dpop_proof_builder, &request)
			.await?;

		if let TokenResponse::Success(success) = &response {
			let expire_at = cache::expire_at_after(Duration::seconds(success.expires_in_seconds()));

			self.token_cache.put(key, success.clone(), expire_at).await;
		}

		Ok(response)
	}

	fn effective_scope<'a>(
		&'a self,
		scope: Option<&'a ScopeSet>,
		details: Option<&'a TokenRequestDetails>,
	) -> &'a ScopeSet {
		scope
			.filter(|scope| !scope.is_empty())
			.or_else(|| details.map(TokenRequestDetails::scope).filter(|scope| !scope.is_empty()))
			.unwrap_or_else(|| self.client.scope())
	}
}
impl<C, M> Debug for ClientCredentials<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("client", &self.client)
			.field("dpop_key_id", &self.dpop_proof_builder.key_id())
			.finish_non_exhaustive()
	}
}

/// Builder for [`ClientCredentials`].
pub struct ClientCredentialsBuilder<'r, C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	registry: &'r MetadataRegistry<C, M>,
	authority: String,
	client: Option<Client>,
	token_cache: Option<Arc<dyn ExpiringCache<AccessTokenResponse>>>,
	dpop_proof_builder: Option<DpopProofBuilder>,
	metadata_provider: Option<Arc<dyn MetadataProvider>>,
}
impl<C, M> ClientCredentialsBuilder<'_, C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Client to authenticate as. Required.
	pub fn client(mut self, client: Client) -> Self {
		self.client = Some(client);

		self
	}

	/// Token cache; defaults to a private [`InMemoryExpiringCache`].
	pub fn token_cache(mut self, cache: Arc<dyn ExpiringCache<AccessTokenResponse>>) -> Self {
		self.token_cache = Some(cache);

		self
	}

	/// DPoP signer; defaults to one over the client's key reference.
	pub fn dpop_proof_builder(mut self, builder: DpopProofBuilder) -> Self {
		self.dpop_proof_builder = Some(builder);

		self
	}

	/// Metadata source; defaults to the registry's provider for the authority.
	pub fn metadata_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
		self.metadata_provider = Some(provider);

		self
	}

	/// Validates the configuration and builds the engine.
	pub fn build(self) -> Result<ClientCredentials<C, M>, ConfigError> {
		let client = self.client.ok_or(ConfigError::MissingClient)?;
		let metadata_provider = match self.metadata_provider {
			Some(provider) => provider,
			None => self.registry.get_or_create(&self.authority)? as Arc<dyn MetadataProvider>,
		};
		let dpop_proof_builder = self
			.dpop_proof_builder
			.unwrap_or_else(|| DpopProofBuilder::new(client.key_reference().clone()));
		let token_cache = match self.token_cache {
			Some(cache) => cache,
			None => Arc::new(InMemoryExpiringCache::<AccessTokenResponse>::new()),
		};
		let http_client = self.registry.http_client().clone();
		let error_mapper = self.registry.error_mapper().clone();

		Ok(ClientCredentials {
			client,
			metadata_provider,
			token_cache,
			dpop_proof_builder,
			token_endpoint: TokenEndpoint::new(http_client.clone(), error_mapper.clone()),
			http_client,
			error_mapper,
		})
	}
}

/// Token-cache key: `key_id|scope fingerprint|details identity`.
pub fn cache_key(key_id: &str, scope: &ScopeSet, details: Option<&TokenRequestDetails>) -> String {
	let identity = details.map(TokenRequestDetails::identity);

	format!(
		"{key_id}|{}|{}",
		scope.fingerprint(),
		identity.as_deref().unwrap_or(NO_DETAILS_IDENTITY)
	)
}
