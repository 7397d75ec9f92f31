//! Discovery metadata resolution and caching.
//!
//! [`RemoteMetadataProvider`] resolves `{authority}/.well-known/openid-configuration` and caches
//! the consumed subset under one fixed key. Providers are shared per authority through a
//! [`MetadataRegistry`], so every engine talking to the same authority shares one cache.

pub mod registry;

pub use registry::*;

// crates.io
use oauth2::http::{Method, header::ACCEPT};
// self
use crate::{
	_prelude::*,
	cache::{self, ExpiringCache, InMemoryExpiringCache},
	error::{ConfigError, ProtocolError, UpstreamError},
	http::{self, HelseIdHttpClient, TransportErrorMapper},
	obs::{FlowKind, FlowOutcome, FlowSpan},
};

/// Default lifetime of cached discovery metadata.
pub const DEFAULT_METADATA_TTL: Duration = Duration::hours(24);

const METADATA_CACHE_KEY: &str = "metadata";
const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Boxed future returned by [`MetadataProvider`] implementations.
pub type MetadataFuture<'a> = Pin<Box<dyn Future<Output = Result<Metadata>> + 'a + Send>>;

/// Discovery document subset the client consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
	issuer: String,
	token_endpoint: Url,
}
impl Metadata {
	/// Builds metadata from known values.
	pub fn new(issuer: impl Into<String>, token_endpoint: Url) -> Self {
		Self { issuer: issuer.into(), token_endpoint }
	}

	/// `issuer`, the audience of client assertions.
	pub fn issuer(&self) -> &str {
		&self.issuer
	}

	/// `token_endpoint`.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}
}

#[derive(Deserialize)]
struct DiscoveryDocument {
	issuer: String,
	token_endpoint: String,
}

/// Source of discovery metadata.
pub trait MetadataProvider
where
	Self: Send + Sync,
{
	/// Returns the current metadata, fetching it when nothing live is cached.
	fn get_metadata(&self) -> MetadataFuture<'_>;
}

/// Provider that always returns the same metadata.
#[derive(Clone, Debug)]
pub struct StaticMetadataProvider(Metadata);
impl StaticMetadataProvider {
	/// Wraps fixed metadata.
	pub fn new(metadata: Metadata) -> Self {
		Self(metadata)
	}
}
impl MetadataProvider for StaticMetadataProvider {
	fn get_metadata(&self) -> MetadataFuture<'_> {
		let metadata = self.0.clone();

		Box::pin(async move { Ok(metadata) })
	}
}

/// Provider resolving metadata from the authority's discovery endpoint.
pub struct RemoteMetadataProvider<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	authority: String,
	discovery_url: Url,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	cache: Arc<dyn ExpiringCache<Metadata>>,
	ttl: Duration,
}
impl<C, M> RemoteMetadataProvider<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a provider for `authority` with a private in-memory cache and the default TTL.
	pub fn new(
		authority: &str,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self, ConfigError> {
		let authority = normalize_authority(authority);
		let discovery_url = Url::parse(&format!("{authority}/{DISCOVERY_PATH}"))
			.map_err(|source| ConfigError::InvalidUrl { what: "authority", source })?;

		Ok(Self {
			authority,
			discovery_url,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			cache: Arc::new(InMemoryExpiringCache::<Metadata>::new()),
			ttl: DEFAULT_METADATA_TTL,
		})
	}

	/// Overrides the cache lifetime. A negative TTL refetches on every call.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Replaces the metadata cache.
	pub fn with_cache(mut self, cache: Arc<dyn ExpiringCache<Metadata>>) -> Self {
		self.cache = cache;

		self
	}

	/// Authority without trailing slashes.
	pub fn authority(&self) -> &str {
		&self.authority
	}

	/// Discovery document URL.
	pub fn discovery_url(&self) -> &Url {
		&self.discovery_url
	}

	async fn resolve(&self) -> Result<Metadata> {
		if let Some(metadata) = self.cache.get(METADATA_CACHE_KEY).await {
			return Ok(metadata);
		}

		let metadata = self.fetch().await?;
		let expire_at = cache::expire_at_after(self.ttl);

		self.cache.put(METADATA_CACHE_KEY.into(), metadata.clone(), expire_at).await;

		Ok(metadata)
	}

	async fn fetch(&self) -> Result<Metadata> {
		let request = oauth2::http::Request::builder()
			.method(Method::GET)
			.uri(self.discovery_url.as_str())
			.header(ACCEPT, "application/json")
			.body(Vec::new())
			.map_err(ConfigError::from)?;
		let response =
			http::execute(&*self.http_client, &*self.error_mapper, "discovery", request).await?;

		if !response.status().is_success() {
			return Err(UpstreamError::Discovery { status: response.status().as_u16() }.into());
		}

		let mut deserializer = serde_json::Deserializer::from_slice(response.body());
		let document: DiscoveryDocument = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ProtocolError::MalformedDiscoveryDocument {
				authority: self.authority.clone(),
				source,
			})?;

		if normalize_authority(&document.issuer) != self.authority {
			return Err(ProtocolError::IssuerMismatch {
				expected: self.authority.clone(),
				actual: document.issuer,
			}
			.into());
		}

		let token_endpoint = Url::parse(&document.token_endpoint)
			.map_err(|source| ConfigError::InvalidUrl { what: "token endpoint", source })?;

		Ok(Metadata { issuer: document.issuer, token_endpoint })
	}
}
impl<C, M> MetadataProvider for RemoteMetadataProvider<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn get_metadata(&self) -> MetadataFuture<'_> {
		let span = FlowSpan::new(FlowKind::Discovery, "get_metadata");

		Box::pin(span.clone().instrument(async move {
			span.record(FlowOutcome::Attempt);

			span.finish(self.resolve().await)
		}))
	}
}
impl<C, M> Debug for RemoteMetadataProvider<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RemoteMetadataProvider")
			.field("authority", &self.authority)
			.field("ttl", &self.ttl)
			.finish_non_exhaustive()
	}
}

pub(crate) fn normalize_authority(authority: &str) -> String {
	authority.trim().trim_end_matches('/').to_owned()
}
