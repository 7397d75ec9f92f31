//! Authority-keyed registry that hands out one shared provider per authority.

// self
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{HelseIdHttpClient, TransportErrorMapper},
	metadata::{DEFAULT_METADATA_TTL, RemoteMetadataProvider, normalize_authority},
};

#[cfg(feature = "reqwest")]
/// Registry specialized for the crate's default reqwest transport stack.
pub type ReqwestMetadataRegistry = MetadataRegistry<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Registry of [`RemoteMetadataProvider`]s, constructed once by the application and passed to
/// every engine.
///
/// `get_or_create` holds the registry lock across check-then-create, so concurrent first access
/// for one authority still yields a single provider (and a single metadata cache).
pub struct MetadataRegistry<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	ttl: Duration,
	providers: Mutex<HashMap<String, Arc<RemoteMetadataProvider<C, M>>>>,
}
impl<C, M> MetadataRegistry<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an empty registry whose providers share `http_client` and `error_mapper`.
	pub fn new(http_client: impl Into<Arc<C>>, error_mapper: impl Into<Arc<M>>) -> Self {
		Self {
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			ttl: DEFAULT_METADATA_TTL,
			providers: Default::default(),
		}
	}

	/// Sets the TTL given to providers created from now on.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Shared HTTP client.
	pub fn http_client(&self) -> &Arc<C> {
		&self.http_client
	}

	/// Shared transport error mapper.
	pub fn error_mapper(&self) -> &Arc<M> {
		&self.error_mapper
	}

	/// Returns the provider for `authority`, creating it on first use.
	///
	/// Authorities differing only in trailing slashes share one provider.
	pub fn get_or_create(
		&self,
		authority: &str,
	) -> Result<Arc<RemoteMetadataProvider<C, M>>, ConfigError> {
		let key = normalize_authority(authority);
		let mut providers = self.providers.lock();

		if let Some(provider) = providers.get(&key) {
			return Ok(provider.clone());
		}

		let provider = Arc::new(
			RemoteMetadataProvider::new(
				&key,
				self.http_client.clone(),
				self.error_mapper.clone(),
			)?
			.with_ttl(self.ttl),
		);

		providers.insert(key, provider.clone());

		Ok(provider)
	}

	/// Number of registered authorities.
	pub fn len(&self) -> usize {
		self.providers.lock().len()
	}

	/// Returns true if no provider was created yet.
	pub fn is_empty(&self) -> bool {
		self.providers.lock().is_empty()
	}
}
#[cfg(feature = "reqwest")]
impl MetadataRegistry<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a registry over a default reqwest client.
	///
	/// Use [`MetadataRegistry::new`] to pass a tuned [`ReqwestClient`] (timeouts, proxies).
	pub fn with_default_transport() -> Self {
		Self::new(ReqwestHttpClient::default(), ReqwestTransportErrorMapper)
	}
}
impl<C, M> Debug for MetadataRegistry<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MetadataRegistry")
			.field("ttl", &self.ttl)
			.field("authorities", &self.providers.lock().keys().collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}
