//! Transport primitives for discovery, token, and self-service calls.
//!
//! The module exposes [`HelseIdHttpClient`] alongside [`ResponseMetadata`] and
//! [`ResponseMetadataSlot`] so downstream crates can plug in custom HTTP clients without losing
//! error classification. Implementations call [`ResponseMetadataSlot::take`] before dispatching
//! a request and [`ResponseMetadataSlot::store`] once an HTTP status is known, which lets a
//! [`TransportErrorMapper`] attach that status to the error it produces.

// std
use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Abstraction over HTTP transports that execute HelseID requests while publishing response
/// metadata to the error-mapping layer.
///
/// The trait is the client's only dependency on an HTTP stack. Callers provide an
/// implementation (typically behind `Arc<T>`) and the client requests a short-lived
/// [`AsyncHttpClient`] handle per request, each carrying a clone of a [`ResponseMetadataSlot`].
/// Handles must own whatever state they need so their request futures stay `Send` for the whole
/// in-flight call.
pub trait HelseIdHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the request so stale information
	///   never leaks across attempts.
	/// - Once a response (successful or not) is available, save its status with
	///   [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response was received.
	pub status: Option<u16>,
}

/// Thread-safe slot sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Maps HTTP transport failures into client [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] raised while calling `endpoint` into a client error.
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() => ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner) => TransportError::network(endpoint, *inner).into(),
			other => map_generic_error(endpoint, meta, other),
		}
	}
}

/// Maps the transport-independent [`HttpClientError`] variants.
///
/// Custom mappers can delegate to this for everything but their own transport variant.
pub fn map_generic_error<E>(
	endpoint: &'static str,
	meta: Option<&ResponseMetadata>,
	err: HttpClientError<E>,
) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	let status = meta.and_then(|meta| meta.status);

	match err {
		HttpClientError::Reqwest(inner) => TransportError::network(endpoint, *inner).into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(source) => TransportError::Io { endpoint, source }.into(),
		HttpClientError::Other(message) => TransportError::Other { endpoint, message, status }.into(),
		_ => TransportError::Other { endpoint, message: "unknown transport failure".into(), status }
			.into(),
	}
}

/// Sends `request` through a fresh handle and maps transport failures with `mapper`.
pub(crate) async fn execute<C, M>(
	client: &C,
	mapper: &M,
	endpoint: &'static str,
	request: HttpRequest,
) -> Result<HttpResponse>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let slot = ResponseMetadataSlot::default();
	let handle = client.with_metadata(slot.clone());

	match handle.call(request).await {
		Ok(response) => Ok(response),
		Err(e) => Err(mapper.map_transport_error(endpoint, slot.take().as_ref(), e)),
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token and self-service endpoints answer directly, so a custom [`ReqwestClient`] should not
/// follow redirects.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HelseIdHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle(Arc::new(InstrumentedHttpClient { client: self.0.clone(), slot }))
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that records response metadata.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()) });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
