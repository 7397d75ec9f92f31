//! Client-level error types shared across signing, endpoints, metadata, and flows.
//!
//! OAuth 2.0 error objects returned by the token endpoint are not errors here; they surface as
//! [`TokenResponse::Failure`](crate::endpoints::token::TokenResponse::Failure) values so callers
//! decide how to react. Everything in [`Error`] aborts the call it was raised from.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Identity provider broke the expected exchange.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	/// DPoP proof key does not match the key an access token is bound to.
	#[error(transparent)]
	Binding(#[from] BindingError),
	/// Signing or JWT serialization failed.
	#[error(transparent)]
	Signing(#[from] SigningError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Upstream service failed in a way that is not an OAuth error object.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A URL could not be derived or parsed.
	#[error("The {what} URL is invalid.")]
	InvalidUrl {
		/// Which URL failed to parse.
		what: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The engine builder was not given a client.
	#[error("No client is provided")]
	MissingClient,
	/// The client has no key reference to sign with.
	#[error("Missing key reference for client assertion")]
	MissingKeyReference,
	/// Client identifier is blank.
	#[error("Client identifier cannot be empty.")]
	EmptyClientId,
	/// Algorithm name is not one of the supported signature algorithms.
	#[error("Unsupported algorithm: {name}. Supported algorithms: {supported}")]
	UnsupportedAlgorithm {
		/// Offending algorithm name.
		name: String,
		/// Comma-separated list of accepted names.
		supported: String,
	},
	/// Algorithm does not belong to the key's family.
	#[error("{0}")]
	AlgorithmFamilyMismatch(&'static str),
	/// Elliptic curve of the key does not match the requested algorithm.
	#[error("Curve {curve} cannot be used with {algorithm}.")]
	CurveMismatch {
		/// Curve of the supplied key.
		curve: &'static str,
		/// Requested algorithm.
		algorithm: &'static str,
	},
	/// JWK text is not a valid key document.
	#[error("Bad string representation of a jwk")]
	MalformedJwk {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// JWK lacks a `kid`.
	#[error("Missing key-id in jwk")]
	MissingJwkKeyId,
	/// JWK lacks an `alg`.
	#[error("Missing algorithm in jwk")]
	MissingJwkAlgorithm,
	/// JWK is missing or carries unusable key parameters.
	#[error("Invalid {kty} key parameters in jwk: {reason}.")]
	InvalidJwkKey {
		/// Declared key type.
		kty: String,
		/// What was wrong with the parameters.
		reason: String,
	},
	/// Assertion details resolve to no claim at all.
	#[error("The resulting assertion details is empty")]
	EmptyAssertionDetails,
	/// Key pair generation failed.
	#[error("Unable to generate a {algorithm} key pair.")]
	KeyGeneration {
		/// Requested algorithm.
		algorithm: &'static str,
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// Scope values could not be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid_jwk(kty: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::InvalidJwkKey { kty: kty.into(), reason: reason.into() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Protocol violations raised by the identity provider's responses.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// The token endpoint asked for a nonce without supplying one.
	#[error("Response indicating missing nonce but none was provided.")]
	MissingDpopNonce,
	/// Token endpoint answered with a success status but an unreadable payload.
	#[error("Bad format on token response, HTTP status: {status}. Content length {content_length}")]
	MalformedTokenResponse {
		/// HTTP status code.
		status: u16,
		/// Length of the response body in bytes.
		content_length: usize,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Discovery document could not be parsed.
	#[error("Discovery document from {authority} is malformed.")]
	MalformedDiscoveryDocument {
		/// Authority the document was fetched for.
		authority: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Discovery document describes another issuer.
	#[error("The returned issuer {actual} doesn't match the expected {expected}.")]
	IssuerMismatch {
		/// Authority the caller configured.
		expected: String,
		/// Issuer announced by the document.
		actual: String,
	},
	/// Self-service response could not be processed.
	#[error("Unable to process the response: {reason}.")]
	MalformedClientSecretResponse {
		/// What failed while reading the body.
		reason: String,
	},
}

/// Access-token binding failures for DPoP proofs.
#[derive(Debug, ThisError)]
pub enum BindingError {
	/// The access token is not a parseable JWT.
	#[error("Unable to parse access token: {reason}.")]
	AccessTokenParse {
		/// What failed while decoding the token.
		reason: String,
	},
	/// The token's `cnf.jkt` differs from the proof key thumbprint.
	#[error(
		"The JWK thumbprint in the access token does not match the thumbprint of the private key JWK"
	)]
	ThumbprintMismatch,
}

/// Signing failures raised while producing JWTs.
#[derive(Debug, ThisError)]
pub enum SigningError {
	/// The signer rejected the key/algorithm pair.
	#[error("An error occurred during signing the {what}")]
	Signer {
		/// Which token was being signed.
		what: &'static str,
		/// Underlying signer failure.
		#[source]
		source: signature::Error,
	},
	/// Header or claims could not be serialized.
	#[error("Unable to serialize the {what}.")]
	Serialize {
		/// Which token was being serialized.
		what: &'static str,
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
	},
}

/// Upstream failures that are not OAuth error objects.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Discovery endpoint answered with a non-success status.
	#[error("Error occurred during fetching metadata: HTTP status {status}.")]
	Discovery {
		/// HTTP status code.
		status: u16,
	},
	/// Self-service endpoint failed server-side.
	#[error("Unexpected error from self service: HTTP status {status}.")]
	SelfService {
		/// HTTP status code.
		status: u16,
	},
	/// A self-service rotation did not produce a new secret.
	#[error("Update of client secret failed")]
	ClientSecretUpdate,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {endpoint} endpoint.")]
	Network {
		/// Endpoint label.
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the {endpoint} endpoint.")]
	Io {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying IO error.
		#[source]
		source: std::io::Error,
	},
	/// Transport failed with a message-only error.
	#[error("HTTP client error occurred while calling the {endpoint} endpoint: {message}.")]
	Other {
		/// Endpoint label.
		endpoint: &'static str,
		/// Transport-supplied message.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}
}
