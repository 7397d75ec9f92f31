//! Self-service client-secret rotation.
//!
//! The updater fetches a token for the self-service scope through the engine, then registers the
//! public half of the new key with the client-secret endpoint using a DPoP proof bound to that
//! token. The caller stores the returned private JWK and rotates again before `expiration`.

// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	endpoints::{
		ClientSecretEndpoint, ClientSecretErrorResponse, ClientSecretResponse, ErrorResponse,
		TokenResponse,
	},
	error::UpstreamError,
	flows::ClientCredentials,
	http::{HelseIdHttpClient, TransportErrorMapper},
	obs::{FlowKind, FlowOutcome, FlowSpan},
	signing::{Algorithm, KeyReference, RsaKeyReference},
};

/// Algorithm of keys produced by [`ClientSecretUpdater::generate_new_client_secret`].
pub const GENERATED_SECRET_ALGORITHM: Algorithm = Algorithm::PS256;

/// Outcome of a rotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdatedClientSecret {
	/// The new key is registered.
	Success {
		/// Private JWK JSON of the new key. Store it securely; it replaces the current secret.
		json_web_key: String,
		/// Instant the registered key stops being accepted.
		expiration: OffsetDateTime,
	},
	/// The token endpoint refused the self-service token.
	TokenFailure(ErrorResponse),
	/// The client-secret endpoint rejected the key.
	ClientSecretFailure(ClientSecretErrorResponse),
}
impl UpdatedClientSecret {
	/// Returns true for [`UpdatedClientSecret::Success`].
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success { .. })
	}
}

/// Rotates the client secret of the engine's client.
pub struct ClientSecretUpdater<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	endpoint: Url,
	scope: ScopeSet,
	client_credentials: Arc<ClientCredentials<C, M>>,
	client_secret_endpoint: ClientSecretEndpoint<C, M>,
}
impl<C, M> ClientSecretUpdater<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Updater posting to `endpoint` with tokens for `scope` from `client_credentials`.
	pub fn new(
		endpoint: Url,
		client_credentials: Arc<ClientCredentials<C, M>>,
		scope: ScopeSet,
	) -> Self {
		let client_secret_endpoint = ClientSecretEndpoint::new(
			client_credentials.http_client().clone(),
			client_credentials.error_mapper().clone(),
		);

		Self { endpoint, scope, client_credentials, client_secret_endpoint }
	}

	/// Self-service client-secret endpoint.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Scope requested for the self-service token.
	pub fn scope(&self) -> &ScopeSet {
		&self.scope
	}

	/// Generates an RSA key and registers it, treating any rejection as an error.
	pub async fn generate_new_client_secret(&self) -> Result<UpdatedClientSecret> {
		let key = KeyReference::from(RsaKeyReference::generate(GENERATED_SECRET_ALGORITHM)?);

		match self.update_client_secret(&key).await? {
			success @ UpdatedClientSecret::Success { .. } => Ok(success),
			_ => Err(UpstreamError::ClientSecretUpdate.into()),
		}
	}

	/// Registers `new_key` as the client's secret.
	///
	/// Rejections from either endpoint are values; transport and protocol failures are errors.
	pub async fn update_client_secret(&self, new_key: &KeyReference) -> Result<UpdatedClientSecret> {
		let span = FlowSpan::new(FlowKind::ClientSecretRotation, "update_client_secret");

		span.instrument(async {
			span.record(FlowOutcome::Attempt);

			span.finish(self.rotate(new_key).await)
		})
		.await
	}

	async fn rotate(&self, new_key: &KeyReference) -> Result<UpdatedClientSecret> {
		let token = match self.client_credentials.get_access_token(Some(&self.scope), None).await? {
			TokenResponse::Success(token) => token,
			TokenResponse::Failure(failure) => return Ok(UpdatedClientSecret::TokenFailure(failure)),
		};
		let jwk = new_key.private_jwk();
		let response = self
			.client_secret_endpoint
			.send_request(
				&self.endpoint,
				self.client_credentials.dpop_proof_builder(),
				token.access_token().expose(),
				&jwk,
			)
			.await?;

		Ok(match response {
			ClientSecretResponse::Success { expiration } =>
				UpdatedClientSecret::Success { json_web_key: jwk.to_json()?, expiration },
			ClientSecretResponse::Failure(failure) => UpdatedClientSecret::ClientSecretFailure(failure),
		})
	}
}
impl<C, M> Debug for ClientSecretUpdater<C, M>
where
	C: ?Sized + HelseIdHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientSecretUpdater")
			.field("endpoint", &self.endpoint.as_str())
			.field("scope", &self.scope)
			.finish_non_exhaustive()
	}
}
