//! Immutable client configuration.

// self
use crate::{_prelude::*, auth::ScopeSet, error::ConfigError, signing::KeyReference};

/// One logical HelseID client: its identifier, signing key, and default scopes.
#[derive(Clone, Debug)]
pub struct Client {
	client_id: String,
	key_reference: Arc<KeyReference>,
	scope: ScopeSet,
}
impl Client {
	/// Starts building a client with the given identifier.
	pub fn builder(client_id: impl Into<String>) -> ClientBuilder {
		ClientBuilder { client_id: client_id.into(), key_reference: None, scope: ScopeSet::default() }
	}

	/// Client identifier, used as `iss` and `sub` of every client assertion.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// Key the client signs assertions with.
	pub fn key_reference(&self) -> &Arc<KeyReference> {
		&self.key_reference
	}

	/// Scopes requested when a call does not name any.
	pub fn scope(&self) -> &ScopeSet {
		&self.scope
	}
}

/// Builder for [`Client`].
#[derive(Clone, Debug)]
pub struct ClientBuilder {
	client_id: String,
	key_reference: Option<Arc<KeyReference>>,
	scope: ScopeSet,
}
impl ClientBuilder {
	/// Sets the signing key.
	pub fn key_reference(mut self, key: impl Into<Arc<KeyReference>>) -> Self {
		self.key_reference = Some(key.into());

		self
	}

	/// Sets the default scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Parses and sets the default scopes from string values.
	pub fn scopes<I, S>(mut self, scopes: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scope = ScopeSet::new(scopes)?;

		Ok(self)
	}

	/// Validates and freezes the configuration.
	pub fn build(self) -> Result<Client, ConfigError> {
		if self.client_id.trim().is_empty() {
			return Err(ConfigError::EmptyClientId);
		}

		let key_reference = self.key_reference.ok_or(ConfigError::MissingKeyReference)?;

		Ok(Client { client_id: self.client_id, key_reference, scope: self.scope })
	}
}
