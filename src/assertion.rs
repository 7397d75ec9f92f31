//! Signed client assertions and the `assertion_details` claim.
//!
//! A client assertion is a short-lived JWT (`private_key_jwt`) the client presents to the token
//! endpoint instead of a shared secret. HelseID reads authorization context from its optional
//! `assertion_details` claim, shaped here from [`TokenRequestDetails`].

// crates.io
use serde_json::{Value, json};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	cache,
	config::Client,
	error::ConfigError,
	jose::{self, JwsHeader},
};

/// JWS `typ` of client assertions.
pub const CLIENT_ASSERTION_TYPE: &str = "client-authentication+jwt";
/// Fixed lifetime of a client assertion in milliseconds.
pub const CLIENT_ASSERTION_LIFETIME_MILLIS: i64 = 5_000;

const AUTHORIZATION_CLAIM_TYPE: &str = "helseid_authorization";
const ORGANIZATION_IDENTIFIER_TYPE: &str = "ENH";
const SINGLE_TENANT_SYSTEM: &str = "urn:oid:2.16.578.1.12.4.1.4.101";
const MULTI_TENANT_SYSTEM: &str = "urn:oid:1.0.6523";
const MULTI_TENANT_VALUE_PREFIX: &str = "NO:ORGNR:";
const JOURNAL_ID_CLAIM_TYPE: &str = "nhn:sfm:journal-id";

/// Whether the client acts for one organization or on behalf of several.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tenancy {
	/// The client represents exactly one organization.
	#[default]
	SingleTenant,
	/// The client acts for delegated organizations identified by parent/child numbers.
	MultiTenant,
}
impl Tenancy {
	/// Stable label used in cache identities.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::SingleTenant => "single_tenant",
			Self::MultiTenant => "multi_tenant",
		}
	}
}

/// Request-scoped authorization context for one token call.
///
/// Construction resolves the `assertion_details` claim eagerly, so a value of this type always
/// produces at least one claim.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenRequestDetails {
	tenancy: Tenancy,
	parent_organization_number: Option<String>,
	child_organization_number: Option<String>,
	sfm_journal_id: Option<String>,
	scope: ScopeSet,
	assertion_details: Value,
}
impl TokenRequestDetails {
	/// Starts building details; tenancy defaults to [`Tenancy::SingleTenant`].
	pub fn builder() -> TokenRequestDetailsBuilder {
		TokenRequestDetailsBuilder::default()
	}

	/// Tenancy of the client.
	pub fn tenancy(&self) -> Tenancy {
		self.tenancy
	}

	/// Parent organization number (multi-tenant).
	pub fn parent_organization_number(&self) -> Option<&str> {
		self.parent_organization_number.as_deref()
	}

	/// Child organization number.
	pub fn child_organization_number(&self) -> Option<&str> {
		self.child_organization_number.as_deref()
	}

	/// Identifier of an external journal.
	pub fn sfm_journal_id(&self) -> Option<&str> {
		self.sfm_journal_id.as_deref()
	}

	/// Scopes requested for this call; empty means "use the caller's or the client's".
	pub fn scope(&self) -> &ScopeSet {
		&self.scope
	}

	/// The `assertion_details` claim value: one claim object, or a list of two.
	pub fn assertion_details(&self) -> &Value {
		&self.assertion_details
	}

	/// Stable identity joining the tenancy and every present field, used in token cache keys.
	pub fn identity(&self) -> String {
		let mut identity = self.tenancy.as_str().to_owned();

		let fields = [
			("parent", &self.parent_organization_number),
			("child", &self.child_organization_number),
			("journal", &self.sfm_journal_id),
		];

		for (label, value) in fields.iter().filter_map(|(label, value)| Some((label, value.as_ref()?))) {
			identity.push_str(&format!(";{label}={value}"));
		}

		identity
	}
}

/// Builder for [`TokenRequestDetails`].
#[derive(Clone, Debug, Default)]
pub struct TokenRequestDetailsBuilder {
	tenancy: Tenancy,
	parent_organization_number: Option<String>,
	child_organization_number: Option<String>,
	sfm_journal_id: Option<String>,
	scopes: Vec<String>,
}
impl TokenRequestDetailsBuilder {
	/// Sets the tenancy.
	pub fn tenancy(mut self, tenancy: Tenancy) -> Self {
		self.tenancy = tenancy;

		self
	}

	/// Sets the parent organization number.
	pub fn parent_organization_number(mut self, number: impl Into<String>) -> Self {
		self.parent_organization_number = Some(number.into());

		self
	}

	/// Sets the child organization number.
	pub fn child_organization_number(mut self, number: impl Into<String>) -> Self {
		self.child_organization_number = Some(number.into());

		self
	}

	/// Sets the external journal identifier.
	pub fn sfm_journal_id(mut self, id: impl Into<String>) -> Self {
		self.sfm_journal_id = Some(id.into());

		self
	}

	/// Adds one requested scope.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scopes.push(scope.into());

		self
	}

	/// Adds several requested scopes.
	pub fn scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes.extend(scopes.into_iter().map(Into::into));

		self
	}

	/// Validates the scopes and resolves the `assertion_details` claim.
	pub fn build(self) -> Result<TokenRequestDetails, ConfigError> {
		let scope = ScopeSet::new(self.scopes)?;
		let mut claims = Vec::with_capacity(2);

		match (self.tenancy, &self.parent_organization_number, &self.child_organization_number) {
			(Tenancy::SingleTenant, _, Some(child)) =>
				claims.push(organization_claim(SINGLE_TENANT_SYSTEM, child.clone())),
			(Tenancy::MultiTenant, Some(parent), child) => {
				let mut value = format!("{MULTI_TENANT_VALUE_PREFIX}{parent}");

				if let Some(child) = child {
					value.push(':');
					value.push_str(child);
				}

				claims.push(organization_claim(MULTI_TENANT_SYSTEM, value));
			},
			_ => (),
		}

		if let Some(journal_id) = &self.sfm_journal_id {
			claims.push(json!({ "type": JOURNAL_ID_CLAIM_TYPE, "value": { "journal_id": journal_id } }));
		}

		let assertion_details = match claims.len() {
			0 => return Err(ConfigError::EmptyAssertionDetails),
			1 => claims.remove(0),
			_ => Value::Array(claims),
		};

		Ok(TokenRequestDetails {
			tenancy: self.tenancy,
			parent_organization_number: self.parent_organization_number,
			child_organization_number: self.child_organization_number,
			sfm_journal_id: self.sfm_journal_id,
			scope,
			assertion_details,
		})
	}
}

#[derive(Serialize)]
struct ClientAssertionClaims<'a> {
	aud: &'a str,
	sub: &'a str,
	iss: &'a str,
	jti: String,
	iat: i64,
	nbf: i64,
	exp: i64,
	#[serde(skip_serializing_if = "Option::is_none")]
	assertion_details: Option<&'a Value>,
}

/// Builds and signs a client assertion for one token request.
#[derive(Clone, Debug)]
pub struct ClientAssertionBuilder<'a> {
	audience: &'a str,
	client: &'a Client,
	assertion_details: Option<&'a Value>,
	issued_at: Option<OffsetDateTime>,
}
impl<'a> ClientAssertionBuilder<'a> {
	/// Assertion for `client` addressed to `audience` (the issuer).
	pub fn new(audience: &'a str, client: &'a Client) -> Self {
		Self { audience, client, assertion_details: None, issued_at: None }
	}

	/// Embeds the `assertion_details` claim of `details`.
	pub fn details(mut self, details: Option<&'a TokenRequestDetails>) -> Self {
		self.assertion_details = details.map(TokenRequestDetails::assertion_details);

		self
	}

	/// Overrides the issue instant; defaults to now.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Signs the assertion with the client's key.
	pub fn sign(self) -> Result<String> {
		let key = self.client.key_reference();
		let now = self.issued_at.map(cache::epoch_millis).unwrap_or_else(cache::now_epoch_millis);
		let claims = ClientAssertionClaims {
			aud: self.audience,
			sub: self.client.client_id(),
			iss: self.client.client_id(),
			jti: jose::random_jti(),
			iat: now / 1_000,
			nbf: now / 1_000,
			exp: (now + CLIENT_ASSERTION_LIFETIME_MILLIS) / 1_000,
			assertion_details: self.assertion_details,
		};
		let header = JwsHeader::for_key(CLIENT_ASSERTION_TYPE, key);

		Ok(jose::sign_compact(key, &header, &claims, "client assertion")?)
	}
}

fn organization_claim(system: &str, value: String) -> Value {
	json!({
		"type": AUTHORIZATION_CLAIM_TYPE,
		"practitioner_role": {
			"organization": {
				"identifier": {
					"system": system,
					"type": ORGANIZATION_IDENTIFIER_TYPE,
					"value": value,
				}
			}
		}
	})
}
