//! JSON Web Key documents and RFC 7638 thumbprints.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, SigningError},
};

/// JSON Web Key restricted to the RSA and EC parameters this client understands.
///
/// Private members (`d`, `p`, `q`, `dp`, `dq`, `qi`) are never printed by [`Debug`].
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
	/// Key type, `"RSA"` or `"EC"`.
	pub kty: String,
	/// Key identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kid: Option<String>,
	/// Signature algorithm the key is meant for.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub alg: Option<String>,
	/// Intended key use.
	#[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
	pub key_use: Option<String>,
	/// EC curve name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub crv: Option<String>,
	/// EC x coordinate.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub x: Option<String>,
	/// EC y coordinate.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub y: Option<String>,
	/// RSA modulus.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub n: Option<String>,
	/// RSA public exponent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub e: Option<String>,
	/// Private exponent (RSA) or private scalar (EC).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub d: Option<String>,
	/// First RSA prime factor.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub p: Option<String>,
	/// Second RSA prime factor.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub q: Option<String>,
	/// First RSA CRT exponent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dp: Option<String>,
	/// Second RSA CRT exponent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dq: Option<String>,
	/// RSA CRT coefficient.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub qi: Option<String>,
}
impl Jwk {
	/// Parses a JWK from its JSON text.
	pub fn parse(json: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(json);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ConfigError::MalformedJwk { source })
	}

	/// Copy with every private member removed.
	pub fn to_public(&self) -> Self {
		Self { d: None, p: None, q: None, dp: None, dq: None, qi: None, ..self.clone() }
	}

	/// Returns true when the document carries a private component.
	pub fn is_private(&self) -> bool {
		self.d.is_some()
	}

	/// Compact JSON text of the document.
	pub fn to_json(&self) -> Result<String, SigningError> {
		serde_json::to_string(self).map_err(|source| SigningError::Serialize { what: "jwk", source })
	}

	/// RFC 7638 thumbprint: base64url SHA-256 over the required public members in lexical order.
	pub fn thumbprint(&self) -> Result<String, ConfigError> {
		let member = |name: &'static str, value: &Option<String>| {
			value.clone().ok_or_else(|| ConfigError::invalid_jwk(&self.kty, format!("missing `{name}`")))
		};
		let canonical = match self.kty.as_str() {
			"RSA" => canonical_rsa(&member("e", &self.e)?, &member("n", &self.n)?),
			"EC" => canonical_ec(
				&member("crv", &self.crv)?,
				&member("x", &self.x)?,
				&member("y", &self.y)?,
			),
			other => return Err(ConfigError::invalid_jwk(other, "unsupported key type")),
		};

		Ok(thumbprint_of(&canonical))
	}
}
impl Debug for Jwk {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Jwk")
			.field("kty", &self.kty)
			.field("kid", &self.kid)
			.field("alg", &self.alg)
			.field("crv", &self.crv)
			.field("private", &self.is_private())
			.finish_non_exhaustive()
	}
}

pub(crate) fn canonical_rsa(e: &str, n: &str) -> String {
	format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#)
}

pub(crate) fn canonical_ec(crv: &str, x: &str, y: &str) -> String {
	format!(r#"{{"crv":"{crv}","kty":"EC","x":"{x}","y":"{y}"}}"#)
}

pub(crate) fn thumbprint_of(canonical: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	// RFC 7638 section 3.1 example key.
	const RFC_7638_N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";

	#[test]
	fn rsa_thumbprint_matches_rfc_7638_example() {
		let jwk = Jwk {
			kty: "RSA".into(),
			n: Some(RFC_7638_N.into()),
			e: Some("AQAB".into()),
			alg: Some("RS256".into()),
			kid: Some("2011-04-29".into()),
			..Default::default()
		};

		assert_eq!(
			jwk.thumbprint().expect("RSA thumbprint should compute."),
			"NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
		);
	}

	#[test]
	fn public_copy_drops_private_members() {
		let jwk = Jwk {
			kty: "EC".into(),
			crv: Some("P-256".into()),
			x: Some("x".into()),
			y: Some("y".into()),
			d: Some("secret".into()),
			..Default::default()
		};
		let public = jwk.to_public();

		assert!(jwk.is_private());
		assert!(!public.is_private());
		assert!(!public.to_json().expect("JWK should serialize.").contains("secret"));
		assert!(!format!("{jwk:?}").contains("secret"));
	}

	#[test]
	fn parse_reports_malformed_documents() {
		assert!(matches!(Jwk::parse("{not json"), Err(ConfigError::MalformedJwk { .. })));
		assert!(matches!(
			Jwk { kty: "oct".into(), ..Default::default() }.thumbprint(),
			Err(ConfigError::InvalidJwkKey { .. })
		));
	}
}
