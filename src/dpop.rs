//! DPoP proof construction (RFC 9449).

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use oauth2::http::Method;
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	error::BindingError,
	jose::{self, JwsHeader},
	signing::KeyReference,
};

/// JWS `typ` of DPoP proofs.
pub const DPOP_PROOF_TYPE: &str = "dpop+jwt";

#[derive(Serialize)]
struct DpopClaims<'a> {
	htm: &'a str,
	htu: String,
	iat: i64,
	jti: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	nonce: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	ath: Option<String>,
}

/// Signs DPoP proofs with one key.
///
/// Every proof gets a fresh `jti` and `iat`; the builder keeps no per-proof state and is shared
/// freely between tasks.
#[derive(Clone, Debug)]
pub struct DpopProofBuilder {
	key: Arc<KeyReference>,
	thumbprint: String,
}
impl DpopProofBuilder {
	/// Creates a builder signing with `key`.
	pub fn new(key: impl Into<Arc<KeyReference>>) -> Self {
		let key = key.into();
		let thumbprint = key.thumbprint();

		Self { key, thumbprint }
	}

	/// Key id of the proof key.
	pub fn key_id(&self) -> &str {
		self.key.key_id()
	}

	/// RFC 7638 thumbprint of the proof key, the value access tokens carry in `cnf.jkt`.
	pub fn thumbprint(&self) -> &str {
		&self.thumbprint
	}

	/// The proof key.
	pub fn key(&self) -> &Arc<KeyReference> {
		&self.key
	}

	/// Proof for a token-endpoint exchange, echoing `nonce` when the server issued one.
	pub fn proof_with_nonce(&self, method: &Method, htu: &Url, nonce: Option<&str>) -> Result<String> {
		self.sign(method, htu, nonce, None)
	}

	/// Proof for a protected-resource call with `access_token`, carrying its `ath` hash.
	///
	/// Fails when the token's `cnf.jkt` is not this key's thumbprint.
	pub fn proof_for_access_token(
		&self,
		method: &Method,
		htu: &Url,
		access_token: &str,
	) -> Result<String> {
		let token = jose::decode_unverified(access_token)
			.map_err(|e| BindingError::AccessTokenParse { reason: e.to_string() })?;
		let jkt = token.claims.get("cnf").and_then(|cnf| cnf.get("jkt")).and_then(|jkt| jkt.as_str());

		if jkt != Some(self.thumbprint.as_str()) {
			return Err(BindingError::ThumbprintMismatch.into());
		}

		self.sign(method, htu, None, Some(access_token_hash(access_token)))
	}

	fn sign(
		&self,
		method: &Method,
		htu: &Url,
		nonce: Option<&str>,
		ath: Option<String>,
	) -> Result<String> {
		let mut target = htu.clone();

		target.set_query(None);
		target.set_fragment(None);

		let claims = DpopClaims {
			htm: method.as_str(),
			htu: target.into(),
			iat: OffsetDateTime::now_utc().unix_timestamp(),
			jti: jose::random_jti(),
			nonce,
			ath,
		};
		let header = JwsHeader {
			jwk: Some(self.key.public_jwk()),
			..JwsHeader::for_key(DPOP_PROOF_TYPE, &self.key)
		};

		Ok(jose::sign_compact(&self.key, &header, &claims, "DPoP proof")?)
	}
}

/// `ath` value for `access_token`: base64url SHA-256 of its ASCII bytes.
pub fn access_token_hash(access_token: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(access_token.as_bytes()))
}
