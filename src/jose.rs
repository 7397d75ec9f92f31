//! Compact JWS encoding and unverified JWT inspection.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::SigningError,
	signing::{Jwk, KeyReference, PublicKey},
};

/// Protected header of the JWTs this client signs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
	/// Media type of the token, e.g. `dpop+jwt`.
	pub typ: String,
	/// Signature algorithm.
	pub alg: String,
	/// Key id of the signing key.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kid: Option<String>,
	/// Embedded public key (DPoP proofs only).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub jwk: Option<Jwk>,
}
impl JwsHeader {
	/// Header for `key` with the given `typ`.
	pub fn for_key(typ: &str, key: &KeyReference) -> Self {
		Self {
			typ: typ.to_owned(),
			alg: key.algorithm().as_str().to_owned(),
			kid: Some(key.key_id().to_owned()),
			jwk: None,
		}
	}
}

/// Serializes `header` and `claims`, signs them with `key`, and returns the compact form.
///
/// `what` names the token in error messages.
pub fn sign_compact<C>(
	key: &KeyReference,
	header: &JwsHeader,
	claims: &C,
	what: &'static str,
) -> Result<String, SigningError>
where
	C: Serialize,
{
	let encode = |value: Vec<u8>| URL_SAFE_NO_PAD.encode(value);
	let header = serde_json::to_vec(header).map_err(|source| SigningError::Serialize { what, source })?;
	let claims = serde_json::to_vec(claims).map_err(|source| SigningError::Serialize { what, source })?;
	let signing_input = format!("{}.{}", encode(header), encode(claims));
	let signature =
		key.sign(signing_input.as_bytes()).map_err(|source| SigningError::Signer { what, source })?;

	Ok(format!("{signing_input}.{}", encode(signature)))
}

/// Header and claims of a compact JWT, decoded without checking the signature.
#[derive(Clone, Debug)]
pub struct UnverifiedJwt {
	/// Decoded protected header.
	pub header: Value,
	/// Decoded claims set.
	pub claims: Value,
}

/// Why a compact token could not be read.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DecodeError {
	/// Token does not have exactly three dot-separated segments.
	#[error("expected three segments, found {0}")]
	Segments(usize),
	/// A segment is not base64url.
	#[error("the {0} segment is not base64url")]
	Encoding(&'static str),
	/// A segment is not a JSON object.
	#[error("the {0} segment is not a JSON object")]
	Json(&'static str),
	/// The signature does not verify.
	#[error("the signature does not verify")]
	Signature,
}

/// Decodes the header and claims of `token` without verifying it.
pub fn decode_unverified(token: &str) -> Result<UnverifiedJwt, DecodeError> {
	let segments = token.split('.').collect::<Vec<_>>();
	let [header, claims, _signature] = segments.as_slice() else {
		return Err(DecodeError::Segments(segments.len()));
	};

	Ok(UnverifiedJwt { header: json_segment(header, "header")?, claims: json_segment(claims, "claims")? })
}

/// Verifies `token` against `public_key` using the algorithm named in its header.
pub fn verify_compact(token: &str, public_key: &PublicKey) -> Result<UnverifiedJwt, DecodeError> {
	let decoded = decode_unverified(token)?;
	let algorithm = decoded
		.header
		.get("alg")
		.and_then(Value::as_str)
		.and_then(|alg| crate::signing::Algorithm::parse(alg).ok())
		.ok_or(DecodeError::Json("header"))?;
	let (signing_input, signature) = token.rsplit_once('.').ok_or(DecodeError::Segments(1))?;
	let signature =
		URL_SAFE_NO_PAD.decode(signature).map_err(|_| DecodeError::Encoding("signature"))?;

	public_key
		.verify(algorithm, signing_input.as_bytes(), &signature)
		.map_err(|_| DecodeError::Signature)?;

	Ok(decoded)
}

/// Random base64url `jti` backed by 12 bytes of entropy.
pub(crate) fn random_jti() -> String {
	URL_SAFE_NO_PAD.encode(rand::random::<[u8; 12]>())
}

fn json_segment(segment: &str, what: &'static str) -> Result<Value, DecodeError> {
	let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|_| DecodeError::Encoding(what))?;

	match serde_json::from_slice(&bytes) {
		Ok(value @ Value::Object(_)) => Ok(value),
		_ => Err(DecodeError::Json(what)),
	}
}
