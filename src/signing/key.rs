//! Key references: private key material bound to an algorithm and key id.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use rsa::{
	BigUint, Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey, pkcs1v15, pss,
	traits::{PrivateKeyParts, PublicKeyParts},
};
use sha2::{
	Sha256, Sha384, Sha512,
	digest::{Digest, DynDigest, const_oid::AssociatedOid},
};
use signature::{SignatureEncoding, Signer, Verifier};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	signing::{Algorithm, AlgorithmFamily, Jwk, jwk},
};

const RSA_KEY_BITS: usize = 2048;
const RSA_FAMILY_REQUIRED: &str = "Algorithm must be RSA compatible";
const EC_FAMILY_REQUIRED: &str = "Algorithm must be compatible with elliptic curve";

/// Elliptic-curve private key on one of the NIST curves.
#[derive(Clone, PartialEq, Eq)]
pub enum EcSecretKey {
	/// P-256 scalar.
	P256(p256::SecretKey),
	/// P-384 scalar.
	P384(p384::SecretKey),
	/// P-521 scalar.
	P521(p521::SecretKey),
}
impl EcSecretKey {
	/// JWK `crv` name of the key's curve.
	pub const fn curve(&self) -> &'static str {
		match self {
			Self::P256(_) => "P-256",
			Self::P384(_) => "P-384",
			Self::P521(_) => "P-521",
		}
	}

	fn public_key(&self) -> PublicKey {
		match self {
			Self::P256(key) => PublicKey::P256(key.public_key()),
			Self::P384(key) => PublicKey::P384(key.public_key()),
			Self::P521(key) => PublicKey::P521(key.public_key()),
		}
	}

	fn scalar_bytes(&self) -> Vec<u8> {
		match self {
			Self::P256(key) => key.to_bytes().to_vec(),
			Self::P384(key) => key.to_bytes().to_vec(),
			Self::P521(key) => key.to_bytes().to_vec(),
		}
	}
}

fn rsa_pkcs1v15_sign<D>(key: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>, signature::Error>
where
	D: Digest + AssociatedOid,
{
	Ok(key.sign(Pkcs1v15Sign::new::<D>(), &D::digest(message))?)
}

fn rsa_pss_sign<D>(key: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>, signature::Error>
where
	D: 'static + Digest + DynDigest + Send + Sync,
{
	Ok(key.sign_with_rng(&mut OsRng, Pss::new_blinded::<D>(), &D::digest(message))?)
}

/// Private half of a key pair.
#[derive(Clone, PartialEq, Eq)]
pub enum PrivateKey {
	/// RSA private key.
	Rsa(Box<RsaPrivateKey>),
	/// Elliptic-curve private key.
	Ec(EcSecretKey),
}
impl PrivateKey {
	/// Key family of the private key.
	pub const fn family(&self) -> AlgorithmFamily {
		match self {
			Self::Rsa(_) => AlgorithmFamily::Rsa,
			Self::Ec(_) => AlgorithmFamily::Ec,
		}
	}

	/// Derives the matching public key.
	pub fn public_key(&self) -> PublicKey {
		match self {
			Self::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
			Self::Ec(key) => key.public_key(),
		}
	}

	/// Signs `message`, returning the raw JWS signature bytes (`r || s` for ECDSA).
	pub fn sign(&self, algorithm: Algorithm, message: &[u8]) -> Result<Vec<u8>, signature::Error> {
		let signature = match (self, algorithm) {
			(Self::Rsa(key), Algorithm::RS256) => rsa_pkcs1v15_sign::<Sha256>(key, message)?,
			(Self::Rsa(key), Algorithm::RS384) => rsa_pkcs1v15_sign::<Sha384>(key, message)?,
			(Self::Rsa(key), Algorithm::RS512) => rsa_pkcs1v15_sign::<Sha512>(key, message)?,
			(Self::Rsa(key), Algorithm::PS256) => rsa_pss_sign::<Sha256>(key, message)?,
			(Self::Rsa(key), Algorithm::PS384) => rsa_pss_sign::<Sha384>(key, message)?,
			(Self::Rsa(key), Algorithm::PS512) => rsa_pss_sign::<Sha512>(key, message)?,
			(Self::Ec(EcSecretKey::P256(key)), Algorithm::ES256) => {
				let signature: p256::ecdsa::Signature =
					p256::ecdsa::SigningKey::from(key).try_sign(message)?;

				signature.to_vec()
			},
			(Self::Ec(EcSecretKey::P384(key)), Algorithm::ES384) => {
				let signature: p384::ecdsa::Signature =
					p384::ecdsa::SigningKey::from(key).try_sign(message)?;

				signature.to_vec()
			},
			(Self::Ec(EcSecretKey::P521(key)), Algorithm::ES512) => {
				let signature: p521::ecdsa::Signature =
					p521::ecdsa::SigningKey::from_slice(&key.to_bytes())?.try_sign(message)?;

				signature.to_vec()
			},
			_ => return Err(signature::Error::new()),
		};

		Ok(signature)
	}

	fn private_jwk(&self, algorithm: Algorithm, key_id: &str) -> Jwk {
		let mut jwk = self.public_key().jwk(algorithm, key_id);

		match self {
			Self::Rsa(key) => {
				let [p, q] = match key.primes() {
					[p, q, ..] => [Some(b64(p)), Some(b64(q))],
					_ => [None, None],
				};

				jwk.d = Some(b64(key.d()));
				jwk.p = p;
				jwk.q = q;
				jwk.dp = key.dp().map(b64);
				jwk.dq = key.dq().map(b64);
				jwk.qi = key.crt_coefficient().as_ref().map(b64);
			},
			Self::Ec(key) => jwk.d = Some(URL_SAFE_NO_PAD.encode(key.scalar_bytes())),
		}

		jwk
	}
}
impl Debug for PrivateKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Rsa(key) => f.debug_tuple("Rsa").field(&key.size()).finish_non_exhaustive(),
			Self::Ec(key) => f.debug_tuple("Ec").field(&key.curve()).finish_non_exhaustive(),
		}
	}
}

/// Public half of a key pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
	/// RSA public key.
	Rsa(RsaPublicKey),
	/// P-256 point.
	P256(p256::PublicKey),
	/// P-384 point.
	P384(p384::PublicKey),
	/// P-521 point.
	P521(p521::PublicKey),
}
impl PublicKey {
	/// Verifies a raw JWS signature produced by [`PrivateKey::sign`].
	pub fn verify(
		&self,
		algorithm: Algorithm,
		message: &[u8],
		signature: &[u8],
	) -> Result<(), signature::Error> {
		match (self, algorithm) {
			(Self::Rsa(key), Algorithm::RS256) => pkcs1v15::VerifyingKey::<Sha256>::new(key.clone())
				.verify(message, &pkcs1v15::Signature::try_from(signature)?),
			(Self::Rsa(key), Algorithm::RS384) => pkcs1v15::VerifyingKey::<Sha384>::new(key.clone())
				.verify(message, &pkcs1v15::Signature::try_from(signature)?),
			(Self::Rsa(key), Algorithm::RS512) => pkcs1v15::VerifyingKey::<Sha512>::new(key.clone())
				.verify(message, &pkcs1v15::Signature::try_from(signature)?),
			(Self::Rsa(key), Algorithm::PS256) => pss::VerifyingKey::<Sha256>::new(key.clone())
				.verify(message, &pss::Signature::try_from(signature)?),
			(Self::Rsa(key), Algorithm::PS384) => pss::VerifyingKey::<Sha384>::new(key.clone())
				.verify(message, &pss::Signature::try_from(signature)?),
			(Self::Rsa(key), Algorithm::PS512) => pss::VerifyingKey::<Sha512>::new(key.clone())
				.verify(message, &pss::Signature::try_from(signature)?),
			(Self::P256(key), Algorithm::ES256) => p256::ecdsa::VerifyingKey::from(key)
				.verify(message, &p256::ecdsa::Signature::from_slice(signature)?),
			(Self::P384(key), Algorithm::ES384) => p384::ecdsa::VerifyingKey::from(key)
				.verify(message, &p384::ecdsa::Signature::from_slice(signature)?),
			(Self::P521(key), Algorithm::ES512) =>
				p521::ecdsa::VerifyingKey::from_sec1_bytes(&key.to_sec1_bytes())?
					.verify(message, &p521::ecdsa::Signature::from_slice(signature)?),
			_ => Err(signature::Error::new()),
		}
	}

	/// Public JWK carrying `kid`, `alg`, and `use`.
	pub fn jwk(&self, algorithm: Algorithm, key_id: &str) -> Jwk {
		let mut jwk = Jwk {
			kid: Some(key_id.to_owned()),
			alg: Some(algorithm.as_str().to_owned()),
			key_use: Some("sig".into()),
			..Default::default()
		};

		match self {
			Self::Rsa(key) => {
				jwk.kty = "RSA".into();
				jwk.n = Some(b64(key.n()));
				jwk.e = Some(b64(key.e()));
			},
			_ => {
				let (crv, x, y) = self.ec_coordinates();

				jwk.kty = "EC".into();
				jwk.crv = Some(crv.into());
				jwk.x = Some(x);
				jwk.y = Some(y);
			},
		}

		jwk
	}

	/// RFC 7638 thumbprint of the key.
	pub fn thumbprint(&self) -> String {
		let canonical = match self {
			Self::Rsa(key) => jwk::canonical_rsa(&b64(key.e()), &b64(key.n())),
			_ => {
				let (crv, x, y) = self.ec_coordinates();

				jwk::canonical_ec(crv, &x, &y)
			},
		};

		jwk::thumbprint_of(&canonical)
	}

	// Base64url affine coordinates of an EC point; RSA keys map to empty strings.
	fn ec_coordinates(&self) -> (&'static str, String, String) {
		let (crv, point) = match self {
			Self::Rsa(_) => return ("", String::new(), String::new()),
			Self::P256(key) => ("P-256", key.to_encoded_point(false).as_bytes().to_vec()),
			Self::P384(key) => ("P-384", key.to_encoded_point(false).as_bytes().to_vec()),
			Self::P521(key) => ("P-521", key.to_encoded_point(false).as_bytes().to_vec()),
		};
		// Uncompressed SEC1: 0x04 || x || y.
		let coordinates = point.get(1..).unwrap_or_default();
		let (x, y) = coordinates.split_at(coordinates.len() / 2);

		(crv, URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y))
	}
}

/// RSA key pair with an RSA-family algorithm.
#[derive(Clone, Debug)]
pub struct RsaKeyReference {
	key: PrivateKey,
	algorithm: Algorithm,
	key_id: String,
}
impl RsaKeyReference {
	/// Binds an existing RSA key to `algorithm`.
	pub fn new(
		key: RsaPrivateKey,
		key_id: impl Into<String>,
		algorithm: Algorithm,
	) -> Result<Self, ConfigError> {
		if algorithm.family() != AlgorithmFamily::Rsa {
			return Err(ConfigError::AlgorithmFamilyMismatch(RSA_FAMILY_REQUIRED));
		}

		Ok(Self { key: PrivateKey::Rsa(Box::new(key)), algorithm, key_id: key_id.into() })
	}

	/// Generates a fresh 2048-bit key pair with a random key id.
	pub fn generate(algorithm: Algorithm) -> Result<Self, ConfigError> {
		if algorithm.family() != AlgorithmFamily::Rsa {
			return Err(ConfigError::AlgorithmFamilyMismatch(RSA_FAMILY_REQUIRED));
		}

		let key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).map_err(|e| {
			ConfigError::KeyGeneration { algorithm: algorithm.as_str(), source: Box::new(e) }
		})?;

		Self::new(key, random_key_id(), algorithm)
	}
}

/// Elliptic-curve key pair with an `ES*` algorithm on the matching curve.
#[derive(Clone, Debug)]
pub struct EcKeyReference {
	key: PrivateKey,
	algorithm: Algorithm,
	key_id: String,
}
impl EcKeyReference {
	/// Binds an existing EC key to `algorithm`; the curve must match the algorithm.
	pub fn new(
		key: EcSecretKey,
		key_id: impl Into<String>,
		algorithm: Algorithm,
	) -> Result<Self, ConfigError> {
		check_curve(key.curve(), algorithm)?;

		Ok(Self { key: PrivateKey::Ec(key), algorithm, key_id: key_id.into() })
	}

	/// Generates a fresh key pair on the algorithm's curve with a random key id.
	pub fn generate(algorithm: Algorithm) -> Result<Self, ConfigError> {
		let key = match algorithm {
			Algorithm::ES256 => EcSecretKey::P256(p256::SecretKey::random(&mut OsRng)),
			Algorithm::ES384 => EcSecretKey::P384(p384::SecretKey::random(&mut OsRng)),
			Algorithm::ES512 => EcSecretKey::P521(p521::SecretKey::random(&mut OsRng)),
			_ => return Err(ConfigError::AlgorithmFamilyMismatch(EC_FAMILY_REQUIRED)),
		};

		Self::new(key, random_key_id(), algorithm)
	}
}

/// Key parsed from a private JSON Web Key.
#[derive(Clone, Debug)]
pub struct JwkKeyReference {
	jwk: Jwk,
	key: PrivateKey,
	algorithm: Algorithm,
	key_id: String,
}
impl JwkKeyReference {
	/// Parses a private JWK. `kid` and `alg` are required; the key parameters must be complete
	/// and agree with the algorithm.
	pub fn parse(json: &str) -> Result<Self, ConfigError> {
		let jwk = Jwk::parse(json)?;
		let key_id = jwk.kid.clone().ok_or(ConfigError::MissingJwkKeyId)?;
		let algorithm = Algorithm::parse(jwk.alg.as_deref().ok_or(ConfigError::MissingJwkAlgorithm)?)?;
		let key = match jwk.kty.as_str() {
			"RSA" => {
				if algorithm.family() != AlgorithmFamily::Rsa {
					return Err(ConfigError::AlgorithmFamilyMismatch(RSA_FAMILY_REQUIRED));
				}

				rsa_from_jwk(&jwk)?
			},
			"EC" => {
				let key = ec_from_jwk(&jwk)?;

				check_curve(key.curve(), algorithm)?;

				PrivateKey::Ec(key)
			},
			other => return Err(ConfigError::invalid_jwk(other, "unsupported key type")),
		};

		Ok(Self { jwk, key, algorithm, key_id })
	}

	/// The parsed document, private members included.
	pub fn jwk(&self) -> &Jwk {
		&self.jwk
	}
}

/// Every key source the client can sign with.
#[derive(Clone, Debug)]
pub enum KeyReference {
	/// RSA key pair.
	Rsa(RsaKeyReference),
	/// Elliptic-curve key pair.
	Ec(EcKeyReference),
	/// Key parsed from a JWK.
	Jwk(JwkKeyReference),
}
impl KeyReference {
	/// Generates a fresh key pair of the algorithm's family.
	pub fn generate(algorithm: Algorithm) -> Result<Self, ConfigError> {
		match algorithm.family() {
			AlgorithmFamily::Rsa => RsaKeyReference::generate(algorithm).map(Self::Rsa),
			AlgorithmFamily::Ec => EcKeyReference::generate(algorithm).map(Self::Ec),
		}
	}

	/// Parses a private JWK into a key reference.
	pub fn from_jwk(json: &str) -> Result<Self, ConfigError> {
		JwkKeyReference::parse(json).map(Self::Jwk)
	}

	/// Algorithm every signature of this key uses.
	pub fn algorithm(&self) -> Algorithm {
		self.parts().1
	}

	/// Key id, emitted as the JWS `kid` header.
	pub fn key_id(&self) -> &str {
		self.parts().2
	}

	/// Private key material.
	pub fn private_key(&self) -> &PrivateKey {
		self.parts().0
	}

	/// Public key derived from the private key.
	pub fn public_key(&self) -> PublicKey {
		self.private_key().public_key()
	}

	/// Public JWK with `kid`, `alg`, and `use`.
	pub fn public_jwk(&self) -> Jwk {
		self.public_key().jwk(self.algorithm(), self.key_id())
	}

	/// Private JWK that [`KeyReference::from_jwk`] parses back into an equivalent key.
	pub fn private_jwk(&self) -> Jwk {
		self.private_key().private_jwk(self.algorithm(), self.key_id())
	}

	/// RFC 7638 thumbprint of the public key.
	pub fn thumbprint(&self) -> String {
		self.public_key().thumbprint()
	}

	/// Signs `message` with the bound algorithm.
	pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, signature::Error> {
		self.private_key().sign(self.algorithm(), message)
	}

	fn parts(&self) -> (&PrivateKey, Algorithm, &str) {
		match self {
			Self::Rsa(r) => (&r.key, r.algorithm, &r.key_id),
			Self::Ec(r) => (&r.key, r.algorithm, &r.key_id),
			Self::Jwk(r) => (&r.key, r.algorithm, &r.key_id),
		}
	}
}
impl From<RsaKeyReference> for KeyReference {
	fn from(value: RsaKeyReference) -> Self {
		Self::Rsa(value)
	}
}
impl From<EcKeyReference> for KeyReference {
	fn from(value: EcKeyReference) -> Self {
		Self::Ec(value)
	}
}
impl From<JwkKeyReference> for KeyReference {
	fn from(value: JwkKeyReference) -> Self {
		Self::Jwk(value)
	}
}

fn check_curve(curve: &'static str, algorithm: Algorithm) -> Result<(), ConfigError> {
	match algorithm.curve() {
		None => Err(ConfigError::AlgorithmFamilyMismatch(EC_FAMILY_REQUIRED)),
		Some(expected) if expected != curve =>
			Err(ConfigError::CurveMismatch { curve, algorithm: algorithm.as_str() }),
		Some(_) => Ok(()),
	}
}

fn random_key_id() -> String {
	uuid::Uuid::new_v4().to_string()
}

fn b64(value: &BigUint) -> String {
	URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

fn decode_member(jwk: &Jwk, name: &'static str, value: &Option<String>) -> Result<Vec<u8>, ConfigError> {
	let encoded = value
		.as_deref()
		.ok_or_else(|| ConfigError::invalid_jwk(&jwk.kty, format!("missing `{name}`")))?;

	URL_SAFE_NO_PAD
		.decode(encoded)
		.map_err(|e| ConfigError::invalid_jwk(&jwk.kty, format!("`{name}` is not base64url: {e}")))
}

fn rsa_from_jwk(jwk: &Jwk) -> Result<PrivateKey, ConfigError> {
	let int = |name: &'static str, value: &Option<String>| {
		decode_member(jwk, name, value).map(|b| BigUint::from_bytes_be(&b))
	};
	let key = RsaPrivateKey::from_components(
		int("n", &jwk.n)?,
		int("e", &jwk.e)?,
		int("d", &jwk.d)?,
		vec![int("p", &jwk.p)?, int("q", &jwk.q)?],
	)
	.map_err(|e| ConfigError::invalid_jwk("RSA", e.to_string()))?;

	Ok(PrivateKey::Rsa(Box::new(key)))
}

fn ec_from_jwk(jwk: &Jwk) -> Result<EcSecretKey, ConfigError> {
	let d = decode_member(jwk, "d", &jwk.d)?;
	let invalid = |e: p256::elliptic_curve::Error| ConfigError::invalid_jwk("EC", e.to_string());
	let key = match jwk.crv.as_deref() {
		Some("P-256") => EcSecretKey::P256(p256::SecretKey::from_slice(&d).map_err(invalid)?),
		Some("P-384") => EcSecretKey::P384(p384::SecretKey::from_slice(&d).map_err(invalid)?),
		Some("P-521") => EcSecretKey::P521(p521::SecretKey::from_slice(&d).map_err(invalid)?),
		Some(other) => return Err(ConfigError::invalid_jwk("EC", format!("unsupported curve {other}"))),
		None => return Err(ConfigError::invalid_jwk("EC", "missing `crv`")),
	};
	let (_, x, y) = key.public_key().ec_coordinates();

	if jwk.x.as_deref() != Some(x.as_str()) || jwk.y.as_deref() != Some(y.as_str()) {
		return Err(ConfigError::invalid_jwk("EC", "public coordinates do not match `d`"));
	}

	Ok(key)
}
