//! Signature algorithms and their key families.

// self
use crate::{_prelude::*, error::ConfigError};

/// Signature algorithms accepted by HelseID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
	/// RSASSA-PKCS1-v1_5 with SHA-256.
	RS256,
	/// RSASSA-PKCS1-v1_5 with SHA-384.
	RS384,
	/// RSASSA-PKCS1-v1_5 with SHA-512.
	RS512,
	/// RSASSA-PSS with SHA-256; signatures differ on every call.
	PS256,
	/// RSASSA-PSS with SHA-384; signatures differ on every call.
	PS384,
	/// RSASSA-PSS with SHA-512; signatures differ on every call.
	PS512,
	/// ECDSA over P-256 with SHA-256.
	ES256,
	/// ECDSA over P-384 with SHA-384.
	ES384,
	/// ECDSA over P-521 with SHA-512.
	ES512,
}
impl Algorithm {
	/// Every supported algorithm, RSA family first.
	pub const ALL: [Algorithm; 9] = [
		Self::RS256,
		Self::RS384,
		Self::RS512,
		Self::PS256,
		Self::PS384,
		Self::PS512,
		Self::ES256,
		Self::ES384,
		Self::ES512,
	];

	/// Parses the JOSE name (`"PS256"`, ...) of a supported algorithm.
	pub fn parse(name: &str) -> Result<Self, ConfigError> {
		Self::ALL.into_iter().find(|alg| alg.as_str() == name).ok_or_else(|| {
			ConfigError::UnsupportedAlgorithm {
				name: name.to_owned(),
				supported: format!(
					"[{}]",
					Self::ALL.iter().map(|alg| alg.as_str()).collect::<Vec<_>>().join(", ")
				),
			}
		})
	}

	/// JOSE `alg` header value.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::RS256 => "RS256",
			Self::RS384 => "RS384",
			Self::RS512 => "RS512",
			Self::PS256 => "PS256",
			Self::PS384 => "PS384",
			Self::PS512 => "PS512",
			Self::ES256 => "ES256",
			Self::ES384 => "ES384",
			Self::ES512 => "ES512",
		}
	}

	/// Key family this algorithm signs with.
	pub const fn family(self) -> AlgorithmFamily {
		match self {
			Self::RS256 | Self::RS384 | Self::RS512 | Self::PS256 | Self::PS384 | Self::PS512 =>
				AlgorithmFamily::Rsa,
			Self::ES256 | Self::ES384 | Self::ES512 => AlgorithmFamily::Ec,
		}
	}

	/// JWK `crv` name of the curve an EC algorithm requires.
	pub const fn curve(self) -> Option<&'static str> {
		match self {
			Self::ES256 => Some("P-256"),
			Self::ES384 => Some("P-384"),
			Self::ES512 => Some("P-521"),
			_ => None,
		}
	}
}
impl Display for Algorithm {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Algorithm {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

/// Groups of algorithms that share one key type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
	/// RSA signature algorithms (`RS*`, `PS*`).
	Rsa,
	/// Elliptic-curve signature algorithms (`ES*`).
	Ec,
}
impl AlgorithmFamily {
	/// Returns true if `algorithm` belongs to this family.
	pub fn contains(self, algorithm: Algorithm) -> bool {
		algorithm.family() == self
	}
}
