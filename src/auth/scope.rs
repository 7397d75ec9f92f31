//! Scope modeling for token requests and cache keys.

// std
use std::{collections::BTreeSet, sync::OnceLock};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Deduplicated, sorted set of OAuth scopes.
///
/// Ordering of the input never matters: `["b", "a"]` and `["a", "b", "a"]` compare equal and
/// share one [`fingerprint`](Self::fingerprint), which is what the token cache keys on.
#[derive(Default)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
	fingerprint: OnceLock<String>,
}
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for scope in scopes {
			let owned: String = scope.into();

			if owned.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if owned.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
			}

			set.insert(owned);
		}

		Ok(Self { scopes: set.into_iter().collect(), fingerprint: OnceLock::new() })
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(String::as_str)
	}

	/// Space-delimited form used in the `scope` request parameter.
	pub fn normalized(&self) -> String {
		self.scopes.join(" ")
	}

	/// Base64url (no padding) SHA-256 digest of [`normalized`](Self::normalized), cached after the
	/// first call.
	pub fn fingerprint(&self) -> &str {
		self.fingerprint.get_or_init(|| {
			URL_SAFE_NO_PAD.encode(Sha256::digest(self.normalized().as_bytes()))
		})
	}
}
impl Clone for ScopeSet {
	fn clone(&self) -> Self {
		Self { scopes: self.scopes.clone(), fingerprint: self.fingerprint.clone() }
	}
}
impl PartialEq for ScopeSet {
	fn eq(&self, other: &Self) -> bool {
		self.scopes == other.scopes
	}
}
impl Eq for ScopeSet {}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.scopes.len()))?;

		for scope in self.scopes.iter() {
			seq.serialize_element(scope)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}
