//! HelseID machine-to-machine client: DPoP-bound client-credentials tokens with signed client
//! assertions, nonce-challenge handling, and in-memory token + discovery caches.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod assertion;
pub mod auth;
pub mod cache;
pub mod config;
pub mod dpop;
pub mod endpoints;
pub mod error;
pub mod flows;
pub mod http;
pub mod jose;
pub mod metadata;
pub mod obs;
pub mod signing;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
