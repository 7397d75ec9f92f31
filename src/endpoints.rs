//! HTTP endpoint clients: the token endpoint and the self-service client-secret endpoint.

pub mod client_secret;
pub mod token;

pub use client_secret::*;
pub use token::*;

// crates.io
use oauth2::HttpResponse;

pub(crate) fn body_text(response: &HttpResponse) -> String {
	String::from_utf8_lossy(response.body()).into_owned()
}
