//! Expiring key/value cache contract shared by the token and discovery layers.

pub mod memory;

pub use memory::InMemoryExpiringCache;

// self
use crate::_prelude::*;

/// Boxed future returned by [`ExpiringCache`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a + Send>>;

/// Cache whose entries carry an absolute expiry instant.
///
/// An entry whose expiry is at or before the current instant is treated as absent. Implementors
/// may back this with a shared store; the client only relies on the three operations below.
pub trait ExpiringCache<T>
where
	Self: Send + Sync,
{
	/// Returns the live value stored under `key`.
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<T>>;

	/// Stores `value` under `key` until `expire_at_epoch_millis`, replacing any previous entry.
	fn put(&self, key: String, value: T, expire_at_epoch_millis: i64) -> CacheFuture<'_, ()>;

	/// Removes the entry stored under `key`, if any.
	fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}

/// Milliseconds since the Unix epoch for `instant`.
pub fn epoch_millis(instant: OffsetDateTime) -> i64 {
	(instant.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Milliseconds since the Unix epoch for the current instant.
pub fn now_epoch_millis() -> i64 {
	epoch_millis(OffsetDateTime::now_utc())
}

/// Absolute expiry, in epoch milliseconds, `ttl` from now.
///
/// Saturates at the `i64` bounds, so huge or negative lifetimes stay ordered.
pub fn expire_at_after(ttl: Duration) -> i64 {
	let millis = i64::try_from(ttl.whole_milliseconds())
		.unwrap_or(if ttl.is_negative() { i64::MIN } else { i64::MAX });

	now_epoch_millis().saturating_add(millis)
}
