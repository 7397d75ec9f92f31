//! Thread-safe in-process [`ExpiringCache`] implementation.

// self
use crate::{
	_prelude::*,
	cache::{self, CacheFuture, ExpiringCache},
};

#[derive(Clone, Debug)]
struct ExpiringValue<T> {
	value: T,
	expire_at: i64,
}

type CacheMap<T> = Arc<RwLock<HashMap<String, ExpiringValue<T>>>>;

/// In-memory cache that evicts expired entries lazily on read.
#[derive(Debug)]
pub struct InMemoryExpiringCache<T>(CacheMap<T>);
impl<T> InMemoryExpiringCache<T>
where
	T: Clone,
{
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self(Default::default())
	}

	/// Number of stored entries, expired-but-unread ones included.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns true if nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn get_now(&self, key: &str, now: i64) -> Option<T> {
		let live = self
			.0
			.read()
			.get(key)
			.map(|entry| (entry.expire_at > now).then(|| entry.value.clone()));

		match live {
			Some(Some(value)) => return Some(value),
			None => return None,
			Some(None) => (),
		}

		let mut guard = self.0.write();

		// Another writer may have stored a fresh entry since the read lock was released.
		if guard.get(key).is_some_and(|entry| entry.expire_at <= now) {
			guard.remove(key);
		}

		None
	}
}
impl<T> Clone for InMemoryExpiringCache<T> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}
impl<T> Default for InMemoryExpiringCache<T> {
	fn default() -> Self {
		Self(Default::default())
	}
}
impl<T> ExpiringCache<T> for InMemoryExpiringCache<T>
where
	T: 'static + Clone + Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<T>> {
		let value = self.get_now(key, cache::now_epoch_millis());

		Box::pin(async move { value })
	}

	fn put(&self, key: String, value: T, expire_at_epoch_millis: i64) -> CacheFuture<'_, ()> {
		self.0.write().insert(key, ExpiringValue { value, expire_at: expire_at_epoch_millis });

		Box::pin(async {})
	}

	fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		self.0.write().remove(key);

		Box::pin(async {})
	}
}
