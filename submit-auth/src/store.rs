//! Per-method password cache
//!
//! A [`PasswordStore`] keeps the secrets of one delivery method in memory.
//! All access happens through a [`StoreGuard`], which holds the store's lock;
//! releasing the guard records the time, and [`PasswordStore::expire`]
//! forgets everything once the store has been idle for longer than the
//! configured timeout.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use submit_common::Secret;

enum Entry {
    Secret(Secret),
    /// The key was tried and rejected; ask again instead of falling back to
    /// the configured default.
    Tombstone,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<String, Entry>,
    last_release: Option<DateTime<Utc>>,
}

pub struct PasswordStore {
    method: String,
    slots: Mutex<Slots>,
}

impl PasswordStore {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Wait for exclusive access to the store
    pub async fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            slots: self.slots.lock().await,
            method: &self.method,
        }
    }

    /// When the last [`StoreGuard`] was released, if ever
    pub async fn last_release(&self) -> Option<DateTime<Utc>> {
        self.slots.lock().await.last_release
    }

    /// Forget all passwords if the store has been idle for longer than
    /// `timeout`. Returns whether the store was cleared.
    pub async fn expire(&self, timeout: Duration) -> bool {
        self.expire_at(Utc::now(), timeout).await
    }

    /// [`PasswordStore::expire`] as seen at time `now`.
    ///
    /// A `now` earlier than the last release (the clock was set back) never
    /// expires the store.
    pub async fn expire_at(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(last_release) = slots.last_release else {
            return false;
        };

        let idle = now - last_release;
        let timeout = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
        if idle < TimeDelta::zero() || idle <= timeout {
            return false;
        }

        debug!(
            "Password store for {} idle for {}s, clearing",
            self.method,
            idle.num_seconds()
        );
        slots.entries.clear();
        slots.last_release = Some(now);
        true
    }
}

/// Exclusive access to a [`PasswordStore`].
pub struct StoreGuard<'a> {
    slots: MutexGuard<'a, Slots>,
    method: &'a str,
}

impl StoreGuard<'_> {
    pub const fn method(&self) -> &str {
        self.method
    }

    /// The cached secret for `key`.
    ///
    /// If nothing was cached for `key`, `fallback` is consulted and a
    /// non-empty result is cached. A key that was [`remove`](Self::remove)d
    /// yields `None` without consulting `fallback`.
    pub fn get(&mut self, key: &str, fallback: impl FnOnce() -> Option<String>) -> Option<Secret> {
        match self.slots.entries.get(key) {
            Some(Entry::Secret(secret)) if !secret.is_empty() => Some(secret.clone()),
            Some(_) => None,
            None => {
                let secret = Secret::new(fallback().filter(|s| !s.is_empty())?);
                self.put(key, secret.clone());
                Some(secret)
            }
        }
    }

    /// Whether `key` was stored or removed since the store was last cleared
    pub fn tried_before(&self, key: &str) -> bool {
        self.slots.entries.contains_key(key)
    }

    pub fn put(&mut self, key: &str, secret: impl Into<Secret>) {
        self.slots
            .entries
            .insert(key.to_string(), Entry::Secret(secret.into()));
    }

    /// Forget the secret for `key` while remembering that it was tried
    pub fn remove(&mut self, key: &str) {
        self.slots.entries.insert(key.to_string(), Entry::Tombstone);
    }

    pub fn clear(&mut self) {
        self.slots.entries.clear();
    }
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        self.slots.last_release = Some(Utc::now());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn none() -> Option<String> {
        None
    }

    fn secret(value: &str) -> Option<Secret> {
        Some(value.to_string().into())
    }

    #[tokio::test]
    async fn test_tried_before_tracks_put_and_remove() {
        let store = PasswordStore::new("work");
        let mut guard = store.lock().await;

        assert!(!guard.tried_before("password"));
        assert_eq!(guard.get("password", none), None);
        assert!(!guard.tried_before("password"));

        guard.put("password", "hunter2".to_string());
        assert!(guard.tried_before("password"));

        guard.remove("password");
        assert!(guard.tried_before("password"));

        guard.clear();
        assert!(!guard.tried_before("password"));

        guard.remove("passphrase");
        assert!(guard.tried_before("passphrase"));
        assert!(!guard.tried_before("password"));
    }

    #[tokio::test]
    async fn test_get_prefers_cache_then_fallback() {
        let store = PasswordStore::new("work");
        let mut guard = store.lock().await;

        assert_eq!(
            guard.get("password", || Some("from-config".to_string())),
            secret("from-config")
        );
        // cached now, the fallback is not consulted again
        assert_eq!(
            guard.get("password", || Some("other".to_string())),
            secret("from-config")
        );

        assert_eq!(guard.get("empty", || Some(String::new())), None);
        assert!(!guard.tried_before("empty"));
    }

    #[tokio::test]
    async fn test_tombstone_skips_fallback() {
        let store = PasswordStore::new("work");
        let mut guard = store.lock().await;

        guard.put("password", "wrong".to_string());
        guard.remove("password");
        assert_eq!(guard.get("password", || Some("wrong".to_string())), None);

        guard.put("password", "right".to_string());
        assert_eq!(guard.get("password", none), secret("right"));
    }

    #[tokio::test]
    async fn test_release_records_time() {
        let store = PasswordStore::new("work");
        assert!(store.last_release().await.is_none());

        let before = Utc::now();
        drop(store.lock().await);
        let released = store.last_release().await.unwrap();
        assert!(released >= before);
    }

    #[tokio::test]
    async fn test_never_used_store_does_not_expire() {
        let store = PasswordStore::new("work");
        assert!(!store.expire(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_expire_after_idle_timeout() {
        let store = PasswordStore::new("work");
        store.lock().await.put("password", "hunter2".to_string());
        let released = store.last_release().await.unwrap();
        let timeout = Duration::from_secs(60);

        assert!(!store.expire_at(released + TimeDelta::seconds(60), timeout).await);
        assert!(store.lock().await.tried_before("password"));

        let released = store.last_release().await.unwrap();
        assert!(store.expire_at(released + TimeDelta::seconds(61), timeout).await);
        assert!(!store.lock().await.tried_before("password"));
    }

    #[tokio::test]
    async fn test_clock_rewind_never_expires() {
        let store = PasswordStore::new("work");
        store.lock().await.put("password", "hunter2".to_string());
        let released = store.last_release().await.unwrap();

        assert!(
            !store
                .expire_at(released - TimeDelta::hours(5), Duration::ZERO)
                .await
        );
        assert!(store.lock().await.tried_before("password"));
    }
}
