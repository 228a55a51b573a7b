//! State shared by all sessions of a daemon

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use submit_auth::PasswordStore;
use submit_common::{Config, Signal, internal};
use submit_delivery::{DelivererFactory, Registry, StoreProvider};
use tokio::sync::broadcast;
use tracing::debug;

/// Password stores by delivery method, the deliverer factory and the
/// shutdown broadcast.
pub struct DaemonContext {
    stores: DashMap<String, Arc<PasswordStore>>,
    factory: Arc<dyn DelivererFactory>,
    shutdown: broadcast::Sender<Signal>,
}

impl Default for DaemonContext {
    fn default() -> Self {
        Self::new(Arc::new(Registry))
    }
}

impl DaemonContext {
    pub fn new(factory: Arc<dyn DelivererFactory>) -> Self {
        let (shutdown, _receiver) = broadcast::channel(16);
        Self {
            stores: DashMap::new(),
            factory,
            shutdown,
        }
    }

    pub fn factory(&self) -> &dyn DelivererFactory {
        self.factory.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.shutdown.subscribe()
    }

    /// Stop accepting connections. Sessions already running are unaffected.
    pub fn shutdown(&self) {
        if self.shutdown.send(Signal::Shutdown).is_err() {
            debug!("Shutdown requested with nobody listening");
        }
    }
}

#[async_trait]
impl StoreProvider for DaemonContext {
    /// The store of `method`, created on first use. A store that is reused
    /// is expired first if it sat idle longer than the method's timeout.
    async fn store(&self, config: &Config, method: &str) -> Arc<PasswordStore> {
        let existing = self.stores.get(method).map(|store| Arc::clone(store.value()));

        if let Some(store) = existing {
            if store.expire(config.expire_timeout(method)).await {
                internal!(level = INFO, "Expired cached passwords for {method}");
            }
            return store;
        }

        Arc::clone(
            self.stores
                .entry(method.to_string())
                .or_insert_with(|| Arc::new(PasswordStore::new(method)))
                .value(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use submit_common::{General, Method};

    use super::*;

    #[tokio::test]
    async fn test_stores_are_shared_per_method() {
        let context = DaemonContext::default();
        let config = Config::default();

        let first = context.store(&config, "work").await;
        let again = context.store(&config, "work").await;
        let other = context.store(&config, "home").await;

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[tokio::test]
    async fn test_cached_password_survives_reuse() {
        let context = DaemonContext::default();
        let config = Config::default();

        let store = context.store(&config, "work").await;
        store.lock().await.put("password", "secret".to_string());

        let store = context.store(&config, "work").await;
        assert_eq!(
            store.lock().await.get("password", || None),
            Some("secret".to_string().into())
        );
    }

    #[tokio::test]
    async fn test_idle_store_is_expired_on_reuse() {
        let context = DaemonContext::default();
        let config = Config {
            general: General {
                expire: Some(0),
                ..General::default()
            },
            ..Config::default()
        };

        let store = context.store(&config, "work").await;
        store.lock().await.put("password", "secret".to_string());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let reused = context.store(&config, "work").await;
        assert!(Arc::ptr_eq(&store, &reused));
        let mut guard = reused.lock().await;
        assert!(!guard.tried_before("password"));
        assert_eq!(guard.get("password", || None), None);
    }

    #[tokio::test]
    async fn test_method_expire_overrides_general() {
        let context = DaemonContext::default();
        let config = Config {
            general: General {
                expire: Some(0),
                ..General::default()
            },
            methods: vec![Method {
                expire: Some(60),
                ..Method::new("work")
            }],
            ..Config::default()
        };

        let store = context.store(&config, "work").await;
        store.lock().await.put("password", "secret".to_string());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let reused = context.store(&config, "work").await;
        assert!(reused.lock().await.tried_before("password"));
    }

    #[tokio::test]
    async fn test_shutdown_reaches_subscribers() {
        let context = DaemonContext::default();
        let mut receiver = context.subscribe();

        context.shutdown();
        assert_eq!(receiver.recv().await.unwrap(), Signal::Shutdown);
    }
}
