//! Running a delivery plan
//!
//! Both the daemon and the frontend (when it delivers without a daemon) go
//! through [`execute`]. They differ only in where password stores come from
//! and in how the user is asked for passwords.

use std::sync::Arc;

use async_trait::async_trait;
use submit_auth::{Authenticator, PasswordStore, QueryPassword};
use submit_common::{Config, Message};
use tracing::{debug, info, warn};

use crate::{DelivererFactory, DeliveryError, DeliveryPlan, Router};

/// What the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Deliver a message to its recipients
    Message(Message),
    /// Authenticate against `method`, or every configured method, without
    /// delivering anything
    Unlock { method: Option<String> },
}

impl Submission {
    pub const fn is_unlock(&self) -> bool {
        matches!(self, Self::Unlock { .. })
    }

    /// The plan this submission is carried out with
    pub fn plan(&self, config: &Config) -> DeliveryPlan {
        match self {
            Self::Message(message) => Router::new(config).route(message),
            Self::Unlock { method } => DeliveryPlan::unlock(config, method.as_deref()),
        }
    }
}

/// Source of the password store of each delivery method
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn store(&self, config: &Config, method: &str) -> Arc<PasswordStore>;
}

/// A new, empty store for every request; nothing outlives the submission.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreshStores;

#[async_trait]
impl StoreProvider for FreshStores {
    async fn store(&self, _config: &Config, method: &str) -> Arc<PasswordStore> {
        Arc::new(PasswordStore::new(method))
    }
}

/// Carry out `submission`.
///
/// Plan entries are processed in order. Each entry's deliverer is
/// authenticated first; if that fails it is aborted and nothing further is
/// attempted. Unlocking aborts right after a successful authentication,
/// otherwise the entry's recipients are delivered to, aborting on failure.
///
/// # Errors
///
/// Returns the first failure; entries after it are not attempted.
pub async fn execute<Q: QueryPassword>(
    config: &Config,
    submission: &Submission,
    stores: &dyn StoreProvider,
    factory: &dyn DelivererFactory,
    query: &mut Q,
) -> Result<(), DeliveryError> {
    let plan = submission.plan(config);
    debug!("Delivery plan: {}", plan.methods().collect::<Vec<_>>().join(", "));

    for entry in plan.entries() {
        let store = stores.store(config, &entry.method).await;
        let mut deliverer = factory.create(config, &entry.method)?;

        debug!("Authenticating {}", entry.method);
        let mut auth = Authenticator::new(&store, config, &mut *query);
        if let Err(e) = deliverer.authenticate(&mut auth).await {
            warn!("Authentication for {} failed: {e}", entry.method);
            deliverer.abort().await;
            return Err(e);
        }

        match submission {
            Submission::Unlock { .. } => {
                deliverer.abort().await;
                info!("Unlocked {}", entry.method);
            }
            Submission::Message(message) => {
                if let Err(e) = deliverer.deliver(message, &entry.recipients).await {
                    warn!("Delivery via {} failed: {e}", entry.method);
                    deliverer.abort().await;
                    return Err(e);
                }
                info!(
                    "Delivered to {} recipient(s) via {}",
                    entry.recipients.len(),
                    entry.method
                );
            }
        }
    }

    Ok(())
}
