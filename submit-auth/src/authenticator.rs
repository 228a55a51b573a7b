//! Credential retrieval for deliverers

use async_trait::async_trait;
use submit_common::{Config, Secret};
use tracing::{debug, warn};

use crate::{AuthError, PasswordStore};

/// The user's answer to a password query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Secret(Secret),
    Cancelled,
}

impl From<Option<Secret>> for Credential {
    fn from(secret: Option<Secret>) -> Self {
        secret.map_or(Self::Cancelled, Self::Secret)
    }
}

/// A way of asking the user for a password.
///
/// Failing to ask at all is an error; the user declining to answer is
/// [`Credential::Cancelled`].
#[async_trait]
pub trait QueryPassword: Send {
    async fn query_password(
        &mut self,
        method: &str,
        key: &str,
        prompt: &str,
        first: bool,
    ) -> Result<Credential, AuthError>;
}

#[async_trait]
impl<Q: QueryPassword + ?Sized> QueryPassword for &mut Q {
    async fn query_password(
        &mut self,
        method: &str,
        key: &str,
        prompt: &str,
        first: bool,
    ) -> Result<Credential, AuthError> {
        (**self).query_password(method, key, prompt, first).await
    }
}

/// What a deliverer sees when it needs credentials.
#[async_trait]
pub trait Authenticate: Send {
    /// The delivery method the credentials belong to
    fn method(&self) -> &str;

    /// Obtain the secret called `key`, asking the user with `prompt` if it is
    /// neither cached nor configured.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Cancelled`] if the user declined to answer.
    async fn get_password(&mut self, key: &str, prompt: &str) -> Result<Secret, AuthError>;

    /// Forget the secret called `key` after it was rejected, so the next
    /// [`get_password`](Self::get_password) asks again.
    async fn remove_password(&mut self, key: &str);
}

/// [`Authenticate`] backed by a [`PasswordStore`], the method's configured
/// defaults and a [`QueryPassword`] callback.
pub struct Authenticator<'a, Q> {
    store: &'a PasswordStore,
    config: &'a Config,
    query: Q,
}

impl<'a, Q: QueryPassword> Authenticator<'a, Q> {
    pub const fn new(store: &'a PasswordStore, config: &'a Config, query: Q) -> Self {
        Self {
            store,
            config,
            query,
        }
    }

    fn configured(&self, key: &str) -> Option<String> {
        self.config
            .get_method::<String>(self.store.method(), key)
            .unwrap_or_else(|e| {
                warn!("Ignoring configured {key}: {e}");
                None
            })
    }
}

#[async_trait]
impl<Q: QueryPassword> Authenticate for Authenticator<'_, Q> {
    fn method(&self) -> &str {
        self.store.method()
    }

    async fn get_password(&mut self, key: &str, prompt: &str) -> Result<Secret, AuthError> {
        let configured = self.configured(key);
        let mut guard = self.store.lock().await;

        if let Some(secret) = guard.get(key, || configured) {
            debug!("Using stored {key} for {}", self.store.method());
            return Ok(secret);
        }

        let first = !guard.tried_before(key);
        match self
            .query
            .query_password(self.store.method(), key, prompt, first)
            .await?
        {
            Credential::Cancelled => Err(AuthError::Cancelled),
            Credential::Secret(secret) => {
                guard.put(key, secret.clone());
                Ok(secret)
            }
        }
    }

    async fn remove_password(&mut self, key: &str) {
        self.store.lock().await.remove(key);
    }
}
