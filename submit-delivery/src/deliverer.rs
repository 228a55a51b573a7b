use async_trait::async_trait;
use submit_auth::Authenticate;
use submit_common::Message;

use crate::DeliveryError;

/// A delivery backend for one delivery method.
///
/// For every plan entry the executor calls [`authenticate`](Self::authenticate)
/// and then exactly one of [`deliver`](Self::deliver) or
/// [`abort`](Self::abort). `abort` is used when authentication failed, when
/// only unlocking was requested, and after a failed delivery; it must release
/// anything `authenticate` opened.
#[async_trait]
pub trait Deliverer: Send {
    fn method(&self) -> &str;

    /// Whether the user is likely to be asked for a password. The frontend
    /// uses this to decide whether the daemon's password cache is worth it.
    fn needs_authentication(&self) -> bool;

    /// Acquire whatever is needed to deliver, asking `auth` for secrets as
    /// often as necessary.
    async fn authenticate(&mut self, auth: &mut dyn Authenticate) -> Result<(), DeliveryError>;

    /// Transmit `message` to `recipients`. Only called right after a
    /// successful [`authenticate`](Self::authenticate).
    async fn deliver(&mut self, message: &Message, recipients: &[String])
    -> Result<(), DeliveryError>;

    async fn abort(&mut self);
}
