//! Password caching and authentication for delivery methods.
//!
//! Every delivery method owns one [`PasswordStore`]. A deliverer that needs
//! credentials asks an [`Authenticate`] implementation, which consults the
//! store first and falls back to asking the user through a
//! [`QueryPassword`] callback.

pub mod authenticator;
pub mod error;
pub mod store;

pub use authenticator::{Authenticate, Authenticator, Credential, QueryPassword};
pub use error::AuthError;
pub use store::{PasswordStore, StoreGuard};
