//! Delivery for submit
//!
//! This crate decides which delivery method carries which recipients
//! ([`routing`]), defines what a delivery backend has to provide
//! ([`Deliverer`]), knows the built-in backends ([`registry`]) and runs a
//! plan against them ([`executor`]).

pub mod deliverer;
pub mod error;
pub mod executor;
pub mod registry;
pub mod routing;
pub mod sendmail;

pub use deliverer::Deliverer;
pub use error::DeliveryError;
pub use executor::{FreshStores, StoreProvider, Submission, execute};
pub use registry::{DelivererFactory, DelivererKind, Registry};
pub use routing::{DeliveryPlan, PlanEntry, Router};
