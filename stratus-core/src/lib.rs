//! Stratus Core
//!
//! Event-driven adapters that reconcile cloud infrastructure objects: each
//! inbound event names a resource type and an action, and is answered with
//! the same document marked `completed` or `errored`.

pub mod adapter;
pub mod adapters;
pub mod credentials;
pub mod differ;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod provider;
pub mod resource;
pub mod validate;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{Dispatcher, DispatcherConfig};
pub use error::{Error, Result};
pub use event::{Action, EventState, ResourceKind, Response, Subject};
