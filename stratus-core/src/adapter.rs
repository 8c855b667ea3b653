//! Adapter - The per-resource-type reconciler
//!
//! An [`Adapter`] owns the family clients one resource type needs, validates
//! the resource body of an event and turns each action into a sequence of
//! provider calls. Adapters keep no state between events; everything they
//! know about the resource is read from the event or from the provider.

use std::fmt::Debug;
use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::credentials::Session;
use crate::error::{Error, Result};
use crate::event::{Action, Event, Query, ResourceKind};
use crate::provider::{Connector, ProviderResult};
use crate::wait::{CancelToken, PollConfig, poll_until};

/// Waiting policy handed to every adapter
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub poll: PollConfig,
    pub cancel: CancelToken,
}

impl Context {
    pub fn new(poll: PollConfig, cancel: CancelToken) -> Self {
        Self { poll, cancel }
    }

    /// Poll `probe` with this context's interval, deadline and token
    pub async fn wait_for<T, F, Fut>(&self, what: &str, probe: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = ProviderResult<Option<T>>> + Send,
        T: Send,
    {
        poll_until(&self.poll, &self.cancel, what, probe).await
    }
}

#[async_trait]
pub trait Adapter: Send + Sync + Sized {
    /// Resource-specific fields of the event body
    type Resource: Serialize + DeserializeOwned + Default + Clone + Debug + Send + Sync;

    const KIND: ResourceKind;

    /// Open the family clients this resource type talks to
    async fn connect(connector: &dyn Connector, session: &Session, context: Context)
    -> ProviderResult<Self>;

    /// Whether the action is implemented at all.
    ///
    /// Checked before validation so unsupported actions never reach the provider.
    fn supports(action: Action) -> bool {
        !matches!(action, Action::Get)
    }

    /// Resource-specific checks for a single-resource action
    fn validate(action: Action, event: &Event<Self::Resource>) -> Result<()>;

    async fn create(&self, event: &mut Event<Self::Resource>) -> Result<()>;

    async fn update(&self, _event: &mut Event<Self::Resource>) -> Result<()> {
        Err(Error::unsupported(Self::KIND, Action::Update))
    }

    async fn delete(&self, event: &mut Event<Self::Resource>) -> Result<()>;

    /// Every object of this type, normalized into events; tag filtering is left to the caller
    async fn find(&self, _query: &Query<Self::Resource>) -> Result<Vec<Event<Self::Resource>>> {
        Err(Error::unsupported(Self::KIND, Action::Find))
    }
}

/// Supported set for resources that cannot change after creation
pub fn immutable(action: Action) -> bool {
    matches!(action, Action::Create | Action::Delete | Action::Find)
}

/// Supported set for immutable resources that also have no read-back
pub fn create_delete_only(action: Action) -> bool {
    matches!(action, Action::Create | Action::Delete)
}
