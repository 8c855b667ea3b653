//! Provider - Traits abstracting the remote resource clients
//!
//! Each resource family (network, compute, load balancing, storage, DNS,
//! database, identity) is reached through its own trait so an adapter only
//! ever holds the capabilities it needs. A [`Connector`] authenticates a
//! [`Session`] and hands out the family clients.

pub mod compute;
pub mod database;
pub mod dns;
pub mod identity;
pub mod load_balancing;
pub mod network;
pub mod storage;

use std::sync::Arc;

use async_trait::async_trait;

use crate::credentials::Session;
use crate::resource::Tags;

pub use compute::ComputeApi;
pub use database::DatabaseApi;
pub use dns::DnsApi;
pub use identity::IdentityApi;
pub use load_balancing::LoadBalancingApi;
pub use network::NetworkApi;
pub use storage::StorageApi;

/// Error type for provider calls
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    /// Provider identifier of the object the call was about, when known
    pub resource_id: Option<String>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A server-side filter on a describe call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
        }
    }

    pub fn with_values(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// `tag:<key>` filter
    pub fn tag(key: &str, value: impl Into<String>) -> Self {
        Self::new(format!("tag:{}", key), value)
    }

    /// One `tag:<key>` filter per entry
    pub fn from_tags(tags: &Tags) -> Vec<Filter> {
        tags.iter().map(|(k, v)| Filter::tag(k, v.clone())).collect()
    }
}

/// Reserved public address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressAllocation {
    pub allocation_id: String,
    pub public_ip: String,
}

/// Authenticates a session and opens family clients
///
/// This is the only place credentials reach the provider SDK.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn network(&self, session: &Session) -> ProviderResult<Arc<dyn NetworkApi>>;

    async fn compute(&self, session: &Session) -> ProviderResult<Arc<dyn ComputeApi>>;

    async fn load_balancing(&self, session: &Session)
    -> ProviderResult<Arc<dyn LoadBalancingApi>>;

    async fn storage(&self, session: &Session) -> ProviderResult<Arc<dyn StorageApi>>;

    async fn dns(&self, session: &Session) -> ProviderResult<Arc<dyn DnsApi>>;

    async fn database(&self, session: &Session) -> ProviderResult<Arc<dyn DatabaseApi>>;

    async fn identity(&self, session: &Session) -> ProviderResult<Arc<dyn IdentityApi>>;
}
