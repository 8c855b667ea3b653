//! DNS family: hosted zones and record sets

use async_trait::async_trait;

use super::ProviderResult;
use crate::resource::{DnsRecord, Tags};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostedZone {
    /// Bare id, without the `/hostedzone/` prefix
    pub id: String,
    pub name: String,
    pub private: bool,
}

/// Strip the `/hostedzone/` prefix the provider puts on zone ids
pub fn bare_zone_id(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

/// Binding of a private zone to a VPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneVpc {
    pub vpc_id: String,
    pub region: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Upsert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub action: ChangeAction,
    pub record: DnsRecord,
}

#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Returns the new zone id
    async fn create_hosted_zone(
        &self,
        name: &str,
        caller_reference: &str,
        vpc: Option<&ZoneVpc>,
    ) -> ProviderResult<String>;

    async fn delete_hosted_zone(&self, zone_id: &str) -> ProviderResult<()>;

    async fn list_hosted_zones(&self) -> ProviderResult<Vec<HostedZone>>;

    async fn list_records(&self, zone_id: &str) -> ProviderResult<Vec<DnsRecord>>;

    /// Applies all changes in one batch
    async fn change_records(&self, zone_id: &str, changes: &[RecordChange]) -> ProviderResult<()>;

    async fn change_tags(&self, zone_id: &str, tags: &Tags) -> ProviderResult<()>;

    async fn list_tags(&self, zone_id: &str) -> ProviderResult<Tags>;
}
