//! Database family: managed relational instances, clusters and subnet groups

use async_trait::async_trait;

use super::ProviderResult;
use crate::resource::Tags;

/// Parameters for creating or modifying a database instance.
///
/// `None` leaves a setting to the provider default on create and untouched on modify.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbInstanceSpec {
    pub identifier: String,
    pub instance_class: Option<String>,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub port: Option<i32>,
    pub cluster_identifier: Option<String>,
    pub allocated_storage: Option<i32>,
    pub storage_type: Option<String>,
    pub iops: Option<i32>,
    pub multi_az: Option<bool>,
    pub promotion_tier: Option<i32>,
    pub availability_zone: Option<String>,
    pub auto_minor_version_upgrade: Option<bool>,
    pub backup_retention_period: Option<i32>,
    pub preferred_backup_window: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    pub security_group_ids: Option<Vec<String>>,
    pub database_name: Option<String>,
    pub master_username: Option<String>,
    pub master_password: Option<String>,
    pub subnet_group_name: Option<String>,
    pub license_model: Option<String>,
    pub publicly_accessible: Option<bool>,
    pub timezone: Option<String>,
    /// Source instance when creating a read replica
    pub replication_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbInstanceDescription {
    pub identifier: String,
    pub arn: Option<String>,
    pub status: Option<String>,
    pub endpoint: Option<String>,
    pub port: Option<i32>,
    pub instance_class: Option<String>,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub cluster_identifier: Option<String>,
    pub allocated_storage: Option<i32>,
    pub storage_type: Option<String>,
    pub iops: Option<i32>,
    pub multi_az: Option<bool>,
    pub promotion_tier: Option<i32>,
    pub availability_zone: Option<String>,
    pub auto_minor_version_upgrade: Option<bool>,
    pub backup_retention_period: Option<i32>,
    pub preferred_backup_window: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    pub security_group_ids: Vec<String>,
    pub subnet_group_name: Option<String>,
    pub database_name: Option<String>,
    pub master_username: Option<String>,
    pub license_model: Option<String>,
    pub publicly_accessible: Option<bool>,
    pub timezone: Option<String>,
    pub replication_source: Option<String>,
}

/// Parameters for creating or modifying a database cluster
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbClusterSpec {
    pub identifier: String,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub port: Option<i32>,
    pub availability_zones: Vec<String>,
    pub security_group_ids: Option<Vec<String>>,
    pub subnet_group_name: Option<String>,
    pub database_name: Option<String>,
    pub master_username: Option<String>,
    pub master_password: Option<String>,
    pub backup_retention_period: Option<i32>,
    pub preferred_backup_window: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    pub replication_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbClusterDescription {
    pub identifier: String,
    pub arn: Option<String>,
    pub status: Option<String>,
    pub endpoint: Option<String>,
    pub port: Option<i32>,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub availability_zones: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub subnet_group_name: Option<String>,
    pub database_name: Option<String>,
    pub master_username: Option<String>,
    pub backup_retention_period: Option<i32>,
    pub preferred_backup_window: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    pub replication_source: Option<String>,
}

#[async_trait]
pub trait DatabaseApi: Send + Sync {
    async fn create_subnet_group(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()>;

    async fn modify_subnet_group(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()>;

    /// Subnets of the group, `None` when the group does not exist
    async fn describe_subnet_group(&self, name: &str) -> ProviderResult<Option<Vec<String>>>;

    async fn delete_subnet_group(&self, name: &str) -> ProviderResult<()>;

    async fn create_db_instance(&self, spec: &DbInstanceSpec) -> ProviderResult<()>;

    async fn create_db_instance_read_replica(&self, spec: &DbInstanceSpec) -> ProviderResult<()>;

    /// Changes are applied immediately
    async fn modify_db_instance(&self, spec: &DbInstanceSpec) -> ProviderResult<()>;

    async fn delete_db_instance(
        &self,
        identifier: &str,
        final_snapshot: Option<&str>,
    ) -> ProviderResult<()>;

    /// `None` once the instance no longer exists
    async fn describe_db_instance(
        &self,
        identifier: &str,
    ) -> ProviderResult<Option<DbInstanceDescription>>;

    async fn describe_db_instances(&self) -> ProviderResult<Vec<DbInstanceDescription>>;

    async fn create_db_cluster(&self, spec: &DbClusterSpec) -> ProviderResult<DbClusterDescription>;

    /// Changes are applied immediately
    async fn modify_db_cluster(&self, spec: &DbClusterSpec) -> ProviderResult<()>;

    async fn delete_db_cluster(
        &self,
        identifier: &str,
        final_snapshot: Option<&str>,
    ) -> ProviderResult<()>;

    async fn describe_db_cluster(
        &self,
        identifier: &str,
    ) -> ProviderResult<Option<DbClusterDescription>>;

    async fn describe_db_clusters(&self) -> ProviderResult<Vec<DbClusterDescription>>;

    async fn add_tags(&self, arn: &str, tags: &Tags) -> ProviderResult<()>;

    async fn list_tags(&self, arn: &str) -> ProviderResult<Tags>;
}
