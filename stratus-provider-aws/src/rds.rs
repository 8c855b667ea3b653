//! RDS instances, clusters and their subnet groups

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rds::Client as RdsClient;
use aws_sdk_rds::types::{DbCluster, DbInstance};
use log::debug;
use stratus_core::provider::database::{
    DbClusterDescription, DbClusterSpec, DbInstanceDescription, DbInstanceSpec,
};
use stratus_core::provider::{DatabaseApi, ProviderError, ProviderResult};
use stratus_core::resource::Tags;

use crate::{collect_tags, failed, owned};

pub struct RdsApi {
    client: RdsClient,
}

impl RdsApi {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: RdsClient::new(config),
        }
    }
}

fn instance(db: &DbInstance) -> Option<DbInstanceDescription> {
    Some(DbInstanceDescription {
        identifier: db.db_instance_identifier()?.to_string(),
        arn: db.db_instance_arn().map(String::from),
        status: db.db_instance_status().map(String::from),
        endpoint: db.endpoint().and_then(|e| e.address()).map(String::from),
        port: db.endpoint().and_then(|e| e.port()),
        instance_class: db.db_instance_class().map(String::from),
        engine: db.engine().map(String::from),
        engine_version: db.engine_version().map(String::from),
        cluster_identifier: db.db_cluster_identifier().map(String::from),
        allocated_storage: db.allocated_storage(),
        storage_type: db.storage_type().map(String::from),
        iops: db.iops(),
        multi_az: db.multi_az(),
        promotion_tier: db.promotion_tier(),
        availability_zone: db.availability_zone().map(String::from),
        auto_minor_version_upgrade: db.auto_minor_version_upgrade(),
        backup_retention_period: db.backup_retention_period(),
        preferred_backup_window: db.preferred_backup_window().map(String::from),
        preferred_maintenance_window: db.preferred_maintenance_window().map(String::from),
        security_group_ids: owned(db.vpc_security_groups(), |g| g.vpc_security_group_id()),
        subnet_group_name: db
            .db_subnet_group()
            .and_then(|g| g.db_subnet_group_name())
            .map(String::from),
        database_name: db.db_name().map(String::from),
        master_username: db.master_username().map(String::from),
        license_model: db.license_model().map(String::from),
        publicly_accessible: db.publicly_accessible(),
        timezone: db.timezone().map(String::from),
        replication_source: db.read_replica_source_db_instance_identifier().map(String::from),
    })
}

fn cluster(db: &DbCluster) -> Option<DbClusterDescription> {
    Some(DbClusterDescription {
        identifier: db.db_cluster_identifier()?.to_string(),
        arn: db.db_cluster_arn().map(String::from),
        status: db.status().map(String::from),
        endpoint: db.endpoint().map(String::from),
        port: db.port(),
        engine: db.engine().map(String::from),
        engine_version: db.engine_version().map(String::from),
        availability_zones: db.availability_zones().to_vec(),
        security_group_ids: owned(db.vpc_security_groups(), |g| g.vpc_security_group_id()),
        subnet_group_name: db.db_subnet_group().map(String::from),
        database_name: db.database_name().map(String::from),
        master_username: db.master_username().map(String::from),
        backup_retention_period: db.backup_retention_period(),
        preferred_backup_window: db.preferred_backup_window().map(String::from),
        preferred_maintenance_window: db.preferred_maintenance_window().map(String::from),
        replication_source: db.replication_source_identifier().map(String::from),
    })
}

#[async_trait]
impl DatabaseApi for RdsApi {
    async fn create_subnet_group(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        self.client
            .create_db_subnet_group()
            .db_subnet_group_name(name)
            .db_subnet_group_description(name)
            .set_subnet_ids(Some(subnet_ids.to_vec()))
            .send()
            .await
            .map_err(|e| failed("create DB subnet group", e).for_resource(name))?;
        Ok(())
    }

    async fn modify_subnet_group(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        self.client
            .modify_db_subnet_group()
            .db_subnet_group_name(name)
            .set_subnet_ids(Some(subnet_ids.to_vec()))
            .send()
            .await
            .map_err(|e| failed("modify DB subnet group", e).for_resource(name))?;
        Ok(())
    }

    async fn describe_subnet_group(&self, name: &str) -> ProviderResult<Option<Vec<String>>> {
        let result = match self
            .client
            .describe_db_subnet_groups()
            .db_subnet_group_name(name)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_db_subnet_group_not_found_fault()) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(failed("describe DB subnet group", e).for_resource(name)),
        };

        Ok(result
            .db_subnet_groups()
            .first()
            .map(|group| owned(group.subnets(), |s| s.subnet_identifier())))
    }

    async fn delete_subnet_group(&self, name: &str) -> ProviderResult<()> {
        self.client
            .delete_db_subnet_group()
            .db_subnet_group_name(name)
            .send()
            .await
            .map_err(|e| failed("delete DB subnet group", e).for_resource(name))?;
        Ok(())
    }

    async fn create_db_instance(&self, spec: &DbInstanceSpec) -> ProviderResult<()> {
        debug!("Creating DB instance {}", spec.identifier);
        self.client
            .create_db_instance()
            .db_instance_identifier(&spec.identifier)
            .set_db_instance_class(spec.instance_class.clone())
            .set_engine(spec.engine.clone())
            .set_engine_version(spec.engine_version.clone())
            .set_port(spec.port)
            .set_db_cluster_identifier(spec.cluster_identifier.clone())
            .set_allocated_storage(spec.allocated_storage)
            .set_storage_type(spec.storage_type.clone())
            .set_iops(spec.iops)
            .set_multi_az(spec.multi_az)
            .set_promotion_tier(spec.promotion_tier)
            .set_availability_zone(spec.availability_zone.clone())
            .set_auto_minor_version_upgrade(spec.auto_minor_version_upgrade)
            .set_backup_retention_period(spec.backup_retention_period)
            .set_preferred_backup_window(spec.preferred_backup_window.clone())
            .set_preferred_maintenance_window(spec.preferred_maintenance_window.clone())
            .set_vpc_security_group_ids(spec.security_group_ids.clone())
            .set_db_name(spec.database_name.clone())
            .set_master_username(spec.master_username.clone())
            .set_master_user_password(spec.master_password.clone())
            .set_db_subnet_group_name(spec.subnet_group_name.clone())
            .set_license_model(spec.license_model.clone())
            .set_publicly_accessible(spec.publicly_accessible)
            .set_timezone(spec.timezone.clone())
            .send()
            .await
            .map_err(|e| failed("create DB instance", e).for_resource(&spec.identifier))?;
        Ok(())
    }

    async fn create_db_instance_read_replica(&self, spec: &DbInstanceSpec) -> ProviderResult<()> {
        let source = spec.replication_source.as_deref().ok_or_else(|| {
            ProviderError::new("Read replica needs a source instance").for_resource(&spec.identifier)
        })?;
        debug!("Creating read replica {} of {}", spec.identifier, source);

        self.client
            .create_db_instance_read_replica()
            .db_instance_identifier(&spec.identifier)
            .source_db_instance_identifier(source)
            .set_db_instance_class(spec.instance_class.clone())
            .set_availability_zone(spec.availability_zone.clone())
            .set_port(spec.port)
            .set_auto_minor_version_upgrade(spec.auto_minor_version_upgrade)
            .set_iops(spec.iops)
            .set_storage_type(spec.storage_type.clone())
            .set_publicly_accessible(spec.publicly_accessible)
            .set_db_subnet_group_name(spec.subnet_group_name.clone())
            .set_vpc_security_group_ids(spec.security_group_ids.clone())
            .set_multi_az(spec.multi_az)
            .send()
            .await
            .map_err(|e| failed("create DB read replica", e).for_resource(&spec.identifier))?;
        Ok(())
    }

    async fn modify_db_instance(&self, spec: &DbInstanceSpec) -> ProviderResult<()> {
        self.client
            .modify_db_instance()
            .db_instance_identifier(&spec.identifier)
            .apply_immediately(true)
            .set_db_instance_class(spec.instance_class.clone())
            .set_engine_version(spec.engine_version.clone())
            .set_db_port_number(spec.port)
            .set_allocated_storage(spec.allocated_storage)
            .set_storage_type(spec.storage_type.clone())
            .set_iops(spec.iops)
            .set_multi_az(spec.multi_az)
            .set_promotion_tier(spec.promotion_tier)
            .set_auto_minor_version_upgrade(spec.auto_minor_version_upgrade)
            .set_backup_retention_period(spec.backup_retention_period)
            .set_preferred_backup_window(spec.preferred_backup_window.clone())
            .set_preferred_maintenance_window(spec.preferred_maintenance_window.clone())
            .set_vpc_security_group_ids(spec.security_group_ids.clone())
            .set_master_user_password(spec.master_password.clone())
            .set_db_subnet_group_name(spec.subnet_group_name.clone())
            .set_license_model(spec.license_model.clone())
            .set_publicly_accessible(spec.publicly_accessible)
            .send()
            .await
            .map_err(|e| failed("modify DB instance", e).for_resource(&spec.identifier))?;
        Ok(())
    }

    async fn delete_db_instance(
        &self,
        identifier: &str,
        final_snapshot: Option<&str>,
    ) -> ProviderResult<()> {
        self.client
            .delete_db_instance()
            .db_instance_identifier(identifier)
            .skip_final_snapshot(final_snapshot.is_none())
            .set_final_db_snapshot_identifier(final_snapshot.map(String::from))
            .send()
            .await
            .map_err(|e| failed("delete DB instance", e).for_resource(identifier))?;
        Ok(())
    }

    async fn describe_db_instance(
        &self,
        identifier: &str,
    ) -> ProviderResult<Option<DbInstanceDescription>> {
        let result = match self
            .client
            .describe_db_instances()
            .db_instance_identifier(identifier)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_db_instance_not_found_fault()) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(failed("describe DB instance", e).for_resource(identifier)),
        };

        Ok(result.db_instances().first().and_then(instance))
    }

    async fn describe_db_instances(&self) -> ProviderResult<Vec<DbInstanceDescription>> {
        let result = self
            .client
            .describe_db_instances()
            .send()
            .await
            .map_err(|e| failed("describe DB instances", e))?;

        Ok(result.db_instances().iter().filter_map(instance).collect())
    }

    async fn create_db_cluster(&self, spec: &DbClusterSpec) -> ProviderResult<DbClusterDescription> {
        debug!("Creating DB cluster {}", spec.identifier);
        let result = self
            .client
            .create_db_cluster()
            .db_cluster_identifier(&spec.identifier)
            .set_engine(spec.engine.clone())
            .set_engine_version(spec.engine_version.clone())
            .set_port(spec.port)
            .set_availability_zones(
                (!spec.availability_zones.is_empty()).then(|| spec.availability_zones.clone()),
            )
            .set_vpc_security_group_ids(spec.security_group_ids.clone())
            .set_db_subnet_group_name(spec.subnet_group_name.clone())
            .set_database_name(spec.database_name.clone())
            .set_master_username(spec.master_username.clone())
            .set_master_user_password(spec.master_password.clone())
            .set_backup_retention_period(spec.backup_retention_period)
            .set_preferred_backup_window(spec.preferred_backup_window.clone())
            .set_preferred_maintenance_window(spec.preferred_maintenance_window.clone())
            .set_replication_source_identifier(spec.replication_source.clone())
            .send()
            .await
            .map_err(|e| failed("create DB cluster", e).for_resource(&spec.identifier))?;

        result.db_cluster().and_then(cluster).ok_or_else(|| {
            ProviderError::new("CreateDBCluster returned no cluster").for_resource(&spec.identifier)
        })
    }

    async fn modify_db_cluster(&self, spec: &DbClusterSpec) -> ProviderResult<()> {
        self.client
            .modify_db_cluster()
            .db_cluster_identifier(&spec.identifier)
            .apply_immediately(true)
            .set_engine_version(spec.engine_version.clone())
            .set_port(spec.port)
            .set_vpc_security_group_ids(spec.security_group_ids.clone())
            .set_master_user_password(spec.master_password.clone())
            .set_backup_retention_period(spec.backup_retention_period)
            .set_preferred_backup_window(spec.preferred_backup_window.clone())
            .set_preferred_maintenance_window(spec.preferred_maintenance_window.clone())
            .send()
            .await
            .map_err(|e| failed("modify DB cluster", e).for_resource(&spec.identifier))?;
        Ok(())
    }

    async fn delete_db_cluster(
        &self,
        identifier: &str,
        final_snapshot: Option<&str>,
    ) -> ProviderResult<()> {
        self.client
            .delete_db_cluster()
            .db_cluster_identifier(identifier)
            .skip_final_snapshot(final_snapshot.is_none())
            .set_final_db_snapshot_identifier(final_snapshot.map(String::from))
            .send()
            .await
            .map_err(|e| failed("delete DB cluster", e).for_resource(identifier))?;
        Ok(())
    }

    async fn describe_db_cluster(
        &self,
        identifier: &str,
    ) -> ProviderResult<Option<DbClusterDescription>> {
        let result = match self
            .client
            .describe_db_clusters()
            .db_cluster_identifier(identifier)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_db_cluster_not_found_fault()) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(failed("describe DB cluster", e).for_resource(identifier)),
        };

        Ok(result.db_clusters().first().and_then(cluster))
    }

    async fn describe_db_clusters(&self) -> ProviderResult<Vec<DbClusterDescription>> {
        let result = self
            .client
            .describe_db_clusters()
            .send()
            .await
            .map_err(|e| failed("describe DB clusters", e))?;

        Ok(result.db_clusters().iter().filter_map(cluster).collect())
    }

    async fn add_tags(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        use aws_sdk_rds::types::Tag;

        if tags.is_empty() {
            return Ok(());
        }
        self.client
            .add_tags_to_resource()
            .resource_name(arn)
            .set_tags(Some(
                tags.iter()
                    .map(|(k, v)| Tag::builder().key(k).value(v).build())
                    .collect(),
            ))
            .send()
            .await
            .map_err(|e| failed("add tags", e).for_resource(arn))?;
        Ok(())
    }

    async fn list_tags(&self, arn: &str) -> ProviderResult<Tags> {
        let result = self
            .client
            .list_tags_for_resource()
            .resource_name(arn)
            .send()
            .await
            .map_err(|e| failed("list tags", e).for_resource(arn))?;

        Ok(collect_tags(result.tag_list().iter().map(|t| (t.key(), t.value()))))
    }
}
