//! Managed relational database instances
//!
//! An instance placed in networks gets its own subnet group, named after the
//! instance, which lives and dies with it.

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use super::{
    changed_groups, create_db_subnet_group, delete_db_subnet_group, final_snapshot,
    sync_db_subnet_group,
};
use crate::adapter::{Adapter, Context};
use crate::credentials::Session;
use crate::error::Result;
use crate::event::{Action, Event, Header, Query, ResourceKind, nullable};
use crate::provider::database::{DbInstanceDescription, DbInstanceSpec};
use crate::provider::{Connector, DatabaseApi, ProviderError, ProviderResult};
use crate::resource::Tags;
use crate::validate::{present, require, small_int};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RdsInstance {
    pub arn: Option<String>,
    pub name: Option<String>,
    /// Instance class, e.g. `db.t3.micro`
    pub size: Option<String>,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub port: Option<i64>,
    pub cluster: Option<String>,
    pub public: Option<bool>,
    pub endpoint: Option<String>,
    pub multi_az: Option<bool>,
    pub promotion_tier: Option<i64>,
    pub storage_type: Option<String>,
    /// GiB
    pub storage_size: Option<i64>,
    pub storage_iops: Option<i64>,
    pub availability_zone: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub security_groups: Vec<String>,
    #[serde(rename = "security_group_aws_ids", default, deserialize_with = "nullable")]
    pub security_group_ids: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub networks: Vec<String>,
    #[serde(rename = "network_aws_ids", default, deserialize_with = "nullable")]
    pub network_ids: Vec<String>,
    pub database_name: Option<String>,
    pub database_username: Option<String>,
    pub database_password: Option<String>,
    pub auto_upgrade: Option<bool>,
    pub backup_retention: Option<i64>,
    pub backup_window: Option<String>,
    pub maintenance_window: Option<String>,
    pub final_snapshot: Option<bool>,
    pub replication_source: Option<String>,
    pub license: Option<String>,
    pub timezone: Option<String>,
}

impl RdsInstance {
    /// Settings shared by create and modify
    fn spec(&self, identifier: &str) -> Result<DbInstanceSpec> {
        const KIND: ResourceKind = ResourceKind::RdsInstance;

        Ok(DbInstanceSpec {
            identifier: identifier.to_string(),
            instance_class: self.size.clone(),
            engine_version: self.engine_version.clone(),
            port: small_int(KIND, "port", self.port)?,
            allocated_storage: small_int(KIND, "storage_size", self.storage_size)?,
            storage_type: self.storage_type.clone(),
            iops: small_int(KIND, "storage_iops", self.storage_iops)?,
            multi_az: self.multi_az,
            promotion_tier: small_int(KIND, "promotion_tier", self.promotion_tier)?,
            auto_minor_version_upgrade: self.auto_upgrade,
            backup_retention_period: small_int(KIND, "backup_retention", self.backup_retention)?,
            preferred_backup_window: self.backup_window.clone(),
            preferred_maintenance_window: self.maintenance_window.clone(),
            master_password: self.database_password.clone(),
            license_model: self.license.clone(),
            publicly_accessible: self.public,
            ..Default::default()
        })
    }
}

fn into_event(db: DbInstanceDescription, tags: Tags) -> Event<RdsInstance> {
    Event::new(
        Header::for_component(ResourceKind::RdsInstance, &db.identifier, tags),
        RdsInstance {
            arn: db.arn,
            name: Some(db.identifier),
            size: db.instance_class,
            engine: db.engine,
            engine_version: db.engine_version,
            port: db.port.map(i64::from),
            cluster: db.cluster_identifier,
            public: db.publicly_accessible,
            endpoint: db.endpoint,
            multi_az: db.multi_az,
            promotion_tier: db.promotion_tier.map(i64::from),
            storage_type: db.storage_type,
            storage_size: db.allocated_storage.map(i64::from),
            storage_iops: db.iops.map(i64::from),
            availability_zone: db.availability_zone,
            security_group_ids: db.security_group_ids,
            database_name: db.database_name,
            database_username: db.master_username,
            auto_upgrade: db.auto_minor_version_upgrade,
            backup_retention: db.backup_retention_period.map(i64::from),
            backup_window: db.preferred_backup_window,
            maintenance_window: db.preferred_maintenance_window,
            replication_source: db.replication_source,
            license: db.license_model,
            timezone: db.timezone,
            ..Default::default()
        },
    )
}

pub struct RdsInstanceAdapter {
    database: Arc<dyn DatabaseApi>,
    context: Context,
}

impl RdsInstanceAdapter {
    async fn wait_available(&self, identifier: &str) -> Result<DbInstanceDescription> {
        self.context
            .wait_for("database instance to be available", || {
                let database = self.database.clone();
                let identifier = identifier.to_string();
                async move {
                    let db = database.describe_db_instance(&identifier).await?;
                    let status = db.as_ref().and_then(|d| d.status.clone());
                    match status.as_deref() {
                        Some("available") => Ok(db),
                        Some("failed") => Err(ProviderError::new("Database instance failed")
                            .for_resource(&identifier)),
                        _ => Ok(None),
                    }
                }
            })
            .await
    }

    async fn tag(&self, arn: Option<&str>, event: &Event<RdsInstance>) -> Result<()> {
        if let Some(arn) = arn
            && !event.header.tags.is_empty()
        {
            self.database.add_tags(arn, &event.header.tags).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for RdsInstanceAdapter {
    type Resource = RdsInstance;

    const KIND: ResourceKind = ResourceKind::RdsInstance;

    async fn connect(connector: &dyn Connector, session: &Session, context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            database: connector.database(session).await?,
            context,
        })
    }

    fn validate(action: Action, event: &Event<RdsInstance>) -> Result<()> {
        let db = &event.resource;
        let name = require(Self::KIND, "name", &db.name)?;
        if action != Action::Delete {
            require(Self::KIND, "engine", &db.engine)?;
            require(Self::KIND, "size", &db.size)?;
            db.spec(name)?;
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<RdsInstance>) -> Result<()> {
        let db = &event.resource;
        let name = require(Self::KIND, "name", &db.name)?.to_string();
        let subnet_group =
            create_db_subnet_group(self.database.as_ref(), &name, &present(&db.network_ids))
                .await?;
        let groups = present(&db.security_group_ids);

        let mut spec = db.spec(&name)?;
        spec.availability_zone = db.availability_zone.clone();
        spec.subnet_group_name = subnet_group;

        match db.replication_source.as_deref().filter(|s| !s.is_empty()) {
            Some(source) => {
                spec.replication_source = Some(source.to_string());
                self.database.create_db_instance_read_replica(&spec).await?;
            }
            None => {
                spec.engine = db.engine.clone();
                spec.cluster_identifier = db.cluster.clone();
                spec.database_name = db.database_name.clone();
                spec.master_username = db.database_username.clone();
                spec.timezone = db.timezone.clone();
                spec.security_group_ids = (!groups.is_empty()).then_some(groups);
                self.database.create_db_instance(&spec).await?;
            }
        }

        let created = self.wait_available(&name).await?;
        info!("Created database instance {}", name);
        event.resource.arn = created.arn;
        event.resource.endpoint = created.endpoint;

        let arn = event.resource.arn.clone();
        self.tag(arn.as_deref(), event).await
    }

    async fn update(&self, event: &mut Event<RdsInstance>) -> Result<()> {
        let db = &event.resource;
        let name = require(Self::KIND, "name", &db.name)?.to_string();
        let current = self
            .database
            .describe_db_instance(&name)
            .await?
            .ok_or_else(|| {
                ProviderError::new("Could not find database instance").for_resource(&name)
            })?;

        sync_db_subnet_group(self.database.as_ref(), &name, &present(&db.network_ids)).await?;

        let mut spec = db.spec(&name)?;
        spec.security_group_ids =
            changed_groups(&present(&db.security_group_ids), &current.security_group_ids);
        self.database.modify_db_instance(&spec).await?;
        info!("Modified database instance {}", name);

        event.resource.arn = current.arn;
        event.resource.endpoint = current.endpoint;
        let arn = event.resource.arn.clone();
        self.tag(arn.as_deref(), event).await
    }

    async fn delete(&self, event: &mut Event<RdsInstance>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?.to_string();
        let snapshot = final_snapshot(&name, event.resource.final_snapshot);

        self.database
            .delete_db_instance(&name, snapshot.as_deref())
            .await?;
        self.context
            .wait_for("database instance to be deleted", || {
                let database = self.database.clone();
                let name = name.clone();
                async move {
                    let db = database.describe_db_instance(&name).await?;
                    Ok(db.is_none().then_some(()))
                }
            })
            .await?;
        info!("Deleted database instance {}", name);

        delete_db_subnet_group(self.database.as_ref(), &name).await?;
        Ok(())
    }

    async fn find(&self, _query: &Query<RdsInstance>) -> Result<Vec<Event<RdsInstance>>> {
        let mut found = Vec::new();
        for db in self.database.describe_db_instances().await? {
            let tags = match db.arn.as_deref() {
                Some(arn) => self.database.list_tags(arn).await?,
                None => Default::default(),
            };
            let subnets = match db.subnet_group_name.as_deref() {
                Some(group) => self.database.describe_subnet_group(group).await?,
                None => None,
            };
            let mut event = into_event(db, tags);
            event.resource.network_ids = subnets.unwrap_or_default();
            found.push(event);
        }
        Ok(found)
    }
}
