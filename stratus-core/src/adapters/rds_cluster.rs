//! Managed relational database clusters

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
use crate::provider::database::{DbClusterDescription, DbClusterSpec};
use crate::provider::{Connector, DatabaseApi, ProviderError, ProviderResult};
use crate::validate::{present, require, small_int};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RdsCluster {
    pub arn: Option<String>,
    pub name: Option<String>,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub port: Option<i64>,
    pub endpoint: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub availability_zones: Vec<String>,
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
    pub backup_retention: Option<i64>,
    pub backup_window: Option<String>,
    pub maintenance_window: Option<String>,
    pub replication_source: Option<String>,
    pub final_snapshot: Option<bool>,
}

impl RdsCluster {
    fn spec(&self, identifier: &str) -> Result<DbClusterSpec> {
        const KIND: ResourceKind = ResourceKind::RdsCluster;

        Ok(DbClusterSpec {
            identifier: identifier.to_string(),
            port: small_int(KIND, "port", self.port)?,
            master_password: self.database_password.clone(),
            backup_retention_period: small_int(KIND, "backup_retention", self.backup_retention)?,
            preferred_backup_window: self.backup_window.clone(),
            preferred_maintenance_window: self.maintenance_window.clone(),
            ..Default::default()
        })
    }
}

pub struct RdsClusterAdapter {
    database: Arc<dyn DatabaseApi>,
    context: Context,
}

impl RdsClusterAdapter {
    async fn wait_available(&self, identifier: &str) -> Result<DbClusterDescription> {
        self.context
            .wait_for("database cluster to be available", || {
                let database = self.database.clone();
                let identifier = identifier.to_string();
                async move {
                    let cluster = database.describe_db_cluster(&identifier).await?;
                    let status = cluster.as_ref().and_then(|c| c.status.clone());
                    match status.as_deref() {
                        Some("available") => Ok(cluster),
                        Some("failed") => Err(ProviderError::new("Database cluster failed")
                            .for_resource(&identifier)),
                        _ => Ok(None),
                    }
                }
            })
            .await
    }

    async fn tag(&self, event: &Event<RdsCluster>) -> Result<()> {
        if let Some(arn) = event.resource.arn.as_deref()
            && !event.header.tags.is_empty()
        {
            self.database.add_tags(arn, &event.header.tags).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for RdsClusterAdapter {
    type Resource = RdsCluster;

    const KIND: ResourceKind = ResourceKind::RdsCluster;

    async fn connect(connector: &dyn Connector, session: &Session, context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            database: connector.database(session).await?,
            context,
        })
    }

    fn validate(action: Action, event: &Event<RdsCluster>) -> Result<()> {
        let cluster = &event.resource;
        let name = require(Self::KIND, "name", &cluster.name)?;
        if action != Action::Delete {
            require(Self::KIND, "engine", &cluster.engine)?;
            cluster.spec(name)?;
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<RdsCluster>) -> Result<()> {
        let cluster = &event.resource;
        let name = require(Self::KIND, "name", &cluster.name)?.to_string();
        let subnet_group =
            create_db_subnet_group(self.database.as_ref(), &name, &present(&cluster.network_ids))
                .await?;
        let groups = present(&cluster.security_group_ids);

        let spec = DbClusterSpec {
            engine: cluster.engine.clone(),
            engine_version: cluster.engine_version.clone(),
            availability_zones: present(&cluster.availability_zones),
            security_group_ids: (!groups.is_empty()).then_some(groups),
            subnet_group_name: subnet_group,
            database_name: cluster.database_name.clone(),
            master_username: cluster.database_username.clone(),
            replication_source: cluster.replication_source.clone().filter(|s| !s.is_empty()),
            ..cluster.spec(&name)?
        };

        let created = self.database.create_db_cluster(&spec).await?;
        event.resource.arn = created.arn;
        let available = self.wait_available(&name).await?;
        info!("Created database cluster {}", name);
        event.resource.endpoint = available.endpoint;

        self.tag(event).await
    }

    async fn update(&self, event: &mut Event<RdsCluster>) -> Result<()> {
        let cluster = &event.resource;
        let name = require(Self::KIND, "name", &cluster.name)?.to_string();
        let current = self
            .database
            .describe_db_cluster(&name)
            .await?
            .ok_or_else(|| {
                ProviderError::new("Could not find database cluster").for_resource(&name)
            })?;

        sync_db_subnet_group(self.database.as_ref(), &name, &present(&cluster.network_ids))
            .await?;

        let mut spec = cluster.spec(&name)?;
        spec.security_group_ids = changed_groups(
            &present(&cluster.security_group_ids),
            &current.security_group_ids,
        );
        self.database.modify_db_cluster(&spec).await?;
        info!("Modified database cluster {}", name);

        event.resource.arn = current.arn;
        event.resource.endpoint = current.endpoint;
        self.tag(event).await
    }

    async fn delete(&self, event: &mut Event<RdsCluster>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?.to_string();
        let snapshot = final_snapshot(&name, event.resource.final_snapshot);

        self.database
            .delete_db_cluster(&name, snapshot.as_deref())
            .await?;
        self.context
            .wait_for("database cluster to be deleted", || {
                let database = self.database.clone();
                let name = name.clone();
                async move {
                    let cluster = database.describe_db_cluster(&name).await?;
                    Ok(cluster.is_none().then_some(()))
                }
            })
            .await?;
        info!("Deleted database cluster {}", name);

        delete_db_subnet_group(self.database.as_ref(), &name).await?;
        Ok(())
    }

    async fn find(&self, _query: &Query<RdsCluster>) -> Result<Vec<Event<RdsCluster>>> {
        let mut found = Vec::new();
        for cluster in self.database.describe_db_clusters().await? {
            let tags = match cluster.arn.as_deref() {
                Some(arn) => self.database.list_tags(arn).await?,
                None => Default::default(),
            };
            let subnets = match cluster.subnet_group_name.as_deref() {
                Some(group) => self.database.describe_subnet_group(group).await?,
                None => None,
            };

            found.push(Event::new(
                Header::for_component(Self::KIND, &cluster.identifier, tags),
                RdsCluster {
                    arn: cluster.arn,
                    name: Some(cluster.identifier),
                    engine: cluster.engine,
                    engine_version: cluster.engine_version,
                    port: cluster.port.map(i64::from),
                    endpoint: cluster.endpoint,
                    availability_zones: cluster.availability_zones,
                    security_group_ids: cluster.security_group_ids,
                    network_ids: subnets.unwrap_or_default(),
                    database_name: cluster.database_name,
                    database_username: cluster.master_username,
                    backup_retention: cluster.backup_retention_period.map(i64::from),
                    backup_window: cluster.preferred_backup_window,
                    maintenance_window: cluster.preferred_maintenance_window,
                    replication_source: cluster.replication_source,
                    ..Default::default()
                },
            ));
        }
        Ok(found)
    }
}
