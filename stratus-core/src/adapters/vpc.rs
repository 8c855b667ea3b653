//! Virtual private networks

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{event_tags, name_tag};
use crate::adapter::{Adapter, Context, immutable};
use crate::credentials::Session;
use crate::error::Result;
use crate::event::{Action, Event, Header, Query, ResourceKind};
use crate::provider::{Connector, Filter, NetworkApi, ProviderResult};
use crate::validate::require;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vpc {
    #[serde(rename = "vpc_aws_id")]
    pub vpc_id: Option<String>,
    pub name: Option<String>,
    /// CIDR block of the VPC
    pub subnet: Option<String>,
    pub auto_remove: Option<bool>,
}

pub struct VpcAdapter {
    network: Arc<dyn NetworkApi>,
}

#[async_trait]
impl Adapter for VpcAdapter {
    type Resource = Vpc;

    const KIND: ResourceKind = ResourceKind::Vpc;

    async fn connect(connector: &dyn Connector, session: &Session, _context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            network: connector.network(session).await?,
        })
    }

    fn supports(action: Action) -> bool {
        immutable(action)
    }

    fn validate(action: Action, event: &Event<Vpc>) -> Result<()> {
        match action {
            Action::Create => require(Self::KIND, "subnet", &event.resource.subnet).map(|_| ()),
            Action::Delete => require(Self::KIND, "vpc_aws_id", &event.resource.vpc_id).map(|_| ()),
            _ => Ok(()),
        }
    }

    async fn create(&self, event: &mut Event<Vpc>) -> Result<()> {
        let cidr = require(Self::KIND, "subnet", &event.resource.subnet)?.to_string();

        let vpc_id = self.network.create_vpc(&cidr).await?;
        info!("Created VPC {} ({})", vpc_id, cidr);
        event.resource.vpc_id = Some(vpc_id.clone());

        let tags = event_tags(event, event.resource.name.as_deref());
        if !tags.is_empty() {
            self.network.create_tags(&vpc_id, &tags).await?;
        }
        Ok(())
    }

    /// Best-effort: a VPC that still has dependents is left in place and the
    /// event completes with a warning.
    async fn delete(&self, event: &mut Event<Vpc>) -> Result<()> {
        let vpc_id = require(Self::KIND, "vpc_aws_id", &event.resource.vpc_id)?.to_string();

        match self.network.delete_vpc(&vpc_id).await {
            Ok(()) => info!("Deleted VPC {}", vpc_id),
            Err(e) => {
                warn!("Could not remove the vpc {} - {}", vpc_id, e);
                event.header.warning = Some(format!("Could not remove the vpc - {}", e));
            }
        }
        Ok(())
    }

    async fn find(&self, query: &Query<Vpc>) -> Result<Vec<Event<Vpc>>> {
        let vpcs = self
            .network
            .describe_vpcs(&Filter::from_tags(&query.tags))
            .await?;

        Ok(vpcs
            .into_iter()
            .map(|vpc| {
                let name = name_tag(&vpc.tags).unwrap_or_default();
                Event::new(
                    Header::for_component(Self::KIND, &name, vpc.tags),
                    Vpc {
                        vpc_id: Some(vpc.vpc_id),
                        name: Some(name),
                        subnet: vpc.cidr_block,
                        auto_remove: None,
                    },
                )
            })
            .collect())
    }
}
