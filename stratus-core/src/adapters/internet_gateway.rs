//! Internet gateways attached to a VPC

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{ensure_internet_gateway, event_tags};
use crate::adapter::{Adapter, Context, create_delete_only};
use crate::credentials::Session;
use crate::error::Result;
use crate::event::{Action, Event, ResourceKind};
use crate::provider::{Connector, Filter, NetworkApi, ProviderResult};
use crate::validate::require;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InternetGateway {
    #[serde(rename = "internet_gateway_aws_id")]
    pub internet_gateway_id: Option<String>,
    pub name: Option<String>,
    pub vpc_id: Option<String>,
}

pub struct InternetGatewayAdapter {
    network: Arc<dyn NetworkApi>,
}

#[async_trait]
impl Adapter for InternetGatewayAdapter {
    type Resource = InternetGateway;

    const KIND: ResourceKind = ResourceKind::InternetGateway;

    async fn connect(connector: &dyn Connector, session: &Session, _context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            network: connector.network(session).await?,
        })
    }

    fn supports(action: Action) -> bool {
        create_delete_only(action)
    }

    fn validate(action: Action, event: &Event<InternetGateway>) -> Result<()> {
        let gateway = &event.resource;
        match action {
            Action::Create => require(Self::KIND, "vpc_id", &gateway.vpc_id).map(|_| ()),
            Action::Delete => {
                require(Self::KIND, "internet_gateway_aws_id", &gateway.internet_gateway_id)
                    .map(|_| ())
            }
            _ => Ok(()),
        }
    }

    async fn create(&self, event: &mut Event<InternetGateway>) -> Result<()> {
        let vpc_id = require(Self::KIND, "vpc_id", &event.resource.vpc_id)?.to_string();

        let gateway_id = ensure_internet_gateway(self.network.as_ref(), &vpc_id).await?;
        info!("Internet gateway {} attached to {}", gateway_id, vpc_id);
        event.resource.internet_gateway_id = Some(gateway_id.clone());

        let tags = event_tags(event, event.resource.name.as_deref());
        if !tags.is_empty() {
            self.network.create_tags(&gateway_id, &tags).await?;
        }
        Ok(())
    }

    /// Route tables sending traffic through the gateway go first, the
    /// provider refuses to drop a gateway that is still a route target.
    async fn delete(&self, event: &mut Event<InternetGateway>) -> Result<()> {
        let gateway_id = require(
            Self::KIND,
            "internet_gateway_aws_id",
            &event.resource.internet_gateway_id,
        )?
        .to_string();

        let filters = [Filter::new("route.gateway-id", gateway_id.as_str())];
        for table in self.network.describe_route_tables(&filters).await? {
            if table.associations.iter().any(|a| a.main) {
                debug!("Keeping main route table {}", table.route_table_id);
                continue;
            }
            for association in &table.associations {
                self.network
                    .disassociate_route_table(&association.association_id)
                    .await?;
            }
            self.network.delete_route_table(&table.route_table_id).await?;
            info!("Deleted route table {}", table.route_table_id);
        }

        if let Some(vpc_id) = event.resource.vpc_id.as_deref().filter(|v| !v.is_empty()) {
            let attached = self.network.find_internet_gateway(vpc_id).await?;
            if attached.as_deref() == Some(gateway_id.as_str()) {
                self.network.detach_internet_gateway(&gateway_id, vpc_id).await?;
            }
        }

        self.network.delete_internet_gateway(&gateway_id).await?;
        info!("Deleted internet gateway {}", gateway_id);
        Ok(())
    }
}
