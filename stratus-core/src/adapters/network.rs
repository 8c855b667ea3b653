//! Subnets, optionally routed to the internet

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use super::{ensure_internet_gateway, event_tags, name_tag, route_default_traffic};
use crate::adapter::{Adapter, Context, immutable};
use crate::credentials::Session;
use crate::error::Result;
use crate::event::{Action, Event, Header, Query, ResourceKind};
use crate::provider::network::RouteTarget;
use crate::provider::{Connector, Filter, NetworkApi, ProviderResult};
use crate::validate::require;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(rename = "network_aws_id")]
    pub network_id: Option<String>,
    pub name: Option<String>,
    /// CIDR block of the subnet
    pub range: Option<String>,
    pub is_public: Option<bool>,
    pub availability_zone: Option<String>,
    pub vpc_id: Option<String>,
    pub internet_gateway: Option<String>,
    #[serde(rename = "internet_gateway_aws_id")]
    pub internet_gateway_id: Option<String>,
}

pub struct NetworkAdapter {
    network: Arc<dyn NetworkApi>,
    context: Context,
}

#[async_trait]
impl Adapter for NetworkAdapter {
    type Resource = Network;

    const KIND: ResourceKind = ResourceKind::Network;

    async fn connect(connector: &dyn Connector, session: &Session, context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            network: connector.network(session).await?,
            context,
        })
    }

    fn supports(action: Action) -> bool {
        immutable(action)
    }

    fn validate(action: Action, event: &Event<Network>) -> Result<()> {
        let network = &event.resource;
        match action {
            Action::Create => {
                require(Self::KIND, "vpc_id", &network.vpc_id)?;
                require(Self::KIND, "range", &network.range)?;
            }
            Action::Delete => {
                require(Self::KIND, "network_aws_id", &network.network_id)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<Network>) -> Result<()> {
        let vpc_id = require(Self::KIND, "vpc_id", &event.resource.vpc_id)?.to_string();
        let range = require(Self::KIND, "range", &event.resource.range)?.to_string();

        let subnet_id = self
            .network
            .create_subnet(&vpc_id, &range, event.resource.availability_zone.as_deref())
            .await?;
        info!("Created subnet {} ({}) in {}", subnet_id, range, vpc_id);
        event.resource.network_id = Some(subnet_id.clone());

        if event.resource.is_public == Some(true) {
            let gateway_id = ensure_internet_gateway(self.network.as_ref(), &vpc_id).await?;
            let target = RouteTarget::InternetGateway(gateway_id.clone());
            route_default_traffic(self.network.as_ref(), &vpc_id, &subnet_id, &target).await?;
            self.network.enable_public_ip_on_launch(&subnet_id).await?;
            event.resource.internet_gateway_id = Some(gateway_id);
        }

        let tags = event_tags(event, event.resource.name.as_deref());
        if !tags.is_empty() {
            self.network.create_tags(&subnet_id, &tags).await?;
        }
        Ok(())
    }

    async fn delete(&self, event: &mut Event<Network>) -> Result<()> {
        let subnet_id = require(Self::KIND, "network_aws_id", &event.resource.network_id)?.to_string();

        // Interfaces of terminated instances linger for a while after the instance is gone.
        self.context
            .wait_for("network interfaces to leave the subnet", || {
                let network = self.network.clone();
                let subnet_id = subnet_id.clone();
                async move {
                    let count = network.count_network_interfaces(&subnet_id).await?;
                    Ok((count == 0).then_some(()))
                }
            })
            .await?;

        self.network.delete_subnet(&subnet_id).await?;
        info!("Deleted subnet {}", subnet_id);
        Ok(())
    }

    async fn find(&self, query: &Query<Network>) -> Result<Vec<Event<Network>>> {
        let subnets = self
            .network
            .describe_subnets(&Filter::from_tags(&query.tags))
            .await?;

        Ok(subnets
            .into_iter()
            .map(|subnet| {
                let name = name_tag(&subnet.tags).unwrap_or_default();
                Event::new(
                    Header::for_component(Self::KIND, &name, subnet.tags),
                    Network {
                        network_id: Some(subnet.subnet_id),
                        name: Some(name),
                        range: subnet.cidr_block,
                        is_public: Some(subnet.map_public_ip_on_launch),
                        availability_zone: subnet.availability_zone,
                        vpc_id: subnet.vpc_id,
                        ..Default::default()
                    },
                )
            })
            .collect())
    }
}
