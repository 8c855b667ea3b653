//! NAT gateways and the routes sending private subnets through them

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{ensure_internet_gateway, event_tags, route_default_traffic};
use crate::adapter::{Adapter, Context};
use crate::credentials::Session;
use crate::error::Result;
use crate::event::{Action, Event, Header, Query, ResourceKind, nullable};
use crate::provider::network::{NatGatewayState, RouteTarget};
use crate::provider::{Connector, Filter, NetworkApi, ProviderError, ProviderResult};
use crate::resource::Tags;
use crate::validate::{present, require, require_any};

/// Tag put on every routed subnet; find reads the gateway name back from it
pub const NAT_GATEWAY_TAG: &str = "stratus.nat_gateway";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nat {
    #[serde(rename = "nat_gateway_aws_id")]
    pub nat_gateway_id: Option<String>,
    pub name: Option<String>,
    pub public_network: Option<String>,
    #[serde(rename = "public_network_aws_id")]
    pub public_network_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub routed_networks: Vec<String>,
    #[serde(rename = "routed_networks_aws_ids", default, deserialize_with = "nullable")]
    pub routed_network_ids: Vec<String>,
    #[serde(rename = "nat_gateway_allocation_id")]
    pub allocation_id: Option<String>,
    #[serde(rename = "nat_gateway_allocation_ip")]
    pub allocation_ip: Option<String>,
    pub internet_gateway_id: Option<String>,
    pub vpc_id: Option<String>,
}

pub struct NatAdapter {
    network: Arc<dyn NetworkApi>,
    context: Context,
}

impl NatAdapter {
    /// Point 0.0.0.0/0 of every routed subnet at the gateway, skipping tables that already do
    async fn route_subnets(&self, vpc_id: &str, nat_gateway_id: &str, subnets: &[String]) -> Result<()> {
        let target = RouteTarget::NatGateway(nat_gateway_id.to_string());
        for subnet_id in subnets {
            if route_default_traffic(self.network.as_ref(), vpc_id, subnet_id, &target).await? {
                info!("Routed {} through {}", subnet_id, nat_gateway_id);
            } else {
                debug!("{} already routes through {}", subnet_id, nat_gateway_id);
            }
        }
        Ok(())
    }

    async fn tag_routed_subnets(&self, name: Option<&str>, subnets: &[String]) -> Result<()> {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return Ok(());
        };
        let mut tags = Tags::new();
        tags.insert(NAT_GATEWAY_TAG.to_string(), name.to_string());
        for subnet_id in subnets {
            self.network.create_tags(subnet_id, &tags).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for NatAdapter {
    type Resource = Nat;

    const KIND: ResourceKind = ResourceKind::Nat;

    async fn connect(connector: &dyn Connector, session: &Session, context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            network: connector.network(session).await?,
            context,
        })
    }

    fn validate(action: Action, event: &Event<Nat>) -> Result<()> {
        let nat = &event.resource;
        match action {
            Action::Create => {
                require(Self::KIND, "public_network_aws_id", &nat.public_network_id)?;
                require_any(Self::KIND, "routed_networks_aws_ids", &present(&nat.routed_network_ids))?;
                require(Self::KIND, "vpc_id", &nat.vpc_id)?;
            }
            Action::Update => {
                require(Self::KIND, "nat_gateway_aws_id", &nat.nat_gateway_id)?;
                require_any(Self::KIND, "routed_networks_aws_ids", &present(&nat.routed_network_ids))?;
                require(Self::KIND, "vpc_id", &nat.vpc_id)?;
            }
            Action::Delete => {
                require(Self::KIND, "nat_gateway_aws_id", &nat.nat_gateway_id)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<Nat>) -> Result<()> {
        let vpc_id = require(Self::KIND, "vpc_id", &event.resource.vpc_id)?.to_string();
        let public_subnet =
            require(Self::KIND, "public_network_aws_id", &event.resource.public_network_id)?.to_string();
        let routed = present(&event.resource.routed_network_ids);

        let allocation = self.network.allocate_address().await?;
        event.resource.allocation_id = Some(allocation.allocation_id.clone());
        event.resource.allocation_ip = Some(allocation.public_ip.clone());

        let gateway_id = ensure_internet_gateway(self.network.as_ref(), &vpc_id).await?;
        event.resource.internet_gateway_id = Some(gateway_id);

        let nat_gateway_id = self
            .network
            .create_nat_gateway(&public_subnet, &allocation.allocation_id)
            .await?;
        info!("Created NAT gateway {} in {}", nat_gateway_id, public_subnet);
        event.resource.nat_gateway_id = Some(nat_gateway_id.clone());

        self.context
            .wait_for("nat gateway to become available", || {
                let network = self.network.clone();
                let nat_gateway_id = nat_gateway_id.clone();
                async move {
                    match network.describe_nat_gateway(&nat_gateway_id).await? {
                        Some(gw) if gw.state == NatGatewayState::Available => Ok(Some(())),
                        Some(gw) if gw.state == NatGatewayState::Failed => Err(ProviderError::new(
                            "NAT gateway failed to become available",
                        )
                        .for_resource(nat_gateway_id)),
                        _ => Ok(None),
                    }
                }
            })
            .await?;

        self.route_subnets(&vpc_id, &nat_gateway_id, &routed).await?;

        let tags = event_tags(event, event.resource.name.as_deref());
        if !tags.is_empty() {
            self.network.create_tags(&nat_gateway_id, &tags).await?;
        }
        self.tag_routed_subnets(event.resource.name.as_deref(), &routed)
            .await
    }

    async fn update(&self, event: &mut Event<Nat>) -> Result<()> {
        let nat_gateway_id =
            require(Self::KIND, "nat_gateway_aws_id", &event.resource.nat_gateway_id)?.to_string();
        let vpc_id = require(Self::KIND, "vpc_id", &event.resource.vpc_id)?.to_string();
        let routed = present(&event.resource.routed_network_ids);

        self.route_subnets(&vpc_id, &nat_gateway_id, &routed).await?;
        self.tag_routed_subnets(event.resource.name.as_deref(), &routed)
            .await
    }

    /// Delete the gateway, wait until it is gone, then hand its address back
    async fn delete(&self, event: &mut Event<Nat>) -> Result<()> {
        let nat_gateway_id =
            require(Self::KIND, "nat_gateway_aws_id", &event.resource.nat_gateway_id)?.to_string();

        let allocation_id = match event.resource.allocation_id.clone().filter(|a| !a.is_empty()) {
            Some(id) => Some(id),
            None => self
                .network
                .describe_nat_gateway(&nat_gateway_id)
                .await?
                .and_then(|gw| gw.allocation_id),
        };

        self.network.delete_nat_gateway(&nat_gateway_id).await?;
        self.context
            .wait_for("nat gateway to be deleted", || {
                let network = self.network.clone();
                let nat_gateway_id = nat_gateway_id.clone();
                async move {
                    Ok(match network.describe_nat_gateway(&nat_gateway_id).await? {
                        None => Some(()),
                        Some(gw) => matches!(gw.state, NatGatewayState::Deleted | NatGatewayState::Failed)
                            .then_some(()),
                    })
                }
            })
            .await?;
        info!("Deleted NAT gateway {}", nat_gateway_id);

        if let Some(allocation_id) = allocation_id {
            self.network.release_address(&allocation_id).await?;
            info!("Released address {}", allocation_id);
        }
        Ok(())
    }

    async fn find(&self, _query: &Query<Nat>) -> Result<Vec<Event<Nat>>> {
        let mut found = Vec::new();

        for gateway in self.network.describe_nat_gateways().await? {
            if gateway.state == NatGatewayState::Deleted {
                continue;
            }

            let filters = [Filter::new("route.nat-gateway-id", gateway.nat_gateway_id.as_str())];
            let routed: Vec<String> = self
                .network
                .describe_route_tables(&filters)
                .await?
                .into_iter()
                .flat_map(|table| table.associations)
                .filter_map(|association| association.subnet_id)
                .collect();
            if routed.is_empty() {
                debug!("NAT gateway {} routes no subnet", gateway.nat_gateway_id);
                continue;
            }

            let subnets = self
                .network
                .describe_subnets(&[Filter::with_values("subnet-id", routed.clone())])
                .await?;
            let Some(name) = subnets
                .iter()
                .find_map(|subnet| subnet.tags.get(NAT_GATEWAY_TAG).cloned())
            else {
                debug!("NAT gateway {} has no named subnet", gateway.nat_gateway_id);
                continue;
            };

            found.push(Event::new(
                Header::for_component(Self::KIND, &name, gateway.tags),
                Nat {
                    nat_gateway_id: Some(gateway.nat_gateway_id),
                    name: Some(name),
                    public_network_id: gateway.subnet_id,
                    routed_network_ids: routed,
                    allocation_id: gateway.allocation_id,
                    allocation_ip: gateway.public_ip,
                    vpc_id: gateway.vpc_id,
                    ..Default::default()
                },
            ));
        }

        Ok(found)
    }
}
