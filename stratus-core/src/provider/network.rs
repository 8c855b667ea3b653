//! Network family: VPCs, subnets, gateways, route tables, NAT and security groups

use async_trait::async_trait;

use super::{AddressAllocation, Filter, ProviderResult};
use crate::resource::{FirewallRule, Tags};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VpcDescription {
    pub vpc_id: String,
    pub cidr_block: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubnetDescription {
    pub subnet_id: String,
    pub vpc_id: Option<String>,
    pub cidr_block: Option<String>,
    pub availability_zone: Option<String>,
    pub map_public_ip_on_launch: bool,
    pub tags: Tags,
}

/// Where a route sends its traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    InternetGateway(String),
    NatGateway(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Route {
    pub destination_cidr_block: Option<String>,
    pub gateway_id: Option<String>,
    pub nat_gateway_id: Option<String>,
}

impl Route {
    pub fn targets(&self, target: &RouteTarget) -> bool {
        match target {
            RouteTarget::InternetGateway(id) => self.gateway_id.as_deref() == Some(id),
            RouteTarget::NatGateway(id) => self.nat_gateway_id.as_deref() == Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteTableAssociation {
    pub association_id: String,
    pub subnet_id: Option<String>,
    pub main: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteTable {
    pub route_table_id: String,
    pub routes: Vec<Route>,
    pub associations: Vec<RouteTableAssociation>,
    pub tags: Tags,
}

impl RouteTable {
    pub fn routes_to(&self, target: &RouteTarget) -> bool {
        self.routes.iter().any(|r| r.targets(target))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NatGatewayState {
    Pending,
    Available,
    Deleting,
    Deleted,
    Failed,
    Unknown(String),
}

impl NatGatewayState {
    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "available" => Self::Available,
            "deleting" => Self::Deleting,
            "deleted" => Self::Deleted,
            "failed" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatGatewayDescription {
    pub nat_gateway_id: String,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub state: NatGatewayState,
    pub allocation_id: Option<String>,
    pub public_ip: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityGroupDescription {
    pub group_id: String,
    pub group_name: String,
    pub vpc_id: Option<String>,
    /// Ingress and egress rules, one CIDR per rule
    pub rules: Vec<FirewallRule>,
    pub tags: Tags,
}

#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn create_vpc(&self, cidr_block: &str) -> ProviderResult<String>;

    async fn delete_vpc(&self, vpc_id: &str) -> ProviderResult<()>;

    async fn describe_vpcs(&self, filters: &[Filter]) -> ProviderResult<Vec<VpcDescription>>;

    async fn create_subnet(
        &self,
        vpc_id: &str,
        cidr_block: &str,
        availability_zone: Option<&str>,
    ) -> ProviderResult<String>;

    async fn enable_public_ip_on_launch(&self, subnet_id: &str) -> ProviderResult<()>;

    async fn delete_subnet(&self, subnet_id: &str) -> ProviderResult<()>;

    async fn describe_subnets(&self, filters: &[Filter]) -> ProviderResult<Vec<SubnetDescription>>;

    /// Number of network interfaces still placed in the subnet
    async fn count_network_interfaces(&self, subnet_id: &str) -> ProviderResult<usize>;

    /// Gateway currently attached to the VPC, if any
    async fn find_internet_gateway(&self, vpc_id: &str) -> ProviderResult<Option<String>>;

    async fn create_internet_gateway(&self) -> ProviderResult<String>;

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ProviderResult<()>;

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ProviderResult<()>;

    async fn delete_internet_gateway(&self, gateway_id: &str) -> ProviderResult<()>;

    async fn describe_route_tables(&self, filters: &[Filter]) -> ProviderResult<Vec<RouteTable>>;

    async fn create_route_table(&self, vpc_id: &str) -> ProviderResult<String>;

    /// Returns the association id
    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> ProviderResult<String>;

    async fn disassociate_route_table(&self, association_id: &str) -> ProviderResult<()>;

    async fn delete_route_table(&self, route_table_id: &str) -> ProviderResult<()>;

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr_block: &str,
        target: &RouteTarget,
    ) -> ProviderResult<()>;

    async fn allocate_address(&self) -> ProviderResult<AddressAllocation>;

    async fn release_address(&self, allocation_id: &str) -> ProviderResult<()>;

    async fn create_nat_gateway(&self, subnet_id: &str, allocation_id: &str)
    -> ProviderResult<String>;

    async fn describe_nat_gateway(
        &self,
        nat_gateway_id: &str,
    ) -> ProviderResult<Option<NatGatewayDescription>>;

    async fn describe_nat_gateways(&self) -> ProviderResult<Vec<NatGatewayDescription>>;

    async fn delete_nat_gateway(&self, nat_gateway_id: &str) -> ProviderResult<()>;

    async fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        description: &str,
    ) -> ProviderResult<String>;

    async fn describe_security_group(
        &self,
        group_id: &str,
    ) -> ProviderResult<Option<SecurityGroupDescription>>;

    async fn describe_security_groups(
        &self,
        filters: &[Filter],
    ) -> ProviderResult<Vec<SecurityGroupDescription>>;

    /// Rules may mix directions; the implementation routes each to the right call
    async fn authorize_rules(&self, group_id: &str, rules: &[FirewallRule]) -> ProviderResult<()>;

    async fn revoke_rules(&self, group_id: &str, rules: &[FirewallRule]) -> ProviderResult<()>;

    async fn delete_security_group(&self, group_id: &str) -> ProviderResult<()>;

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> ProviderResult<()>;
}
