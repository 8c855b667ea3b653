//! EC2: the network and compute families

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::{IpPermission, IpRange, Tag};
use stratus_core::provider::compute::{
    InstanceDescription, InstanceRequest, InstanceState, VolumeDescription, VolumeRequest,
};
use stratus_core::provider::network::{
    NatGatewayDescription, NatGatewayState, Route, RouteTable, RouteTableAssociation,
    RouteTarget, SecurityGroupDescription, SubnetDescription, VpcDescription,
};
use stratus_core::provider::{
    AddressAllocation, ComputeApi, Filter, NetworkApi, ProviderError, ProviderResult,
};
use stratus_core::resource::{Direction, FirewallRule, Tags, VolumeAttachment};

use crate::{collect_tags, failed, owned};

/// Error codes EC2 answers with when a described id does not exist
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidGroup.NotFound",
    "NatGatewayNotFound",
];

/// EC2 client shared by the network and compute families
pub struct Ec2Api {
    client: Ec2Client,
}

impl Ec2Api {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Ec2Client::new(config),
        }
    }
}

fn sdk_filters(filters: &[Filter]) -> Option<Vec<aws_sdk_ec2::types::Filter>> {
    if filters.is_empty() {
        return None;
    }
    Some(
        filters
            .iter()
            .map(|f| {
                aws_sdk_ec2::types::Filter::builder()
                    .name(&f.name)
                    .set_values(Some(f.values.clone()))
                    .build()
            })
            .collect(),
    )
}

fn sdk_tags(tags: &Tags) -> Vec<Tag> {
    tags.iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

fn tags_of(tags: &[Tag]) -> Tags {
    collect_tags(tags.iter().map(|t| (t.key(), t.value())))
}

fn is_not_found<E: ProvideErrorMetadata>(err: &E) -> bool {
    err.code().is_some_and(|c| NOT_FOUND_CODES.contains(&c))
}

fn missing(what: &str) -> ProviderError {
    ProviderError::new(format!("{} returned no identifier", what))
}

fn ip_permission(rule: &FirewallRule) -> IpPermission {
    let mut range = IpRange::builder().cidr_ip(&rule.cidr);
    if let Some(description) = &rule.description {
        range = range.description(description);
    }
    let builder = IpPermission::builder()
        .ip_protocol(&rule.protocol)
        .ip_ranges(range.build());
    if rule.protocol == stratus_core::resource::ALL_PROTOCOLS {
        builder.build()
    } else {
        builder.from_port(rule.from_port).to_port(rule.to_port).build()
    }
}

/// Flatten provider permissions into one rule per CIDR
fn firewall_rules(direction: Direction, permissions: &[IpPermission]) -> Vec<FirewallRule> {
    let mut rules = Vec::new();
    for permission in permissions {
        let protocol = permission.ip_protocol().unwrap_or_default();
        for range in permission.ip_ranges() {
            let Some(cidr) = range.cidr_ip() else {
                continue;
            };
            let mut rule = FirewallRule::new(
                direction,
                cidr,
                protocol,
                permission.from_port().unwrap_or(0),
                permission.to_port().unwrap_or(65535),
            );
            if let Some(description) = range.description() {
                rule = rule.with_description(description);
            }
            rules.push(rule);
        }
    }
    rules
}

fn nat_gateway(gw: &aws_sdk_ec2::types::NatGateway) -> Option<NatGatewayDescription> {
    let address = gw.nat_gateway_addresses().first();
    Some(NatGatewayDescription {
        nat_gateway_id: gw.nat_gateway_id()?.to_string(),
        vpc_id: gw.vpc_id().map(String::from),
        subnet_id: gw.subnet_id().map(String::from),
        state: NatGatewayState::parse(gw.state().map(|s| s.as_str()).unwrap_or_default()),
        allocation_id: address.and_then(|a| a.allocation_id().map(String::from)),
        public_ip: address.and_then(|a| a.public_ip().map(String::from)),
        tags: tags_of(gw.tags()),
    })
}

fn security_group(sg: &aws_sdk_ec2::types::SecurityGroup) -> Option<SecurityGroupDescription> {
    let mut rules = firewall_rules(Direction::Ingress, sg.ip_permissions());
    rules.extend(firewall_rules(Direction::Egress, sg.ip_permissions_egress()));
    Some(SecurityGroupDescription {
        group_id: sg.group_id()?.to_string(),
        group_name: sg.group_name().unwrap_or_default().to_string(),
        vpc_id: sg.vpc_id().map(String::from),
        rules,
        tags: tags_of(sg.tags()),
    })
}

fn instance(instance: &aws_sdk_ec2::types::Instance) -> Option<InstanceDescription> {
    let volumes = instance
        .block_device_mappings()
        .iter()
        .filter_map(|m| {
            Some(VolumeAttachment {
                volume_id: m.ebs()?.volume_id()?.to_string(),
                device: m.device_name()?.to_string(),
            })
        })
        .collect();

    Some(InstanceDescription {
        instance_id: instance.instance_id()?.to_string(),
        state: InstanceState::parse(
            instance
                .state()
                .and_then(|s| s.name())
                .map(|n| n.as_str())
                .unwrap_or_default(),
        ),
        instance_type: instance.instance_type().map(|t| t.as_str().to_string()),
        image_id: instance.image_id().map(String::from),
        subnet_id: instance.subnet_id().map(String::from),
        private_ip: instance.private_ip_address().map(String::from),
        public_ip: instance.public_ip_address().map(String::from),
        key_name: instance.key_name().map(String::from),
        security_group_ids: owned(instance.security_groups(), |g| g.group_id()),
        root_device_name: instance.root_device_name().map(String::from),
        volumes,
        tags: tags_of(instance.tags()),
    })
}

#[async_trait]
impl NetworkApi for Ec2Api {
    async fn create_vpc(&self, cidr_block: &str) -> ProviderResult<String> {
        let result = self
            .client
            .create_vpc()
            .cidr_block(cidr_block)
            .send()
            .await
            .map_err(|e| failed("create VPC", e))?;

        result
            .vpc()
            .and_then(|v| v.vpc_id().map(String::from))
            .ok_or_else(|| missing("CreateVpc"))
    }

    async fn delete_vpc(&self, vpc_id: &str) -> ProviderResult<()> {
        self.client
            .delete_vpc()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| failed("delete VPC", e).for_resource(vpc_id))?;
        Ok(())
    }

    async fn describe_vpcs(&self, filters: &[Filter]) -> ProviderResult<Vec<VpcDescription>> {
        let result = self
            .client
            .describe_vpcs()
            .set_filters(sdk_filters(filters))
            .send()
            .await
            .map_err(|e| failed("describe VPCs", e))?;

        Ok(result
            .vpcs()
            .iter()
            .filter_map(|vpc| {
                Some(VpcDescription {
                    vpc_id: vpc.vpc_id()?.to_string(),
                    cidr_block: vpc.cidr_block().map(String::from),
                    tags: tags_of(vpc.tags()),
                })
            })
            .collect())
    }

    async fn create_subnet(
        &self,
        vpc_id: &str,
        cidr_block: &str,
        availability_zone: Option<&str>,
    ) -> ProviderResult<String> {
        let result = self
            .client
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr_block)
            .set_availability_zone(availability_zone.map(String::from))
            .send()
            .await
            .map_err(|e| failed("create subnet", e).for_resource(vpc_id))?;

        result
            .subnet()
            .and_then(|s| s.subnet_id().map(String::from))
            .ok_or_else(|| missing("CreateSubnet"))
    }

    async fn enable_public_ip_on_launch(&self, subnet_id: &str) -> ProviderResult<()> {
        use aws_sdk_ec2::types::AttributeBooleanValue;

        self.client
            .modify_subnet_attribute()
            .subnet_id(subnet_id)
            .map_public_ip_on_launch(AttributeBooleanValue::builder().value(true).build())
            .send()
            .await
            .map_err(|e| failed("modify subnet attribute", e).for_resource(subnet_id))?;
        Ok(())
    }

    async fn delete_subnet(&self, subnet_id: &str) -> ProviderResult<()> {
        self.client
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| failed("delete subnet", e).for_resource(subnet_id))?;
        Ok(())
    }

    async fn describe_subnets(&self, filters: &[Filter]) -> ProviderResult<Vec<SubnetDescription>> {
        let result = self
            .client
            .describe_subnets()
            .set_filters(sdk_filters(filters))
            .send()
            .await
            .map_err(|e| failed("describe subnets", e))?;

        Ok(result
            .subnets()
            .iter()
            .filter_map(|subnet| {
                Some(SubnetDescription {
                    subnet_id: subnet.subnet_id()?.to_string(),
                    vpc_id: subnet.vpc_id().map(String::from),
                    cidr_block: subnet.cidr_block().map(String::from),
                    availability_zone: subnet.availability_zone().map(String::from),
                    map_public_ip_on_launch: subnet.map_public_ip_on_launch().unwrap_or(false),
                    tags: tags_of(subnet.tags()),
                })
            })
            .collect())
    }

    async fn count_network_interfaces(&self, subnet_id: &str) -> ProviderResult<usize> {
        let result = self
            .client
            .describe_network_interfaces()
            .set_filters(sdk_filters(&[Filter::new("subnet-id", subnet_id)]))
            .send()
            .await
            .map_err(|e| failed("describe network interfaces", e).for_resource(subnet_id))?;

        Ok(result.network_interfaces().len())
    }

    async fn find_internet_gateway(&self, vpc_id: &str) -> ProviderResult<Option<String>> {
        let result = self
            .client
            .describe_internet_gateways()
            .set_filters(sdk_filters(&[Filter::new("attachment.vpc-id", vpc_id)]))
            .send()
            .await
            .map_err(|e| failed("describe internet gateways", e).for_resource(vpc_id))?;

        Ok(result
            .internet_gateways()
            .first()
            .and_then(|gw| gw.internet_gateway_id().map(String::from)))
    }

    async fn create_internet_gateway(&self) -> ProviderResult<String> {
        let result = self
            .client
            .create_internet_gateway()
            .send()
            .await
            .map_err(|e| failed("create internet gateway", e))?;

        result
            .internet_gateway()
            .and_then(|gw| gw.internet_gateway_id().map(String::from))
            .ok_or_else(|| missing("CreateInternetGateway"))
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ProviderResult<()> {
        self.client
            .attach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| failed("attach internet gateway", e).for_resource(gateway_id))?;
        Ok(())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ProviderResult<()> {
        self.client
            .detach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| failed("detach internet gateway", e).for_resource(gateway_id))?;
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> ProviderResult<()> {
        self.client
            .delete_internet_gateway()
            .internet_gateway_id(gateway_id)
            .send()
            .await
            .map_err(|e| failed("delete internet gateway", e).for_resource(gateway_id))?;
        Ok(())
    }

    async fn describe_route_tables(&self, filters: &[Filter]) -> ProviderResult<Vec<RouteTable>> {
        let result = self
            .client
            .describe_route_tables()
            .set_filters(sdk_filters(filters))
            .send()
            .await
            .map_err(|e| failed("describe route tables", e))?;

        Ok(result
            .route_tables()
            .iter()
            .filter_map(|table| {
                Some(RouteTable {
                    route_table_id: table.route_table_id()?.to_string(),
                    routes: table
                        .routes()
                        .iter()
                        .map(|r| Route {
                            destination_cidr_block: r.destination_cidr_block().map(String::from),
                            gateway_id: r.gateway_id().map(String::from),
                            nat_gateway_id: r.nat_gateway_id().map(String::from),
                        })
                        .collect(),
                    associations: table
                        .associations()
                        .iter()
                        .filter_map(|a| {
                            Some(RouteTableAssociation {
                                association_id: a.route_table_association_id()?.to_string(),
                                subnet_id: a.subnet_id().map(String::from),
                                main: a.main().unwrap_or(false),
                            })
                        })
                        .collect(),
                    tags: tags_of(table.tags()),
                })
            })
            .collect())
    }

    async fn create_route_table(&self, vpc_id: &str) -> ProviderResult<String> {
        let result = self
            .client
            .create_route_table()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| failed("create route table", e).for_resource(vpc_id))?;

        result
            .route_table()
            .and_then(|t| t.route_table_id().map(String::from))
            .ok_or_else(|| missing("CreateRouteTable"))
    }

    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> ProviderResult<String> {
        let result = self
            .client
            .associate_route_table()
            .route_table_id(route_table_id)
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| failed("associate route table", e).for_resource(route_table_id))?;

        result
            .association_id()
            .map(String::from)
            .ok_or_else(|| missing("AssociateRouteTable"))
    }

    async fn disassociate_route_table(&self, association_id: &str) -> ProviderResult<()> {
        self.client
            .disassociate_route_table()
            .association_id(association_id)
            .send()
            .await
            .map_err(|e| failed("disassociate route table", e).for_resource(association_id))?;
        Ok(())
    }

    async fn delete_route_table(&self, route_table_id: &str) -> ProviderResult<()> {
        self.client
            .delete_route_table()
            .route_table_id(route_table_id)
            .send()
            .await
            .map_err(|e| failed("delete route table", e).for_resource(route_table_id))?;
        Ok(())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr_block: &str,
        target: &RouteTarget,
    ) -> ProviderResult<()> {
        let request = self
            .client
            .create_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr_block);
        let request = match target {
            RouteTarget::InternetGateway(id) => request.gateway_id(id),
            RouteTarget::NatGateway(id) => request.nat_gateway_id(id),
        };

        request
            .send()
            .await
            .map_err(|e| failed("create route", e).for_resource(route_table_id))?;
        Ok(())
    }

    async fn allocate_address(&self) -> ProviderResult<AddressAllocation> {
        allocate_vpc_address(&self.client).await
    }

    async fn release_address(&self, allocation_id: &str) -> ProviderResult<()> {
        release_vpc_address(&self.client, allocation_id).await
    }

    async fn create_nat_gateway(&self, subnet_id: &str, allocation_id: &str)
    -> ProviderResult<String> {
        let result = self
            .client
            .create_nat_gateway()
            .subnet_id(subnet_id)
            .allocation_id(allocation_id)
            .send()
            .await
            .map_err(|e| failed("create NAT gateway", e).for_resource(subnet_id))?;

        result
            .nat_gateway()
            .and_then(|gw| gw.nat_gateway_id().map(String::from))
            .ok_or_else(|| missing("CreateNatGateway"))
    }

    async fn describe_nat_gateway(
        &self,
        nat_gateway_id: &str,
    ) -> ProviderResult<Option<NatGatewayDescription>> {
        let result = match self
            .client
            .describe_nat_gateways()
            .nat_gateway_ids(nat_gateway_id)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e) if e.as_service_error().is_some_and(is_not_found) => return Ok(None),
            Err(e) => return Err(failed("describe NAT gateway", e).for_resource(nat_gateway_id)),
        };

        Ok(result.nat_gateways().first().and_then(nat_gateway))
    }

    async fn describe_nat_gateways(&self) -> ProviderResult<Vec<NatGatewayDescription>> {
        let result = self
            .client
            .describe_nat_gateways()
            .send()
            .await
            .map_err(|e| failed("describe NAT gateways", e))?;

        Ok(result.nat_gateways().iter().filter_map(nat_gateway).collect())
    }

    async fn delete_nat_gateway(&self, nat_gateway_id: &str) -> ProviderResult<()> {
        self.client
            .delete_nat_gateway()
            .nat_gateway_id(nat_gateway_id)
            .send()
            .await
            .map_err(|e| failed("delete NAT gateway", e).for_resource(nat_gateway_id))?;
        Ok(())
    }

    async fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        description: &str,
    ) -> ProviderResult<String> {
        let result = self
            .client
            .create_security_group()
            .vpc_id(vpc_id)
            .group_name(name)
            .description(description)
            .send()
            .await
            .map_err(|e| failed("create security group", e).for_resource(name))?;

        result
            .group_id()
            .map(String::from)
            .ok_or_else(|| missing("CreateSecurityGroup"))
    }

    async fn describe_security_group(
        &self,
        group_id: &str,
    ) -> ProviderResult<Option<SecurityGroupDescription>> {
        let result = match self
            .client
            .describe_security_groups()
            .group_ids(group_id)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e) if e.as_service_error().is_some_and(is_not_found) => return Ok(None),
            Err(e) => return Err(failed("describe security group", e).for_resource(group_id)),
        };

        Ok(result.security_groups().first().and_then(security_group))
    }

    async fn describe_security_groups(
        &self,
        filters: &[Filter],
    ) -> ProviderResult<Vec<SecurityGroupDescription>> {
        let result = self
            .client
            .describe_security_groups()
            .set_filters(sdk_filters(filters))
            .send()
            .await
            .map_err(|e| failed("describe security groups", e))?;

        Ok(result
            .security_groups()
            .iter()
            .filter_map(security_group)
            .collect())
    }

    async fn authorize_rules(&self, group_id: &str, rules: &[FirewallRule]) -> ProviderResult<()> {
        for rule in rules {
            let permission = ip_permission(rule);
            match rule.direction {
                Direction::Ingress => {
                    self.client
                        .authorize_security_group_ingress()
                        .group_id(group_id)
                        .ip_permissions(permission)
                        .send()
                        .await
                        .map_err(|e| failed("authorize ingress", e).for_resource(group_id))?;
                }
                Direction::Egress => {
                    self.client
                        .authorize_security_group_egress()
                        .group_id(group_id)
                        .ip_permissions(permission)
                        .send()
                        .await
                        .map_err(|e| failed("authorize egress", e).for_resource(group_id))?;
                }
            }
        }
        Ok(())
    }

    async fn revoke_rules(&self, group_id: &str, rules: &[FirewallRule]) -> ProviderResult<()> {
        for rule in rules {
            let permission = ip_permission(rule);
            match rule.direction {
                Direction::Ingress => {
                    self.client
                        .revoke_security_group_ingress()
                        .group_id(group_id)
                        .ip_permissions(permission)
                        .send()
                        .await
                        .map_err(|e| failed("revoke ingress", e).for_resource(group_id))?;
                }
                Direction::Egress => {
                    self.client
                        .revoke_security_group_egress()
                        .group_id(group_id)
                        .ip_permissions(permission)
                        .send()
                        .await
                        .map_err(|e| failed("revoke egress", e).for_resource(group_id))?;
                }
            }
        }
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> ProviderResult<()> {
        self.client
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
            .map_err(|e| failed("delete security group", e).for_resource(group_id))?;
        Ok(())
    }

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> ProviderResult<()> {
        tag_resource(&self.client, resource_id, tags).await
    }
}

async fn allocate_vpc_address(client: &Ec2Client) -> ProviderResult<AddressAllocation> {
    use aws_sdk_ec2::types::DomainType;

    let result = client
        .allocate_address()
        .domain(DomainType::Vpc)
        .send()
        .await
        .map_err(|e| failed("allocate address", e))?;

    match (result.allocation_id(), result.public_ip()) {
        (Some(allocation_id), Some(public_ip)) => Ok(AddressAllocation {
            allocation_id: allocation_id.to_string(),
            public_ip: public_ip.to_string(),
        }),
        _ => Err(missing("AllocateAddress")),
    }
}

async fn release_vpc_address(client: &Ec2Client, allocation_id: &str) -> ProviderResult<()> {
    client
        .release_address()
        .allocation_id(allocation_id)
        .send()
        .await
        .map_err(|e| failed("release address", e).for_resource(allocation_id))?;
    Ok(())
}

async fn tag_resource(client: &Ec2Client, resource_id: &str, tags: &Tags) -> ProviderResult<()> {
    if tags.is_empty() {
        return Ok(());
    }
    client
        .create_tags()
        .resources(resource_id)
        .set_tags(Some(sdk_tags(tags)))
        .send()
        .await
        .map_err(|e| failed("create tags", e).for_resource(resource_id))?;
    Ok(())
}

#[async_trait]
impl ComputeApi for Ec2Api {
    async fn run_instance(&self, request: &InstanceRequest) -> ProviderResult<String> {
        use aws_sdk_ec2::types::InstanceType;

        let result = self
            .client
            .run_instances()
            .image_id(&request.image_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .subnet_id(&request.subnet_id)
            .min_count(1)
            .max_count(1)
            .set_private_ip_address(request.private_ip.clone())
            .set_key_name(request.key_name.clone())
            .set_user_data(request.user_data.clone())
            .set_security_group_ids(
                (!request.security_group_ids.is_empty())
                    .then(|| request.security_group_ids.clone()),
            )
            .send()
            .await
            .map_err(|e| failed("run instance", e).for_resource(&request.subnet_id))?;

        result
            .instances()
            .first()
            .and_then(|i| i.instance_id().map(String::from))
            .ok_or_else(|| missing("RunInstances"))
    }

    async fn describe_instance(&self, instance_id: &str)
    -> ProviderResult<Option<InstanceDescription>> {
        let result = match self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e) if e.as_service_error().is_some_and(is_not_found) => return Ok(None),
            Err(e) => return Err(failed("describe instance", e).for_resource(instance_id)),
        };

        Ok(result
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .find_map(instance))
    }

    async fn describe_instances(&self, filters: &[Filter])
    -> ProviderResult<Vec<InstanceDescription>> {
        let result = self
            .client
            .describe_instances()
            .set_filters(sdk_filters(filters))
            .send()
            .await
            .map_err(|e| failed("describe instances", e))?;

        Ok(result
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(instance)
            .collect())
    }

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<()> {
        self.client
            .start_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| failed("start instance", e).for_resource(instance_id))?;
        Ok(())
    }

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<()> {
        self.client
            .stop_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| failed("stop instance", e).for_resource(instance_id))?;
        Ok(())
    }

    async fn terminate_instance(&self, instance_id: &str) -> ProviderResult<()> {
        self.client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| failed("terminate instance", e).for_resource(instance_id))?;
        Ok(())
    }

    async fn modify_instance_type(&self, instance_id: &str, instance_type: &str)
    -> ProviderResult<()> {
        use aws_sdk_ec2::types::AttributeValue;

        self.client
            .modify_instance_attribute()
            .instance_id(instance_id)
            .instance_type(AttributeValue::builder().value(instance_type).build())
            .send()
            .await
            .map_err(|e| failed("modify instance type", e).for_resource(instance_id))?;
        Ok(())
    }

    async fn modify_instance_groups(&self, instance_id: &str, group_ids: &[String])
    -> ProviderResult<()> {
        self.client
            .modify_instance_attribute()
            .instance_id(instance_id)
            .set_groups(Some(group_ids.to_vec()))
            .send()
            .await
            .map_err(|e| failed("modify instance security groups", e).for_resource(instance_id))?;
        Ok(())
    }

    async fn attach_volume(&self, instance_id: &str, volume: &VolumeAttachment)
    -> ProviderResult<()> {
        self.client
            .attach_volume()
            .instance_id(instance_id)
            .volume_id(&volume.volume_id)
            .device(&volume.device)
            .send()
            .await
            .map_err(|e| failed("attach volume", e).for_resource(&volume.volume_id))?;
        Ok(())
    }

    async fn detach_volume(&self, instance_id: &str, volume: &VolumeAttachment)
    -> ProviderResult<()> {
        self.client
            .detach_volume()
            .instance_id(instance_id)
            .volume_id(&volume.volume_id)
            .device(&volume.device)
            .send()
            .await
            .map_err(|e| failed("detach volume", e).for_resource(&volume.volume_id))?;
        Ok(())
    }

    async fn allocate_address(&self) -> ProviderResult<AddressAllocation> {
        allocate_vpc_address(&self.client).await
    }

    async fn associate_address(&self, instance_id: &str, allocation_id: &str)
    -> ProviderResult<()> {
        self.client
            .associate_address()
            .instance_id(instance_id)
            .allocation_id(allocation_id)
            .send()
            .await
            .map_err(|e| failed("associate address", e).for_resource(instance_id))?;
        Ok(())
    }

    async fn release_address(&self, allocation_id: &str) -> ProviderResult<()> {
        release_vpc_address(&self.client, allocation_id).await
    }

    async fn create_volume(&self, request: &VolumeRequest) -> ProviderResult<String> {
        use aws_sdk_ec2::types::VolumeType;

        let result = self
            .client
            .create_volume()
            .availability_zone(&request.availability_zone)
            .volume_type(VolumeType::from(request.volume_type.as_str()))
            .set_size(request.size)
            .set_iops(request.iops)
            .set_encrypted(request.encrypted)
            .set_kms_key_id(request.kms_key_id.clone())
            .send()
            .await
            .map_err(|e| failed("create volume", e).for_resource(&request.availability_zone))?;

        result
            .volume_id()
            .map(String::from)
            .ok_or_else(|| missing("CreateVolume"))
    }

    async fn delete_volume(&self, volume_id: &str) -> ProviderResult<()> {
        self.client
            .delete_volume()
            .volume_id(volume_id)
            .send()
            .await
            .map_err(|e| failed("delete volume", e).for_resource(volume_id))?;
        Ok(())
    }

    async fn describe_volumes(&self, filters: &[Filter]) -> ProviderResult<Vec<VolumeDescription>> {
        let result = self
            .client
            .describe_volumes()
            .set_filters(sdk_filters(filters))
            .send()
            .await
            .map_err(|e| failed("describe volumes", e))?;

        Ok(result
            .volumes()
            .iter()
            .filter_map(|v| {
                Some(VolumeDescription {
                    volume_id: v.volume_id()?.to_string(),
                    availability_zone: v.availability_zone().map(String::from),
                    volume_type: v.volume_type().map(|t| t.as_str().to_string()),
                    size: v.size(),
                    iops: v.iops(),
                    encrypted: v.encrypted(),
                    kms_key_id: v.kms_key_id().map(String::from),
                    tags: tags_of(v.tags()),
                })
            })
            .collect())
    }

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> ProviderResult<()> {
        tag_resource(&self.client, resource_id, tags).await
    }
}
