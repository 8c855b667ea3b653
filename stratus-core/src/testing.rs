//! In-memory provider used by the tests
//!
//! `StubCloud` implements every family trait over one shared state, records
//! each call by method name, and rejects the calls the real provider would
//! reject (duplicate rules, deleting a zone that still has records, modifying
//! a running instance). Asynchronous objects move one step towards their
//! final state every time they are described, so polling is exercised too.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::adapter::{Adapter, Context};
use crate::credentials::{Credentials, Session};
use crate::differ::NaturalKey;
use crate::dispatch::{Dispatcher, DispatcherConfig};
use crate::event::Event;
use crate::provider::compute::{
    InstanceDescription, InstanceRequest, InstanceState, VolumeDescription, VolumeRequest,
};
use crate::provider::database::{
    DbClusterDescription, DbClusterSpec, DbInstanceDescription, DbInstanceSpec,
};
use crate::provider::dns::{ChangeAction, HostedZone, RecordChange, ZoneVpc};
use crate::provider::identity::{InstanceProfileDescription, PolicyDescription, RoleDescription};
use crate::provider::load_balancing::{LoadBalancerDescription, LoadBalancerRequest};
use crate::provider::network::{
    NatGatewayDescription, NatGatewayState, Route, RouteTable, RouteTableAssociation, RouteTarget,
    SecurityGroupDescription, SubnetDescription, VpcDescription,
};
use crate::provider::storage::{BucketAcl, BucketOwner};
use crate::provider::{
    AddressAllocation, ComputeApi, Connector, DatabaseApi, DnsApi, Filter, IdentityApi,
    LoadBalancingApi, NetworkApi, ProviderError, ProviderResult, StorageApi,
};
use crate::resource::{
    DnsRecord, FirewallRule, Grant, Listener, Tags, VolumeAttachment, normalize_dns_name,
};
use crate::wait::{CancelToken, PollConfig};

pub const REGION: &str = "eu-west-1";

pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Header fields every valid event carries
pub fn header() -> Value {
    json!({
        "datacenter_region": REGION,
        "aws_access_key_id": "AKIAEXAMPLE",
        "aws_secret_access_key": "secret"
    })
}

/// `body` merged over [`header`]
pub fn with_header(body: Value) -> Value {
    let mut merged = header();
    if let (Value::Object(target), Value::Object(fields)) = (&mut merged, body) {
        target.extend(fields);
    }
    merged
}

/// Decode `body` merged over [`header`]
pub fn event<R: DeserializeOwned>(body: Value) -> Event<R> {
    serde_json::from_value(with_header(body)).unwrap()
}

/// Run one event through a dispatcher backed by `cloud` and return the outbound body
pub async fn dispatch(cloud: &StubCloud, subject: &str, body: Value) -> Value {
    let dispatcher = Dispatcher::new(Arc::new(cloud.clone()), &fast_config()).unwrap();
    let inbound = serde_json::to_vec(&with_header(body)).unwrap();
    dispatcher.dispatch(subject, &inbound).await.json().unwrap()
}

/// Assert the event is refused naming `field`, before any provider call
pub async fn assert_rejected(subject: &str, body: Value, field: &str) {
    let cloud = StubCloud::default();
    let out = dispatch(&cloud, subject, body).await;
    let kind = subject.split('.').next().unwrap();
    assert_eq!(out["_state"], "errored", "{}", subject);
    assert_eq!(out["error"], format!("{} {} invalid", kind, field), "{}", subject);
    assert!(cloud.calls().is_empty(), "{} made calls: {:?}", subject, cloud.calls());
}

pub fn fast_poll() -> PollConfig {
    PollConfig::default()
        .with_interval(Duration::from_millis(1))
        .with_deadline(Duration::from_secs(5))
}

pub fn fast_config() -> DispatcherConfig {
    DispatcherConfig {
        crypto_key: None,
        poll: fast_poll(),
    }
}

pub fn session() -> Session {
    Session {
        region: REGION.to_string(),
        credentials: Credentials {
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
        },
    }
}

/// Connect an adapter straight to the stub
pub async fn connect<A: Adapter>(cloud: &StubCloud) -> A {
    let context = Context::new(fast_poll(), CancelToken::never());
    A::connect(cloud, &session(), context).await.unwrap()
}

#[derive(Debug, Clone, Default)]
pub struct StubBucket {
    pub name: String,
    pub acl: Option<String>,
    pub grants: Vec<Grant>,
    pub location: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default)]
pub struct StubZone {
    pub zone: HostedZone,
    pub records: Vec<DnsRecord>,
    pub tags: Tags,
    pub vpc: Option<ZoneVpc>,
}

#[derive(Debug, Clone, Default)]
pub struct StubRole {
    pub role: RoleDescription,
    pub attached: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StubPolicy {
    pub policy: PolicyDescription,
    pub document: String,
}

#[derive(Debug, Default)]
pub struct StubState {
    pub calls: Vec<String>,
    pub failing: HashSet<String>,
    pub session: Option<Session>,
    next_id: u32,

    pub vpcs: Vec<VpcDescription>,
    pub subnets: Vec<SubnetDescription>,
    /// Network interfaces left per subnet; each count call drains one
    pub interfaces: HashMap<String, usize>,
    /// Gateway id and the VPC it is attached to
    pub gateways: Vec<(String, Option<String>)>,
    /// Owning VPC and table
    pub route_tables: Vec<(String, RouteTable)>,
    pub addresses: Vec<AddressAllocation>,
    pub nat_gateways: Vec<NatGatewayDescription>,
    pub security_groups: Vec<SecurityGroupDescription>,
    /// Tags of every EC2 object, by id
    pub ec2_tags: HashMap<String, Tags>,

    pub instances: Vec<InstanceDescription>,
    pub volumes: Vec<VolumeDescription>,

    pub load_balancers: Vec<LoadBalancerDescription>,
    pub lb_tags: HashMap<String, Tags>,

    pub buckets: Vec<StubBucket>,
    pub zones: Vec<StubZone>,

    pub subnet_groups: HashMap<String, Vec<String>>,
    pub db_instances: Vec<DbInstanceDescription>,
    pub db_clusters: Vec<DbClusterDescription>,
    pub db_tags: HashMap<String, Tags>,
    pub last_db_instance_spec: Option<DbInstanceSpec>,
    pub last_db_cluster_spec: Option<DbClusterSpec>,
    pub final_snapshots: Vec<String>,

    pub roles: Vec<StubRole>,
    pub policies: Vec<StubPolicy>,
    pub instance_profiles: Vec<InstanceProfileDescription>,
}

impl StubState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn tags_of(&self, id: &str) -> Tags {
        self.ec2_tags.get(id).cloned().unwrap_or_default()
    }

    fn merge_tags(&mut self, id: &str, tags: &Tags) {
        self.ec2_tags
            .entry(id.to_string())
            .or_default()
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn allocate(&mut self) -> AddressAllocation {
        let allocation_id = self.id("eipalloc");
        let allocation = AddressAllocation {
            public_ip: format!("203.0.113.{}", self.next_id),
            allocation_id,
        };
        self.addresses.push(allocation.clone());
        allocation
    }

    fn release(&mut self, allocation_id: &str) -> ProviderResult<()> {
        let before = self.addresses.len();
        self.addresses.retain(|a| a.allocation_id != allocation_id);
        if self.addresses.len() == before {
            return Err(not_found("address", allocation_id));
        }
        Ok(())
    }
}

fn not_found(what: &str, id: &str) -> ProviderError {
    ProviderError::new(format!("{} not found", what)).for_resource(id)
}

/// Every filter must match one of its values
fn matches(filters: &[Filter], values_of: impl Fn(&str) -> Vec<String>) -> bool {
    filters.iter().all(|f| {
        let actual = values_of(&f.name);
        f.values.iter().any(|v| actual.contains(v))
    })
}

fn tag_values(tags: &Tags, name: &str) -> Vec<String> {
    name.strip_prefix("tag:")
        .and_then(|key| tags.get(key))
        .cloned()
        .into_iter()
        .collect()
}

fn one(value: &Option<String>) -> Vec<String> {
    value.iter().cloned().collect()
}

#[derive(Debug, Clone, Default)]
pub struct StubCloud {
    state: Arc<Mutex<StubState>>,
}

impl StubCloud {
    /// Record a call and lock the state, failing when the method was marked as failing
    fn enter(&self, method: &str) -> ProviderResult<MutexGuard<'_, StubState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(method.to_string());
        if state.failing.contains(method) {
            return Err(ProviderError::new(format!("{} failed: injected fault", method)));
        }
        Ok(state)
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut StubState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, method: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| *c == method).count())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    pub fn fail(&self, method: &str) {
        self.with(|s| s.failing.insert(method.to_string()));
    }

    pub fn last_session(&self) -> Option<Session> {
        self.with(|s| s.session.clone())
    }

    pub fn seed_vpc(&self, id: &str, cidr: &str, pairs: &[(&str, &str)]) {
        self.with(|s| {
            s.vpcs.push(VpcDescription {
                vpc_id: id.to_string(),
                cidr_block: Some(cidr.to_string()),
                tags: Tags::new(),
            });
            s.ec2_tags.insert(id.to_string(), tags(pairs));
        });
    }

    pub fn seed_subnet(&self, id: &str, vpc_id: &str, cidr: &str) {
        self.with(|s| {
            s.subnets.push(SubnetDescription {
                subnet_id: id.to_string(),
                vpc_id: Some(vpc_id.to_string()),
                cidr_block: Some(cidr.to_string()),
                ..Default::default()
            })
        });
    }

    pub fn seed_security_group(&self, id: &str, vpc_id: &str, rules: Vec<FirewallRule>) {
        self.with(|s| {
            s.security_groups.push(SecurityGroupDescription {
                group_id: id.to_string(),
                group_name: id.to_string(),
                vpc_id: Some(vpc_id.to_string()),
                rules,
                tags: Tags::new(),
            })
        });
    }

    pub fn security_group(&self, id: &str) -> Option<SecurityGroupDescription> {
        self.with(|s| s.security_groups.iter().find(|g| g.group_id == id).cloned())
    }

    pub fn ec2_tags(&self, id: &str) -> Tags {
        self.with(|s| s.tags_of(id))
    }

    pub fn zone(&self, id: &str) -> Option<StubZone> {
        self.with(|s| s.zones.iter().find(|z| z.zone.id == id).cloned())
    }
}

#[async_trait]
impl Connector for StubCloud {
    async fn network(&self, session: &Session) -> ProviderResult<Arc<dyn NetworkApi>> {
        self.with(|s| s.session = Some(session.clone()));
        Ok(Arc::new(self.clone()))
    }

    async fn compute(&self, session: &Session) -> ProviderResult<Arc<dyn ComputeApi>> {
        self.with(|s| s.session = Some(session.clone()));
        Ok(Arc::new(self.clone()))
    }

    async fn load_balancing(&self, session: &Session)
    -> ProviderResult<Arc<dyn LoadBalancingApi>> {
        self.with(|s| s.session = Some(session.clone()));
        Ok(Arc::new(self.clone()))
    }

    async fn storage(&self, session: &Session) -> ProviderResult<Arc<dyn StorageApi>> {
        self.with(|s| s.session = Some(session.clone()));
        Ok(Arc::new(self.clone()))
    }

    async fn dns(&self, session: &Session) -> ProviderResult<Arc<dyn DnsApi>> {
        self.with(|s| s.session = Some(session.clone()));
        Ok(Arc::new(self.clone()))
    }

    async fn database(&self, session: &Session) -> ProviderResult<Arc<dyn DatabaseApi>> {
        self.with(|s| s.session = Some(session.clone()));
        Ok(Arc::new(self.clone()))
    }

    async fn identity(&self, session: &Session) -> ProviderResult<Arc<dyn IdentityApi>> {
        self.with(|s| s.session = Some(session.clone()));
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl NetworkApi for StubCloud {
    async fn create_vpc(&self, cidr_block: &str) -> ProviderResult<String> {
        let mut s = self.enter("create_vpc")?;
        let vpc_id = s.id("vpc");
        s.vpcs.push(VpcDescription {
            vpc_id: vpc_id.clone(),
            cidr_block: Some(cidr_block.to_string()),
            tags: Tags::new(),
        });
        Ok(vpc_id)
    }

    async fn delete_vpc(&self, vpc_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_vpc")?;
        if s.subnets.iter().any(|n| n.vpc_id.as_deref() == Some(vpc_id)) {
            return Err(ProviderError::new("DependencyViolation: vpc has subnets").for_resource(vpc_id));
        }
        s.vpcs.retain(|v| v.vpc_id != vpc_id);
        Ok(())
    }

    async fn describe_vpcs(&self, filters: &[Filter]) -> ProviderResult<Vec<VpcDescription>> {
        let s = self.enter("describe_vpcs")?;
        Ok(s.vpcs
            .iter()
            .map(|v| VpcDescription {
                tags: s.tags_of(&v.vpc_id),
                ..v.clone()
            })
            .filter(|v| {
                matches(filters, |name| match name {
                    "vpc-id" => vec![v.vpc_id.clone()],
                    other => tag_values(&v.tags, other),
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
        let mut s = self.enter("create_subnet")?;
        let subnet_id = s.id("subnet");
        s.subnets.push(SubnetDescription {
            subnet_id: subnet_id.clone(),
            vpc_id: Some(vpc_id.to_string()),
            cidr_block: Some(cidr_block.to_string()),
            availability_zone: availability_zone.map(str::to_string),
            map_public_ip_on_launch: false,
            tags: Tags::new(),
        });
        Ok(subnet_id)
    }

    async fn enable_public_ip_on_launch(&self, subnet_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("enable_public_ip_on_launch")?;
        let subnet = s
            .subnets
            .iter_mut()
            .find(|n| n.subnet_id == subnet_id)
            .ok_or_else(|| not_found("subnet", subnet_id))?;
        subnet.map_public_ip_on_launch = true;
        Ok(())
    }

    async fn delete_subnet(&self, subnet_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_subnet")?;
        if s.interfaces.get(subnet_id).copied().unwrap_or(0) > 0 {
            return Err(ProviderError::new("DependencyViolation: interfaces in use").for_resource(subnet_id));
        }
        s.subnets.retain(|n| n.subnet_id != subnet_id);
        Ok(())
    }

    async fn describe_subnets(&self, filters: &[Filter]) -> ProviderResult<Vec<SubnetDescription>> {
        let s = self.enter("describe_subnets")?;
        Ok(s.subnets
            .iter()
            .map(|n| SubnetDescription {
                tags: s.tags_of(&n.subnet_id),
                ..n.clone()
            })
            .filter(|n| {
                matches(filters, |name| match name {
                    "subnet-id" => vec![n.subnet_id.clone()],
                    "vpc-id" => one(&n.vpc_id),
                    other => tag_values(&n.tags, other),
                })
            })
            .collect())
    }

    async fn count_network_interfaces(&self, subnet_id: &str) -> ProviderResult<usize> {
        let mut s = self.enter("count_network_interfaces")?;
        let left = s.interfaces.entry(subnet_id.to_string()).or_default();
        let count = *left;
        *left = left.saturating_sub(1);
        Ok(count)
    }

    async fn find_internet_gateway(&self, vpc_id: &str) -> ProviderResult<Option<String>> {
        let s = self.enter("find_internet_gateway")?;
        Ok(s.gateways
            .iter()
            .find(|(_, vpc)| vpc.as_deref() == Some(vpc_id))
            .map(|(id, _)| id.clone()))
    }

    async fn create_internet_gateway(&self) -> ProviderResult<String> {
        let mut s = self.enter("create_internet_gateway")?;
        let id = s.id("igw");
        s.gateways.push((id.clone(), None));
        Ok(id)
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("attach_internet_gateway")?;
        let gateway = s
            .gateways
            .iter_mut()
            .find(|(id, _)| id == gateway_id)
            .ok_or_else(|| not_found("internet gateway", gateway_id))?;
        gateway.1 = Some(vpc_id.to_string());
        Ok(())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("detach_internet_gateway")?;
        let gateway = s
            .gateways
            .iter_mut()
            .find(|(id, vpc)| id == gateway_id && vpc.as_deref() == Some(vpc_id))
            .ok_or_else(|| ProviderError::new("Gateway.NotAttached").for_resource(gateway_id))?;
        gateway.1 = None;
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_internet_gateway")?;
        if s.gateways.iter().any(|(id, vpc)| id == gateway_id && vpc.is_some()) {
            return Err(ProviderError::new("DependencyViolation: gateway attached").for_resource(gateway_id));
        }
        s.gateways.retain(|(id, _)| id != gateway_id);
        Ok(())
    }

    async fn describe_route_tables(&self, filters: &[Filter]) -> ProviderResult<Vec<RouteTable>> {
        let s = self.enter("describe_route_tables")?;
        Ok(s.route_tables
            .iter()
            .map(|(vpc, t)| {
                (
                    vpc,
                    RouteTable {
                        tags: s.tags_of(&t.route_table_id),
                        ..t.clone()
                    },
                )
            })
            .filter(|(vpc, t)| {
                matches(filters, |name| match name {
                    "vpc-id" => vec![vpc.to_string()],
                    "route-table-id" => vec![t.route_table_id.clone()],
                    "association.subnet-id" => {
                        t.associations.iter().filter_map(|a| a.subnet_id.clone()).collect()
                    }
                    "route.gateway-id" => t.routes.iter().filter_map(|r| r.gateway_id.clone()).collect(),
                    "route.nat-gateway-id" => {
                        t.routes.iter().filter_map(|r| r.nat_gateway_id.clone()).collect()
                    }
                    other => tag_values(&t.tags, other),
                })
            })
            .map(|(_, t)| t)
            .collect())
    }

    async fn create_route_table(&self, vpc_id: &str) -> ProviderResult<String> {
        let mut s = self.enter("create_route_table")?;
        let id = s.id("rtb");
        s.route_tables.push((
            vpc_id.to_string(),
            RouteTable {
                route_table_id: id.clone(),
                ..Default::default()
            },
        ));
        Ok(id)
    }

    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> ProviderResult<String> {
        let mut s = self.enter("associate_route_table")?;
        let association_id = s.id("rtbassoc");
        let (_, table) = s
            .route_tables
            .iter_mut()
            .find(|(_, t)| t.route_table_id == route_table_id)
            .ok_or_else(|| not_found("route table", route_table_id))?;
        table.associations.push(RouteTableAssociation {
            association_id: association_id.clone(),
            subnet_id: Some(subnet_id.to_string()),
            main: false,
        });
        Ok(association_id)
    }

    async fn disassociate_route_table(&self, association_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("disassociate_route_table")?;
        for (_, table) in s.route_tables.iter_mut() {
            if let Some(pos) = table
                .associations
                .iter()
                .position(|a| a.association_id == association_id)
            {
                table.associations.remove(pos);
                return Ok(());
            }
        }
        Err(not_found("association", association_id))
    }

    async fn delete_route_table(&self, route_table_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_route_table")?;
        let in_use = s
            .route_tables
            .iter()
            .any(|(_, t)| t.route_table_id == route_table_id && !t.associations.is_empty());
        if in_use {
            return Err(ProviderError::new("DependencyViolation: table still associated")
                .for_resource(route_table_id));
        }
        s.route_tables.retain(|(_, t)| t.route_table_id != route_table_id);
        Ok(())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr_block: &str,
        target: &RouteTarget,
    ) -> ProviderResult<()> {
        let mut s = self.enter("create_route")?;
        let (_, table) = s
            .route_tables
            .iter_mut()
            .find(|(_, t)| t.route_table_id == route_table_id)
            .ok_or_else(|| not_found("route table", route_table_id))?;
        if table
            .routes
            .iter()
            .any(|r| r.destination_cidr_block.as_deref() == Some(destination_cidr_block))
        {
            return Err(ProviderError::new("RouteAlreadyExists").for_resource(route_table_id));
        }
        let mut route = Route {
            destination_cidr_block: Some(destination_cidr_block.to_string()),
            ..Default::default()
        };
        match target {
            RouteTarget::InternetGateway(id) => route.gateway_id = Some(id.clone()),
            RouteTarget::NatGateway(id) => route.nat_gateway_id = Some(id.clone()),
        }
        table.routes.push(route);
        Ok(())
    }

    async fn allocate_address(&self) -> ProviderResult<AddressAllocation> {
        let mut s = self.enter("allocate_address")?;
        Ok(s.allocate())
    }

    async fn release_address(&self, allocation_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("release_address")?;
        s.release(allocation_id)
    }

    async fn create_nat_gateway(
        &self,
        subnet_id: &str,
        allocation_id: &str,
    ) -> ProviderResult<String> {
        let mut s = self.enter("create_nat_gateway")?;
        let id = s.id("nat");
        let vpc_id = s
            .subnets
            .iter()
            .find(|n| n.subnet_id == subnet_id)
            .and_then(|n| n.vpc_id.clone());
        let public_ip = s
            .addresses
            .iter()
            .find(|a| a.allocation_id == allocation_id)
            .map(|a| a.public_ip.clone());
        s.nat_gateways.push(NatGatewayDescription {
            nat_gateway_id: id.clone(),
            vpc_id,
            subnet_id: Some(subnet_id.to_string()),
            state: NatGatewayState::Pending,
            allocation_id: Some(allocation_id.to_string()),
            public_ip,
            tags: Tags::new(),
        });
        Ok(id)
    }

    async fn describe_nat_gateway(
        &self,
        nat_gateway_id: &str,
    ) -> ProviderResult<Option<NatGatewayDescription>> {
        let mut s = self.enter("describe_nat_gateway")?;
        let tags = s.tags_of(nat_gateway_id);
        let Some(gateway) = s
            .nat_gateways
            .iter_mut()
            .find(|n| n.nat_gateway_id == nat_gateway_id)
        else {
            return Ok(None);
        };
        let seen = NatGatewayDescription {
            tags,
            ..gateway.clone()
        };
        gateway.state = match gateway.state {
            NatGatewayState::Pending => NatGatewayState::Available,
            NatGatewayState::Deleting => NatGatewayState::Deleted,
            ref other => other.clone(),
        };
        Ok(Some(seen))
    }

    async fn describe_nat_gateways(&self) -> ProviderResult<Vec<NatGatewayDescription>> {
        let s = self.enter("describe_nat_gateways")?;
        Ok(s.nat_gateways
            .iter()
            .map(|n| NatGatewayDescription {
                tags: s.tags_of(&n.nat_gateway_id),
                ..n.clone()
            })
            .collect())
    }

    async fn delete_nat_gateway(&self, nat_gateway_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_nat_gateway")?;
        let gateway = s
            .nat_gateways
            .iter_mut()
            .find(|n| n.nat_gateway_id == nat_gateway_id)
            .ok_or_else(|| not_found("nat gateway", nat_gateway_id))?;
        gateway.state = NatGatewayState::Deleting;
        Ok(())
    }

    async fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        _description: &str,
    ) -> ProviderResult<String> {
        let mut s = self.enter("create_security_group")?;
        let id = s.id("sg");
        s.security_groups.push(SecurityGroupDescription {
            group_id: id.clone(),
            group_name: name.to_string(),
            vpc_id: Some(vpc_id.to_string()),
            rules: vec![FirewallRule::default_egress()],
            tags: Tags::new(),
        });
        Ok(id)
    }

    async fn describe_security_group(
        &self,
        group_id: &str,
    ) -> ProviderResult<Option<SecurityGroupDescription>> {
        let s = self.enter("describe_security_group")?;
        Ok(s.security_groups
            .iter()
            .find(|g| g.group_id == group_id)
            .map(|g| SecurityGroupDescription {
                tags: s.tags_of(&g.group_id),
                ..g.clone()
            }))
    }

    async fn describe_security_groups(
        &self,
        filters: &[Filter],
    ) -> ProviderResult<Vec<SecurityGroupDescription>> {
        let s = self.enter("describe_security_groups")?;
        Ok(s.security_groups
            .iter()
            .map(|g| SecurityGroupDescription {
                tags: s.tags_of(&g.group_id),
                ..g.clone()
            })
            .filter(|g| {
                matches(filters, |name| match name {
                    "group-id" => vec![g.group_id.clone()],
                    "vpc-id" => one(&g.vpc_id),
                    other => tag_values(&g.tags, other),
                })
            })
            .collect())
    }

    async fn authorize_rules(&self, group_id: &str, rules: &[FirewallRule]) -> ProviderResult<()> {
        let mut s = self.enter("authorize_rules")?;
        let group = s
            .security_groups
            .iter_mut()
            .find(|g| g.group_id == group_id)
            .ok_or_else(|| not_found("security group", group_id))?;
        for rule in rules {
            if group.rules.iter().any(|r| r.natural_key() == rule.natural_key()) {
                return Err(ProviderError::new("InvalidPermission.Duplicate").for_resource(group_id));
            }
            group.rules.push(rule.clone());
        }
        Ok(())
    }

    async fn revoke_rules(&self, group_id: &str, rules: &[FirewallRule]) -> ProviderResult<()> {
        let mut s = self.enter("revoke_rules")?;
        let group = s
            .security_groups
            .iter_mut()
            .find(|g| g.group_id == group_id)
            .ok_or_else(|| not_found("security group", group_id))?;
        for rule in rules {
            let Some(pos) = group
                .rules
                .iter()
                .position(|r| r.natural_key() == rule.natural_key())
            else {
                return Err(ProviderError::new("InvalidPermission.NotFound").for_resource(group_id));
            };
            group.rules.remove(pos);
        }
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_security_group")?;
        s.security_groups.retain(|g| g.group_id != group_id);
        Ok(())
    }

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> ProviderResult<()> {
        let mut s = self.enter("create_tags")?;
        s.merge_tags(resource_id, tags);
        Ok(())
    }
}

#[async_trait]
impl ComputeApi for StubCloud {
    async fn run_instance(&self, request: &InstanceRequest) -> ProviderResult<String> {
        let mut s = self.enter("run_instance")?;
        let id = s.id("i");
        let root = s.id("vol");
        let private_ip = request
            .private_ip
            .clone()
            .unwrap_or_else(|| format!("10.0.0.{}", s.next_id));
        s.instances.push(InstanceDescription {
            instance_id: id.clone(),
            state: InstanceState::Pending,
            instance_type: Some(request.instance_type.clone()),
            image_id: Some(request.image_id.clone()),
            subnet_id: Some(request.subnet_id.clone()),
            private_ip: Some(private_ip),
            public_ip: None,
            key_name: request.key_name.clone(),
            security_group_ids: request.security_group_ids.clone(),
            root_device_name: Some("/dev/xvda".to_string()),
            volumes: vec![VolumeAttachment {
                volume_id: root,
                device: "/dev/xvda".to_string(),
            }],
            tags: Tags::new(),
        });
        Ok(id)
    }

    async fn describe_instance(
        &self,
        instance_id: &str,
    ) -> ProviderResult<Option<InstanceDescription>> {
        let mut s = self.enter("describe_instance")?;
        let tags = s.tags_of(instance_id);
        let Some(instance) = s.instances.iter_mut().find(|i| i.instance_id == instance_id) else {
            return Ok(None);
        };
        let seen = InstanceDescription {
            tags,
            ..instance.clone()
        };
        instance.state = match instance.state {
            InstanceState::Pending => InstanceState::Running,
            InstanceState::Stopping => InstanceState::Stopped,
            InstanceState::ShuttingDown => InstanceState::Terminated,
            other => other,
        };
        Ok(Some(seen))
    }

    async fn describe_instances(&self, filters: &[Filter]) -> ProviderResult<Vec<InstanceDescription>> {
        let s = self.enter("describe_instances")?;
        Ok(s.instances
            .iter()
            .map(|i| InstanceDescription {
                tags: s.tags_of(&i.instance_id),
                ..i.clone()
            })
            .filter(|i| {
                matches(filters, |name| match name {
                    "instance-id" => vec![i.instance_id.clone()],
                    "instance-state-name" => vec![
                        match i.state {
                            InstanceState::Running => "running",
                            InstanceState::Stopped => "stopped",
                            InstanceState::Terminated => "terminated",
                            _ => "pending",
                        }
                        .to_string(),
                    ],
                    other => tag_values(&i.tags, other),
                })
            })
            .collect())
    }

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<()> {
        self.transition("start_instance", instance_id, InstanceState::Pending)
    }

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<()> {
        self.transition("stop_instance", instance_id, InstanceState::Stopping)
    }

    async fn terminate_instance(&self, instance_id: &str) -> ProviderResult<()> {
        self.transition("terminate_instance", instance_id, InstanceState::ShuttingDown)
    }

    async fn modify_instance_type(&self, instance_id: &str, instance_type: &str) -> ProviderResult<()> {
        let mut s = self.enter("modify_instance_type")?;
        let instance = s
            .instances
            .iter_mut()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| not_found("instance", instance_id))?;
        if instance.state != InstanceState::Stopped {
            return Err(ProviderError::new("IncorrectInstanceState").for_resource(instance_id));
        }
        instance.instance_type = Some(instance_type.to_string());
        Ok(())
    }

    async fn modify_instance_groups(&self, instance_id: &str, group_ids: &[String]) -> ProviderResult<()> {
        let mut s = self.enter("modify_instance_groups")?;
        let instance = s
            .instances
            .iter_mut()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| not_found("instance", instance_id))?;
        instance.security_group_ids = group_ids.to_vec();
        Ok(())
    }

    async fn attach_volume(&self, instance_id: &str, volume: &VolumeAttachment) -> ProviderResult<()> {
        let mut s = self.enter("attach_volume")?;
        let instance = s
            .instances
            .iter_mut()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| not_found("instance", instance_id))?;
        instance.volumes.push(volume.clone());
        Ok(())
    }

    async fn detach_volume(&self, instance_id: &str, volume: &VolumeAttachment) -> ProviderResult<()> {
        let mut s = self.enter("detach_volume")?;
        let instance = s
            .instances
            .iter_mut()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| not_found("instance", instance_id))?;
        if instance.root_device_name.as_deref() == Some(volume.device.as_str()) {
            return Err(ProviderError::new("OperationNotPermitted: root device").for_resource(instance_id));
        }
        instance.volumes.retain(|v| v.volume_id != volume.volume_id);
        Ok(())
    }

    async fn allocate_address(&self) -> ProviderResult<AddressAllocation> {
        let mut s = self.enter("allocate_address")?;
        Ok(s.allocate())
    }

    async fn associate_address(&self, instance_id: &str, allocation_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("associate_address")?;
        let ip = s
            .addresses
            .iter()
            .find(|a| a.allocation_id == allocation_id)
            .map(|a| a.public_ip.clone())
            .ok_or_else(|| not_found("address", allocation_id))?;
        let instance = s
            .instances
            .iter_mut()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| not_found("instance", instance_id))?;
        instance.public_ip = Some(ip);
        Ok(())
    }

    async fn release_address(&self, allocation_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("release_address")?;
        s.release(allocation_id)
    }

    async fn create_volume(&self, request: &VolumeRequest) -> ProviderResult<String> {
        let mut s = self.enter("create_volume")?;
        let id = s.id("vol");
        s.volumes.push(VolumeDescription {
            volume_id: id.clone(),
            availability_zone: Some(request.availability_zone.clone()),
            volume_type: Some(request.volume_type.clone()),
            size: request.size,
            iops: request.iops,
            encrypted: request.encrypted,
            kms_key_id: request.kms_key_id.clone(),
            tags: Tags::new(),
        });
        Ok(id)
    }

    async fn delete_volume(&self, volume_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_volume")?;
        s.volumes.retain(|v| v.volume_id != volume_id);
        Ok(())
    }

    async fn describe_volumes(&self, filters: &[Filter]) -> ProviderResult<Vec<VolumeDescription>> {
        let s = self.enter("describe_volumes")?;
        Ok(s.volumes
            .iter()
            .map(|v| VolumeDescription {
                tags: s.tags_of(&v.volume_id),
                ..v.clone()
            })
            .filter(|v| {
                matches(filters, |name| match name {
                    "volume-id" => vec![v.volume_id.clone()],
                    other => tag_values(&v.tags, other),
                })
            })
            .collect())
    }

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> ProviderResult<()> {
        let mut s = self.enter("create_tags")?;
        s.merge_tags(resource_id, tags);
        Ok(())
    }
}

impl StubCloud {
    fn transition(&self, method: &str, instance_id: &str, state: InstanceState) -> ProviderResult<()> {
        let mut s = self.enter(method)?;
        let instance = s
            .instances
            .iter_mut()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| not_found("instance", instance_id))?;
        instance.state = state;
        Ok(())
    }

    fn lb<'a>(
        s: &'a mut StubState,
        name: &str,
    ) -> ProviderResult<&'a mut LoadBalancerDescription> {
        s.load_balancers
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| not_found("load balancer", name))
    }
}

#[async_trait]
impl LoadBalancingApi for StubCloud {
    async fn create_load_balancer(&self, request: &LoadBalancerRequest) -> ProviderResult<Option<String>> {
        let mut s = self.enter("create_load_balancer")?;
        if s.load_balancers.iter().any(|l| l.name == request.name) {
            return Err(ProviderError::new("DuplicateLoadBalancerName").for_resource(&request.name));
        }
        let dns_name = format!("{}-1234.{}.elb.amazonaws.com", request.name, REGION);
        s.load_balancers.push(LoadBalancerDescription {
            name: request.name.clone(),
            dns_name: Some(dns_name.clone()),
            vpc_id: None,
            internal: request.internal,
            listeners: request.listeners.clone(),
            instance_ids: Vec::new(),
            subnet_ids: request.subnet_ids.clone(),
            security_group_ids: request.security_group_ids.clone(),
        });
        Ok(Some(dns_name))
    }

    async fn describe_load_balancer(&self, name: &str) -> ProviderResult<Option<LoadBalancerDescription>> {
        let s = self.enter("describe_load_balancer")?;
        Ok(s.load_balancers.iter().find(|l| l.name == name).cloned())
    }

    async fn describe_load_balancers(&self) -> ProviderResult<Vec<LoadBalancerDescription>> {
        let s = self.enter("describe_load_balancers")?;
        Ok(s.load_balancers.clone())
    }

    async fn delete_load_balancer(&self, name: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_load_balancer")?;
        s.load_balancers.retain(|l| l.name != name);
        Ok(())
    }

    async fn register_instances(&self, name: &str, instance_ids: &[String]) -> ProviderResult<()> {
        let mut s = self.enter("register_instances")?;
        let lb = Self::lb(&mut s, name)?;
        for id in instance_ids {
            if !lb.instance_ids.contains(id) {
                lb.instance_ids.push(id.clone());
            }
        }
        Ok(())
    }

    async fn deregister_instances(&self, name: &str, instance_ids: &[String]) -> ProviderResult<()> {
        let mut s = self.enter("deregister_instances")?;
        let lb = Self::lb(&mut s, name)?;
        lb.instance_ids.retain(|id| !instance_ids.contains(id));
        Ok(())
    }

    async fn create_listeners(&self, name: &str, listeners: &[Listener]) -> ProviderResult<()> {
        let mut s = self.enter("create_listeners")?;
        let lb = Self::lb(&mut s, name)?;
        for listener in listeners {
            if lb
                .listeners
                .iter()
                .any(|l| l.load_balancer_port == listener.load_balancer_port)
            {
                return Err(ProviderError::new("DuplicateListener").for_resource(name));
            }
            lb.listeners.push(listener.clone());
        }
        Ok(())
    }

    async fn delete_listeners(&self, name: &str, load_balancer_ports: &[i32]) -> ProviderResult<()> {
        let mut s = self.enter("delete_listeners")?;
        let lb = Self::lb(&mut s, name)?;
        lb.listeners
            .retain(|l| !load_balancer_ports.contains(&l.load_balancer_port));
        Ok(())
    }

    async fn attach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        let mut s = self.enter("attach_subnets")?;
        let lb = Self::lb(&mut s, name)?;
        lb.subnet_ids.extend(subnet_ids.iter().cloned());
        Ok(())
    }

    async fn detach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        let mut s = self.enter("detach_subnets")?;
        let lb = Self::lb(&mut s, name)?;
        lb.subnet_ids.retain(|id| !subnet_ids.contains(id));
        Ok(())
    }

    async fn apply_security_groups(&self, name: &str, group_ids: &[String]) -> ProviderResult<()> {
        let mut s = self.enter("apply_security_groups")?;
        let lb = Self::lb(&mut s, name)?;
        lb.security_group_ids = group_ids.to_vec();
        Ok(())
    }

    async fn add_tags(&self, name: &str, tags: &Tags) -> ProviderResult<()> {
        let mut s = self.enter("add_tags")?;
        s.lb_tags
            .entry(name.to_string())
            .or_default()
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn describe_tags(&self, name: &str) -> ProviderResult<Tags> {
        let s = self.enter("describe_tags")?;
        Ok(s.lb_tags.get(name).cloned().unwrap_or_default())
    }
}

impl StubCloud {
    fn bucket<'a>(s: &'a mut StubState, name: &str) -> ProviderResult<&'a mut StubBucket> {
        s.buckets
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| not_found("bucket", name))
    }
}

#[async_trait]
impl StorageApi for StubCloud {
    async fn create_bucket(
        &self,
        name: &str,
        acl: Option<&str>,
        location: Option<&str>,
    ) -> ProviderResult<Option<String>> {
        let mut s = self.enter("create_bucket")?;
        if s.buckets.iter().any(|b| b.name == name) {
            return Err(ProviderError::new("BucketAlreadyOwnedByYou").for_resource(name));
        }
        s.buckets.push(StubBucket {
            name: name.to_string(),
            acl: acl.map(str::to_string),
            location: location.map(str::to_string),
            ..Default::default()
        });
        Ok(Some(format!("/{}", name)))
    }

    async fn delete_bucket(&self, name: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_bucket")?;
        s.buckets.retain(|b| b.name != name);
        Ok(())
    }

    async fn list_buckets(&self) -> ProviderResult<Vec<String>> {
        let s = self.enter("list_buckets")?;
        Ok(s.buckets.iter().map(|b| b.name.clone()).collect())
    }

    async fn put_bucket_acl(&self, name: &str, acl: &BucketAcl) -> ProviderResult<()> {
        let mut s = self.enter("put_bucket_acl")?;
        let bucket = Self::bucket(&mut s, name)?;
        match acl {
            BucketAcl::Canned(canned) => {
                bucket.acl = Some(canned.clone());
                bucket.grants.clear();
            }
            BucketAcl::Grants { grants, .. } => bucket.grants = grants.clone(),
        }
        Ok(())
    }

    async fn bucket_owner(&self, name: &str) -> ProviderResult<BucketOwner> {
        let mut s = self.enter("bucket_owner")?;
        Self::bucket(&mut s, name)?;
        Ok(BucketOwner {
            id: Some("owner-canonical-id".to_string()),
            display_name: Some("owner".to_string()),
        })
    }

    async fn bucket_grants(&self, name: &str) -> ProviderResult<Vec<Grant>> {
        let mut s = self.enter("bucket_grants")?;
        Ok(Self::bucket(&mut s, name)?.grants.clone())
    }

    async fn bucket_location(&self, name: &str) -> ProviderResult<Option<String>> {
        let mut s = self.enter("bucket_location")?;
        Ok(Self::bucket(&mut s, name)?.location.clone())
    }

    async fn put_bucket_tags(&self, name: &str, tags: &Tags) -> ProviderResult<()> {
        let mut s = self.enter("put_bucket_tags")?;
        Self::bucket(&mut s, name)?.tags = tags.clone();
        Ok(())
    }

    async fn bucket_tags(&self, name: &str) -> ProviderResult<Tags> {
        let mut s = self.enter("bucket_tags")?;
        Ok(Self::bucket(&mut s, name)?.tags.clone())
    }
}

impl StubCloud {
    fn hosted_zone<'a>(s: &'a mut StubState, zone_id: &str) -> ProviderResult<&'a mut StubZone> {
        s.zones
            .iter_mut()
            .find(|z| z.zone.id == zone_id)
            .ok_or_else(|| not_found("hosted zone", zone_id))
    }
}

#[async_trait]
impl DnsApi for StubCloud {
    async fn create_hosted_zone(
        &self,
        name: &str,
        _caller_reference: &str,
        vpc: Option<&ZoneVpc>,
    ) -> ProviderResult<String> {
        let mut s = self.enter("create_hosted_zone")?;
        let id = s.id("Z");
        let apex = format!("{}.", normalize_dns_name(name));
        let records = vec![
            DnsRecord::new(apex.as_str(), "SOA")
                .with_values(vec!["ns-1.awsdns.com. hostmaster. 1 7200 900 1209600 86400".to_string()], Some(900)),
            DnsRecord::new(apex.as_str(), "NS")
                .with_values(vec!["ns-1.awsdns.com.".to_string(), "ns-2.awsdns.net.".to_string()], Some(172800)),
        ];
        s.zones.push(StubZone {
            zone: HostedZone {
                id: id.clone(),
                name: apex,
                private: vpc.is_some(),
            },
            records,
            tags: Tags::new(),
            vpc: vpc.cloned(),
        });
        Ok(id)
    }

    async fn delete_hosted_zone(&self, zone_id: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_hosted_zone")?;
        let zone = Self::hosted_zone(&mut s, zone_id)?;
        if zone
            .records
            .iter()
            .any(|r| !matches!(r.record_type.as_str(), "SOA" | "NS"))
        {
            return Err(ProviderError::new("HostedZoneNotEmpty").for_resource(zone_id));
        }
        s.zones.retain(|z| z.zone.id != zone_id);
        Ok(())
    }

    async fn list_hosted_zones(&self) -> ProviderResult<Vec<HostedZone>> {
        let s = self.enter("list_hosted_zones")?;
        Ok(s.zones.iter().map(|z| z.zone.clone()).collect())
    }

    async fn list_records(&self, zone_id: &str) -> ProviderResult<Vec<DnsRecord>> {
        let mut s = self.enter("list_records")?;
        Ok(Self::hosted_zone(&mut s, zone_id)?.records.clone())
    }

    async fn change_records(&self, zone_id: &str, changes: &[RecordChange]) -> ProviderResult<()> {
        let mut s = self.enter("change_records")?;
        let zone = Self::hosted_zone(&mut s, zone_id)?;
        for change in changes {
            let key = change.record.natural_key();
            let existing = zone.records.iter().position(|r| r.natural_key() == key);
            match (change.action, existing) {
                (ChangeAction::Upsert, Some(pos)) => zone.records[pos] = change.record.clone(),
                (ChangeAction::Upsert, None) => zone.records.push(change.record.clone()),
                (ChangeAction::Delete, Some(pos)) => {
                    zone.records.remove(pos);
                }
                (ChangeAction::Delete, None) => {
                    return Err(ProviderError::new("InvalidChangeBatch: record not found")
                        .for_resource(zone_id));
                }
            }
        }
        Ok(())
    }

    async fn change_tags(&self, zone_id: &str, tags: &Tags) -> ProviderResult<()> {
        let mut s = self.enter("change_tags")?;
        Self::hosted_zone(&mut s, zone_id)?
            .tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn list_tags(&self, zone_id: &str) -> ProviderResult<Tags> {
        let mut s = self.enter("list_tags")?;
        Ok(Self::hosted_zone(&mut s, zone_id)?.tags.clone())
    }
}

/// Status a database object reports on the describe after `status`
fn db_progress(status: &str) -> Option<&'static str> {
    match status {
        "creating" | "modifying" | "backing-up" => Some("available"),
        _ => None,
    }
}

#[async_trait]
impl DatabaseApi for StubCloud {
    async fn create_subnet_group(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        let mut s = self.enter("create_subnet_group")?;
        if s.subnet_groups.contains_key(name) {
            return Err(ProviderError::new("DBSubnetGroupAlreadyExists").for_resource(name));
        }
        s.subnet_groups.insert(name.to_string(), subnet_ids.to_vec());
        Ok(())
    }

    async fn modify_subnet_group(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        let mut s = self.enter("modify_subnet_group")?;
        let group = s
            .subnet_groups
            .get_mut(name)
            .ok_or_else(|| not_found("subnet group", name))?;
        *group = subnet_ids.to_vec();
        Ok(())
    }

    async fn describe_subnet_group(&self, name: &str) -> ProviderResult<Option<Vec<String>>> {
        let s = self.enter("describe_subnet_group")?;
        Ok(s.subnet_groups.get(name).cloned())
    }

    async fn delete_subnet_group(&self, name: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_subnet_group")?;
        s.subnet_groups
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("subnet group", name))
    }

    async fn create_db_instance(&self, spec: &DbInstanceSpec) -> ProviderResult<()> {
        let mut s = self.enter("create_db_instance")?;
        s.db_instances.push(stub_db_instance(spec));
        s.last_db_instance_spec = Some(spec.clone());
        Ok(())
    }

    async fn create_db_instance_read_replica(&self, spec: &DbInstanceSpec) -> ProviderResult<()> {
        let mut s = self.enter("create_db_instance_read_replica")?;
        s.db_instances.push(stub_db_instance(spec));
        s.last_db_instance_spec = Some(spec.clone());
        Ok(())
    }

    async fn modify_db_instance(&self, spec: &DbInstanceSpec) -> ProviderResult<()> {
        let mut s = self.enter("modify_db_instance")?;
        let instance = s
            .db_instances
            .iter_mut()
            .find(|d| d.identifier == spec.identifier)
            .ok_or_else(|| not_found("db instance", &spec.identifier))?;
        if let Some(ref groups) = spec.security_group_ids {
            instance.security_group_ids = groups.clone();
        }
        if spec.instance_class.is_some() {
            instance.instance_class = spec.instance_class.clone();
        }
        instance.status = Some("modifying".to_string());
        s.last_db_instance_spec = Some(spec.clone());
        Ok(())
    }

    async fn delete_db_instance(&self, identifier: &str, final_snapshot: Option<&str>) -> ProviderResult<()> {
        let mut s = self.enter("delete_db_instance")?;
        let instance = s
            .db_instances
            .iter_mut()
            .find(|d| d.identifier == identifier)
            .ok_or_else(|| not_found("db instance", identifier))?;
        instance.status = Some("deleting".to_string());
        if let Some(snapshot) = final_snapshot {
            s.final_snapshots.push(snapshot.to_string());
        }
        Ok(())
    }

    async fn describe_db_instance(&self, identifier: &str) -> ProviderResult<Option<DbInstanceDescription>> {
        let mut s = self.enter("describe_db_instance")?;
        let Some(pos) = s.db_instances.iter().position(|d| d.identifier == identifier) else {
            return Ok(None);
        };
        let seen = s.db_instances[pos].clone();
        match seen.status.as_deref() {
            Some("deleting") => {
                s.db_instances.remove(pos);
            }
            Some(status) => {
                if let Some(next) = db_progress(status) {
                    s.db_instances[pos].status = Some(next.to_string());
                }
            }
            None => {}
        }
        Ok(Some(seen))
    }

    async fn describe_db_instances(&self) -> ProviderResult<Vec<DbInstanceDescription>> {
        let s = self.enter("describe_db_instances")?;
        Ok(s.db_instances.clone())
    }

    async fn create_db_cluster(&self, spec: &DbClusterSpec) -> ProviderResult<DbClusterDescription> {
        let mut s = self.enter("create_db_cluster")?;
        let cluster = DbClusterDescription {
            identifier: spec.identifier.clone(),
            arn: Some(format!("arn:aws:rds:{}:123456789012:cluster:{}", REGION, spec.identifier)),
            status: Some("creating".to_string()),
            endpoint: Some(format!("{}.cluster.{}.rds.amazonaws.com", spec.identifier, REGION)),
            port: spec.port,
            engine: spec.engine.clone(),
            engine_version: spec.engine_version.clone(),
            availability_zones: spec.availability_zones.clone(),
            security_group_ids: spec.security_group_ids.clone().unwrap_or_default(),
            subnet_group_name: spec.subnet_group_name.clone(),
            database_name: spec.database_name.clone(),
            master_username: spec.master_username.clone(),
            backup_retention_period: spec.backup_retention_period,
            preferred_backup_window: spec.preferred_backup_window.clone(),
            preferred_maintenance_window: spec.preferred_maintenance_window.clone(),
            replication_source: spec.replication_source.clone(),
        };
        s.db_clusters.push(cluster.clone());
        s.last_db_cluster_spec = Some(spec.clone());
        Ok(cluster)
    }

    async fn modify_db_cluster(&self, spec: &DbClusterSpec) -> ProviderResult<()> {
        let mut s = self.enter("modify_db_cluster")?;
        let cluster = s
            .db_clusters
            .iter_mut()
            .find(|c| c.identifier == spec.identifier)
            .ok_or_else(|| not_found("db cluster", &spec.identifier))?;
        if let Some(ref groups) = spec.security_group_ids {
            cluster.security_group_ids = groups.clone();
        }
        cluster.status = Some("modifying".to_string());
        s.last_db_cluster_spec = Some(spec.clone());
        Ok(())
    }

    async fn delete_db_cluster(&self, identifier: &str, final_snapshot: Option<&str>) -> ProviderResult<()> {
        let mut s = self.enter("delete_db_cluster")?;
        let cluster = s
            .db_clusters
            .iter_mut()
            .find(|c| c.identifier == identifier)
            .ok_or_else(|| not_found("db cluster", identifier))?;
        cluster.status = Some("deleting".to_string());
        if let Some(snapshot) = final_snapshot {
            s.final_snapshots.push(snapshot.to_string());
        }
        Ok(())
    }

    async fn describe_db_cluster(&self, identifier: &str) -> ProviderResult<Option<DbClusterDescription>> {
        let mut s = self.enter("describe_db_cluster")?;
        let Some(pos) = s.db_clusters.iter().position(|c| c.identifier == identifier) else {
            return Ok(None);
        };
        let seen = s.db_clusters[pos].clone();
        match seen.status.as_deref() {
            Some("deleting") => {
                s.db_clusters.remove(pos);
            }
            Some(status) => {
                if let Some(next) = db_progress(status) {
                    s.db_clusters[pos].status = Some(next.to_string());
                }
            }
            None => {}
        }
        Ok(Some(seen))
    }

    async fn describe_db_clusters(&self) -> ProviderResult<Vec<DbClusterDescription>> {
        let s = self.enter("describe_db_clusters")?;
        Ok(s.db_clusters.clone())
    }

    async fn add_tags(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        let mut s = self.enter("add_tags")?;
        s.db_tags
            .entry(arn.to_string())
            .or_default()
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn list_tags(&self, arn: &str) -> ProviderResult<Tags> {
        let s = self.enter("list_tags")?;
        Ok(s.db_tags.get(arn).cloned().unwrap_or_default())
    }
}

fn stub_db_instance(spec: &DbInstanceSpec) -> DbInstanceDescription {
    DbInstanceDescription {
        identifier: spec.identifier.clone(),
        arn: Some(format!("arn:aws:rds:{}:123456789012:db:{}", REGION, spec.identifier)),
        status: Some("creating".to_string()),
        endpoint: Some(format!("{}.abc.{}.rds.amazonaws.com", spec.identifier, REGION)),
        port: spec.port,
        instance_class: spec.instance_class.clone(),
        engine: spec.engine.clone(),
        engine_version: spec.engine_version.clone(),
        cluster_identifier: spec.cluster_identifier.clone(),
        allocated_storage: spec.allocated_storage,
        storage_type: spec.storage_type.clone(),
        iops: spec.iops,
        multi_az: spec.multi_az,
        promotion_tier: spec.promotion_tier,
        availability_zone: spec.availability_zone.clone(),
        auto_minor_version_upgrade: spec.auto_minor_version_upgrade,
        backup_retention_period: spec.backup_retention_period,
        preferred_backup_window: spec.preferred_backup_window.clone(),
        preferred_maintenance_window: spec.preferred_maintenance_window.clone(),
        security_group_ids: spec.security_group_ids.clone().unwrap_or_default(),
        subnet_group_name: spec.subnet_group_name.clone(),
        database_name: spec.database_name.clone(),
        master_username: spec.master_username.clone(),
        license_model: spec.license_model.clone(),
        publicly_accessible: spec.publicly_accessible,
        timezone: spec.timezone.clone(),
        replication_source: spec.replication_source.clone(),
    }
}

impl StubCloud {
    fn role<'a>(s: &'a mut StubState, name: &str) -> ProviderResult<&'a mut StubRole> {
        s.roles
            .iter_mut()
            .find(|r| r.role.name == name)
            .ok_or_else(|| ProviderError::new("NoSuchEntity").for_resource(name))
    }

    fn profile<'a>(
        s: &'a mut StubState,
        name: &str,
    ) -> ProviderResult<&'a mut InstanceProfileDescription> {
        s.instance_profiles
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ProviderError::new("NoSuchEntity").for_resource(name))
    }
}

#[async_trait]
impl IdentityApi for StubCloud {
    async fn create_role(
        &self,
        name: &str,
        assume_role_policy_document: &str,
        description: Option<&str>,
        path: Option<&str>,
    ) -> ProviderResult<RoleDescription> {
        let mut s = self.enter("create_role")?;
        if s.roles.iter().any(|r| r.role.name == name) {
            return Err(ProviderError::new("EntityAlreadyExists").for_resource(name));
        }
        let role = RoleDescription {
            role_id: s.id("AROA"),
            arn: format!("arn:aws:iam::123456789012:role{}{}", path.unwrap_or("/"), name),
            name: name.to_string(),
            path: Some(path.unwrap_or("/").to_string()),
            description: description.map(str::to_string),
            assume_role_policy_document: Some(assume_role_policy_document.to_string()),
        };
        s.roles.push(StubRole {
            role: role.clone(),
            attached: Vec::new(),
        });
        Ok(role)
    }

    async fn delete_role(&self, name: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_role")?;
        if !Self::role(&mut s, name)?.attached.is_empty() {
            return Err(ProviderError::new("DeleteConflict: policies attached").for_resource(name));
        }
        s.roles.retain(|r| r.role.name != name);
        Ok(())
    }

    async fn list_roles(&self) -> ProviderResult<Vec<RoleDescription>> {
        let s = self.enter("list_roles")?;
        Ok(s.roles.iter().map(|r| r.role.clone()).collect())
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> ProviderResult<Vec<String>> {
        let mut s = self.enter("list_attached_role_policies")?;
        Ok(Self::role(&mut s, role_name)?.attached.clone())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()> {
        let mut s = self.enter("attach_role_policy")?;
        let role = Self::role(&mut s, role_name)?;
        if !role.attached.iter().any(|a| a == policy_arn) {
            role.attached.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()> {
        let mut s = self.enter("detach_role_policy")?;
        let role = Self::role(&mut s, role_name)?;
        let Some(pos) = role.attached.iter().position(|a| a == policy_arn) else {
            return Err(ProviderError::new("NoSuchEntity: policy not attached").for_resource(role_name));
        };
        role.attached.remove(pos);
        Ok(())
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &str,
        description: Option<&str>,
        path: Option<&str>,
    ) -> ProviderResult<PolicyDescription> {
        let mut s = self.enter("create_policy")?;
        let policy = PolicyDescription {
            policy_id: Some(s.id("ANPA")),
            arn: Some(format!(
                "arn:aws:iam::123456789012:policy{}{}",
                path.unwrap_or("/"),
                name
            )),
            name: Some(name.to_string()),
            path: Some(path.unwrap_or("/").to_string()),
            description: description.map(str::to_string),
            default_version_id: Some("v1".to_string()),
        };
        s.policies.push(StubPolicy {
            policy: policy.clone(),
            document: document.to_string(),
        });
        Ok(policy)
    }

    async fn delete_policy(&self, arn: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_policy")?;
        let before = s.policies.len();
        s.policies.retain(|p| p.policy.arn.as_deref() != Some(arn));
        if s.policies.len() == before {
            return Err(ProviderError::new("NoSuchEntity").for_resource(arn));
        }
        Ok(())
    }

    async fn list_local_policies(&self) -> ProviderResult<Vec<PolicyDescription>> {
        let s = self.enter("list_local_policies")?;
        Ok(s.policies.iter().map(|p| p.policy.clone()).collect())
    }

    async fn policy_document(&self, arn: &str, _version_id: &str) -> ProviderResult<Option<String>> {
        let s = self.enter("policy_document")?;
        Ok(s.policies
            .iter()
            .find(|p| p.policy.arn.as_deref() == Some(arn))
            .map(|p| p.document.clone()))
    }

    async fn create_instance_profile(
        &self,
        name: &str,
        path: Option<&str>,
    ) -> ProviderResult<InstanceProfileDescription> {
        let mut s = self.enter("create_instance_profile")?;
        let profile = InstanceProfileDescription {
            instance_profile_id: s.id("AIPA"),
            arn: format!(
                "arn:aws:iam::123456789012:instance-profile{}{}",
                path.unwrap_or("/"),
                name
            ),
            name: name.to_string(),
            path: Some(path.unwrap_or("/").to_string()),
            role_names: Vec::new(),
        };
        s.instance_profiles.push(profile.clone());
        Ok(profile)
    }

    async fn get_instance_profile(&self, name: &str) -> ProviderResult<Option<InstanceProfileDescription>> {
        let s = self.enter("get_instance_profile")?;
        Ok(s.instance_profiles.iter().find(|p| p.name == name).cloned())
    }

    async fn list_instance_profiles(&self) -> ProviderResult<Vec<InstanceProfileDescription>> {
        let s = self.enter("list_instance_profiles")?;
        Ok(s.instance_profiles.clone())
    }

    async fn add_role_to_instance_profile(&self, profile: &str, role: &str) -> ProviderResult<()> {
        let mut s = self.enter("add_role_to_instance_profile")?;
        Self::profile(&mut s, profile)?.role_names.push(role.to_string());
        Ok(())
    }

    async fn remove_role_from_instance_profile(&self, profile: &str, role: &str) -> ProviderResult<()> {
        let mut s = self.enter("remove_role_from_instance_profile")?;
        Self::profile(&mut s, profile)?.role_names.retain(|r| r != role);
        Ok(())
    }

    async fn delete_instance_profile(&self, name: &str) -> ProviderResult<()> {
        let mut s = self.enter("delete_instance_profile")?;
        if !Self::profile(&mut s, name)?.role_names.is_empty() {
            return Err(ProviderError::new("DeleteConflict: roles attached").for_resource(name));
        }
        s.instance_profiles.retain(|p| p.name != name);
        Ok(())
    }
}
