//! Adapters - One reconciler per resource type

mod ebs;
mod elb;
mod firewall;
mod iam_instance_profile;
mod iam_policy;
mod iam_role;
mod instance;
mod internet_gateway;
mod nat;
mod network;
mod rds_cluster;
mod rds_instance;
mod route53;
mod s3;
mod vpc;

pub use ebs::{EbsVolume, EbsVolumeAdapter};
pub use elb::{Elb, ElbAdapter, ElbListener};
pub use firewall::{Firewall, FirewallAdapter, Rule, Rules};
pub use iam_instance_profile::{IamInstanceProfile, IamInstanceProfileAdapter};
pub use iam_policy::{IamPolicy, IamPolicyAdapter};
pub use iam_role::{IamRole, IamRoleAdapter};
pub use instance::{Instance, InstanceAdapter, InstanceVolume};
pub use internet_gateway::{InternetGateway, InternetGatewayAdapter};
pub use nat::{Nat, NatAdapter};
pub use network::{Network, NetworkAdapter};
pub use rds_cluster::{RdsCluster, RdsClusterAdapter};
pub use rds_instance::{RdsInstance, RdsInstanceAdapter};
pub use route53::{Record, Route53, Route53Adapter};
pub use s3::{Grantee, S3, S3Adapter};
pub use vpc::{Vpc, VpcAdapter};

use log::debug;

use crate::differ::compute_convergence;
use crate::event::Event;
use crate::provider::network::{RouteTarget, RouteTable};
use crate::provider::{DatabaseApi, Filter, NetworkApi, ProviderError, ProviderResult};

/// Name of an object, read from its `Name` tag
pub(crate) fn name_tag(tags: &crate::resource::Tags) -> Option<String> {
    tags.get("Name").cloned()
}

/// Tags to write for an event: the event tags plus `Name` when the body has one
pub(crate) fn event_tags<R>(event: &Event<R>, name: Option<&str>) -> crate::resource::Tags {
    match name {
        Some(name) if !name.is_empty() => crate::resource::named_tags(name, &event.header.tags),
        _ => event.header.tags.clone(),
    }
}

/// Route table associated with `subnet_id`, creating and associating one when there is none
pub(crate) async fn subnet_route_table(
    network: &dyn NetworkApi,
    vpc_id: &str,
    subnet_id: &str,
) -> ProviderResult<RouteTable> {
    let filters = [Filter::new("association.subnet-id", subnet_id)];
    if let Some(table) = network.describe_route_tables(&filters).await?.into_iter().next() {
        return Ok(table);
    }

    let route_table_id = network.create_route_table(vpc_id).await?;
    network.associate_route_table(&route_table_id, subnet_id).await?;
    Ok(RouteTable {
        route_table_id,
        ..Default::default()
    })
}

/// Send 0.0.0.0/0 of the subnet's route table to `target`, unless it already does
pub(crate) async fn route_default_traffic(
    network: &dyn NetworkApi,
    vpc_id: &str,
    subnet_id: &str,
    target: &RouteTarget,
) -> ProviderResult<bool> {
    let table = subnet_route_table(network, vpc_id, subnet_id).await?;
    if table.routes_to(target) {
        return Ok(false);
    }
    network
        .create_route(&table.route_table_id, "0.0.0.0/0", target)
        .await?;
    Ok(true)
}

/// Internet gateway attached to the VPC, creating and attaching one when missing
pub(crate) async fn ensure_internet_gateway(
    network: &dyn NetworkApi,
    vpc_id: &str,
) -> ProviderResult<String> {
    if let Some(gateway_id) = network.find_internet_gateway(vpc_id).await? {
        return Ok(gateway_id);
    }
    let gateway_id = network.create_internet_gateway().await?;
    network.attach_internet_gateway(&gateway_id, vpc_id).await?;
    Ok(gateway_id)
}

/// Subnet group holding the networks of the database `name`
pub(crate) fn db_subnet_group(name: &str) -> String {
    format!("{}-sg", name)
}

/// Snapshot taken when the database `name` is deleted, unless disabled
pub(crate) fn final_snapshot(name: &str, enabled: Option<bool>) -> Option<String> {
    (enabled != Some(false)).then(|| format!("{}-Final-Snapshot", name))
}

/// Create the subnet group for a database placed in `subnet_ids`.
///
/// Returns the group name, or `None` when the database has no networks.
pub(crate) async fn create_db_subnet_group(
    database: &dyn DatabaseApi,
    name: &str,
    subnet_ids: &[String],
) -> ProviderResult<Option<String>> {
    if subnet_ids.is_empty() {
        return Ok(None);
    }
    let group = db_subnet_group(name);
    database.create_subnet_group(&group, subnet_ids).await?;
    Ok(Some(group))
}

/// Point the database's subnet group at `subnet_ids` when its subnets differ
pub(crate) async fn sync_db_subnet_group(
    database: &dyn DatabaseApi,
    name: &str,
    subnet_ids: &[String],
) -> ProviderResult<()> {
    if subnet_ids.is_empty() {
        return Ok(());
    }
    let group = db_subnet_group(name);
    let current = database
        .describe_subnet_group(&group)
        .await?
        .ok_or_else(|| ProviderError::new("Could not find subnet group").for_resource(&group))?;

    let plan = compute_convergence(subnet_ids, &current, &[]);
    debug!("Subnet group {}: {}", group, plan.summary());
    if !plan.is_converged() {
        database.modify_subnet_group(&group, subnet_ids).await?;
    }
    Ok(())
}

/// Remove the database's subnet group if it has one
pub(crate) async fn delete_db_subnet_group(
    database: &dyn DatabaseApi,
    name: &str,
) -> ProviderResult<()> {
    let group = db_subnet_group(name);
    if database.describe_subnet_group(&group).await?.is_some() {
        database.delete_subnet_group(&group).await?;
    }
    Ok(())
}

/// Security groups to send on a modify: the desired set, only when it differs
pub(crate) fn changed_groups(desired: &[String], current: &[String]) -> Option<Vec<String>> {
    if desired.is_empty() || compute_convergence(desired, current, &[]).is_converged() {
        return None;
    }
    Some(desired.to_vec())
}
