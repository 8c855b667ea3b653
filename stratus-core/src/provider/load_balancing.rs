//! Load balancing family: classic load balancers

use async_trait::async_trait;

use super::ProviderResult;
use crate::resource::{Listener, Tags};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadBalancerRequest {
    pub name: String,
    pub listeners: Vec<Listener>,
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub internal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadBalancerDescription {
    pub name: String,
    pub dns_name: Option<String>,
    pub vpc_id: Option<String>,
    pub internal: bool,
    pub listeners: Vec<Listener>,
    pub instance_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
}

#[async_trait]
pub trait LoadBalancingApi: Send + Sync {
    /// Returns the DNS name assigned to the new load balancer
    async fn create_load_balancer(
        &self,
        request: &LoadBalancerRequest,
    ) -> ProviderResult<Option<String>>;

    async fn describe_load_balancer(
        &self,
        name: &str,
    ) -> ProviderResult<Option<LoadBalancerDescription>>;

    async fn describe_load_balancers(&self) -> ProviderResult<Vec<LoadBalancerDescription>>;

    async fn delete_load_balancer(&self, name: &str) -> ProviderResult<()>;

    async fn register_instances(&self, name: &str, instance_ids: &[String]) -> ProviderResult<()>;

    async fn deregister_instances(&self, name: &str, instance_ids: &[String])
    -> ProviderResult<()>;

    async fn create_listeners(&self, name: &str, listeners: &[Listener]) -> ProviderResult<()>;

    async fn delete_listeners(&self, name: &str, load_balancer_ports: &[i32])
    -> ProviderResult<()>;

    async fn attach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()>;

    async fn detach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()>;

    /// Replaces the full set of security groups
    async fn apply_security_groups(&self, name: &str, group_ids: &[String])
    -> ProviderResult<()>;

    async fn add_tags(&self, name: &str, tags: &Tags) -> ProviderResult<()>;

    async fn describe_tags(&self, name: &str) -> ProviderResult<Tags>;
}
