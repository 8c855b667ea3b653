//! Classic Elastic Load Balancing

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_elasticloadbalancing::Client as ElbClient;
use aws_sdk_elasticloadbalancing::types::Instance;
use stratus_core::provider::load_balancing::{LoadBalancerDescription, LoadBalancerRequest};
use stratus_core::provider::{LoadBalancingApi, ProviderError, ProviderResult};
use stratus_core::resource::{Listener, Tags};

use crate::{failed, owned};

const INTERNAL_SCHEME: &str = "internal";

pub struct ElbApi {
    client: ElbClient,
}

impl ElbApi {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: ElbClient::new(config),
        }
    }
}

fn sdk_listener(listener: &Listener) -> ProviderResult<aws_sdk_elasticloadbalancing::types::Listener> {
    aws_sdk_elasticloadbalancing::types::Listener::builder()
        .protocol(&listener.protocol)
        .load_balancer_port(listener.load_balancer_port)
        .instance_protocol(&listener.protocol)
        .instance_port(listener.instance_port)
        .set_ssl_certificate_id(listener.ssl_certificate_id.clone())
        .build()
        .map_err(|e| ProviderError::new(format!("Failed to build listener: {}", e)))
}

fn sdk_listeners(
    listeners: &[Listener],
) -> ProviderResult<Vec<aws_sdk_elasticloadbalancing::types::Listener>> {
    listeners.iter().map(sdk_listener).collect()
}

fn listener(raw: &aws_sdk_elasticloadbalancing::types::Listener) -> Listener {
    Listener {
        load_balancer_port: raw.load_balancer_port(),
        instance_port: raw.instance_port(),
        protocol: raw.protocol().to_string(),
        ssl_certificate_id: raw.ssl_certificate_id().map(String::from),
    }
}

fn instances(ids: &[String]) -> Vec<Instance> {
    ids.iter()
        .map(|id| Instance::builder().instance_id(id).build())
        .collect()
}

fn description(
    raw: &aws_sdk_elasticloadbalancing::types::LoadBalancerDescription,
) -> Option<LoadBalancerDescription> {
    Some(LoadBalancerDescription {
        name: raw.load_balancer_name()?.to_string(),
        dns_name: raw.dns_name().map(String::from),
        vpc_id: raw.vpc_id().map(String::from),
        internal: raw.scheme() == Some(INTERNAL_SCHEME),
        listeners: raw
            .listener_descriptions()
            .iter()
            .filter_map(|d| d.listener().map(listener))
            .collect(),
        instance_ids: owned(raw.instances(), |i| i.instance_id()),
        subnet_ids: raw.subnets().to_vec(),
        security_group_ids: raw.security_groups().to_vec(),
    })
}

#[async_trait]
impl LoadBalancingApi for ElbApi {
    async fn create_load_balancer(
        &self,
        request: &LoadBalancerRequest,
    ) -> ProviderResult<Option<String>> {
        let mut call = self
            .client
            .create_load_balancer()
            .load_balancer_name(&request.name)
            .set_listeners(Some(sdk_listeners(&request.listeners)?))
            .set_subnets(Some(request.subnet_ids.clone()))
            .set_security_groups(
                (!request.security_group_ids.is_empty())
                    .then(|| request.security_group_ids.clone()),
            );
        if request.internal {
            call = call.scheme(INTERNAL_SCHEME);
        }

        let result = call
            .send()
            .await
            .map_err(|e| failed("create load balancer", e).for_resource(&request.name))?;

        Ok(result.dns_name().map(String::from))
    }

    async fn describe_load_balancer(
        &self,
        name: &str,
    ) -> ProviderResult<Option<LoadBalancerDescription>> {
        let result = match self
            .client
            .describe_load_balancers()
            .load_balancer_names(name)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_access_point_not_found_exception()) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(failed("describe load balancer", e).for_resource(name)),
        };

        Ok(result
            .load_balancer_descriptions()
            .first()
            .and_then(description))
    }

    async fn describe_load_balancers(&self) -> ProviderResult<Vec<LoadBalancerDescription>> {
        let result = self
            .client
            .describe_load_balancers()
            .send()
            .await
            .map_err(|e| failed("describe load balancers", e))?;

        Ok(result
            .load_balancer_descriptions()
            .iter()
            .filter_map(description)
            .collect())
    }

    async fn delete_load_balancer(&self, name: &str) -> ProviderResult<()> {
        self.client
            .delete_load_balancer()
            .load_balancer_name(name)
            .send()
            .await
            .map_err(|e| failed("delete load balancer", e).for_resource(name))?;
        Ok(())
    }

    async fn register_instances(&self, name: &str, instance_ids: &[String]) -> ProviderResult<()> {
        if instance_ids.is_empty() {
            return Ok(());
        }
        self.client
            .register_instances_with_load_balancer()
            .load_balancer_name(name)
            .set_instances(Some(instances(instance_ids)))
            .send()
            .await
            .map_err(|e| failed("register instances", e).for_resource(name))?;
        Ok(())
    }

    async fn deregister_instances(&self, name: &str, instance_ids: &[String])
    -> ProviderResult<()> {
        if instance_ids.is_empty() {
            return Ok(());
        }
        self.client
            .deregister_instances_from_load_balancer()
            .load_balancer_name(name)
            .set_instances(Some(instances(instance_ids)))
            .send()
            .await
            .map_err(|e| failed("deregister instances", e).for_resource(name))?;
        Ok(())
    }

    async fn create_listeners(&self, name: &str, listeners: &[Listener]) -> ProviderResult<()> {
        if listeners.is_empty() {
            return Ok(());
        }
        self.client
            .create_load_balancer_listeners()
            .load_balancer_name(name)
            .set_listeners(Some(sdk_listeners(listeners)?))
            .send()
            .await
            .map_err(|e| failed("create listeners", e).for_resource(name))?;
        Ok(())
    }

    async fn delete_listeners(&self, name: &str, load_balancer_ports: &[i32])
    -> ProviderResult<()> {
        if load_balancer_ports.is_empty() {
            return Ok(());
        }
        self.client
            .delete_load_balancer_listeners()
            .load_balancer_name(name)
            .set_load_balancer_ports(Some(load_balancer_ports.to_vec()))
            .send()
            .await
            .map_err(|e| failed("delete listeners", e).for_resource(name))?;
        Ok(())
    }

    async fn attach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        if subnet_ids.is_empty() {
            return Ok(());
        }
        self.client
            .attach_load_balancer_to_subnets()
            .load_balancer_name(name)
            .set_subnets(Some(subnet_ids.to_vec()))
            .send()
            .await
            .map_err(|e| failed("attach subnets", e).for_resource(name))?;
        Ok(())
    }

    async fn detach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        if subnet_ids.is_empty() {
            return Ok(());
        }
        self.client
            .detach_load_balancer_from_subnets()
            .load_balancer_name(name)
            .set_subnets(Some(subnet_ids.to_vec()))
            .send()
            .await
            .map_err(|e| failed("detach subnets", e).for_resource(name))?;
        Ok(())
    }

    async fn apply_security_groups(&self, name: &str, group_ids: &[String])
    -> ProviderResult<()> {
        self.client
            .apply_security_groups_to_load_balancer()
            .load_balancer_name(name)
            .set_security_groups(Some(group_ids.to_vec()))
            .send()
            .await
            .map_err(|e| failed("apply security groups", e).for_resource(name))?;
        Ok(())
    }

    async fn add_tags(&self, name: &str, tags: &Tags) -> ProviderResult<()> {
        use aws_sdk_elasticloadbalancing::types::Tag;

        if tags.is_empty() {
            return Ok(());
        }
        let tags = tags
            .iter()
            .map(|(k, v)| {
                Tag::builder()
                    .key(k)
                    .value(v)
                    .build()
                    .map_err(|e| ProviderError::new(format!("Failed to build tag: {}", e)))
            })
            .collect::<ProviderResult<Vec<_>>>()?;

        self.client
            .add_tags()
            .load_balancer_names(name)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| failed("add tags", e).for_resource(name))?;
        Ok(())
    }

    async fn describe_tags(&self, name: &str) -> ProviderResult<Tags> {
        let result = self
            .client
            .describe_tags()
            .load_balancer_names(name)
            .send()
            .await
            .map_err(|e| failed("describe tags", e).for_resource(name))?;

        Ok(result
            .tag_descriptions()
            .iter()
            .flat_map(|d| d.tags())
            .map(|t| (t.key().to_string(), t.value().unwrap_or_default().to_string()))
            .collect())
    }
}
