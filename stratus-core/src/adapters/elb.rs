//! Classic load balancers
//!
//! An update converges four collections independently: security groups,
//! subnets, backend instances and listeners. Listeners are keyed by their
//! load balancer port; one whose backend side changed is deleted and created
//! again, as the provider cannot modify a listener in place.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::adapter::{Adapter, Context};
use crate::credentials::Session;
use crate::differ::compute_convergence;
use crate::error::{Error, Result};
use crate::event::{Action, Event, Header, Query, ResourceKind, nullable};
use crate::provider::load_balancing::LoadBalancerRequest;
use crate::provider::{Connector, LoadBalancingApi, ProviderError, ProviderResult};
use crate::resource::Listener;
use crate::validate::{port, present, require};

const PROTOCOLS: [&str; 4] = ["HTTP", "HTTPS", "TCP", "SSL"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElbListener {
    /// Port the load balancer listens on
    pub from_port: Option<i64>,
    /// Port of the backend instances
    pub to_port: Option<i64>,
    pub protocol: Option<String>,
    pub ssl_cert: Option<String>,
}

impl ElbListener {
    fn to_listener(&self) -> Result<Listener> {
        const KIND: ResourceKind = ResourceKind::Elb;

        let protocol = require(KIND, "protocol", &self.protocol)?.to_ascii_uppercase();
        if !PROTOCOLS.contains(&protocol.as_str()) {
            return Err(Error::out_of_range(
                KIND,
                "protocol",
                format!("{} is not one of {}", protocol, PROTOCOLS.join(", ")),
            ));
        }
        Ok(Listener {
            load_balancer_port: port(KIND, "from_port", self.from_port, 1..=65535)?,
            instance_port: port(KIND, "to_port", self.to_port, 1..=65535)?,
            protocol,
            ssl_certificate_id: self.ssl_cert.clone().filter(|c| !c.is_empty()),
        })
    }

    fn from_listener(listener: &Listener) -> Self {
        Self {
            from_port: Some(listener.load_balancer_port.into()),
            to_port: Some(listener.instance_port.into()),
            protocol: Some(listener.protocol.clone()),
            ssl_cert: listener.ssl_certificate_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Elb {
    pub name: Option<String>,
    pub is_private: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub listeners: Vec<ElbListener>,
    pub dns_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub instances: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub instance_names: Vec<String>,
    #[serde(rename = "instance_aws_ids", default, deserialize_with = "nullable")]
    pub instance_ids: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub networks: Vec<String>,
    #[serde(rename = "network_aws_ids", default, deserialize_with = "nullable")]
    pub network_ids: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub security_groups: Vec<String>,
    #[serde(rename = "security_group_aws_ids", default, deserialize_with = "nullable")]
    pub security_group_ids: Vec<String>,
}

impl Elb {
    fn listeners(&self) -> Result<Vec<Listener>> {
        self.listeners.iter().map(ElbListener::to_listener).collect()
    }
}

pub struct ElbAdapter {
    load_balancing: Arc<dyn LoadBalancingApi>,
    context: Context,
}

impl ElbAdapter {
    async fn tag(&self, name: &str, event: &Event<Elb>) -> Result<()> {
        if !event.header.tags.is_empty() {
            self.load_balancing.add_tags(name, &event.header.tags).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for ElbAdapter {
    type Resource = Elb;

    const KIND: ResourceKind = ResourceKind::Elb;

    async fn connect(connector: &dyn Connector, session: &Session, context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            load_balancing: connector.load_balancing(session).await?,
            context,
        })
    }

    fn validate(action: Action, event: &Event<Elb>) -> Result<()> {
        require(Self::KIND, "name", &event.resource.name)?;
        if action != Action::Delete {
            event.resource.listeners()?;
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<Elb>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?.to_string();
        let request = LoadBalancerRequest {
            name: name.clone(),
            listeners: event.resource.listeners()?,
            subnet_ids: present(&event.resource.network_ids),
            security_group_ids: present(&event.resource.security_group_ids),
            internal: event.resource.is_private == Some(true),
        };

        let dns_name = self.load_balancing.create_load_balancer(&request).await?;
        info!("Created load balancer {} ({:?})", name, dns_name);
        event.resource.dns_name = dns_name;

        let instances = present(&event.resource.instance_ids);
        if !instances.is_empty() {
            self.load_balancing
                .register_instances(&name, &instances)
                .await?;
        }

        self.tag(&name, event).await
    }

    async fn update(&self, event: &mut Event<Elb>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?.to_string();
        let current = self
            .load_balancing
            .describe_load_balancer(&name)
            .await?
            .ok_or_else(|| ProviderError::new("Could not find load balancer").for_resource(&name))?;

        let groups = present(&event.resource.security_group_ids);
        let plan = compute_convergence(&groups, &current.security_group_ids, &[]);
        debug!("{} security groups: {}", name, plan.summary());
        if !groups.is_empty() && !plan.is_converged() {
            self.load_balancing
                .apply_security_groups(&name, &groups)
                .await?;
        }

        let subnets = present(&event.resource.network_ids);
        let plan = compute_convergence(&subnets, &current.subnet_ids, &[]);
        debug!("{} subnets: {}", name, plan.summary());
        if !plan.to_remove.is_empty() {
            self.load_balancing.detach_subnets(&name, &plan.to_remove).await?;
        }
        if !plan.to_add.is_empty() {
            self.load_balancing.attach_subnets(&name, &plan.to_add).await?;
        }

        let members = present(&event.resource.instance_ids);
        let plan = compute_convergence(&members, &current.instance_ids, &[]);
        debug!("{} instances: {}", name, plan.summary());
        if !plan.to_remove.is_empty() {
            self.load_balancing
                .deregister_instances(&name, &plan.to_remove)
                .await?;
        }
        if !plan.to_add.is_empty() {
            self.load_balancing
                .register_instances(&name, &plan.to_add)
                .await?;
        }

        let listeners = event.resource.listeners()?;
        let plan = compute_convergence(&listeners, &current.listeners, &[]);
        debug!("{} listeners: {}", name, plan.summary());
        let ports: Vec<i32> = plan.removals().map(|l| l.load_balancer_port).collect();
        if !ports.is_empty() {
            self.load_balancing.delete_listeners(&name, &ports).await?;
        }
        let additions: Vec<Listener> = plan.additions().cloned().collect();
        if !additions.is_empty() {
            self.load_balancing
                .create_listeners(&name, &additions)
                .await?;
        }

        event.resource.dns_name = current.dns_name;
        self.tag(&name, event).await
    }

    async fn delete(&self, event: &mut Event<Elb>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?.to_string();

        self.load_balancing.delete_load_balancer(&name).await?;
        self.context
            .wait_for("load balancer to be removed", || {
                let load_balancing = self.load_balancing.clone();
                let name = name.clone();
                async move {
                    let current = load_balancing.describe_load_balancer(&name).await?;
                    Ok(current.is_none().then_some(()))
                }
            })
            .await?;
        info!("Deleted load balancer {}", name);
        Ok(())
    }

    async fn find(&self, _query: &Query<Elb>) -> Result<Vec<Event<Elb>>> {
        let mut found = Vec::new();
        for lb in self.load_balancing.describe_load_balancers().await? {
            let tags = self.load_balancing.describe_tags(&lb.name).await?;
            found.push(Event::new(
                Header::for_component(Self::KIND, &lb.name, tags),
                Elb {
                    name: Some(lb.name.clone()),
                    is_private: Some(lb.internal),
                    listeners: lb.listeners.iter().map(ElbListener::from_listener).collect(),
                    dns_name: lb.dns_name,
                    instance_ids: lb.instance_ids,
                    network_ids: lb.subnet_ids,
                    security_group_ids: lb.security_group_ids,
                    ..Default::default()
                },
            ));
        }
        Ok(found)
    }
}
