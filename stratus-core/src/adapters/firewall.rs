//! Security groups and their rule sets
//!
//! Updates never resubmit a rule the group already has: the desired rules are
//! diffed against the group per direction, stale rules are revoked first and
//! only the missing ones are authorized.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::event_tags;
use crate::adapter::{Adapter, Context};
use crate::credentials::Session;
use crate::differ::compute_convergence;
use crate::error::Result;
use crate::event::{Action, Event, Header, Query, ResourceKind, nullable};
use crate::provider::{Connector, Filter, NetworkApi, ProviderError, ProviderResult};
use crate::resource::{ALL_PROTOCOLS, Direction, FirewallRule, normalize_protocol};
use crate::validate::{port, require};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Source or destination CIDR
    pub ip: Option<String>,
    pub protocol: Option<String>,
    pub from_port: Option<i64>,
    pub to_port: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rules {
    #[serde(default, deserialize_with = "nullable")]
    pub ingress: Vec<Rule>,
    #[serde(default, deserialize_with = "nullable")]
    pub egress: Vec<Rule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Firewall {
    #[serde(rename = "security_group_aws_id")]
    pub security_group_id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "network_aws_id")]
    pub network_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub rules: Rules,
    pub vpc_id: Option<String>,
}

impl Firewall {
    /// Every rule of the body, checked and normalized
    fn firewall_rules(&self, direction: Direction) -> Result<Vec<FirewallRule>> {
        let rules = match direction {
            Direction::Ingress => &self.rules.ingress,
            Direction::Egress => &self.rules.egress,
        };
        rules.iter().map(|rule| rule.to_firewall_rule(direction)).collect()
    }
}

impl Rule {
    fn to_firewall_rule(&self, direction: Direction) -> Result<FirewallRule> {
        const KIND: ResourceKind = ResourceKind::Firewall;

        let ip = require(KIND, "ip", &self.ip)?;
        let protocol = normalize_protocol(require(KIND, "protocol", &self.protocol)?);
        let (from_port, to_port) = if protocol == ALL_PROTOCOLS {
            (0, 65535)
        } else {
            (
                port(KIND, "from_port", self.from_port, 0..=65535)?,
                port(KIND, "to_port", self.to_port, 0..=65535)?,
            )
        };
        Ok(FirewallRule::new(direction, ip, &protocol, from_port, to_port))
    }

    fn from_firewall_rule(rule: &FirewallRule) -> Self {
        Self {
            ip: Some(rule.cidr.clone()),
            protocol: Some(rule.protocol.clone()),
            from_port: Some(rule.from_port.into()),
            to_port: Some(rule.to_port.into()),
        }
    }
}

pub struct FirewallAdapter {
    network: Arc<dyn NetworkApi>,
}

impl FirewallAdapter {
    async fn authorize(&self, group_id: &str, rules: &[FirewallRule]) -> Result<()> {
        if !rules.is_empty() {
            self.network.authorize_rules(group_id, rules).await?;
        }
        Ok(())
    }

    async fn revoke(&self, group_id: &str, rules: &[FirewallRule]) -> Result<()> {
        if !rules.is_empty() {
            self.network.revoke_rules(group_id, rules).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for FirewallAdapter {
    type Resource = Firewall;

    const KIND: ResourceKind = ResourceKind::Firewall;

    async fn connect(connector: &dyn Connector, session: &Session, _context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            network: connector.network(session).await?,
        })
    }

    fn validate(action: Action, event: &Event<Firewall>) -> Result<()> {
        let firewall = &event.resource;
        require(Self::KIND, "vpc_id", &firewall.vpc_id)?;
        if action != Action::Create {
            require(Self::KIND, "security_group_aws_id", &firewall.security_group_id)?;
        }
        if action != Action::Delete {
            require(Self::KIND, "name", &firewall.name)?;
            firewall.firewall_rules(Direction::Ingress)?;
            firewall.firewall_rules(Direction::Egress)?;
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<Firewall>) -> Result<()> {
        let vpc_id = require(Self::KIND, "vpc_id", &event.resource.vpc_id)?.to_string();
        let name = require(Self::KIND, "name", &event.resource.name)?.to_string();
        let ingress = event.resource.firewall_rules(Direction::Ingress)?;
        let egress = event.resource.firewall_rules(Direction::Egress)?;

        let group_id = self.network.create_security_group(&vpc_id, &name, &name).await?;
        info!("Created security group {} ({}) in {}", group_id, name, vpc_id);
        event.resource.security_group_id = Some(group_id.clone());

        // New groups allow all outbound traffic until told otherwise.
        self.network
            .revoke_rules(&group_id, &[FirewallRule::default_egress()])
            .await?;

        self.authorize(&group_id, &ingress).await?;
        self.authorize(&group_id, &egress).await?;

        let tags = event_tags(event, Some(name.as_str()));
        self.network.create_tags(&group_id, &tags).await?;
        Ok(())
    }

    async fn update(&self, event: &mut Event<Firewall>) -> Result<()> {
        let group_id =
            require(Self::KIND, "security_group_aws_id", &event.resource.security_group_id)?.to_string();

        let group = self
            .network
            .describe_security_group(&group_id)
            .await?
            .ok_or_else(|| ProviderError::new("Could not find security group").for_resource(&group_id))?;

        let mut revoke = Vec::new();
        let mut authorize = Vec::new();
        for direction in [Direction::Ingress, Direction::Egress] {
            let desired = event.resource.firewall_rules(direction)?;
            let observed: Vec<FirewallRule> = group
                .rules
                .iter()
                .filter(|r| r.direction == direction)
                .cloned()
                .collect();

            let plan = compute_convergence(&desired, &observed, &[]);
            debug!("{} {} rules: {}", group_id, direction, plan.summary());
            revoke.push(plan.to_remove);
            authorize.push(plan.to_add);
        }

        for rules in &revoke {
            self.revoke(&group_id, rules).await?;
        }
        for rules in &authorize {
            self.authorize(&group_id, rules).await?;
        }

        let tags = event_tags(event, event.resource.name.as_deref());
        if !tags.is_empty() {
            self.network.create_tags(&group_id, &tags).await?;
        }
        Ok(())
    }

    async fn delete(&self, event: &mut Event<Firewall>) -> Result<()> {
        let group_id =
            require(Self::KIND, "security_group_aws_id", &event.resource.security_group_id)?.to_string();

        self.network.delete_security_group(&group_id).await?;
        info!("Deleted security group {}", group_id);
        Ok(())
    }

    async fn find(&self, query: &Query<Firewall>) -> Result<Vec<Event<Firewall>>> {
        let groups = self
            .network
            .describe_security_groups(&Filter::from_tags(&query.tags))
            .await?;

        Ok(groups
            .into_iter()
            .map(|group| {
                let rules = |direction: Direction| -> Vec<Rule> {
                    group
                        .rules
                        .iter()
                        .filter(|r| r.direction == direction)
                        .map(Rule::from_firewall_rule)
                        .collect()
                };
                let body = Firewall {
                    security_group_id: Some(group.group_id.clone()),
                    name: Some(group.group_name.clone()),
                    rules: Rules {
                        ingress: rules(Direction::Ingress),
                        egress: rules(Direction::Egress),
                    },
                    vpc_id: group.vpc_id.clone(),
                    ..Default::default()
                };
                Event::new(
                    Header::for_component(Self::KIND, &group.group_name, group.tags.clone()),
                    body,
                )
            })
            .collect())
    }
}
