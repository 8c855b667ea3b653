//! Route 53 hosted zones and their record sets
//!
//! Records are converged against the zone's current record sets. The SOA
//! and NS records at the zone apex belong to the provider and are never
//! deleted, even when the event does not list them.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapter::{Adapter, Context};
use crate::credentials::Session;
use crate::differ::{ConvergencePlan, NaturalKey, compute_convergence};
use crate::error::{Error, Result};
use crate::event::{Action, Event, Header, Query, ResourceKind, nullable};
use crate::provider::dns::{ChangeAction, RecordChange, ZoneVpc, bare_zone_id};
use crate::provider::{Connector, DnsApi, ProviderResult};
use crate::resource::{DnsRecord, normalize_dns_name};
use crate::validate::require;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub entry: Option<String>,
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub values: Vec<String>,
    pub ttl: Option<i64>,
}

impl Record {
    fn to_dns_record(&self) -> Result<DnsRecord> {
        const KIND: ResourceKind = ResourceKind::Route53;

        let entry = require(KIND, "entry", &self.entry)?;
        let record_type = require(KIND, "type", &self.record_type)?;
        if let Some(ttl) = self.ttl
            && ttl < 0
        {
            return Err(Error::out_of_range(KIND, "ttl", format!("{} is negative", ttl)));
        }
        Ok(DnsRecord::new(entry, record_type.to_ascii_uppercase())
            .with_values(self.values.clone(), self.ttl))
    }
}

impl From<DnsRecord> for Record {
    fn from(record: DnsRecord) -> Self {
        Self {
            entry: Some(record.name),
            record_type: Some(record.record_type),
            values: record.values,
            ttl: record.ttl,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route53 {
    pub hosted_zone_id: Option<String>,
    pub name: Option<String>,
    pub private: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub records: Vec<Record>,
    pub vpc_id: Option<String>,
}

impl Route53 {
    fn records(&self) -> Result<Vec<DnsRecord>> {
        self.records.iter().map(Record::to_dns_record).collect()
    }
}

/// UPSERT for every record to write, DELETE for every record to drop
fn changes(plan: &ConvergencePlan<DnsRecord>) -> Vec<RecordChange> {
    let upserts = plan.additions().map(|record| RecordChange {
        action: ChangeAction::Upsert,
        record: record.clone(),
    });
    let deletes = plan.to_remove.iter().map(|record| RecordChange {
        action: ChangeAction::Delete,
        record: record.clone(),
    });
    upserts.chain(deletes).collect()
}

pub struct Route53Adapter {
    dns: Arc<dyn DnsApi>,
    region: String,
}

impl Route53Adapter {
    /// Bring the zone's records to `desired`, leaving the apex SOA and NS alone
    async fn converge(&self, zone_id: &str, zone_name: &str, desired: &[DnsRecord]) -> Result<()> {
        let observed = self.dns.list_records(zone_id).await?;
        let protected = DnsRecord::zone_defaults(zone_name);
        let plan = compute_convergence(desired, &observed, &protected);
        debug!("Zone {} records: {}", zone_id, plan.summary());

        let changes = changes(&plan);
        if !changes.is_empty() {
            self.dns.change_records(zone_id, &changes).await?;
        }
        Ok(())
    }

    async fn tag(&self, zone_id: &str, event: &Event<Route53>) -> Result<()> {
        if !event.header.tags.is_empty() {
            self.dns.change_tags(zone_id, &event.header.tags).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for Route53Adapter {
    type Resource = Route53;

    const KIND: ResourceKind = ResourceKind::Route53;

    async fn connect(connector: &dyn Connector, session: &Session, _context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            dns: connector.dns(session).await?,
            region: session.region.clone(),
        })
    }

    fn validate(action: Action, event: &Event<Route53>) -> Result<()> {
        let zone = &event.resource;
        require(Self::KIND, "name", &zone.name)?;
        match action {
            Action::Create => {
                if zone.private == Some(true) {
                    require(Self::KIND, "vpc_id", &zone.vpc_id)?;
                }
                zone.records()?;
            }
            Action::Update => {
                require(Self::KIND, "hosted_zone_id", &zone.hosted_zone_id)?;
                zone.records()?;
            }
            Action::Delete => {
                require(Self::KIND, "hosted_zone_id", &zone.hosted_zone_id)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<Route53>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?.to_string();
        let vpc = match (event.resource.private, event.resource.vpc_id.as_deref()) {
            (Some(true), Some(vpc_id)) => Some(ZoneVpc {
                vpc_id: vpc_id.to_string(),
                region: self.region.clone(),
            }),
            _ => None,
        };

        let caller_reference = Uuid::new_v4().to_string();
        let zone_id = self
            .dns
            .create_hosted_zone(&name, &caller_reference, vpc.as_ref())
            .await?;
        let zone_id = bare_zone_id(&zone_id).to_string();
        info!("Created hosted zone {} ({})", name, zone_id);
        event.resource.hosted_zone_id = Some(zone_id);

        self.update(event).await
    }

    async fn update(&self, event: &mut Event<Route53>) -> Result<()> {
        let zone_id = require(Self::KIND, "hosted_zone_id", &event.resource.hosted_zone_id)?;
        let name = require(Self::KIND, "name", &event.resource.name)?;

        self.converge(zone_id, name, &event.resource.records()?).await?;
        self.tag(zone_id, event).await
    }

    async fn delete(&self, event: &mut Event<Route53>) -> Result<()> {
        let zone_id = require(Self::KIND, "hosted_zone_id", &event.resource.hosted_zone_id)?;
        let name = require(Self::KIND, "name", &event.resource.name)?;

        self.converge(zone_id, name, &[]).await?;
        self.dns.delete_hosted_zone(zone_id).await?;
        info!("Deleted hosted zone {} ({})", name, zone_id);
        Ok(())
    }

    async fn find(&self, _query: &Query<Route53>) -> Result<Vec<Event<Route53>>> {
        let mut found = Vec::new();
        for zone in self.dns.list_hosted_zones().await? {
            let tags = self.dns.list_tags(&zone.id).await?;
            let name = normalize_dns_name(&zone.name).to_string();
            let protected = DnsRecord::zone_defaults(&name);
            let records = self
                .dns
                .list_records(&zone.id)
                .await?
                .into_iter()
                .filter(|record| {
                    let key = record.natural_key();
                    !protected.iter().any(|p| p.natural_key() == key)
                })
                .map(Record::from)
                .collect();

            found.push(Event::new(
                Header::for_component(Self::KIND, &name, tags),
                Route53 {
                    hosted_zone_id: Some(zone.id),
                    name: Some(name),
                    private: Some(zone.private),
                    records,
                    vpc_id: None,
                },
            ));
        }
        Ok(found)
    }
}
