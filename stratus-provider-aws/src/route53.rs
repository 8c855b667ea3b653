//! Route 53 hosted zones and record sets

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_route53::Client as Route53Client;
use aws_sdk_route53::types::{ResourceRecordSet, RrType, TagResourceType};
use stratus_core::provider::dns::{ChangeAction, HostedZone, RecordChange, ZoneVpc, bare_zone_id};
use stratus_core::provider::{DnsApi, ProviderError, ProviderResult};
use stratus_core::resource::{DnsRecord, Tags};

use crate::{collect_tags, failed};

pub struct Route53Api {
    client: Route53Client,
}

impl Route53Api {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Route53Client::new(config),
        }
    }
}

fn record_set(record: &DnsRecord) -> ProviderResult<ResourceRecordSet> {
    use aws_sdk_route53::types::ResourceRecord;

    let values = record
        .values
        .iter()
        .map(|v| {
            ResourceRecord::builder()
                .value(v)
                .build()
                .map_err(|e| ProviderError::new(format!("Failed to build record value: {}", e)))
        })
        .collect::<ProviderResult<Vec<_>>>()?;

    ResourceRecordSet::builder()
        .name(&record.name)
        .r#type(RrType::from(record.record_type.to_ascii_uppercase().as_str()))
        .set_ttl(record.ttl)
        .set_resource_records((!values.is_empty()).then_some(values))
        .build()
        .map_err(|e| {
            ProviderError::new(format!("Failed to build record set: {}", e)).for_resource(&record.name)
        })
}

fn dns_record(raw: &ResourceRecordSet) -> DnsRecord {
    DnsRecord::new(raw.name(), raw.r#type().as_str()).with_values(
        raw.resource_records()
            .iter()
            .map(|r| r.value().to_string())
            .collect(),
        raw.ttl(),
    )
}

fn change(change: &RecordChange) -> ProviderResult<aws_sdk_route53::types::Change> {
    use aws_sdk_route53::types::ChangeAction as SdkAction;

    let action = match change.action {
        ChangeAction::Upsert => SdkAction::Upsert,
        ChangeAction::Delete => SdkAction::Delete,
    };
    aws_sdk_route53::types::Change::builder()
        .action(action)
        .resource_record_set(record_set(&change.record)?)
        .build()
        .map_err(|e| ProviderError::new(format!("Failed to build change: {}", e)))
}

#[async_trait]
impl DnsApi for Route53Api {
    async fn create_hosted_zone(
        &self,
        name: &str,
        caller_reference: &str,
        vpc: Option<&ZoneVpc>,
    ) -> ProviderResult<String> {
        use aws_sdk_route53::types::{HostedZoneConfig, Vpc, VpcRegion};

        let mut request = self
            .client
            .create_hosted_zone()
            .name(name)
            .caller_reference(caller_reference);
        if let Some(vpc) = vpc {
            request = request
                .vpc(
                    Vpc::builder()
                        .vpc_id(&vpc.vpc_id)
                        .vpc_region(VpcRegion::from(vpc.region.as_str()))
                        .build(),
                )
                .hosted_zone_config(HostedZoneConfig::builder().private_zone(true).build());
        }

        let result = request
            .send()
            .await
            .map_err(|e| failed("create hosted zone", e).for_resource(name))?;

        result
            .hosted_zone()
            .map(|zone| bare_zone_id(zone.id()).to_string())
            .ok_or_else(|| ProviderError::new("CreateHostedZone returned no zone").for_resource(name))
    }

    async fn delete_hosted_zone(&self, zone_id: &str) -> ProviderResult<()> {
        self.client
            .delete_hosted_zone()
            .id(zone_id)
            .send()
            .await
            .map_err(|e| failed("delete hosted zone", e).for_resource(zone_id))?;
        Ok(())
    }

    async fn list_hosted_zones(&self) -> ProviderResult<Vec<HostedZone>> {
        let result = self
            .client
            .list_hosted_zones()
            .send()
            .await
            .map_err(|e| failed("list hosted zones", e))?;

        Ok(result
            .hosted_zones()
            .iter()
            .map(|zone| HostedZone {
                id: bare_zone_id(zone.id()).to_string(),
                name: zone.name().to_string(),
                private: zone.config().is_some_and(|c| c.private_zone()),
            })
            .collect())
    }

    async fn list_records(&self, zone_id: &str) -> ProviderResult<Vec<DnsRecord>> {
        let result = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(zone_id)
            .send()
            .await
            .map_err(|e| failed("list record sets", e).for_resource(zone_id))?;

        Ok(result.resource_record_sets().iter().map(dns_record).collect())
    }

    async fn change_records(&self, zone_id: &str, changes: &[RecordChange]) -> ProviderResult<()> {
        use aws_sdk_route53::types::ChangeBatch;

        if changes.is_empty() {
            return Ok(());
        }
        let batch = ChangeBatch::builder()
            .set_changes(Some(changes.iter().map(change).collect::<ProviderResult<Vec<_>>>()?))
            .build()
            .map_err(|e| ProviderError::new(format!("Failed to build change batch: {}", e)))?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| failed("change record sets", e).for_resource(zone_id))?;
        Ok(())
    }

    async fn change_tags(&self, zone_id: &str, tags: &Tags) -> ProviderResult<()> {
        use aws_sdk_route53::types::Tag;

        if tags.is_empty() {
            return Ok(());
        }
        self.client
            .change_tags_for_resource()
            .resource_type(TagResourceType::Hostedzone)
            .resource_id(zone_id)
            .set_add_tags(Some(
                tags.iter()
                    .map(|(k, v)| Tag::builder().key(k).value(v).build())
                    .collect(),
            ))
            .send()
            .await
            .map_err(|e| failed("change tags", e).for_resource(zone_id))?;
        Ok(())
    }

    async fn list_tags(&self, zone_id: &str) -> ProviderResult<Tags> {
        let result = self
            .client
            .list_tags_for_resource()
            .resource_type(TagResourceType::Hostedzone)
            .resource_id(zone_id)
            .send()
            .await
            .map_err(|e| failed("list tags", e).for_resource(zone_id))?;

        Ok(result
            .resource_tag_set()
            .map(|set| collect_tags(set.tags().iter().map(|t| (t.key(), t.value()))))
            .unwrap_or_default())
    }
}
