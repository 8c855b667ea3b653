//! Block storage volumes

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use super::{event_tags, name_tag};
use crate::adapter::{Adapter, Context, immutable};
use crate::credentials::Session;
use crate::error::Result;
use crate::event::{Action, Event, Header, Query, ResourceKind};
use crate::provider::compute::VolumeRequest;
use crate::provider::{ComputeApi, Connector, Filter, ProviderResult};
use crate::validate::{require, small_int};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EbsVolume {
    #[serde(rename = "volume_aws_id")]
    pub volume_id: Option<String>,
    pub name: Option<String>,
    pub availability_zone: Option<String>,
    pub volume_type: Option<String>,
    /// GiB
    pub size: Option<i64>,
    pub iops: Option<i64>,
    pub encrypted: Option<bool>,
    #[serde(rename = "encryption_key_id")]
    pub kms_key_id: Option<String>,
    pub vpc_id: Option<String>,
}

pub struct EbsVolumeAdapter {
    compute: Arc<dyn ComputeApi>,
}

#[async_trait]
impl Adapter for EbsVolumeAdapter {
    type Resource = EbsVolume;

    const KIND: ResourceKind = ResourceKind::EbsVolume;

    async fn connect(connector: &dyn Connector, session: &Session, _context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            compute: connector.compute(session).await?,
        })
    }

    fn supports(action: Action) -> bool {
        immutable(action)
    }

    fn validate(action: Action, event: &Event<EbsVolume>) -> Result<()> {
        let volume = &event.resource;
        match action {
            Action::Create => {
                require(Self::KIND, "availability_zone", &volume.availability_zone)?;
                require(Self::KIND, "volume_type", &volume.volume_type)?;
                require(Self::KIND, "name", &volume.name)?;
                small_int(Self::KIND, "size", volume.size)?;
                small_int(Self::KIND, "iops", volume.iops)?;
            }
            Action::Delete => {
                require(Self::KIND, "volume_aws_id", &volume.volume_id)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<EbsVolume>) -> Result<()> {
        let volume = &event.resource;
        let request = VolumeRequest {
            availability_zone: require(Self::KIND, "availability_zone", &volume.availability_zone)?
                .to_string(),
            volume_type: require(Self::KIND, "volume_type", &volume.volume_type)?.to_string(),
            size: small_int(Self::KIND, "size", volume.size)?,
            iops: small_int(Self::KIND, "iops", volume.iops)?,
            encrypted: volume.encrypted,
            kms_key_id: volume.kms_key_id.clone().filter(|k| !k.is_empty()),
        };

        let volume_id = self.compute.create_volume(&request).await?;
        info!("Created volume {} in {}", volume_id, request.availability_zone);
        event.resource.volume_id = Some(volume_id.clone());

        let tags = event_tags(event, event.resource.name.as_deref());
        if !tags.is_empty() {
            self.compute.create_tags(&volume_id, &tags).await?;
        }
        Ok(())
    }

    async fn delete(&self, event: &mut Event<EbsVolume>) -> Result<()> {
        let volume_id = require(Self::KIND, "volume_aws_id", &event.resource.volume_id)?.to_string();

        self.compute.delete_volume(&volume_id).await?;
        info!("Deleted volume {}", volume_id);
        Ok(())
    }

    async fn find(&self, query: &Query<EbsVolume>) -> Result<Vec<Event<EbsVolume>>> {
        let volumes = self
            .compute
            .describe_volumes(&Filter::from_tags(&query.tags))
            .await?;

        Ok(volumes
            .into_iter()
            .map(|volume| {
                let name = name_tag(&volume.tags).unwrap_or_default();
                Event::new(
                    Header::for_component(Self::KIND, &name, volume.tags),
                    EbsVolume {
                        volume_id: Some(volume.volume_id),
                        name: Some(name),
                        availability_zone: volume.availability_zone,
                        volume_type: volume.volume_type,
                        size: volume.size.map(i64::from),
                        iops: volume.iops.map(i64::from),
                        encrypted: volume.encrypted,
                        kms_key_id: volume.kms_key_id,
                        vpc_id: None,
                    },
                )
            })
            .collect())
    }
}
