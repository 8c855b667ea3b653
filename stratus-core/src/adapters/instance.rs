//! Compute instances
//!
//! Instances are changed while stopped: an update stops the instance, applies
//! the new type, security groups and volume attachments, then starts it again.
//! The root volume is never detached, whatever the event lists.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{event_tags, name_tag};
use crate::adapter::{Adapter, Context};
use crate::credentials::Session;
use crate::differ::compute_convergence;
use crate::error::Result;
use crate::event::{Action, Event, Header, Query, ResourceKind, nullable};
use crate::provider::compute::{InstanceDescription, InstanceRequest, InstanceState};
use crate::provider::{ComputeApi, Connector, Filter, ProviderError, ProviderResult};
use crate::resource::VolumeAttachment;
use crate::validate::{present, require};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceVolume {
    pub name: Option<String>,
    pub device: Option<String>,
    #[serde(rename = "volume_aws_id")]
    pub volume_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(rename = "instance_aws_id")]
    pub instance_id: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub instance_type: Option<String>,
    /// Private address requested for the instance
    pub ip: Option<String>,
    pub key_pair: Option<String>,
    pub user_data: Option<String>,
    pub public_ip: Option<String>,
    pub elastic_ip: Option<String>,
    #[serde(rename = "elastic_ip_aws_id")]
    pub elastic_ip_id: Option<String>,
    pub assign_elastic_ip: Option<bool>,
    #[serde(rename = "network_aws_id")]
    pub network_id: Option<String>,
    pub network_is_public: Option<bool>,
    #[serde(rename = "security_group_aws_ids", default, deserialize_with = "nullable")]
    pub security_group_ids: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub volumes: Vec<InstanceVolume>,
    pub vpc_id: Option<String>,
}

impl Instance {
    fn attachments(&self) -> Result<Vec<VolumeAttachment>> {
        const KIND: ResourceKind = ResourceKind::Instance;

        self.volumes
            .iter()
            .map(|volume| {
                Ok(VolumeAttachment {
                    volume_id: require(KIND, "volume_aws_id", &volume.volume_id)?.to_string(),
                    device: require(KIND, "device", &volume.device)?.to_string(),
                })
            })
            .collect()
    }
}

fn encode_user_data(data: &str) -> String {
    STANDARD.encode(data.as_bytes())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}

pub struct InstanceAdapter {
    compute: Arc<dyn ComputeApi>,
    context: Context,
}

impl InstanceAdapter {
    async fn wait_for_state(&self, instance_id: &str, state: InstanceState, what: &str)
    -> Result<InstanceDescription> {
        self.wait_for_any(instance_id, &[state], what).await
    }

    async fn wait_for_any(&self, instance_id: &str, states: &[InstanceState], what: &str)
    -> Result<InstanceDescription> {
        self.context
            .wait_for(what, || {
                let compute = self.compute.clone();
                let instance_id = instance_id.to_string();
                async move {
                    let instance = compute
                        .describe_instance(&instance_id)
                        .await?
                        .ok_or_else(|| {
                            ProviderError::new("Could not find an instance with that ID")
                                .for_resource(&instance_id)
                        })?;
                    Ok(states.contains(&instance.state).then_some(instance))
                }
            })
            .await
    }

    /// Detach what the event no longer lists, then attach what is new
    async fn sync_volumes(&self, instance: &InstanceDescription, desired: &[VolumeAttachment]) -> Result<()> {
        let protected: Vec<VolumeAttachment> = instance.root_volume().cloned().into_iter().collect();
        let plan = compute_convergence(desired, &instance.volumes, &protected);
        debug!("{} volumes: {}", instance.instance_id, plan.summary());

        for volume in &plan.to_remove {
            self.compute.detach_volume(&instance.instance_id, volume).await?;
            info!("Detached {} from {}", volume.volume_id, instance.instance_id);
        }
        for volume in &plan.to_add {
            self.compute.attach_volume(&instance.instance_id, volume).await?;
            info!("Attached {} to {} as {}", volume.volume_id, instance.instance_id, volume.device);
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for InstanceAdapter {
    type Resource = Instance;

    const KIND: ResourceKind = ResourceKind::Instance;

    async fn connect(connector: &dyn Connector, session: &Session, context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            compute: connector.compute(session).await?,
            context,
        })
    }

    fn validate(action: Action, event: &Event<Instance>) -> Result<()> {
        let instance = &event.resource;
        require(Self::KIND, "vpc_id", &instance.vpc_id)?;
        if action != Action::Create {
            require(Self::KIND, "instance_aws_id", &instance.instance_id)?;
        }
        if action != Action::Delete {
            require(Self::KIND, "network_aws_id", &instance.network_id)?;
            require(Self::KIND, "name", &instance.name)?;
            require(Self::KIND, "image", &instance.image)?;
            require(Self::KIND, "instance_type", &instance.instance_type)?;
            instance.attachments()?;
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<Instance>) -> Result<()> {
        let request = InstanceRequest {
            subnet_id: require(Self::KIND, "network_aws_id", &event.resource.network_id)?.to_string(),
            image_id: require(Self::KIND, "image", &event.resource.image)?.to_string(),
            instance_type: require(Self::KIND, "instance_type", &event.resource.instance_type)?.to_string(),
            private_ip: non_empty(&event.resource.ip),
            key_name: non_empty(&event.resource.key_pair),
            user_data: event.resource.user_data.as_deref().map(encode_user_data),
            security_group_ids: present(&event.resource.security_group_ids),
        };
        let attachments = event.resource.attachments()?;

        let instance_id = self.compute.run_instance(&request).await?;
        info!("Launched instance {} ({})", instance_id, request.instance_type);
        event.resource.instance_id = Some(instance_id.clone());

        let running = self
            .wait_for_state(&instance_id, InstanceState::Running, "instance to be running")
            .await?;

        event.resource.public_ip = running.public_ip.clone();
        if event.resource.assign_elastic_ip == Some(true) {
            let allocation = self.compute.allocate_address().await?;
            self.compute
                .associate_address(&instance_id, &allocation.allocation_id)
                .await?;
            info!("Associated {} with {}", allocation.public_ip, instance_id);
            event.resource.public_ip = Some(allocation.public_ip.clone());
            event.resource.elastic_ip = Some(allocation.public_ip);
            event.resource.elastic_ip_id = Some(allocation.allocation_id);
        }

        self.sync_volumes(&running, &attachments).await?;

        let tags = event_tags(event, event.resource.name.as_deref());
        if !tags.is_empty() {
            self.compute.create_tags(&instance_id, &tags).await?;
        }
        Ok(())
    }

    async fn update(&self, event: &mut Event<Instance>) -> Result<()> {
        let instance_id = require(Self::KIND, "instance_aws_id", &event.resource.instance_id)?.to_string();
        let instance_type = require(Self::KIND, "instance_type", &event.resource.instance_type)?.to_string();
        let attachments = event.resource.attachments()?;
        let groups = present(&event.resource.security_group_ids);

        self.wait_for_any(
            &instance_id,
            &[InstanceState::Running, InstanceState::Stopped],
            "instance to settle",
        )
        .await?;
        self.compute.stop_instance(&instance_id).await?;
        let stopped = self
            .wait_for_state(&instance_id, InstanceState::Stopped, "instance to stop")
            .await?;

        if stopped.instance_type.as_deref() != Some(instance_type.as_str()) {
            self.compute
                .modify_instance_type(&instance_id, &instance_type)
                .await?;
            info!("Resized {} to {}", instance_id, instance_type);
        }

        let plan = compute_convergence(&groups, &stopped.security_group_ids, &[]);
        debug!("{} security groups: {}", instance_id, plan.summary());
        if !groups.is_empty() && !plan.is_converged() {
            self.compute
                .modify_instance_groups(&instance_id, &groups)
                .await?;
        }

        self.sync_volumes(&stopped, &attachments).await?;

        self.compute.start_instance(&instance_id).await?;
        let running = self
            .wait_for_state(&instance_id, InstanceState::Running, "instance to be running")
            .await?;
        event.resource.public_ip = running.public_ip;

        let tags = event_tags(event, event.resource.name.as_deref());
        if !tags.is_empty() {
            self.compute.create_tags(&instance_id, &tags).await?;
        }
        Ok(())
    }

    async fn delete(&self, event: &mut Event<Instance>) -> Result<()> {
        let instance_id = require(Self::KIND, "instance_aws_id", &event.resource.instance_id)?.to_string();

        self.compute.terminate_instance(&instance_id).await?;
        self.context
            .wait_for("instance to terminate", || {
                let compute = self.compute.clone();
                let instance_id = instance_id.clone();
                async move {
                    Ok(match compute.describe_instance(&instance_id).await? {
                        None => Some(()),
                        Some(i) => (i.state == InstanceState::Terminated).then_some(()),
                    })
                }
            })
            .await?;
        info!("Terminated instance {}", instance_id);

        if let Some(allocation_id) = non_empty(&event.resource.elastic_ip_id) {
            self.compute.release_address(&allocation_id).await?;
            info!("Released address {}", allocation_id);
        }
        Ok(())
    }

    async fn find(&self, query: &Query<Instance>) -> Result<Vec<Event<Instance>>> {
        let mut filters = Filter::from_tags(&query.tags);
        filters.push(Filter::with_values(
            "instance-state-name",
            vec!["running".to_string(), "stopped".to_string()],
        ));
        let instances = self.compute.describe_instances(&filters).await?;

        Ok(instances
            .into_iter()
            .map(|instance| {
                let name = name_tag(&instance.tags).unwrap_or_default();
                let root = instance.root_device_name.clone();
                let volumes = instance
                    .volumes
                    .iter()
                    .filter(|v| root.as_deref() != Some(v.device.as_str()))
                    .map(|v| InstanceVolume {
                        name: None,
                        device: Some(v.device.clone()),
                        volume_id: Some(v.volume_id.clone()),
                    })
                    .collect();
                Event::new(
                    Header::for_component(Self::KIND, &name, instance.tags),
                    Instance {
                        instance_id: Some(instance.instance_id),
                        name: Some(name),
                        image: instance.image_id,
                        instance_type: instance.instance_type,
                        ip: instance.private_ip,
                        key_pair: instance.key_name,
                        public_ip: instance.public_ip,
                        network_id: instance.subnet_id,
                        security_group_ids: instance.security_group_ids,
                        volumes,
                        ..Default::default()
                    },
                )
            })
            .collect())
    }
}
