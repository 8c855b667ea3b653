//! Compute family: instances, block volumes and their public addressing

use async_trait::async_trait;

use super::{AddressAllocation, Filter, ProviderResult};
use crate::resource::{Tags, VolumeAttachment};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceRequest {
    pub subnet_id: String,
    pub image_id: String,
    pub instance_type: String,
    pub private_ip: Option<String>,
    pub key_name: Option<String>,
    /// Already base64-encoded
    pub user_data: Option<String>,
    pub security_group_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Unknown,
}

impl InstanceState {
    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDescription {
    pub instance_id: String,
    pub state: InstanceState,
    pub instance_type: Option<String>,
    pub image_id: Option<String>,
    pub subnet_id: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub key_name: Option<String>,
    pub security_group_ids: Vec<String>,
    pub root_device_name: Option<String>,
    pub volumes: Vec<VolumeAttachment>,
    pub tags: Tags,
}

impl InstanceDescription {
    /// Attachment backing the root device, which must never be detached
    pub fn root_volume(&self) -> Option<&VolumeAttachment> {
        let root = self.root_device_name.as_deref()?;
        self.volumes.iter().find(|v| v.device == root)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VolumeRequest {
    pub availability_zone: String,
    pub volume_type: String,
    pub size: Option<i32>,
    pub iops: Option<i32>,
    pub encrypted: Option<bool>,
    pub kms_key_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VolumeDescription {
    pub volume_id: String,
    pub availability_zone: Option<String>,
    pub volume_type: Option<String>,
    pub size: Option<i32>,
    pub iops: Option<i32>,
    pub encrypted: Option<bool>,
    pub kms_key_id: Option<String>,
    pub tags: Tags,
}

#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Launches exactly one instance and returns its id
    async fn run_instance(&self, request: &InstanceRequest) -> ProviderResult<String>;

    async fn describe_instance(&self, instance_id: &str)
    -> ProviderResult<Option<InstanceDescription>>;

    async fn describe_instances(&self, filters: &[Filter])
    -> ProviderResult<Vec<InstanceDescription>>;

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<()>;

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<()>;

    async fn terminate_instance(&self, instance_id: &str) -> ProviderResult<()>;

    async fn modify_instance_type(&self, instance_id: &str, instance_type: &str)
    -> ProviderResult<()>;

    async fn modify_instance_groups(&self, instance_id: &str, group_ids: &[String])
    -> ProviderResult<()>;

    async fn attach_volume(&self, instance_id: &str, volume: &VolumeAttachment)
    -> ProviderResult<()>;

    async fn detach_volume(&self, instance_id: &str, volume: &VolumeAttachment)
    -> ProviderResult<()>;

    async fn allocate_address(&self) -> ProviderResult<AddressAllocation>;

    async fn associate_address(&self, instance_id: &str, allocation_id: &str)
    -> ProviderResult<()>;

    async fn release_address(&self, allocation_id: &str) -> ProviderResult<()>;

    async fn create_volume(&self, request: &VolumeRequest) -> ProviderResult<String>;

    async fn delete_volume(&self, volume_id: &str) -> ProviderResult<()>;

    async fn describe_volumes(&self, filters: &[Filter]) -> ProviderResult<Vec<VolumeDescription>>;

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> ProviderResult<()>;
}
