//! Identity family: roles, managed policies and instance profiles

use async_trait::async_trait;

use super::ProviderResult;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleDescription {
    pub role_id: String,
    pub arn: String,
    pub name: String,
    pub path: Option<String>,
    pub description: Option<String>,
    pub assume_role_policy_document: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicyDescription {
    pub policy_id: Option<String>,
    pub arn: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub description: Option<String>,
    pub default_version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceProfileDescription {
    pub instance_profile_id: String,
    pub arn: String,
    pub name: String,
    pub path: Option<String>,
    pub role_names: Vec<String>,
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn create_role(
        &self,
        name: &str,
        assume_role_policy_document: &str,
        description: Option<&str>,
        path: Option<&str>,
    ) -> ProviderResult<RoleDescription>;

    async fn delete_role(&self, name: &str) -> ProviderResult<()>;

    async fn list_roles(&self) -> ProviderResult<Vec<RoleDescription>>;

    /// ARNs of the managed policies attached to the role
    async fn list_attached_role_policies(&self, role_name: &str) -> ProviderResult<Vec<String>>;

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()>;

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()>;

    async fn create_policy(
        &self,
        name: &str,
        document: &str,
        description: Option<&str>,
        path: Option<&str>,
    ) -> ProviderResult<PolicyDescription>;

    async fn delete_policy(&self, arn: &str) -> ProviderResult<()>;

    /// Policies owned by the account
    async fn list_local_policies(&self) -> ProviderResult<Vec<PolicyDescription>>;

    /// Document of one policy version, already URL-decoded
    async fn policy_document(&self, arn: &str, version_id: &str)
    -> ProviderResult<Option<String>>;

    async fn create_instance_profile(
        &self,
        name: &str,
        path: Option<&str>,
    ) -> ProviderResult<InstanceProfileDescription>;

    /// `None` while the profile is not yet visible
    async fn get_instance_profile(
        &self,
        name: &str,
    ) -> ProviderResult<Option<InstanceProfileDescription>>;

    async fn list_instance_profiles(&self) -> ProviderResult<Vec<InstanceProfileDescription>>;

    async fn add_role_to_instance_profile(&self, profile: &str, role: &str)
    -> ProviderResult<()>;

    async fn remove_role_from_instance_profile(&self, profile: &str, role: &str)
    -> ProviderResult<()>;

    async fn delete_instance_profile(&self, name: &str) -> ProviderResult<()>;
}
