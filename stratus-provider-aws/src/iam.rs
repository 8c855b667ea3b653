//! IAM roles, customer managed policies and instance profiles
//!
//! IAM hands policy documents back URL-encoded; they are decoded here so
//! callers compare them with what they sent.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_iam::types::{InstanceProfile, Policy, Role};
use stratus_core::provider::identity::{
    InstanceProfileDescription, PolicyDescription, RoleDescription,
};
use stratus_core::provider::{IdentityApi, ProviderError, ProviderResult};

use crate::failed;

pub struct IamApi {
    client: IamClient,
}

impl IamApi {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: IamClient::new(config),
        }
    }
}

fn decode_document(document: &str) -> ProviderResult<String> {
    urlencoding::decode(document)
        .map(|d| d.into_owned())
        .map_err(|e| ProviderError::new("Failed to decode policy document").with_cause(e))
}

fn role(role: &Role) -> ProviderResult<RoleDescription> {
    Ok(RoleDescription {
        role_id: role.role_id().to_string(),
        arn: role.arn().to_string(),
        name: role.role_name().to_string(),
        path: Some(role.path().to_string()),
        description: role.description().map(String::from),
        assume_role_policy_document: role
            .assume_role_policy_document()
            .map(decode_document)
            .transpose()?,
    })
}

fn policy(policy: &Policy) -> PolicyDescription {
    PolicyDescription {
        policy_id: policy.policy_id().map(String::from),
        arn: policy.arn().map(String::from),
        name: policy.policy_name().map(String::from),
        path: policy.path().map(String::from),
        description: policy.description().map(String::from),
        default_version_id: policy.default_version_id().map(String::from),
    }
}

fn instance_profile(profile: &InstanceProfile) -> InstanceProfileDescription {
    InstanceProfileDescription {
        instance_profile_id: profile.instance_profile_id().to_string(),
        arn: profile.arn().to_string(),
        name: profile.instance_profile_name().to_string(),
        path: Some(profile.path().to_string()),
        role_names: profile.roles().iter().map(|r| r.role_name().to_string()).collect(),
    }
}

#[async_trait]
impl IdentityApi for IamApi {
    async fn create_role(
        &self,
        name: &str,
        assume_role_policy_document: &str,
        description: Option<&str>,
        path: Option<&str>,
    ) -> ProviderResult<RoleDescription> {
        let result = self
            .client
            .create_role()
            .role_name(name)
            .assume_role_policy_document(assume_role_policy_document)
            .set_description(description.map(String::from))
            .set_path(path.map(String::from))
            .send()
            .await
            .map_err(|e| failed("create role", e).for_resource(name))?;

        result
            .role()
            .map(role)
            .transpose()?
            .ok_or_else(|| ProviderError::new("CreateRole returned no role").for_resource(name))
    }

    async fn delete_role(&self, name: &str) -> ProviderResult<()> {
        self.client
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| failed("delete role", e).for_resource(name))?;
        Ok(())
    }

    async fn list_roles(&self) -> ProviderResult<Vec<RoleDescription>> {
        let result = self
            .client
            .list_roles()
            .send()
            .await
            .map_err(|e| failed("list roles", e))?;

        result.roles().iter().map(role).collect()
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> ProviderResult<Vec<String>> {
        let result = self
            .client
            .list_attached_role_policies()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| failed("list attached role policies", e).for_resource(role_name))?;

        Ok(crate::owned(result.attached_policies(), |p| p.policy_arn()))
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()> {
        self.client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| failed("attach role policy", e).for_resource(role_name))?;
        Ok(())
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()> {
        self.client
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| failed("detach role policy", e).for_resource(role_name))?;
        Ok(())
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &str,
        description: Option<&str>,
        path: Option<&str>,
    ) -> ProviderResult<PolicyDescription> {
        let result = self
            .client
            .create_policy()
            .policy_name(name)
            .policy_document(document)
            .set_description(description.map(String::from))
            .set_path(path.map(String::from))
            .send()
            .await
            .map_err(|e| failed("create policy", e).for_resource(name))?;

        result
            .policy()
            .map(policy)
            .ok_or_else(|| ProviderError::new("CreatePolicy returned no policy").for_resource(name))
    }

    async fn delete_policy(&self, arn: &str) -> ProviderResult<()> {
        self.client
            .delete_policy()
            .policy_arn(arn)
            .send()
            .await
            .map_err(|e| failed("delete policy", e).for_resource(arn))?;
        Ok(())
    }

    async fn list_local_policies(&self) -> ProviderResult<Vec<PolicyDescription>> {
        use aws_sdk_iam::types::PolicyScopeType;

        let result = self
            .client
            .list_policies()
            .scope(PolicyScopeType::Local)
            .send()
            .await
            .map_err(|e| failed("list policies", e))?;

        Ok(result.policies().iter().map(policy).collect())
    }

    async fn policy_document(&self, arn: &str, version_id: &str)
    -> ProviderResult<Option<String>> {
        let result = self
            .client
            .get_policy_version()
            .policy_arn(arn)
            .version_id(version_id)
            .send()
            .await
            .map_err(|e| failed("get policy version", e).for_resource(arn))?;

        result
            .policy_version()
            .and_then(|v| v.document())
            .map(decode_document)
            .transpose()
    }

    async fn create_instance_profile(
        &self,
        name: &str,
        path: Option<&str>,
    ) -> ProviderResult<InstanceProfileDescription> {
        let result = self
            .client
            .create_instance_profile()
            .instance_profile_name(name)
            .set_path(path.map(String::from))
            .send()
            .await
            .map_err(|e| failed("create instance profile", e).for_resource(name))?;

        result.instance_profile().map(instance_profile).ok_or_else(|| {
            ProviderError::new("CreateInstanceProfile returned no profile").for_resource(name)
        })
    }

    async fn get_instance_profile(
        &self,
        name: &str,
    ) -> ProviderResult<Option<InstanceProfileDescription>> {
        match self
            .client
            .get_instance_profile()
            .instance_profile_name(name)
            .send()
            .await
        {
            Ok(result) => Ok(result.instance_profile().map(instance_profile)),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_no_such_entity_exception()) => {
                Ok(None)
            }
            Err(e) => Err(failed("get instance profile", e).for_resource(name)),
        }
    }

    async fn list_instance_profiles(&self) -> ProviderResult<Vec<InstanceProfileDescription>> {
        let result = self
            .client
            .list_instance_profiles()
            .send()
            .await
            .map_err(|e| failed("list instance profiles", e))?;

        Ok(result.instance_profiles().iter().map(instance_profile).collect())
    }

    async fn add_role_to_instance_profile(&self, profile: &str, role: &str)
    -> ProviderResult<()> {
        self.client
            .add_role_to_instance_profile()
            .instance_profile_name(profile)
            .role_name(role)
            .send()
            .await
            .map_err(|e| failed("add role to instance profile", e).for_resource(profile))?;
        Ok(())
    }

    async fn remove_role_from_instance_profile(&self, profile: &str, role: &str)
    -> ProviderResult<()> {
        self.client
            .remove_role_from_instance_profile()
            .instance_profile_name(profile)
            .role_name(role)
            .send()
            .await
            .map_err(|e| failed("remove role from instance profile", e).for_resource(profile))?;
        Ok(())
    }

    async fn delete_instance_profile(&self, name: &str) -> ProviderResult<()> {
        self.client
            .delete_instance_profile()
            .instance_profile_name(name)
            .send()
            .await
            .map_err(|e| failed("delete instance profile", e).for_resource(name))?;
        Ok(())
    }
}
