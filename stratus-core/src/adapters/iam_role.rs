//! IAM roles and their managed policy attachments

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::adapter::{Adapter, Context};
use crate::credentials::Session;
use crate::differ::compute_convergence;
use crate::error::Result;
use crate::event::{Action, Event, Header, Query, ResourceKind, nullable};
use crate::provider::{Connector, IdentityApi, ProviderResult};
use crate::resource::Tags;
use crate::validate::{present, require};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IamRole {
    #[serde(rename = "iam_role_aws_id")]
    pub role_id: Option<String>,
    #[serde(rename = "iam_role_arn")]
    pub role_arn: Option<String>,
    pub name: Option<String>,
    pub assume_policy_document: Option<String>,
    /// Names of the policies, kept for the caller
    #[serde(default, deserialize_with = "nullable")]
    pub policies: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub policy_arns: Vec<String>,
    pub description: Option<String>,
    pub path: Option<String>,
}

pub struct IamRoleAdapter {
    identity: Arc<dyn IdentityApi>,
}

#[async_trait]
impl Adapter for IamRoleAdapter {
    type Resource = IamRole;

    const KIND: ResourceKind = ResourceKind::IamRole;

    async fn connect(connector: &dyn Connector, session: &Session, _context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            identity: connector.identity(session).await?,
        })
    }

    fn validate(action: Action, event: &Event<IamRole>) -> Result<()> {
        let role = &event.resource;
        require(Self::KIND, "name", &role.name)?;
        match action {
            Action::Create => {
                require(Self::KIND, "assume_policy_document", &role.assume_policy_document)?;
            }
            Action::Delete => {
                require(Self::KIND, "iam_role_aws_id", &role.role_id)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<IamRole>) -> Result<()> {
        let role = &event.resource;
        let name = require(Self::KIND, "name", &role.name)?.to_string();
        let document = require(Self::KIND, "assume_policy_document", &role.assume_policy_document)?;

        let created = self
            .identity
            .create_role(
                &name,
                document,
                role.description.as_deref().filter(|d| !d.is_empty()),
                role.path.as_deref().filter(|p| !p.is_empty()),
            )
            .await?;
        info!("Created role {} ({})", name, created.role_id);

        for arn in present(&role.policy_arns) {
            self.identity.attach_role_policy(&name, &arn).await?;
        }

        event.resource.role_id = Some(created.role_id);
        event.resource.role_arn = Some(created.arn);
        Ok(())
    }

    async fn update(&self, event: &mut Event<IamRole>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?;

        let attached = self.identity.list_attached_role_policies(name).await?;
        let plan = compute_convergence(&present(&event.resource.policy_arns), &attached, &[]);
        debug!("Role {} policies: {}", name, plan.summary());

        for arn in &plan.to_remove {
            self.identity.detach_role_policy(name, arn).await?;
        }
        for arn in &plan.to_add {
            self.identity.attach_role_policy(name, arn).await?;
        }
        Ok(())
    }

    async fn delete(&self, event: &mut Event<IamRole>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?;

        for arn in self.identity.list_attached_role_policies(name).await? {
            self.identity.detach_role_policy(name, &arn).await?;
        }
        self.identity.delete_role(name).await?;
        info!("Deleted role {}", name);
        Ok(())
    }

    async fn find(&self, _query: &Query<IamRole>) -> Result<Vec<Event<IamRole>>> {
        let mut found = Vec::new();
        for role in self.identity.list_roles().await? {
            let policy_arns = self.identity.list_attached_role_policies(&role.name).await?;
            found.push(Event::new(
                Header::for_component(Self::KIND, &role.name, Tags::new()),
                IamRole {
                    role_id: Some(role.role_id),
                    role_arn: Some(role.arn),
                    name: Some(role.name),
                    assume_policy_document: role.assume_role_policy_document,
                    policy_arns,
                    description: role.description,
                    path: role.path,
                    ..Default::default()
                },
            ));
        }
        Ok(found)
    }
}
