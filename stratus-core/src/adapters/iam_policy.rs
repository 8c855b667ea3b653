//! Customer managed IAM policies

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use crate::adapter::{Adapter, Context, immutable};
use crate::credentials::Session;
use crate::error::Result;
use crate::event::{Action, Event, Header, Query, ResourceKind};
use crate::provider::{Connector, IdentityApi, ProviderResult};
use crate::resource::Tags;
use crate::validate::require;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IamPolicy {
    #[serde(rename = "iam_policy_aws_id")]
    pub policy_id: Option<String>,
    #[serde(rename = "iam_policy_arn")]
    pub policy_arn: Option<String>,
    pub name: Option<String>,
    pub policy_document: Option<String>,
    pub description: Option<String>,
    pub path: Option<String>,
}

pub struct IamPolicyAdapter {
    identity: Arc<dyn IdentityApi>,
}

#[async_trait]
impl Adapter for IamPolicyAdapter {
    type Resource = IamPolicy;

    const KIND: ResourceKind = ResourceKind::IamPolicy;

    async fn connect(connector: &dyn Connector, session: &Session, _context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            identity: connector.identity(session).await?,
        })
    }

    fn supports(action: Action) -> bool {
        immutable(action)
    }

    fn validate(action: Action, event: &Event<IamPolicy>) -> Result<()> {
        let policy = &event.resource;
        match action {
            Action::Create => {
                require(Self::KIND, "name", &policy.name)?;
                require(Self::KIND, "policy_document", &policy.policy_document)?;
            }
            Action::Delete => {
                require(Self::KIND, "iam_policy_arn", &policy.policy_arn)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<IamPolicy>) -> Result<()> {
        let policy = &event.resource;
        let name = require(Self::KIND, "name", &policy.name)?;
        let document = require(Self::KIND, "policy_document", &policy.policy_document)?;

        let created = self
            .identity
            .create_policy(
                name,
                document,
                policy.description.as_deref().filter(|d| !d.is_empty()),
                policy.path.as_deref().filter(|p| !p.is_empty()),
            )
            .await?;
        info!("Created policy {} ({:?})", name, created.arn);

        event.resource.policy_id = created.policy_id;
        event.resource.policy_arn = created.arn;
        Ok(())
    }

    async fn delete(&self, event: &mut Event<IamPolicy>) -> Result<()> {
        let arn = require(Self::KIND, "iam_policy_arn", &event.resource.policy_arn)?;

        self.identity.delete_policy(arn).await?;
        info!("Deleted policy {}", arn);
        Ok(())
    }

    async fn find(&self, _query: &Query<IamPolicy>) -> Result<Vec<Event<IamPolicy>>> {
        let mut found = Vec::new();
        for policy in self.identity.list_local_policies().await? {
            let document = match (policy.arn.as_deref(), policy.default_version_id.as_deref()) {
                (Some(arn), Some(version)) => self.identity.policy_document(arn, version).await?,
                _ => None,
            };
            let name = policy.name.clone().unwrap_or_default();

            found.push(Event::new(
                Header::for_component(Self::KIND, &name, Tags::new()),
                IamPolicy {
                    policy_id: policy.policy_id,
                    policy_arn: policy.arn,
                    name: policy.name,
                    policy_document: document,
                    description: policy.description,
                    path: policy.path,
                },
            ));
        }
        Ok(found)
    }
}
