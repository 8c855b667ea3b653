//! IAM instance profiles

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use crate::adapter::{Adapter, Context, immutable};
use crate::credentials::Session;
use crate::error::Result;
use crate::event::{Action, Event, Header, Query, ResourceKind, nullable};
use crate::provider::{Connector, IdentityApi, ProviderResult};
use crate::resource::Tags;
use crate::validate::{present, require};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IamInstanceProfile {
    #[serde(rename = "iam_instance_profile_aws_id")]
    pub instance_profile_id: Option<String>,
    #[serde(rename = "iam_instance_profile_arn")]
    pub instance_profile_arn: Option<String>,
    pub name: Option<String>,
    /// Role names
    #[serde(default, deserialize_with = "nullable")]
    pub roles: Vec<String>,
    pub path: Option<String>,
}

pub struct IamInstanceProfileAdapter {
    identity: Arc<dyn IdentityApi>,
    context: Context,
}

#[async_trait]
impl Adapter for IamInstanceProfileAdapter {
    type Resource = IamInstanceProfile;

    const KIND: ResourceKind = ResourceKind::IamInstanceProfile;

    async fn connect(connector: &dyn Connector, session: &Session, context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            identity: connector.identity(session).await?,
            context,
        })
    }

    fn supports(action: Action) -> bool {
        immutable(action)
    }

    fn validate(action: Action, event: &Event<IamInstanceProfile>) -> Result<()> {
        let profile = &event.resource;
        require(Self::KIND, "name", &profile.name)?;
        if action == Action::Delete {
            require(
                Self::KIND,
                "iam_instance_profile_aws_id",
                &profile.instance_profile_id,
            )?;
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<IamInstanceProfile>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?.to_string();
        let path = event.resource.path.as_deref().filter(|p| !p.is_empty());

        let created = self.identity.create_instance_profile(&name, path).await?;
        self.context
            .wait_for("instance profile to exist", || {
                let identity = self.identity.clone();
                let name = name.clone();
                async move {
                    let profile = identity.get_instance_profile(&name).await?;
                    Ok(profile.map(|_| ()))
                }
            })
            .await?;
        info!("Created instance profile {} ({})", name, created.instance_profile_id);

        for role in present(&event.resource.roles) {
            self.identity
                .add_role_to_instance_profile(&name, &role)
                .await?;
        }

        event.resource.instance_profile_id = Some(created.instance_profile_id);
        event.resource.instance_profile_arn = Some(created.arn);
        Ok(())
    }

    async fn delete(&self, event: &mut Event<IamInstanceProfile>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?;

        for role in present(&event.resource.roles) {
            self.identity
                .remove_role_from_instance_profile(name, &role)
                .await?;
        }
        self.identity.delete_instance_profile(name).await?;
        info!("Deleted instance profile {}", name);
        Ok(())
    }

    async fn find(
        &self,
        _query: &Query<IamInstanceProfile>,
    ) -> Result<Vec<Event<IamInstanceProfile>>> {
        Ok(self
            .identity
            .list_instance_profiles()
            .await?
            .into_iter()
            .map(|profile| {
                Event::new(
                    Header::for_component(Self::KIND, &profile.name, Tags::new()),
                    IamInstanceProfile {
                        instance_profile_id: Some(profile.instance_profile_id),
                        instance_profile_arn: Some(profile.arn),
                        name: Some(profile.name),
                        roles: profile.role_names,
                        path: profile.path,
                    },
                )
            })
            .collect())
    }
}
