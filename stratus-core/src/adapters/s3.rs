//! S3 buckets and their access control lists

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use crate::adapter::{Adapter, Context};
use crate::credentials::Session;
use crate::error::{Error, Result};
use crate::event::{Action, Event, Header, Query, ResourceKind, nullable};
use crate::provider::storage::BucketAcl;
use crate::provider::{Connector, ProviderResult, StorageApi};
use crate::resource::{Grant, GranteeType};
use crate::validate::require;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grantee {
    /// Canonical user id, email address or group URI, depending on `type`
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub grantee_type: Option<String>,
    pub permissions: Option<String>,
}

impl Grantee {
    fn to_grant(&self) -> Result<Grant> {
        const KIND: ResourceKind = ResourceKind::S3;

        let grantee_type = require(KIND, "type", &self.grantee_type)?;
        let grantee_type = GranteeType::parse(grantee_type).ok_or_else(|| {
            Error::out_of_range(
                KIND,
                "type",
                format!("{} is not a grantee type", grantee_type),
            )
        })?;
        Ok(Grant {
            grantee: require(KIND, "id", &self.id)?.to_string(),
            grantee_type,
            permission: require(KIND, "permissions", &self.permissions)?.to_string(),
        })
    }
}

impl From<Grant> for Grantee {
    fn from(grant: Grant) -> Self {
        Self {
            id: Some(grant.grantee),
            grantee_type: Some(grant.grantee_type.as_str().to_string()),
            permissions: Some(grant.permission),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct S3 {
    pub name: Option<String>,
    /// Canned ACL; when empty the grantees are written as explicit grants
    pub acl: Option<String>,
    pub bucket_location: Option<String>,
    pub bucket_uri: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub grantees: Vec<Grantee>,
}

impl S3 {
    fn canned_acl(&self) -> Option<&str> {
        self.acl.as_deref().filter(|acl| !acl.is_empty())
    }

    fn grants(&self) -> Result<Vec<Grant>> {
        self.grantees.iter().map(Grantee::to_grant).collect()
    }
}

pub struct S3Adapter {
    storage: Arc<dyn StorageApi>,
}

impl S3Adapter {
    async fn apply_acl(&self, name: &str, bucket: &S3) -> Result<()> {
        let acl = match bucket.canned_acl() {
            Some(canned) => BucketAcl::Canned(canned.to_string()),
            None => BucketAcl::Grants {
                owner: self.storage.bucket_owner(name).await?,
                grants: bucket.grants()?,
            },
        };
        self.storage.put_bucket_acl(name, &acl).await?;
        Ok(())
    }

    async fn tag(&self, name: &str, event: &Event<S3>) -> Result<()> {
        if !event.header.tags.is_empty() {
            self.storage.put_bucket_tags(name, &event.header.tags).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for S3Adapter {
    type Resource = S3;

    const KIND: ResourceKind = ResourceKind::S3;

    async fn connect(connector: &dyn Connector, session: &Session, _context: Context)
    -> ProviderResult<Self> {
        Ok(Self {
            storage: connector.storage(session).await?,
        })
    }

    fn validate(action: Action, event: &Event<S3>) -> Result<()> {
        require(Self::KIND, "name", &event.resource.name)?;
        if action != Action::Delete {
            event.resource.grants()?;
        }
        Ok(())
    }

    async fn create(&self, event: &mut Event<S3>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?.to_string();
        let location = event
            .resource
            .bucket_location
            .as_deref()
            .filter(|l| !l.is_empty());

        let uri = self
            .storage
            .create_bucket(&name, event.resource.canned_acl(), location)
            .await?;
        info!("Created bucket {}", name);
        event.resource.bucket_uri = uri;

        if !event.resource.grantees.is_empty() {
            self.apply_acl(&name, &event.resource).await?;
        }
        self.tag(&name, event).await
    }

    async fn update(&self, event: &mut Event<S3>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?.to_string();

        self.apply_acl(&name, &event.resource).await?;
        self.tag(&name, event).await
    }

    async fn delete(&self, event: &mut Event<S3>) -> Result<()> {
        let name = require(Self::KIND, "name", &event.resource.name)?;

        self.storage.delete_bucket(name).await?;
        info!("Deleted bucket {}", name);
        Ok(())
    }

    async fn find(&self, _query: &Query<S3>) -> Result<Vec<Event<S3>>> {
        let mut found = Vec::new();
        for name in self.storage.list_buckets().await? {
            let tags = self.storage.bucket_tags(&name).await?;
            let grants = self.storage.bucket_grants(&name).await?;
            let location = self.storage.bucket_location(&name).await?;

            found.push(Event::new(
                Header::for_component(Self::KIND, &name, tags),
                S3 {
                    name: Some(name),
                    bucket_location: location,
                    grantees: grants.into_iter().map(Grantee::from).collect(),
                    ..Default::default()
                },
            ));
        }
        Ok(found)
    }
}
