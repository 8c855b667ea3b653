//! S3 buckets

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::{BucketCannedAcl, Permission, Type};
use log::debug;
use stratus_core::provider::storage::{BucketAcl, BucketOwner};
use stratus_core::provider::{ProviderError, ProviderResult, StorageApi};
use stratus_core::resource::{Grant, GranteeType, Tags};

use crate::failed;

/// Region that must not be sent as a location constraint
const DEFAULT_REGION: &str = "us-east-1";

pub struct S3Api {
    client: S3Client,
    region: String,
}

impl S3Api {
    pub fn new(config: &SdkConfig, region: &str) -> Self {
        Self {
            client: S3Client::new(config),
            region: region.to_string(),
        }
    }
}

/// Location constraint for a new bucket, falling back to the session region
fn location_constraint(region: &str, location: Option<&str>) -> Option<String> {
    let location = location.filter(|l| !l.is_empty()).unwrap_or(region);
    (location != DEFAULT_REGION).then(|| location.to_string())
}

fn sdk_grant(grant: &Grant) -> ProviderResult<aws_sdk_s3::types::Grant> {
    use aws_sdk_s3::types::Grantee;

    let grantee = Grantee::builder().r#type(Type::from(grant.grantee_type.as_str()));
    let grantee = match grant.grantee_type {
        GranteeType::CanonicalUser => grantee.id(&grant.grantee),
        GranteeType::AmazonCustomerByEmail => grantee.email_address(&grant.grantee),
        GranteeType::Group => grantee.uri(&grant.grantee),
    }
    .build()
    .map_err(|e| ProviderError::new(format!("Failed to build grantee: {}", e)))?;

    Ok(aws_sdk_s3::types::Grant::builder()
        .grantee(grantee)
        .permission(Permission::from(grant.permission.as_str()))
        .build())
}

fn grant(raw: &aws_sdk_s3::types::Grant) -> Option<Grant> {
    let grantee = raw.grantee()?;
    let grantee_type = GranteeType::parse(grantee.r#type().as_str())?;
    let value = match grantee_type {
        GranteeType::CanonicalUser => grantee.id(),
        GranteeType::AmazonCustomerByEmail => grantee.email_address(),
        GranteeType::Group => grantee.uri(),
    }?;
    Some(Grant {
        grantee: value.to_string(),
        grantee_type,
        permission: raw.permission()?.as_str().to_string(),
    })
}

#[async_trait]
impl StorageApi for S3Api {
    async fn create_bucket(
        &self,
        name: &str,
        acl: Option<&str>,
        location: Option<&str>,
    ) -> ProviderResult<Option<String>> {
        use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};

        let mut request = self
            .client
            .create_bucket()
            .bucket(name)
            .set_acl(acl.filter(|a| !a.is_empty()).map(BucketCannedAcl::from));
        if let Some(constraint) = location_constraint(&self.region, location) {
            debug!("Creating bucket {} in {}", name, constraint);
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(constraint.as_str()))
                    .build(),
            );
        }

        let result = request
            .send()
            .await
            .map_err(|e| failed("create bucket", e).for_resource(name))?;

        Ok(result.location().map(String::from))
    }

    async fn delete_bucket(&self, name: &str) -> ProviderResult<()> {
        self.client
            .delete_bucket()
            .bucket(name)
            .send()
            .await
            .map_err(|e| failed("delete bucket", e).for_resource(name))?;
        Ok(())
    }

    async fn list_buckets(&self) -> ProviderResult<Vec<String>> {
        let result = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| failed("list buckets", e))?;

        Ok(crate::owned(result.buckets(), |b| b.name()))
    }

    async fn put_bucket_acl(&self, name: &str, acl: &BucketAcl) -> ProviderResult<()> {
        use aws_sdk_s3::types::{AccessControlPolicy, Owner};

        let request = self.client.put_bucket_acl().bucket(name);
        let request = match acl {
            BucketAcl::Canned(canned) => request.acl(BucketCannedAcl::from(canned.as_str())),
            BucketAcl::Grants { owner, grants } => {
                let grants = grants.iter().map(sdk_grant).collect::<ProviderResult<Vec<_>>>()?;
                request.access_control_policy(
                    AccessControlPolicy::builder()
                        .owner(
                            Owner::builder()
                                .set_id(owner.id.clone())
                                .set_display_name(owner.display_name.clone())
                                .build(),
                        )
                        .set_grants(Some(grants))
                        .build(),
                )
            }
        };

        request
            .send()
            .await
            .map_err(|e| failed("put bucket ACL", e).for_resource(name))?;
        Ok(())
    }

    async fn bucket_owner(&self, name: &str) -> ProviderResult<BucketOwner> {
        let result = self
            .client
            .get_bucket_acl()
            .bucket(name)
            .send()
            .await
            .map_err(|e| failed("get bucket ACL", e).for_resource(name))?;

        Ok(result
            .owner()
            .map(|o| BucketOwner {
                id: o.id().map(String::from),
                display_name: o.display_name().map(String::from),
            })
            .unwrap_or_default())
    }

    async fn bucket_grants(&self, name: &str) -> ProviderResult<Vec<Grant>> {
        let result = self
            .client
            .get_bucket_acl()
            .bucket(name)
            .send()
            .await
            .map_err(|e| failed("get bucket ACL", e).for_resource(name))?;

        Ok(result.grants().iter().filter_map(grant).collect())
    }

    async fn bucket_location(&self, name: &str) -> ProviderResult<Option<String>> {
        let result = self
            .client
            .get_bucket_location()
            .bucket(name)
            .send()
            .await
            .map_err(|e| failed("get bucket location", e).for_resource(name))?;

        Ok(result
            .location_constraint()
            .map(|l| l.as_str().to_string())
            .filter(|l| !l.is_empty()))
    }

    async fn put_bucket_tags(&self, name: &str, tags: &Tags) -> ProviderResult<()> {
        use aws_sdk_s3::types::{Tag, Tagging};

        let tag_set = tags
            .iter()
            .map(|(k, v)| {
                Tag::builder()
                    .key(k)
                    .value(v)
                    .build()
                    .map_err(|e| ProviderError::new(format!("Failed to build tag: {}", e)))
            })
            .collect::<ProviderResult<Vec<_>>>()?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| ProviderError::new(format!("Failed to build tagging: {}", e)))?;

        self.client
            .put_bucket_tagging()
            .bucket(name)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| failed("put bucket tags", e).for_resource(name))?;
        Ok(())
    }

    async fn bucket_tags(&self, name: &str) -> ProviderResult<Tags> {
        let result = match self.client.get_bucket_tagging().bucket(name).send().await {
            Ok(result) => result,
            Err(e) if e.as_service_error().and_then(|s| s.code()) == Some("NoSuchTagSet") => {
                return Ok(Tags::new());
            }
            Err(e) => return Err(failed("get bucket tags", e).for_resource(name)),
        };

        Ok(result
            .tag_set()
            .iter()
            .map(|t| (t.key().to_string(), t.value().to_string()))
            .collect())
    }
}
