//! Storage family: object buckets

use async_trait::async_trait;

use super::ProviderResult;
use crate::resource::{Grant, Tags};

/// Bucket owner, needed when writing explicit grants
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BucketOwner {
    pub id: Option<String>,
    pub display_name: Option<String>,
}

/// Access control to write on a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketAcl {
    Canned(String),
    Grants { owner: BucketOwner, grants: Vec<Grant> },
}

#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Returns the bucket location reported by the provider
    async fn create_bucket(
        &self,
        name: &str,
        acl: Option<&str>,
        location: Option<&str>,
    ) -> ProviderResult<Option<String>>;

    async fn delete_bucket(&self, name: &str) -> ProviderResult<()>;

    async fn list_buckets(&self) -> ProviderResult<Vec<String>>;

    async fn put_bucket_acl(&self, name: &str, acl: &BucketAcl) -> ProviderResult<()>;

    async fn bucket_owner(&self, name: &str) -> ProviderResult<BucketOwner>;

    async fn bucket_grants(&self, name: &str) -> ProviderResult<Vec<Grant>>;

    async fn bucket_location(&self, name: &str) -> ProviderResult<Option<String>>;

    async fn put_bucket_tags(&self, name: &str, tags: &Tags) -> ProviderResult<()>;

    /// A bucket without a tag set yields an empty map rather than an error
    async fn bucket_tags(&self, name: &str) -> ProviderResult<Tags>;
}
