//! Stratus AWS Provider
//!
//! Implements the provider family traits of `stratus-core` over the AWS SDK.
//! Every event carries its own region and credentials, so the connector
//! builds a fresh SDK configuration per session instead of reading the
//! ambient environment.

mod ec2;
mod elb;
mod iam;
mod rds;
mod route53;
mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{Region, SdkConfig};
use aws_sdk_ec2::config::Credentials;
use log::debug;
use stratus_core::credentials::Session;
use stratus_core::provider::{
    ComputeApi, Connector, DatabaseApi, DnsApi, IdentityApi, LoadBalancingApi, NetworkApi,
    ProviderError, ProviderResult, StorageApi,
};
use stratus_core::resource::Tags;

pub use ec2::Ec2Api;
pub use elb::ElbApi;
pub use iam::IamApi;
pub use rds::RdsApi;
pub use route53::Route53Api;
pub use s3::S3Api;

/// Name reported by the static credentials provider
const CREDENTIALS_SOURCE: &str = "stratus";

/// Opens AWS service clients for an event's session
#[derive(Debug, Clone, Default)]
pub struct AwsConnector;

impl AwsConnector {
    pub fn new() -> Self {
        Self
    }

    async fn config(&self, session: &Session) -> ProviderResult<SdkConfig> {
        if session.region.trim().is_empty() {
            return Err(ProviderError::new("Missing region"));
        }
        debug!("Loading AWS configuration for {}", session.region);

        let credentials = Credentials::new(
            session.credentials.access_key_id.clone(),
            session.credentials.secret_access_key.clone(),
            None,
            None,
            CREDENTIALS_SOURCE,
        );

        Ok(aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(session.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await)
    }
}

#[async_trait]
impl Connector for AwsConnector {
    async fn network(&self, session: &Session) -> ProviderResult<Arc<dyn NetworkApi>> {
        let config = self.config(session).await?;
        Ok(Arc::new(Ec2Api::new(&config)))
    }

    async fn compute(&self, session: &Session) -> ProviderResult<Arc<dyn ComputeApi>> {
        let config = self.config(session).await?;
        Ok(Arc::new(Ec2Api::new(&config)))
    }

    async fn load_balancing(
        &self,
        session: &Session,
    ) -> ProviderResult<Arc<dyn LoadBalancingApi>> {
        let config = self.config(session).await?;
        Ok(Arc::new(ElbApi::new(&config)))
    }

    async fn storage(&self, session: &Session) -> ProviderResult<Arc<dyn StorageApi>> {
        let config = self.config(session).await?;
        Ok(Arc::new(S3Api::new(&config, &session.region)))
    }

    async fn dns(&self, session: &Session) -> ProviderResult<Arc<dyn DnsApi>> {
        let config = self.config(session).await?;
        Ok(Arc::new(Route53Api::new(&config)))
    }

    async fn database(&self, session: &Session) -> ProviderResult<Arc<dyn DatabaseApi>> {
        let config = self.config(session).await?;
        Ok(Arc::new(RdsApi::new(&config)))
    }

    async fn identity(&self, session: &Session) -> ProviderResult<Arc<dyn IdentityApi>> {
        let config = self.config(session).await?;
        Ok(Arc::new(IamApi::new(&config)))
    }
}

/// Wrap an SDK error with the action that failed, keeping the full source chain
pub(crate) fn failed<E: std::error::Error>(action: &str, err: E) -> ProviderError {
    ProviderError::new(format!(
        "Failed to {}: {}",
        action,
        aws_sdk_ec2::error::DisplayErrorContext(&err)
    ))
}

/// Collect provider tag pairs into [`Tags`], skipping pairs without a key
pub(crate) fn collect_tags<'a, I>(pairs: I) -> Tags
where
    I: IntoIterator<Item = (Option<&'a str>, Option<&'a str>)>,
{
    pairs
        .into_iter()
        .filter_map(|(key, value)| {
            key.map(|k| (k.to_string(), value.unwrap_or_default().to_string()))
        })
        .collect()
}

/// Strings of a slice getter, owned
pub(crate) fn owned<T, F>(items: &[T], get: F) -> Vec<String>
where
    F: Fn(&T) -> Option<&str>,
{
    items.iter().filter_map(|i| get(i).map(String::from)).collect()
}
