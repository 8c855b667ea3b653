//! Event - Subjects, envelopes and the normalized outcome of an event
//!
//! A subject such as `firewall.update.aws` is resolved once into a
//! [`ResourceKind`] and an [`Action`]. Bodies are JSON documents made of a
//! common [`Header`] plus resource-specific fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;
use crate::resource::Tags;

/// Provider segment every subject must end with
pub const PROVIDER: &str = "aws";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
    Find,
    Get,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Find => "find",
            Action::Get => "get",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "find" => Ok(Action::Find),
            "get" => Ok(Action::Get),
            other => Err(Error::Subject(format!("unknown action '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Vpc,
    Network,
    InternetGateway,
    Nat,
    Firewall,
    Instance,
    EbsVolume,
    Elb,
    S3,
    Route53,
    RdsInstance,
    RdsCluster,
    IamRole,
    IamPolicy,
    IamInstanceProfile,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 15] = [
        ResourceKind::Vpc,
        ResourceKind::Network,
        ResourceKind::InternetGateway,
        ResourceKind::Nat,
        ResourceKind::Firewall,
        ResourceKind::Instance,
        ResourceKind::EbsVolume,
        ResourceKind::Elb,
        ResourceKind::S3,
        ResourceKind::Route53,
        ResourceKind::RdsInstance,
        ResourceKind::RdsCluster,
        ResourceKind::IamRole,
        ResourceKind::IamPolicy,
        ResourceKind::IamInstanceProfile,
    ];

    /// Name used in subjects and in the `_component` field
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Network => "network",
            ResourceKind::InternetGateway => "internet_gateway",
            ResourceKind::Nat => "nat",
            ResourceKind::Firewall => "firewall",
            ResourceKind::Instance => "instance",
            ResourceKind::EbsVolume => "ebs_volume",
            ResourceKind::Elb => "elb",
            ResourceKind::S3 => "s3",
            ResourceKind::Route53 => "route53",
            ResourceKind::RdsInstance => "rds_instance",
            ResourceKind::RdsCluster => "rds_cluster",
            ResourceKind::IamRole => "iam_role",
            ResourceKind::IamPolicy => "iam_policy",
            ResourceKind::IamInstanceProfile => "iam_instance_profile",
        }
    }

    /// `<kind>::<name>`, the component id used on normalized find results
    pub fn component_id(&self, name: &str) -> String {
        format!("{}::{}", self.as_str(), name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::Subject(format!("unknown resource type '{}'", s)))
    }
}

/// A parsed `<kind>.<action>.<provider>` subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subject {
    pub kind: ResourceKind,
    pub action: Action,
}

impl Subject {
    pub fn new(kind: ResourceKind, action: Action) -> Self {
        Self { kind, action }
    }

    pub fn parse(subject: &str) -> Result<Self, Error> {
        let mut parts = subject.split('.');
        let (Some(kind), Some(action), Some(provider), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::Subject(format!(
                "'{}' is not of the form <type>.<action>.{}",
                subject, PROVIDER
            )));
        };

        if provider != PROVIDER {
            return Err(Error::Subject(format!("unsupported provider '{}'", provider)));
        }

        Ok(Self {
            kind: kind.parse()?,
            action: action.parse()?,
        })
    }

    pub fn is_collection(&self) -> bool {
        self.action == Action::Find
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.kind, self.action, PROVIDER)
    }
}

/// Reads an explicit JSON `null` as the default value, for lists and maps
pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Lifecycle marker carried in `_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Completed,
    Errored,
    /// Whatever the caller sent before processing
    #[serde(other)]
    Received,
}

/// Fields common to every single-resource event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "_uuid", default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(rename = "_batch_id", default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(rename = "_provider", default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(rename = "_component", default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(rename = "_component_id", default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(rename = "_state", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<EventState>,
    #[serde(rename = "_action", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_secret_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Tags,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl Header {
    /// Header of a normalized find result
    pub fn for_component(kind: ResourceKind, name: &str, tags: Tags) -> Self {
        Self {
            provider: Some(PROVIDER.to_string()),
            component: Some(kind.as_str().to_string()),
            component_id: Some(kind.component_id(name)),
            tags,
            ..Default::default()
        }
    }
}

/// A single-resource event: common header plus resource fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event<R> {
    #[serde(flatten)]
    pub header: Header,
    #[serde(flatten)]
    pub resource: R,
}

impl<R> Event<R> {
    pub fn new(header: Header, resource: R) -> Self {
        Self { header, resource }
    }

    pub fn complete(&mut self) {
        self.header.state = Some(EventState::Completed);
        self.header.error_message = None;
    }

    pub fn fail(&mut self, error: &Error) {
        self.header.state = Some(EventState::Errored);
        self.header.error_message = Some(error.to_string());
    }
}

/// A find request and, once processed, its results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query<R> {
    #[serde(rename = "_uuid", default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(rename = "_batch_id", default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_secret_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter_region: Option<String>,
    /// Every pair must be present on a result for it to be kept
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Tags,
    #[serde(
        default,
        alias = "results",
        deserialize_with = "nullable",
        bound(deserialize = "R: Deserialize<'de>")
    )]
    pub components: Vec<Event<R>>,
    #[serde(rename = "_state", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<EventState>,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl<R> Query<R> {
    pub fn complete(&mut self) {
        self.state = Some(EventState::Completed);
        self.error_message = None;
    }

    pub fn fail(&mut self, error: &Error) {
        self.state = Some(EventState::Errored);
        self.error_message = Some(error.to_string());
    }
}

/// Outcome of dispatching one event
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The inbound subject, verbatim
    pub subject: String,
    pub state: EventState,
    /// Outbound JSON body, always present
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_completed(&self) -> bool {
        self.state == EventState::Completed
    }

    /// `<subject>.done` or `<subject>.error`
    pub fn reply_subject(&self) -> String {
        let suffix = if self.is_completed() { "done" } else { "error" };
        format!("{}.{}", self.subject, suffix)
    }

    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}
