//! Resource - Element types shared by event bodies, provider clients and the differ
//!
//! Event bodies carry loosely-typed, optional fields. Once an event has been
//! validated, the adapters convert those fields into the element types below,
//! which are what the provider clients accept and what the differ compares.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::differ::NaturalKey;

/// Key/value tags as they appear on events and provider objects
pub type Tags = BTreeMap<String, String>;

/// Returns true when every key/value pair in `filter` is present in `tags`.
///
/// An empty filter matches everything.
pub fn tags_match(filter: &Tags, tags: &Tags) -> bool {
    filter
        .iter()
        .all(|(key, value)| tags.get(key).is_some_and(|v| v == value))
}

/// Tags to apply to a named object: the caller's tags plus `Name`, unless the
/// caller already set one.
pub fn named_tags(name: &str, tags: &Tags) -> Tags {
    let mut tags = tags.clone();
    tags.entry("Name".to_string())
        .or_insert_with(|| name.to_string());
    tags
}

/// Direction of a firewall rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Ingress,
    Egress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ingress => write!(f, "ingress"),
            Direction::Egress => write!(f, "egress"),
        }
    }
}

/// Protocol value meaning "all protocols"
pub const ALL_PROTOCOLS: &str = "-1";

/// Normalize a protocol name the way the provider reports it.
///
/// `all`, `any` and `-1` collapse to `-1`, the IANA numbers of tcp, udp and
/// icmp map to their names, everything else is lower-cased.
pub fn normalize_protocol(protocol: &str) -> String {
    match protocol.trim().to_ascii_lowercase().as_str() {
        "all" | "any" | "-1" => ALL_PROTOCOLS.to_string(),
        "6" => "tcp".to_string(),
        "17" => "udp".to_string(),
        "1" => "icmp".to_string(),
        other => other.to_string(),
    }
}

/// One firewall rule: a single CIDR, protocol and port range in one direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRule {
    pub direction: Direction,
    pub cidr: String,
    pub protocol: String,
    pub from_port: i32,
    pub to_port: i32,
    /// Free-form text the provider keeps alongside the rule; not part of identity
    pub description: Option<String>,
}

impl FirewallRule {
    pub fn new(
        direction: Direction,
        cidr: impl Into<String>,
        protocol: &str,
        from_port: i32,
        to_port: i32,
    ) -> Self {
        let protocol = normalize_protocol(protocol);
        // The provider ignores ports for all-protocol rules and reports none back.
        let (from_port, to_port) = if protocol == ALL_PROTOCOLS {
            (0, 65535)
        } else {
            (from_port, to_port)
        };
        Self {
            direction,
            cidr: cidr.into(),
            protocol,
            from_port,
            to_port,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The rule every new security group starts with: all traffic out to anywhere
    pub fn default_egress() -> Self {
        Self::new(Direction::Egress, "0.0.0.0/0", ALL_PROTOCOLS, 0, 65535)
    }
}

impl NaturalKey for FirewallRule {
    type Key = (Direction, String, String, i32, i32);

    fn natural_key(&self) -> Self::Key {
        (
            self.direction,
            self.cidr.clone(),
            self.protocol.clone(),
            self.from_port,
            self.to_port,
        )
    }
}

/// A load balancer listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub load_balancer_port: i32,
    pub instance_port: i32,
    pub protocol: String,
    pub ssl_certificate_id: Option<String>,
}

impl NaturalKey for Listener {
    type Key = i32;

    fn natural_key(&self) -> i32 {
        self.load_balancer_port
    }

    fn requires_replacement(&self, observed: &Self) -> bool {
        self.instance_port != observed.instance_port
            || !self.protocol.eq_ignore_ascii_case(&observed.protocol)
            || self.ssl_certificate_id != observed.ssl_certificate_id
    }
}

/// Membership of a plain identifier: backend instances, subnets, security
/// groups and policy ARNs are all compared by the identifier itself.
impl NaturalKey for String {
    type Key = String;

    fn natural_key(&self) -> String {
        self.clone()
    }
}

/// A block device attachment on a compute instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeAttachment {
    pub volume_id: String,
    pub device: String,
}

impl NaturalKey for VolumeAttachment {
    type Key = String;

    fn natural_key(&self) -> String {
        self.volume_id.clone()
    }
}

/// Strip the trailing dot of a fully-qualified DNS name
pub fn normalize_dns_name(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// A DNS record set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: String,
    pub values: Vec<String>,
    pub ttl: Option<i64>,
}

impl DnsRecord {
    pub fn new(name: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record_type: record_type.into(),
            values: Vec::new(),
            ttl: None,
        }
    }

    pub fn with_values(mut self, values: Vec<String>, ttl: Option<i64>) -> Self {
        self.values = values;
        self.ttl = ttl;
        self
    }

    /// SOA and NS records of the zone apex, which the provider manages itself
    pub fn zone_defaults(zone_name: &str) -> Vec<DnsRecord> {
        vec![
            DnsRecord::new(zone_name, "SOA"),
            DnsRecord::new(zone_name, "NS"),
        ]
    }

    fn sorted_values(&self) -> Vec<&str> {
        let mut values: Vec<&str> = self.values.iter().map(String::as_str).collect();
        values.sort_unstable();
        values
    }
}

impl NaturalKey for DnsRecord {
    type Key = (String, String);

    fn natural_key(&self) -> Self::Key {
        (
            normalize_dns_name(&self.name).to_ascii_lowercase(),
            self.record_type.to_ascii_uppercase(),
        )
    }

    fn requires_replacement(&self, observed: &Self) -> bool {
        self.sorted_values() != observed.sorted_values() || self.ttl != observed.ttl
    }
}

/// Canned or explicit access for an S3 grantee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GranteeType {
    CanonicalUser,
    AmazonCustomerByEmail,
    Group,
}

impl GranteeType {
    /// Accepts both the short names used on events and the provider names
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "id" | "CanonicalUser" => Some(Self::CanonicalUser),
            "emailaddress" | "AmazonCustomerByEmail" => Some(Self::AmazonCustomerByEmail),
            "uri" | "Group" => Some(Self::Group),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CanonicalUser => "CanonicalUser",
            Self::AmazonCustomerByEmail => "AmazonCustomerByEmail",
            Self::Group => "Group",
        }
    }
}

/// One grant on a bucket ACL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub grantee: String,
    pub grantee_type: GranteeType,
    pub permission: String,
}
