//! Error types shared by every adapter

use std::time::Duration;

use thiserror::Error;

use crate::event::{Action, ResourceKind};
use crate::provider::ProviderError;

/// Everything that can end an event in the `errored` state
#[derive(Debug, Error)]
pub enum Error {
    /// A required field is missing or empty
    #[error("{kind} {field} invalid")]
    Invalid {
        kind: ResourceKind,
        field: &'static str,
    },

    /// A field is present but its value is not acceptable
    #[error("{kind} {field} invalid: {reason}")]
    OutOfRange {
        kind: ResourceKind,
        field: &'static str,
        reason: String,
    },

    /// The action is not meaningful for this resource type
    #[error("{kind}.{action}.aws not supported")]
    Unsupported { kind: ResourceKind, action: Action },

    /// The subject could not be resolved to a resource type and action
    #[error("Invalid subject: {0}")]
    Subject(String),

    /// The event body is not valid JSON for this resource type
    #[error("Failed to decode {kind} event: {reason}")]
    Decode { kind: ResourceKind, reason: String },

    /// Credential material could not be decrypted
    #[error("Datacenter credentials invalid: {0}")]
    Credentials(String),

    /// The provider rejected or failed a call
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A poll exceeded its deadline
    #[error("Timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    /// A poll was cancelled before the provider converged
    #[error("Cancelled while waiting for {what}")]
    Cancelled { what: String },
}

impl Error {
    pub fn invalid(kind: ResourceKind, field: &'static str) -> Self {
        Self::Invalid { kind, field }
    }

    pub fn out_of_range(kind: ResourceKind, field: &'static str, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            kind,
            field,
            reason: reason.into(),
        }
    }

    pub fn unsupported(kind: ResourceKind, action: Action) -> Self {
        Self::Unsupported { kind, action }
    }

    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials(message.into())
    }

    /// Stable name of the error class, for callers that branch on the cause
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "invalid",
            Self::OutOfRange { .. } => "out_of_range",
            Self::Unsupported { .. } => "unsupported",
            Self::Subject(_) => "subject",
            Self::Decode { .. } => "decode",
            Self::Credentials(_) => "credentials",
            Self::Provider(_) => "provider",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// The field a validation error refers to
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { field, .. } | Self::OutOfRange { field, .. } => Some(*field),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
