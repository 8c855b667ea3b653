//! Dispatch - Resolve a subject once and drive the matching adapter
//!
//! The dispatcher is the boundary of the library: whatever happens while an
//! event is processed, it answers with a [`Response`] whose body is valid JSON
//! carrying `_state` and, on failure, `error`.

use std::sync::Arc;

use log::{debug, error, info};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::adapter::{Adapter, Context};
use crate::adapters::{
    EbsVolumeAdapter, ElbAdapter, FirewallAdapter, IamInstanceProfileAdapter, IamPolicyAdapter,
    IamRoleAdapter, InstanceAdapter, InternetGatewayAdapter, NatAdapter, NetworkAdapter,
    RdsClusterAdapter, RdsInstanceAdapter, Route53Adapter, S3Adapter, VpcAdapter,
};
use crate::credentials::{CredentialDecryptor, Session};
use crate::error::{Error, Result};
use crate::event::{Action, Event, EventState, Query, ResourceKind, Response, Subject};
use crate::provider::Connector;
use crate::resource::tags_match;
use crate::validate::require;
use crate::wait::{CancelToken, PollConfig};

/// Settings shared by every event a dispatcher handles
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Key for encrypted credentials; `None` means credentials arrive in clear
    pub crypto_key: Option<String>,
    pub poll: PollConfig,
}

pub struct Dispatcher {
    connector: Arc<dyn Connector>,
    decryptor: CredentialDecryptor,
    poll: PollConfig,
    cancel: CancelToken,
}

impl Dispatcher {
    pub fn new(connector: Arc<dyn Connector>, config: &DispatcherConfig) -> Result<Self> {
        Ok(Self {
            connector,
            decryptor: CredentialDecryptor::new(config.crypto_key.as_deref())?,
            poll: config.poll,
            cancel: CancelToken::never(),
        })
    }

    /// Stop in-flight waits when `token` fires
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Process one event and produce its outbound body
    pub async fn dispatch(&self, subject: &str, body: &[u8]) -> Response {
        let (state, body) = match Subject::parse(subject) {
            Ok(parsed) => {
                info!("{} received", parsed);
                self.route(parsed, body).await
            }
            Err(e) => {
                error!("{} rejected: {}", subject, e);
                errored_body(body, &e)
            }
        };

        Response {
            subject: subject.to_string(),
            state,
            body,
        }
    }

    async fn route(&self, subject: Subject, body: &[u8]) -> (EventState, Vec<u8>) {
        match subject.kind {
            ResourceKind::Vpc => self.run::<VpcAdapter>(subject, body).await,
            ResourceKind::Network => self.run::<NetworkAdapter>(subject, body).await,
            ResourceKind::InternetGateway => self.run::<InternetGatewayAdapter>(subject, body).await,
            ResourceKind::Nat => self.run::<NatAdapter>(subject, body).await,
            ResourceKind::Firewall => self.run::<FirewallAdapter>(subject, body).await,
            ResourceKind::Instance => self.run::<InstanceAdapter>(subject, body).await,
            ResourceKind::EbsVolume => self.run::<EbsVolumeAdapter>(subject, body).await,
            ResourceKind::Elb => self.run::<ElbAdapter>(subject, body).await,
            ResourceKind::S3 => self.run::<S3Adapter>(subject, body).await,
            ResourceKind::Route53 => self.run::<Route53Adapter>(subject, body).await,
            ResourceKind::RdsInstance => self.run::<RdsInstanceAdapter>(subject, body).await,
            ResourceKind::RdsCluster => self.run::<RdsClusterAdapter>(subject, body).await,
            ResourceKind::IamRole => self.run::<IamRoleAdapter>(subject, body).await,
            ResourceKind::IamPolicy => self.run::<IamPolicyAdapter>(subject, body).await,
            ResourceKind::IamInstanceProfile => {
                self.run::<IamInstanceProfileAdapter>(subject, body).await
            }
        }
    }

    async fn run<A: Adapter>(&self, subject: Subject, body: &[u8]) -> (EventState, Vec<u8>) {
        if subject.is_collection() {
            self.run_query::<A>(subject, body).await
        } else {
            self.run_single::<A>(subject, body).await
        }
    }

    async fn run_single<A: Adapter>(&self, subject: Subject, body: &[u8]) -> (EventState, Vec<u8>) {
        let mut event: Event<A::Resource> = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                let err = Error::Decode {
                    kind: A::KIND,
                    reason: e.to_string(),
                };
                error!("{} errored: {}", subject, err);
                return errored_body(body, &err);
            }
        };

        match self.process::<A>(subject.action, &mut event).await {
            Ok(()) => {
                event.complete();
                info!("{} completed", subject);
            }
            Err(e) => {
                error!("{} errored: {}", subject, e);
                event.fail(&e);
            }
        }

        let state = event.header.state.unwrap_or(EventState::Errored);
        encode(A::KIND, state, &event, body)
    }

    async fn process<A: Adapter>(&self, action: Action, event: &mut Event<A::Resource>) -> Result<()> {
        if !A::supports(action) {
            return Err(Error::unsupported(A::KIND, action));
        }

        let header = &event.header;
        let credentials = (
            require(A::KIND, "datacenter_region", &header.datacenter_region)?,
            require(A::KIND, "aws_access_key_id", &header.aws_access_key_id)?,
            require(A::KIND, "aws_secret_access_key", &header.aws_secret_access_key)?,
        );
        A::validate(action, event)?;
        let session = self.session(credentials)?;

        let adapter = A::connect(self.connector.as_ref(), &session, self.context()).await?;
        match action {
            Action::Create => adapter.create(event).await,
            Action::Update => adapter.update(event).await,
            Action::Delete => adapter.delete(event).await,
            Action::Find | Action::Get => Err(Error::unsupported(A::KIND, action)),
        }
    }

    async fn run_query<A: Adapter>(&self, subject: Subject, body: &[u8]) -> (EventState, Vec<u8>) {
        let mut query: Query<A::Resource> = match serde_json::from_slice(body) {
            Ok(query) => query,
            Err(e) => {
                let err = Error::Decode {
                    kind: A::KIND,
                    reason: e.to_string(),
                };
                error!("{} errored: {}", subject, err);
                return errored_body(body, &err);
            }
        };
        query.components.clear();

        match self.search::<A>(&query).await {
            Ok(found) => {
                let total = found.len();
                query.components = found
                    .into_iter()
                    .filter(|e| tags_match(&query.tags, &e.header.tags))
                    .collect();
                debug!(
                    "{} kept {} of {} result(s) after tag filter",
                    subject,
                    query.components.len(),
                    total
                );
                query.complete();
                info!("{} completed", subject);
            }
            Err(e) => {
                error!("{} errored: {}", subject, e);
                query.fail(&e);
            }
        }

        let state = query.state.unwrap_or(EventState::Errored);
        encode(A::KIND, state, &query, body)
    }

    async fn search<A: Adapter>(&self, query: &Query<A::Resource>) -> Result<Vec<Event<A::Resource>>> {
        if !A::supports(Action::Find) {
            return Err(Error::unsupported(A::KIND, Action::Find));
        }

        let credentials = (
            require(A::KIND, "datacenter_region", &query.datacenter_region)?,
            require(A::KIND, "aws_access_key_id", &query.aws_access_key_id)?,
            require(A::KIND, "aws_secret_access_key", &query.aws_secret_access_key)?,
        );
        let session = self.session(credentials)?;

        let adapter = A::connect(self.connector.as_ref(), &session, self.context()).await?;
        adapter.find(query).await
    }

    fn session(&self, (region, access_key_id, secret): (&str, &str, &str)) -> Result<Session> {
        self.decryptor.session(region, access_key_id, secret)
    }

    fn context(&self) -> Context {
        Context::new(self.poll, self.cancel.clone())
    }
}

fn encode<T: Serialize>(
    kind: ResourceKind,
    state: EventState,
    value: &T,
    inbound: &[u8],
) -> (EventState, Vec<u8>) {
    match serde_json::to_vec(value) {
        Ok(body) => (state, body),
        Err(e) => errored_body(
            inbound,
            &Error::Decode {
                kind,
                reason: format!("Failed to encode response: {e}"),
            },
        ),
    }
}

/// Mark the inbound document as errored, or build a minimal one when it is not a JSON object
fn errored_body(inbound: &[u8], err: &Error) -> (EventState, Vec<u8>) {
    let mut object = match serde_json::from_slice::<Value>(inbound) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    object.insert("_state".to_string(), Value::from("errored"));
    object.insert("error".to_string(), Value::from(err.to_string()));

    let body = serde_json::to_vec(&Value::Object(object)).unwrap_or_default();
    (EventState::Errored, body)
}
