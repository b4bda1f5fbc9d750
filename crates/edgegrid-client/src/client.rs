//! MetaClient and the generic per-kind ResourceClient.

use std::marker::PhantomData;
use std::time::Duration;

use edgegrid_bus::{Content, Message, MessageBus};
use edgegrid_core::config::EdgeConfig;
use edgegrid_core::modules::{EDGED, META_GROUP, META_MANAGER};
use edgegrid_core::{CloudConnection, Operation, ResourceType};
use edgegrid_state::StateStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// Shared handles behind every resource client.
#[derive(Clone)]
pub struct MetaClient {
    bus: MessageBus,
    store: Option<StateStore>,
    connection: CloudConnection,
    query_timeout: Duration,
    retry_attempts: u32,
    retry_pause: Duration,
    lease_timeout: Duration,
}

impl MetaClient {
    pub fn new(bus: MessageBus, connection: CloudConnection, config: &EdgeConfig) -> Self {
        Self {
            bus,
            store: None,
            connection,
            query_timeout: config.client.query_deadline(),
            retry_attempts: config.client.retry_attempts.max(1),
            retry_pause: config.client.retry_pause(),
            lease_timeout: config.meta_manager.lease_deadline(),
        }
    }

    /// Serve gets for cache-safe types straight from the local store.
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// A client for any kind, decoding objects as `T`.
    pub fn resource<T>(&self, ty: ResourceType) -> ResourceClient<T> {
        ResourceClient {
            client: self.clone(),
            ty,
            _object: PhantomData,
        }
    }

    pub fn config_maps(&self) -> ResourceClient {
        self.resource(ResourceType::ConfigMap)
    }

    pub fn secrets(&self) -> ResourceClient {
        self.resource(ResourceType::Secret)
    }

    pub fn pods(&self) -> ResourceClient {
        self.resource(ResourceType::Pod)
    }

    pub fn pod_status(&self) -> ResourceClient {
        self.resource(ResourceType::PodStatus)
    }

    pub fn nodes(&self) -> ResourceClient {
        self.resource(ResourceType::Node)
    }

    pub fn node_status(&self) -> ResourceClient {
        self.resource(ResourceType::NodeStatus)
    }

    pub fn persistent_volumes(&self) -> ResourceClient {
        self.resource(ResourceType::PersistentVolume)
    }

    pub fn persistent_volume_claims(&self) -> ResourceClient {
        self.resource(ResourceType::PersistentVolumeClaim)
    }

    pub fn volume_attachments(&self) -> ResourceClient {
        self.resource(ResourceType::VolumeAttachment)
    }

    pub fn leases(&self) -> ResourceClient {
        self.resource(ResourceType::Lease)
    }

    pub fn service_account_tokens(&self) -> ResourceClient {
        self.resource(ResourceType::ServiceAccountToken)
    }

    pub fn certificate_signing_requests(&self) -> ResourceClient {
        self.resource(ResourceType::CertificateSigningRequest)
    }

    pub fn events(&self) -> ResourceClient {
        self.resource(ResourceType::Event)
    }
}

/// Get/list/create/update/delete for one resource kind.
pub struct ResourceClient<T = Value> {
    client: MetaClient,
    ty: ResourceType,
    _object: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceClient<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            ty: self.ty,
            _object: PhantomData,
        }
    }
}

impl<T> ResourceClient<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn resource_type(&self) -> ResourceType {
        self.ty
    }

    /// Fetch one object.
    ///
    /// Cache-safe kinds are served from the local store when present;
    /// everything else asks the meta-manager, retrying on failure.
    pub async fn get(&self, namespace: &str, name: &str) -> ClientResult<T> {
        let resource = self.ty.resource(namespace, name);

        if !self.ty.requires_remote_query()
            && let Some(store) = &self.client.store
            && let Some(record) = store.query_by_key(&resource)?
        {
            debug!(%resource, "served from local store");
            return decode_text(&record.value);
        }

        let resp = self.query(&resource).await?;
        decode_single(&resource, &resp)
    }

    /// Every cached object of this kind in `namespace`.
    pub async fn list(&self, namespace: &str) -> ClientResult<Vec<T>> {
        let resource = self.ty.resource(namespace, "");
        let resp = self.query(&resource).await?;
        decode_list(&resp)?
            .into_iter()
            .map(decode_item)
            .collect()
    }

    pub async fn create(&self, namespace: &str, name: &str, object: &T) -> ClientResult<()> {
        let msg = self.message(namespace, name, Operation::Insert, Content::json(object)?);
        self.send(msg).await
    }

    /// Push an updated object.
    ///
    /// Node and pod status updates fail fast while the cloud link is
    /// down. Lease renewals wait for the meta-manager's acknowledgement.
    pub async fn update(&self, namespace: &str, name: &str, object: &T) -> ClientResult<()> {
        if matches!(self.ty, ResourceType::NodeStatus | ResourceType::PodStatus)
            && !self.client.connection.is_connected()
        {
            debug!(resource_type = %self.ty, %name, "status update refused while disconnected");
            return Err(ClientError::Disconnected);
        }

        let msg = self.message(namespace, name, Operation::Update, Content::json(object)?);
        if self.ty == ResourceType::Lease {
            let resp = self
                .client
                .bus
                .send_sync(META_MANAGER, msg, self.client.lease_timeout)
                .await?;
            return check_ack(&resp);
        }
        self.send(msg).await
    }

    pub async fn delete(&self, namespace: &str, name: &str) -> ClientResult<()> {
        let msg = self.message(namespace, name, Operation::Delete, Content::Empty);
        self.send(msg).await
    }

    /// Not served on the edge; succeeds without doing anything.
    pub async fn delete_collection(&self, _namespace: &str) -> ClientResult<()> {
        Ok(())
    }

    /// Not served on the edge; returns no object.
    pub async fn patch(&self, _namespace: &str, _name: &str, _patch: &Value) -> ClientResult<Option<T>> {
        Ok(None)
    }

    fn message(&self, namespace: &str, name: &str, op: Operation, content: Content) -> Message {
        Message::new()
            .build_router(EDGED, META_GROUP, self.ty.resource(namespace, name), op.as_str())
            .fill_body(content)
    }

    async fn send(&self, msg: Message) -> ClientResult<()> {
        self.client.bus.send(META_MANAGER, msg).await?;
        Ok(())
    }

    async fn query(&self, resource: &str) -> ClientResult<Message> {
        let msg = Message::new().build_router(EDGED, META_GROUP, resource, Operation::Query.as_str());
        let attempts = self.client.retry_attempts;
        let mut attempt = 1;
        loop {
            match self
                .client
                .bus
                .send_sync(META_MANAGER, msg.clone(), self.client.query_timeout)
                .await
            {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt >= attempts => return Err(e.into()),
                Err(e) => {
                    warn!(%resource, attempt, error = %e, "query failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.client.retry_pause).await;
                }
            }
        }
    }
}

fn check_ack(resp: &Message) -> ClientResult<()> {
    if resp.is_error() {
        return Err(remote_error(resp));
    }
    Ok(())
}

fn remote_error(resp: &Message) -> ClientError {
    ClientError::Remote(resp.content.as_str().unwrap_or_default().to_string())
}

/// A reply to a single get: the object itself, or a list of 0 or 1 stored values.
fn decode_single<T: DeserializeOwned>(resource: &str, resp: &Message) -> ClientResult<T> {
    if resp.is_error() {
        return Err(remote_error(resp));
    }
    let body: Value = resp.content.decode()?;
    match body {
        Value::Array(mut items) => match items.len() {
            0 => Err(ClientError::NotFound(resource.to_string())),
            1 => decode_item(items.remove(0)),
            n => Err(ClientError::ContentDecode(format!(
                "expected one object for {resource}, got {n}"
            ))),
        },
        object => decode_item(object),
    }
}

fn decode_list(resp: &Message) -> ClientResult<Vec<Value>> {
    if resp.is_error() {
        return Err(remote_error(resp));
    }
    match resp.content.decode::<Value>()? {
        Value::Array(items) => Ok(items),
        other => Err(ClientError::ContentDecode(format!("expected a list, got {other}"))),
    }
}

/// Stored values arrive as JSON text inside the list.
fn decode_item<T: DeserializeOwned>(item: Value) -> ClientResult<T> {
    match item {
        Value::String(text) => decode_text(&text),
        object => serde_json::from_value(object).map_err(|e| ClientError::ContentDecode(e.to_string())),
    }
}

fn decode_text<T: DeserializeOwned>(text: &str) -> ClientResult<T> {
    serde_json::from_str(text).map_err(|e| ClientError::ContentDecode(e.to_string()))
}
