//! Per-request log record.
//!
//! The outermost dispatcher stage creates one [`RequestEvent`] per request and
//! emits it as a single structured log line once the response is ready.
//! Handlers and the envelope verifier enrich it through an [`EventHandle`]
//! taken from the request extensions.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_addr: Option<SocketAddr>,
    pub endpoint: String,
    pub method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
    pub received: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl RequestEvent {
    pub fn new(method: &str, endpoint: &str, received: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            real_ip: None,
            client_addr: None,
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            user_agent: String::new(),
            requester: None,
            contacts: Vec::new(),
            errors: Vec::new(),
            extra: BTreeMap::new(),
            received,
            status: None,
            response_time_ms: None,
        }
    }
}

/// Shared, mutable view of the current request's event.
#[derive(Debug, Clone)]
pub struct EventHandle(Arc<Mutex<RequestEvent>>);

impl EventHandle {
    pub fn new(event: RequestEvent) -> Self {
        Self(Arc::new(Mutex::new(event)))
    }

    pub fn add_error<S: Into<String>>(&self, error: S) {
        self.0.lock().errors.push(error.into());
    }

    pub fn set_requester(&self, id: i64, contacts: &[String]) {
        let mut event = self.0.lock();
        event.requester = Some(id);
        event.contacts = contacts.to_vec();
    }

    pub fn insert_extra<T: Serialize>(&self, key: &str, value: T) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.0.lock().extra.insert(key.to_string(), value);
    }

    /// Address the client connected from: `X-Real-IP` when a proxy set one,
    /// otherwise the peer address.
    pub fn client_ip(&self) -> Option<IpAddr> {
        let event = self.0.lock();
        event
            .real_ip
            .as_deref()
            .and_then(|ip| ip.trim().parse().ok())
            .or_else(|| event.client_addr.map(|addr| addr.ip()))
    }

    pub fn requester(&self) -> Option<i64> {
        self.0.lock().requester
    }

    pub fn snapshot(&self) -> RequestEvent {
        self.0.lock().clone()
    }

    /// Record the outcome and emit the event.
    pub fn finish(&self, status: u16, response_time_ms: u64) {
        let event = {
            let mut event = self.0.lock();
            event.status = Some(status);
            event.response_time_ms = Some(response_time_ms);
            event.clone()
        };

        let extra = serde_json::to_string(&event.extra).unwrap_or_default();
        info!(
            target: "wfe::request",
            request_id = %event.id,
            method = %event.method,
            endpoint = %event.endpoint,
            status,
            response_time_ms,
            requester = ?event.requester,
            real_ip = ?event.real_ip,
            client_addr = ?event.client_addr,
            user_agent = %event.user_agent,
            errors = ?event.errors,
            extra = %extra,
            "Request completed"
        );
    }
}
