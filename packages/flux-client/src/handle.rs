//! Broker handles and the connector that opens them.
//!
//! A [`Handle`] is one open connection. It is closed when dropped, so a
//! handle acquired anywhere in a call chain is released on every return path
//! without explicit cleanup.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::types::{
    GuestAccessConfig, JobListRequest, JobListResponse, CONFIG_GET_TOPIC, JOB_LIST_TOPIC,
};

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Endpoint {
    /// The enclosing instance, located by the transport's own rules
    #[default]
    Default,
    /// An explicit URI such as `local:///run/flux/local`
    Uri(String),
}

impl Endpoint {
    pub fn uri(uri: impl Into<String>) -> Self {
        Endpoint::Uri(uri.into())
    }

    pub fn as_uri(&self) -> Option<&str> {
        match self {
            Endpoint::Default => None,
            Endpoint::Uri(uri) => Some(uri),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Default => f.write_str("(default)"),
            Endpoint::Uri(uri) => f.write_str(uri),
        }
    }
}

/// An open broker connection.
pub trait Handle {
    /// This broker's rank within the instance.
    fn rank(&self) -> Result<u32>;

    /// Look up a broker attribute.
    fn attr_get(&self, name: &str) -> Result<String>;

    /// Send a request to `topic` on any rank and wait for its response.
    fn rpc(&self, topic: &str, payload: Value) -> Result<Value>;
}

/// Opens handles.
pub trait Connector {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Handle>>;
}

impl<C: Connector + ?Sized> Connector for &C {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Handle>> {
        (**self).open(endpoint)
    }
}

/// Typed requests layered over [`Handle::rpc`].
impl dyn Handle + '_ {
    /// Send a typed request and decode the typed response.
    pub fn call<T: DeserializeOwned>(&self, topic: &str, payload: Value) -> Result<T> {
        let response = self.rpc(topic, payload)?;
        Ok(serde_json::from_value(response)?)
    }

    /// Query the job listing service.
    pub fn list_jobs(&self, request: &JobListRequest) -> Result<JobListResponse> {
        tracing::debug!(max_entries = request.max_entries, "Listing jobs");
        self.call(JOB_LIST_TOPIC, serde_json::to_value(request)?)
    }

    /// Fetch the guest access settings from the broker configuration.
    pub fn guest_access_config(&self) -> Result<GuestAccessConfig> {
        self.call(CONFIG_GET_TOPIC, Value::Null)
    }

    /// Read an attribute holding a base-10 user id.
    pub fn attr_get_uid(&self, name: &str) -> Result<u32> {
        let value = self.attr_get(name)?;
        value.parse::<u32>().map_err(|_| ClientError::InvalidAttr {
            name: name.to_string(),
            value,
        })
    }
}
