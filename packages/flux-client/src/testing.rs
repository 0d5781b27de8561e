//! Testing utilities including a scripted in-memory broker.
//!
//! These are useful for testing code that talks to Flux without a running
//! instance.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};

use crate::error::{ClientError, Result};
use crate::handle::{Connector, Endpoint, Handle};
use crate::types::{CONFIG_GET_TOPIC, JOB_LIST_TOPIC};

/// Scripted state of one broker reachable through [`MockBroker`].
#[derive(Debug, Clone, Default)]
pub struct MockInstance {
    pub rank: Option<u32>,
    pub attrs: HashMap<String, String>,
    pub jobs: Vec<Value>,
    pub config: Option<Value>,
    /// Topics that fail with an error response
    pub failing_topics: Vec<String>,
}

/// Record of a call made to the mock broker.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Open { endpoint: Endpoint },
    Rank { endpoint: Endpoint },
    AttrGet { endpoint: Endpoint, name: String },
    Rpc { endpoint: Endpoint, topic: String, payload: Value },
    Close { endpoint: Endpoint },
}

/// A mock broker implementing [`Connector`].
///
/// Instances are keyed by endpoint; opening an endpoint with no scripted
/// instance fails like an unreachable socket would.
#[derive(Default, Clone)]
pub struct MockBroker {
    instances: Arc<RwLock<HashMap<Endpoint, MockInstance>>>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockBroker {
    /// Create a broker with no reachable instances.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the instance answering at `endpoint`.
    pub fn with_instance(self, endpoint: Endpoint, instance: MockInstance) -> Self {
        self.instances.write().unwrap().insert(endpoint, instance);
        self
    }

    /// Make the default endpoint answer with `rank`.
    pub fn with_rank(self, rank: u32) -> Self {
        self.update(Endpoint::Default, |i| i.rank = Some(rank));
        self
    }

    /// Set an attribute on the default endpoint.
    pub fn with_attr(self, name: &str, value: &str) -> Self {
        self.update(Endpoint::Default, |i| {
            i.attrs.insert(name.to_string(), value.to_string());
        });
        self
    }

    /// Append a job to the default endpoint's listing.
    pub fn with_job(self, job: Value) -> Self {
        self.update(Endpoint::Default, |i| i.jobs.push(job));
        self
    }

    /// Make `topic` fail on the default endpoint.
    pub fn with_failing_topic(self, topic: &str) -> Self {
        self.update(Endpoint::Default, |i| i.failing_topics.push(topic.to_string()));
        self
    }

    /// Make `uri` reachable with the given configuration object.
    pub fn with_child_config(self, uri: &str, config: Value) -> Self {
        self.update(Endpoint::uri(uri), |i| i.config = Some(config));
        self
    }

    fn update(&self, endpoint: Endpoint, f: impl FnOnce(&mut MockInstance)) {
        let mut instances = self.instances.write().unwrap();
        f(instances.entry(endpoint).or_default());
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }

    /// Clear recorded calls.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    /// Number of handles opened.
    pub fn open_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Open { .. }))
    }

    /// Number of handles dropped.
    pub fn close_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Close { .. }))
    }

    /// Number of RPCs sent to `topic` on any endpoint.
    pub fn rpc_count(&self, topic: &str) -> usize {
        self.count(|c| matches!(c, MockCall::Rpc { topic: t, .. } if t == topic))
    }

    /// Payloads of every RPC sent to `topic`, in order.
    pub fn rpc_payloads(&self, topic: &str) -> Vec<Value> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MockCall::Rpc {
                    topic: t, payload, ..
                } if t == topic => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    /// Endpoints opened, in order.
    pub fn opened_endpoints(&self) -> Vec<Endpoint> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MockCall::Open { endpoint } => Some(endpoint.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.read().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: MockCall) {
        self.calls.write().unwrap().push(call);
    }
}

impl Connector for MockBroker {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Handle>> {
        let instance = self.instances.read().unwrap().get(endpoint).cloned();
        let Some(instance) = instance else {
            return Err(ClientError::Connect {
                uri: endpoint.to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        };
        self.record(MockCall::Open {
            endpoint: endpoint.clone(),
        });
        Ok(Box::new(MockHandle {
            broker: self.clone(),
            endpoint: endpoint.clone(),
            instance,
        }))
    }
}

struct MockHandle {
    broker: MockBroker,
    endpoint: Endpoint,
    instance: MockInstance,
}

impl MockHandle {
    fn respond(&self, topic: &str) -> Result<Value> {
        let fail = |kind: io::ErrorKind| ClientError::Rpc {
            topic: topic.to_string(),
            source: io::Error::from(kind),
        };
        if self.instance.failing_topics.iter().any(|t| t == topic) {
            return Err(fail(io::ErrorKind::Other));
        }
        match topic {
            JOB_LIST_TOPIC => Ok(json!({ "jobs": self.instance.jobs })),
            CONFIG_GET_TOPIC => self
                .instance
                .config
                .clone()
                .ok_or_else(|| fail(io::ErrorKind::Unsupported)),
            _ => Err(fail(io::ErrorKind::Unsupported)),
        }
    }
}

impl Handle for MockHandle {
    fn rank(&self) -> Result<u32> {
        self.broker.record(MockCall::Rank {
            endpoint: self.endpoint.clone(),
        });
        self.instance
            .rank
            .ok_or_else(|| ClientError::Rank(io::Error::from(io::ErrorKind::Other)))
    }

    fn attr_get(&self, name: &str) -> Result<String> {
        self.broker.record(MockCall::AttrGet {
            endpoint: self.endpoint.clone(),
            name: name.to_string(),
        });
        self.instance
            .attrs
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::Attr {
                name: name.to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })
    }

    fn rpc(&self, topic: &str, payload: Value) -> Result<Value> {
        self.broker.record(MockCall::Rpc {
            endpoint: self.endpoint.clone(),
            topic: topic.to_string(),
            payload,
        });
        self.respond(topic)
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.broker.record(MockCall::Close {
            endpoint: self.endpoint.clone(),
        });
    }
}
