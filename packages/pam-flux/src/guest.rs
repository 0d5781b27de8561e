//! Guest access to multi-user instance jobs.
//!
//! A job that is itself a Flux instance publishes an `ssh://` URI. The broker
//! on the job's first rank also listens on the local socket named by that
//! URI's path, so rank 0 of the job can open the child instance directly and
//! read whether it opted in to guest users.

use flux_client::{Connector, Endpoint};

use crate::error::{PamFluxError, Result};

const REMOTE_SCHEME: &str = "ssh://";
const LOCAL_SCHEME: &str = "local://";

/// Rewrite a remote instance URI to the local URI of the same broker.
///
/// `ssh://host123/tmp/flux-abc/local-0` becomes
/// `local:///tmp/flux-abc/local-0`.
pub fn uri_to_local(uri: &str) -> Result<String> {
    let fail = || PamFluxError::UriTransform(uri.to_string());

    let rest = uri.strip_prefix(REMOTE_SCHEME).ok_or_else(fail)?;
    let path = rest.find('/').map(|i| &rest[i..]).ok_or_else(fail)?;
    Ok(format!("{LOCAL_SCHEME}{path}"))
}

/// Decides whether a job instance admits guests.
pub trait GuestPolicy {
    /// `uri` is the job's published instance URI, if any.
    fn guest_allowed(&self, uri: Option<&str>) -> bool;
}

/// Asks the child instance itself via its `config.get` service.
pub struct InstanceGuestPolicy<C> {
    connector: C,
}

impl<C: Connector> InstanceGuestPolicy<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    fn query(&self, uri: &str) -> Result<bool> {
        let local_uri = uri_to_local(uri)?;
        let h = self.connector.open(&Endpoint::uri(local_uri))?;
        let config = h.guest_access_config()?;
        Ok(config.allow_guest_user())
    }
}

impl<C: Connector> GuestPolicy for InstanceGuestPolicy<C> {
    fn guest_allowed(&self, uri: Option<&str>) -> bool {
        let Some(uri) = uri else {
            tracing::debug!("job is not a Flux instance");
            return false;
        };
        match self.query(uri) {
            Ok(true) => true,
            Ok(false) => {
                tracing::info!("access.allow-guest-user not enabled in child");
                false
            }
            Err(e) => {
                tracing::error!(uri, error = %e, "failed to check guest access");
                false
            }
        }
    }
}
