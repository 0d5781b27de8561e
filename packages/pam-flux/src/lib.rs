//! PAM account module for Flux-managed nodes.
//!
//! Grants a user access to a node only while that user has a job in RUN
//! state that includes the node. With the `allow-guest-user` argument, users
//! may also reach rank 0 of a running multi-user instance job owned by the
//! instance owner, provided that child instance sets
//! `access.allow-guest-user`.
//!
//! # Modules
//!
//! - [`options`] - Module arguments
//! - [`guest`] - Guest access to child instances
//! - [`engine`] - Job scan and access reduction
//! - [`driver`] - Verdicts, user lookup and denial notice
//! - [`logging`] - Syslog output scoped to one PAM call
//! - `pam` - Exported `pam_sm_acct_mgmt` (feature `pam`)

pub mod driver;
pub mod engine;
pub mod error;
pub mod guest;
pub mod logging;
pub mod options;

#[cfg(feature = "pam")]
pub mod pam;

pub use driver::{denial_message, Authorizer, Conversation, SystemUsers, UserDirectory, Verdict};
pub use engine::{check_jobs, check_user, decide, AccessCheck, OWNER_ATTR};
pub use error::{PamFluxError, Result};
pub use guest::{uri_to_local, GuestPolicy, InstanceGuestPolicy};
pub use options::{ModuleOptions, ALLOW_GUEST_USER};
