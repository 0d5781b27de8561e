//! Minimal Flux broker client.
//!
//! Opens handles to a local or explicitly addressed broker, reads the
//! broker rank and attributes, and issues the two requests needed to reason
//! about node access: a constrained `job-list.list` and `config.get`.
//!
//! # Example
//!
//! ```rust,ignore
//! use flux_client::{Connector, Constraint, Endpoint, JobListRequest, LibFluxConnector};
//!
//! let h = LibFluxConnector::new().open(&Endpoint::Default)?;
//! let rank = h.rank()?;
//! let request = JobListRequest::new(Constraint::running_on_rank_for_users(rank, &[1000]));
//! for job in h.list_jobs(&request)?.records() {
//!     println!("{:?}", job?);
//! }
//! ```
//!
//! # Modules
//!
//! - [`handle`] - `Handle` and `Connector` traits
//! - [`idset`] - Rank set decoding
//! - [`types`] - Request and response payloads
//! - [`testing`] - Scripted in-memory broker

pub mod error;
pub mod handle;
pub mod idset;
pub mod testing;
pub mod types;

#[cfg(feature = "libflux")]
pub mod libflux;

pub use error::{ClientError, IdSetError, Result};
pub use handle::{Connector, Endpoint, Handle};
pub use idset::IdSet;
pub use types::{
    Constraint, GuestAccessConfig, JobListRequest, JobListResponse, JobRecord, JobState,
    CONFIG_GET_TOPIC, JOB_LIST_TOPIC,
};

#[cfg(feature = "libflux")]
pub use libflux::LibFluxConnector;
