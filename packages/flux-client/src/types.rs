//! Request and response payloads for the broker services used by this crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::idset::IdSet;

/// Topic of the job listing service.
pub const JOB_LIST_TOPIC: &str = "job-list.list";

/// Topic returning the broker's current configuration object.
pub const CONFIG_GET_TOPIC: &str = "config.get";

/// Job state machine, encoded as single-bit flags on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum JobState {
    New,
    Depend,
    Priority,
    Sched,
    Run,
    Cleanup,
    Inactive,
}

impl JobState {
    pub fn as_flag(self) -> u32 {
        match self {
            JobState::New => 1,
            JobState::Depend => 2,
            JobState::Priority => 4,
            JobState::Sched => 8,
            JobState::Run => 16,
            JobState::Cleanup => 32,
            JobState::Inactive => 64,
        }
    }
}

impl TryFrom<u32> for JobState {
    type Error = String;

    fn try_from(flag: u32) -> std::result::Result<Self, Self::Error> {
        Ok(match flag {
            1 => JobState::New,
            2 => JobState::Depend,
            4 => JobState::Priority,
            8 => JobState::Sched,
            16 => JobState::Run,
            32 => JobState::Cleanup,
            64 => JobState::Inactive,
            other => return Err(format!("unknown job state {other}")),
        })
    }
}

impl From<JobState> for u32 {
    fn from(state: JobState) -> Self {
        state.as_flag()
    }
}

/// Constraint object accepted by the job listing service.
///
/// Operators nest: `{"and": [ {"userid": [..]}, {"ranks": [..]}, .. ]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constraint {
    #[serde(rename = "and")]
    And(Vec<Constraint>),
    #[serde(rename = "userid")]
    UserId(Vec<u32>),
    /// Ranks are matched as idset strings by the service
    #[serde(rename = "ranks")]
    Ranks(Vec<String>),
    #[serde(rename = "states")]
    States(Vec<u32>),
}

impl Constraint {
    /// Running jobs that include `rank` and belong to any of `uids`.
    pub fn running_on_rank_for_users(rank: u32, uids: &[u32]) -> Self {
        let mut users = uids.to_vec();
        users.dedup();
        Constraint::And(vec![
            Constraint::UserId(users),
            Constraint::Ranks(vec![rank.to_string()]),
            Constraint::States(vec![JobState::Run.as_flag()]),
        ])
    }
}

/// Request body for [`JOB_LIST_TOPIC`].
#[derive(Debug, Clone, Serialize)]
pub struct JobListRequest {
    /// 0 means no limit
    pub max_entries: u32,
    pub attrs: Vec<String>,
    pub constraint: Constraint,
}

impl JobListRequest {
    /// Attributes needed to make an access decision about a job.
    pub const ACCESS_ATTRS: [&'static str; 4] = ["userid", "ranks", "state", "annotations"];

    pub fn new(constraint: Constraint) -> Self {
        Self {
            max_entries: 0,
            attrs: Self::ACCESS_ATTRS.iter().map(|a| a.to_string()).collect(),
            constraint,
        }
    }
}

/// Response body for [`JOB_LIST_TOPIC`].
///
/// Entries stay as raw JSON so one malformed job does not hide the others.
#[derive(Debug, Clone, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<Value>,
}

impl JobListResponse {
    /// Decode each entry independently.
    pub fn records(&self) -> impl Iterator<Item = Result<JobRecord>> + '_ {
        self.jobs
            .iter()
            .map(|job| JobRecord::deserialize(job).map_err(ClientError::from))
    }
}

/// One job as returned by the listing service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawJobRecord")]
pub struct JobRecord {
    pub userid: u32,
    /// Raw idset string, decoded on demand by [`JobRecord::node_set`]
    pub ranks: String,
    pub state: JobState,
    /// Remote URI published by jobs that are themselves Flux instances
    pub uri: Option<String>,
}

impl JobRecord {
    pub fn node_set(&self) -> Result<IdSet> {
        Ok(IdSet::decode(&self.ranks)?)
    }
}

#[derive(Deserialize)]
struct RawJobRecord {
    userid: u32,
    ranks: String,
    state: JobState,
    #[serde(default)]
    annotations: Option<Annotations>,
}

#[derive(Deserialize)]
struct Annotations {
    #[serde(default)]
    user: Option<UserAnnotations>,
}

#[derive(Deserialize)]
struct UserAnnotations {
    #[serde(default)]
    uri: Option<String>,
}

impl From<RawJobRecord> for JobRecord {
    fn from(raw: RawJobRecord) -> Self {
        let uri = raw.annotations.and_then(|a| a.user).and_then(|u| u.uri);
        Self {
            userid: raw.userid,
            ranks: raw.ranks,
            state: raw.state,
            uri,
        }
    }
}

/// The part of an instance's configuration that governs guest access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GuestAccessConfig {
    #[serde(default)]
    access: Option<AccessTable>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct AccessTable {
    #[serde(default, rename = "allow-guest-user")]
    allow_guest_user: Option<bool>,
}

impl GuestAccessConfig {
    /// `access.allow-guest-user`, false when either level is absent.
    pub fn allow_guest_user(&self) -> bool {
        self.access
            .as_ref()
            .and_then(|a| a.allow_guest_user)
            .unwrap_or(false)
    }
}
