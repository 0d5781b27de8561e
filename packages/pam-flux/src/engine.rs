//! Job scan: does this user have a running job on this rank?
//!
//! The broker is asked only for running jobs on the current rank owned by
//! the requesting user or by the instance owner. A job owned by the user
//! grants access outright. A job owned by the instance owner grants access
//! only when this rank is the job's first rank and the job, being a Flux
//! instance, has opted in to guest users.

use flux_client::{
    ClientError, Connector, Constraint, Endpoint, Handle, JobListRequest, JobRecord, JobState,
};

use crate::guest::GuestPolicy;
use crate::options::ModuleOptions;

/// Broker attribute holding the instance owner's uid.
pub const OWNER_ATTR: &str = "security.owner";

/// Identities relevant to one access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessCheck {
    /// Broker rank of this node
    pub rank: u32,
    /// User requesting access
    pub uid: u32,
    /// Owner whose instance jobs may admit `uid` as a guest. Equal to `uid`
    /// when guest access is off.
    pub allow_if_user: u32,
}

impl AccessCheck {
    pub fn new(rank: u32, uid: u32) -> Self {
        Self {
            rank,
            uid,
            allow_if_user: uid,
        }
    }

    pub fn with_guest_owner(mut self, owner: u32) -> Self {
        self.allow_if_user = owner;
        self
    }

    /// The constrained job listing for this check.
    pub fn request(&self) -> JobListRequest {
        JobListRequest::new(Constraint::running_on_rank_for_users(
            self.rank,
            &[self.uid, self.allow_if_user],
        ))
    }
}

/// Reduce listed jobs to a decision. The first job that grants wins.
///
/// Entries that fail to decode, are not running, or do not include this
/// rank are skipped.
pub fn check_jobs<I>(records: I, check: &AccessCheck, guest: &dyn GuestPolicy) -> bool
where
    I: IntoIterator<Item = Result<JobRecord, ClientError>>,
{
    for (index, record) in records.into_iter().enumerate() {
        let job = match record {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(index, error = %e, "failed to unpack userid, ranks for job");
                continue;
            }
        };
        if job.state != JobState::Run {
            tracing::debug!(index, state = ?job.state, "skipping job not in RUN state");
            continue;
        }
        let ranks = match job.node_set() {
            Ok(ranks) => ranks,
            Err(e) => {
                tracing::error!(index, ranks = %job.ranks, error = %e, "failed to decode job ranks");
                continue;
            }
        };
        if !ranks.contains(check.rank) {
            tracing::debug!(index, ranks = %job.ranks, rank = check.rank, "job does not include this rank");
            continue;
        }

        if job.userid == check.uid {
            return true;
        }
        if job.userid == check.allow_if_user {
            // Only rank 0 of the job asks the child instance
            if ranks.first().ok() == Some(check.rank) && guest.guest_allowed(job.uri.as_deref()) {
                return true;
            }
        }
    }
    false
}

/// Issue the constrained job listing on `h` and reduce the result.
///
/// A failed listing denies.
pub fn decide(h: &dyn Handle, check: &AccessCheck, guest: &dyn GuestPolicy) -> bool {
    let jobs = match h.list_jobs(&check.request()) {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!(error = %e, "flux_job_list failed");
            return false;
        }
    };
    tracing::debug!(count = jobs.jobs.len(), "candidate jobs");
    check_jobs(jobs.records(), check, guest)
}

/// Connect to the enclosing instance and decide whether `uid` may access
/// this node. Any connection failure denies.
pub fn check_user<C>(
    connector: &C,
    options: &ModuleOptions,
    uid: u32,
    guest: &dyn GuestPolicy,
) -> bool
where
    C: Connector + ?Sized,
{
    let h = match connector.open(&Endpoint::Default) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "Unable to connect to Flux");
            return false;
        }
    };
    let rank = match h.rank() {
        Ok(rank) => rank,
        Err(e) => {
            tracing::error!(error = %e, "Failed to get current broker rank");
            return false;
        }
    };

    let mut check = AccessCheck::new(rank, uid);
    if options.allow_guest_user {
        match h.attr_get_uid(OWNER_ATTR) {
            Ok(owner) => check = check.with_guest_owner(owner),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get {OWNER_ATTR}, can't allow guest access")
            }
        }
    }
    tracing::debug!(uid, rank, allow_if_user = check.allow_if_user, "checking jobs");

    decide(&*h, &check, guest)
}
