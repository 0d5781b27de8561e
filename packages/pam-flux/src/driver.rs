//! Account management decision for one PAM call.

use std::fmt;

use flux_client::Connector;

use crate::engine::check_user;
use crate::error::Result;
use crate::guest::InstanceGuestPolicy;
use crate::options::ModuleOptions;

/// Outcome handed back to the PAM stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Granted,
    Denied,
    UnknownIdentity,
    SystemError,
}

impl Verdict {
    pub const PAM_SUCCESS: i32 = 0;
    pub const PAM_SYSTEM_ERR: i32 = 4;
    pub const PAM_PERM_DENIED: i32 = 6;
    pub const PAM_USER_UNKNOWN: i32 = 10;

    /// Linux-PAM return code.
    pub fn pam_code(self) -> i32 {
        match self {
            Verdict::Granted => Self::PAM_SUCCESS,
            Verdict::Denied => Self::PAM_PERM_DENIED,
            Verdict::UnknownIdentity => Self::PAM_USER_UNKNOWN,
            Verdict::SystemError => Self::PAM_SYSTEM_ERR,
        }
    }

    pub fn is_granted(self) -> bool {
        self == Verdict::Granted
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Granted => "granted",
            Verdict::Denied => "denied",
            Verdict::UnknownIdentity => "unknown user",
            Verdict::SystemError => "system error",
        })
    }
}

/// Resolves login names to uids.
pub trait UserDirectory {
    fn uid_for(&self, name: &str) -> Option<u32>;
}

/// The system password database.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUsers;

impl UserDirectory for SystemUsers {
    fn uid_for(&self, name: &str) -> Option<u32> {
        match nix::unistd::User::from_name(name) {
            Ok(user) => user.map(|u| u.uid.as_raw()),
            Err(e) => {
                tracing::error!(user = name, error = %e, "getpwnam failed");
                None
            }
        }
    }
}

/// Channel for messages shown to the user being checked.
pub trait Conversation {
    fn error_message(&mut self, message: &str) -> Result<()>;
}

/// Message shown to a user who is refused.
pub fn denial_message(user: &str) -> String {
    format!("Access denied: user {user} has no active jobs on this node")
}

/// Decides node access for users named by the PAM stack.
pub struct Authorizer<'a, C> {
    connector: C,
    users: &'a dyn UserDirectory,
}

impl<'a, C: Connector> Authorizer<'a, C> {
    pub fn new(connector: C, users: &'a dyn UserDirectory) -> Self {
        Self { connector, users }
    }

    /// Decide for `user` under the module arguments `args`.
    ///
    /// A refused user is told so through `conv` and the refusal is logged.
    pub fn authorize<S: AsRef<str>>(
        &self,
        user: Option<&str>,
        args: &[S],
        conv: &mut dyn Conversation,
    ) -> Verdict {
        let Some(user) = user.filter(|u| !u.is_empty()) else {
            tracing::error!("unable to identify user");
            return Verdict::UnknownIdentity;
        };
        let Some(uid) = self.users.uid_for(user) else {
            tracing::error!("user {user} does not exist");
            return Verdict::UnknownIdentity;
        };
        let options = match ModuleOptions::parse(args) {
            Ok(options) => options,
            Err(e) => {
                tracing::error!("{e}");
                return Verdict::SystemError;
            }
        };

        let guest = InstanceGuestPolicy::new(&self.connector);
        if check_user(&self.connector, &options, uid, &guest) {
            tracing::info!("access granted for user {user} (uid={uid})");
            return Verdict::Granted;
        }

        if let Err(e) = conv.error_message(&denial_message(user)) {
            tracing::error!("{e}");
        }
        tracing::info!("access denied for user {user} (uid={uid})");
        Verdict::Denied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pam_codes() {
        assert_eq!(Verdict::Granted.pam_code(), 0);
        assert_eq!(Verdict::Denied.pam_code(), 6);
        assert_eq!(Verdict::UnknownIdentity.pam_code(), 10);
        assert_eq!(Verdict::SystemError.pam_code(), 4);
    }

    #[test]
    fn test_denial_message() {
        assert_eq!(
            denial_message("alice"),
            "Access denied: user alice has no active jobs on this node"
        );
    }

    #[test]
    fn test_system_users_resolves_root() {
        assert_eq!(SystemUsers.uid_for("root"), Some(0));
        assert_eq!(SystemUsers.uid_for("no-such-user-pam-flux"), None);
    }
}
