//! Module arguments from the PAM stack configuration.

use crate::error::{PamFluxError, Result};

/// Word that enables guest access to multi-user instance jobs.
pub const ALLOW_GUEST_USER: &str = "allow-guest-user";

/// Parsed module arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleOptions {
    /// Permit any user on rank 0 of a running job owned by the instance
    /// owner, if that job is a Flux instance with
    /// `access.allow-guest-user` set.
    pub allow_guest_user: bool,
}

impl ModuleOptions {
    /// Parse module arguments. Any unknown word is an error.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::default();
        for arg in args {
            match arg.as_ref() {
                ALLOW_GUEST_USER => options.allow_guest_user = true,
                other => return Err(PamFluxError::UnrecognizedOption(other.to_string())),
            }
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_args_is_default() {
        let options = ModuleOptions::parse(Vec::<String>::new()).unwrap();
        assert!(!options.allow_guest_user);
    }

    #[test]
    fn test_allow_guest_user() {
        let options = ModuleOptions::parse(["allow-guest-user"]).unwrap();
        assert!(options.allow_guest_user);

        let options = ModuleOptions::parse(["allow-guest-user", "allow-guest-user"]).unwrap();
        assert!(options.allow_guest_user);
    }

    #[test]
    fn test_unknown_word_rejected() {
        let err = ModuleOptions::parse(["allow-guest-user", "debug"]).unwrap_err();
        assert!(matches!(err, PamFluxError::UnrecognizedOption(ref w) if w == "debug"));
        assert_eq!(err.to_string(), "unrecognized option: debug");

        // options are case sensitive, as PAM passes them verbatim
        assert!(ModuleOptions::parse(["Allow-Guest-User"]).is_err());
    }
}
