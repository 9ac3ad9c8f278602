//! Guest vs. authenticated session state (spec §9 "Guest-session polymorphism").

use std::sync::Arc;

use reqwest::cookie::Jar;

/// Fixed sentinel username used for guest sessions. Download paths and log
/// lines for unauthenticated runs are namespaced under this literal.
pub const GUEST_USERNAME: &str = "guest";

/// Exactly one of these is active at any time on the engine.
#[derive(Clone)]
pub enum Session {
    Guest,
    Authenticated {
        username: String,
        cookies: Arc<Jar>,
    },
}

impl Session {
    pub fn guest() -> Self {
        Session::Guest
    }

    pub fn username(&self) -> &str {
        match self {
            Session::Guest => GUEST_USERNAME,
            Session::Authenticated { username, .. } => username.as_str(),
        }
    }

    pub fn is_authed(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    pub fn cookies(&self) -> Option<&Arc<Jar>> {
        match self {
            Session::Guest => None,
            Session::Authenticated { cookies, .. } => Some(cookies),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Session::Guest => write!(f, "Session::Guest"),
            Session::Authenticated { username, .. } => {
                write!(f, "Session::Authenticated({username})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_username_is_fixed_literal() {
        assert_eq!(Session::guest().username(), "guest");
        assert!(!Session::guest().is_authed());
    }

    #[test]
    fn authenticated_reports_username() {
        let session = Session::Authenticated {
            username: "ada".into(),
            cookies: Arc::new(Jar::default()),
        };
        assert_eq!(session.username(), "ada");
        assert!(session.is_authed());
    }
}
