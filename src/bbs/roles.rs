//! Role levels and access control string evaluation.
//!
//! Access control strings (ACS) are opaque to the menu engine; it only forwards
//! them to an [`AccessControl`] implementation together with the session.
use super::session::Session;

/// Role / privilege level constants
pub const LEVEL_USER: u8 = 1;
pub const LEVEL_MODERATOR: u8 = 5;
pub const LEVEL_SYSOP: u8 = 10;

/// Return the human‑readable role name for a numeric level.
pub fn role_name(level: u8) -> &'static str {
    match level {
        l if l >= LEVEL_SYSOP => "Sysop",
        l if l >= LEVEL_MODERATOR => "Moderator",
        0 => "Guest",
        _ => "User",
    }
}

/// Decides whether a session satisfies an access control string.
pub trait AccessControl: Send + Sync {
    fn allows(&self, acs: &str, session: &Session) -> bool;
}

/// Level-based ACS: whitespace separated tokens that must all pass.
///
/// - `sN` - user level at least N
/// - `!token` - negation
///
/// An empty string always passes; unknown tokens fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct LevelAccess;

impl LevelAccess {
    /// `sN` parsed to `N`. Anything else, negated or nested tokens included, is `None`.
    fn min_level(token: &str) -> Option<u8> {
        token
            .strip_prefix(|c: char| c.eq_ignore_ascii_case(&'s'))?
            .parse::<u8>()
            .ok()
    }

    fn token_allows(token: &str, session: &Session) -> bool {
        let (negated, inner) = match token.strip_prefix('!') {
            Some(inner) => (true, inner),
            None => (false, token),
        };
        match Self::min_level(inner) {
            Some(level) => (session.user_level >= level) != negated,
            None => false,
        }
    }
}

impl AccessControl for LevelAccess {
    fn allows(&self, acs: &str, session: &Session) -> bool {
        acs.split_whitespace()
            .all(|token| Self::token_allows(token, session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(level: u8) -> Session {
        let mut s = Session::new("t".into(), "127.0.0.1:1".into());
        s.user_level = level;
        s
    }

    #[test]
    fn empty_acs_always_passes() {
        assert!(LevelAccess.allows("", &session_at(0)));
        assert!(LevelAccess.allows("   ", &session_at(0)));
    }

    #[test]
    fn level_tokens_compare_against_user_level() {
        assert!(LevelAccess.allows("s10", &session_at(LEVEL_SYSOP)));
        assert!(!LevelAccess.allows("s10", &session_at(LEVEL_MODERATOR)));
        assert!(LevelAccess.allows("S5 s1", &session_at(LEVEL_MODERATOR)));
        assert!(LevelAccess.allows("!s5", &session_at(LEVEL_USER)));
        assert!(!LevelAccess.allows("!s5", &session_at(LEVEL_SYSOP)));
    }

    #[test]
    fn unknown_tokens_fail_closed() {
        assert!(!LevelAccess.allows("x", &session_at(LEVEL_SYSOP)));
        assert!(!LevelAccess.allows("s", &session_at(LEVEL_SYSOP)));
        assert!(!LevelAccess.allows("!", &session_at(LEVEL_SYSOP)));
        // negation never turns an unparsable token into a grant
        for acs in ["!x", "!!", "!z9", "!!s5", "s1 !x"] {
            assert!(!LevelAccess.allows(acs, &session_at(0)), "{acs}");
            assert!(!LevelAccess.allows(acs, &session_at(LEVEL_SYSOP)), "{acs}");
        }
    }

    #[test]
    fn role_names() {
        assert_eq!(role_name(0), "Guest");
        assert_eq!(role_name(LEVEL_USER), "User");
        assert_eq!(role_name(7), "Moderator");
        assert_eq!(role_name(255), "Sysop");
    }
}
