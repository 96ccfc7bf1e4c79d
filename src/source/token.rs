//! Session token bookkeeping.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// How long a logon token is trusted after it is issued.
pub const TOKEN_LIFETIME_HOURS: i64 = 8;

/// Tokens are treated as expired this long before their real expiry.
pub const EXPIRY_SKEW_MINUTES: i64 = 5;

/// Logged-out or logged-in-until-expiry.
#[derive(Debug, Clone, Default)]
pub struct TokenState {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    /// Record a freshly issued token.
    pub fn set(&mut self, token: String, now: DateTime<Utc>) {
        self.token = Some(token);
        self.expires_at = Some(now + ChronoDuration::hours(TOKEN_LIFETIME_HOURS));
    }

    pub fn clear(&mut self) {
        self.token = None;
        self.expires_at = None;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expires_at) {
            (Some(_), Some(expires_at)) => {
                now < expires_at - ChronoDuration::minutes(EXPIRY_SKEW_MINUTES)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logged_out_is_invalid() {
        assert!(!TokenState::default().is_valid_at(Utc::now()));
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let mut state = TokenState::default();
        state.set("abc".to_string(), now);

        let expires_at = state.expires_at().unwrap();
        assert_eq!(expires_at, now + ChronoDuration::hours(8));

        assert!(state.is_valid_at(now));
        assert!(state.is_valid_at(expires_at - ChronoDuration::minutes(6)));
        assert!(!state.is_valid_at(expires_at - ChronoDuration::minutes(5)));
        assert!(!state.is_valid_at(expires_at - ChronoDuration::minutes(4)));
        assert!(!state.is_valid_at(expires_at));
    }

    #[test]
    fn test_clear() {
        let now = Utc::now();
        let mut state = TokenState::default();
        state.set("abc".to_string(), now);
        state.clear();

        assert_eq!(state.token(), None);
        assert!(!state.is_valid_at(now));
    }
}
