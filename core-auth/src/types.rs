use chrono::{DateTime, SecondsFormat, Utc};
use core_api::LoginRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted session record.
///
/// Stored as JSON under a single key; at most one exists at a time.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use core_auth::AuthCredentials;
///
/// let issued = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
/// let credentials = AuthCredentials::issue("42", "access", "refresh", issued, Duration::hours(1));
///
/// assert_eq!(credentials.expiry_date, "2024-01-01T13:00:00.000Z");
/// assert!(!credentials.is_expired(issued));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCredentials {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// ISO-8601 UTC timestamp with millisecond precision
    pub expiry_date: String,
}

impl AuthCredentials {
    /// Builds a record whose expiry is `issued_at + lifetime`.
    pub fn issue(
        user_id: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: chrono::Duration,
    ) -> Self {
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expiry_date: expires_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Parsed expiry, or `None` if the stored value is not a valid timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.expiry_date)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// An unparseable expiry counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(true, |expires_at| now >= expires_at)
    }
}

impl fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expiry_date", &self.expiry_date)
            .finish()
    }
}

/// Username (or email) and password entered by the user.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub(crate) fn to_request(&self) -> LoginRequest {
        LoginRequest::new(self.username.clone(), self.password.clone())
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
