//! # Event Bus System
//!
//! Broadcasts authentication state changes using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The session manager publishes an [`AuthEvent`] whenever the persisted
//! session changes: sign-in, restoration at startup, refresh, expiry and
//! sign-out. Hosts subscribe to keep their own view of "who is signed in" in
//! sync without polling storage.
//!
//! ```text
//! ┌────────────────┐   emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ SessionManager ├─────────>│ EventBus ├────────────>│ Subscriber │
//! └────────────────┘          └──────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(16);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Auth(AuthEvent::SignedIn {
//!         user_id: "42".to_string(),
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Auth(AuthEvent::SignedIn { .. })));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `emit` fails only when nobody is subscribed; publishers ignore that case.
//! Slow subscribers receive `RecvError::Lagged(n)` and may keep reading.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError {
                recoverable: false, ..
            }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SessionExpired { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. })
            | CoreEvent::Auth(AuthEvent::SignedOut { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events related to the session lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Login succeeded and a new session was persisted.
    SignedIn { user_id: String },
    /// The session was cleared on request.
    SignedOut { user_id: Option<String> },
    /// A persisted session was found at startup.
    SessionRestored {
        user_id: String,
        /// Whether the stored expiry date has already passed.
        expired: bool,
    },
    /// A token refresh network call started.
    TokenRefreshing,
    /// Token refresh completed successfully.
    TokenRefreshed {
        /// New expiry (Unix epoch seconds).
        expires_at: i64,
    },
    /// The credential was rejected and the session was cleared.
    /// The user must sign in again.
    SessionExpired { reason: String },
    /// Authentication error that did not clear the session.
    AuthError {
        message: String,
        /// Whether retrying later may succeed.
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SignedIn { .. } => "User signed in successfully",
            AuthEvent::SignedOut { .. } => "User signed out",
            AuthEvent::SessionRestored { .. } => "Persisted session restored",
            AuthEvent::TokenRefreshing => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::SessionExpired { .. } => "Session expired",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

/// Central broadcast channel for core events.
///
/// Cloning an `EventBus` yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` is the number of events buffered per subscriber before it
    /// starts receiving `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Publishes an auth event, ignoring the no-subscriber case.
    pub fn emit_auth(&self, event: AuthEvent) {
        let _ = self.sender.send(CoreEvent::Auth(event));
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        let result = bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));
        assert!(result.is_err());

        // Must not panic
        bus.emit_auth(AuthEvent::TokenRefreshing);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        bus.emit_auth(AuthEvent::SignedIn {
            user_id: "7".to_string(),
        });

        let expected = CoreEvent::Auth(AuthEvent::SignedIn {
            user_id: "7".to_string(),
        });
        assert_eq!(sub1.recv().await.unwrap(), expected);
        assert_eq!(sub2.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for _ in 0..5 {
            bus.emit_auth(AuthEvent::TokenRefreshing);
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
        assert!(sub.recv().await.is_ok());
    }

    #[test]
    fn test_event_severity() {
        let fatal = CoreEvent::Auth(AuthEvent::AuthError {
            message: "boom".to_string(),
            recoverable: false,
        });
        let transient = CoreEvent::Auth(AuthEvent::AuthError {
            message: "offline".to_string(),
            recoverable: true,
        });
        let expired = CoreEvent::Auth(AuthEvent::SessionExpired {
            reason: "refresh rejected".to_string(),
        });
        let refreshing = CoreEvent::Auth(AuthEvent::TokenRefreshing);

        assert_eq!(fatal.severity(), EventSeverity::Error);
        assert_eq!(transient.severity(), EventSeverity::Warning);
        assert_eq!(expired.severity(), EventSeverity::Warning);
        assert_eq!(refreshing.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        let event = CoreEvent::Auth(AuthEvent::SignedOut { user_id: None });
        assert_eq!(event.description(), "User signed out");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Auth(AuthEvent::TokenRefreshed {
            expires_at: 1_700_000_000,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Auth");
        assert_eq!(json["payload"]["event"], "TokenRefreshed");
        assert_eq!(json["payload"]["expires_at"], 1_700_000_000);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
