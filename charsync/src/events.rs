//! Client event bus.
//!
//! The host publishes login/logout signals here; the credential core publishes user
//! notifications and forced disconnects.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: NotificationSeverity,
}

impl Notification {
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity: NotificationSeverity::Error,
        }
    }
}

/// Events exchanged between the host and the client core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Show a notification to the user.
    Notification(Notification),
    /// The transport must drop its connection.
    Disconnected,
    /// The player logged in to a character.
    LoggedIn,
    /// The player logged out.
    LoggedOut,
}

impl ClientEvent {
    /// Get a description of the event for logging.
    pub fn description(&self) -> String {
        match self {
            Self::Notification(n) => format!("Notification ({:?}): {}", n.severity, n.title),
            Self::Disconnected => "Disconnected".to_string(),
            Self::LoggedIn => "Logged in".to_string(),
            Self::LoggedOut => "Logged out".to_string(),
        }
    }

    /// Whether this event invalidates every cached credential.
    #[inline]
    pub fn is_session_change(&self) -> bool {
        matches!(self, Self::LoggedIn | Self::LoggedOut)
    }
}

/// Default channel capacity for client events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broadcaster for client events.
///
/// Uses tokio's broadcast channel to distribute events to multiple subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    /// Create a new bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new bus with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    /// Publish an event.
    ///
    /// Returns the number of receivers that received the event (0 without subscribers).
    pub fn publish(&self, event: ClientEvent) -> usize {
        tracing::debug!("Publishing client event: {}", event.description());
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Log notifications and disconnects until `shutdown` fires or the bus closes.
///
/// Returns the number of events received.
pub async fn log_events(
    mut receiver: broadcast::Receiver<ClientEvent>,
    shutdown: CancellationToken,
) -> usize {
    let mut received = 0;
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = receiver.recv() => event,
        };

        match event {
            Ok(event) => {
                received += 1;
                match event {
                    ClientEvent::Notification(n) => warn!(title = %n.title, "{}", n.message),
                    ClientEvent::Disconnected => warn!("Transport disconnect requested"),
                    other => debug!(event = %other.description(), "Client event"),
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
    received
}
