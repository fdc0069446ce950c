//! Flash notifications.
//!
//! A handler queues a message before redirecting; the next rendered page
//! takes the queue out of the session and shows it as toasts.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::warn;

use super::session::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    Success,
    Error,
    Info,
}

impl FlashKind {
    /// CSS modifier class.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Info,
            message: message.into(),
        }
    }

    /// Queue this notification for the next page.
    pub async fn push(self, session: &Session) {
        let mut queue: Vec<Self> = session
            .get(keys::FLASH)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        queue.push(self);
        if let Err(e) = session.insert(keys::FLASH, &queue).await {
            warn!(error = %e, "Failed to store flash message");
        }
    }

    /// Take every queued notification.
    pub async fn take(session: &Session) -> Vec<Self> {
        session
            .remove::<Vec<Self>>(keys::FLASH)
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }
}
