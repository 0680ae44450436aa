//! Session lifecycle events broadcast to UI regions.

use serde::{Deserialize, Serialize};

/// Why a session was cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClearReason {
    /// The user logged out.
    Logout,
    /// Acquisition or renewal failed and no valid token remains.
    ExchangeFailed,
}

/// A session state transition.
///
/// Delivery is at-least-once: handlers must tolerate seeing the same event
/// twice in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum SessionEvent {
    /// An exchange has started.
    #[serde(rename = "session:pending")]
    Pending {},
    /// A valid token is available.
    #[serde(rename = "session:ready")]
    Ready {
        /// True when the token was served from the cache.
        #[serde(rename = "fromCache")]
        from_cache: bool,
    },
    /// No valid session exists any more.
    #[serde(rename = "session:cleared")]
    Cleared {
        /// Why the session ended.
        reason: ClearReason,
    },
}

impl SessionEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending {} => "session:pending",
            Self::Ready { .. } => "session:ready",
            Self::Cleared { .. } => "session:cleared",
        }
    }

    /// Returns true for `session:ready`.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Returns true for `session:cleared`.
    #[must_use]
    pub const fn is_cleared(&self) -> bool {
        matches!(self, Self::Cleared { .. })
    }
}
