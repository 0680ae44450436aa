//! Session status snapshot for UI display.

/// Whether a valid session exists, as seen by one observer at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No token is cached and no exchange is running.
    Absent,
    /// An exchange is in flight and nothing valid is cached yet.
    Pending,
    /// A valid token is cached and not close to expiry.
    Active {
        /// Seconds until expiry.
        seconds_remaining: i64,
    },
    /// A valid token is cached but inside the renewal threshold.
    Expiring {
        /// Seconds until expiry.
        seconds_remaining: i64,
    },
}

impl SessionStatus {
    /// Returns true if a token can be served right now.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Active { .. } | Self::Expiring { .. })
    }

    /// Get a user-friendly display message.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Absent => "Signed out".to_string(),
            Self::Pending => "Signing in...".to_string(),
            Self::Active { seconds_remaining } => {
                let secs = *seconds_remaining;
                if secs > 3600 {
                    format!("Signed in for {} more hours", secs / 3600)
                } else if secs > 60 {
                    format!("Signed in for {} more minutes", secs / 60)
                } else {
                    format!("Signed in for {secs} more seconds")
                }
            }
            Self::Expiring { seconds_remaining } => {
                format!("Session renewing (expires in {seconds_remaining} seconds)")
            }
        }
    }
}
