//! Notification channel classification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transport class for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Electronic mail over SMTP.
    Email,
    /// Text message through the SMS provider API.
    Sms,
    /// Mobile/web push through FCM.
    Push,
    /// Real-time in-app delivery over WebSocket.
    InApp,
}

impl ChannelType {
    /// All channels, in delivery-priority order.
    pub const ALL: [Self; 4] = [Self::Email, Self::Sms, Self::Push, Self::InApp];

    /// Returns the channel as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
            Self::InApp => "inapp",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "push" => Ok(Self::Push),
            "inapp" => Ok(Self::InApp),
            other => Err(format!("unknown channel type: {other}")),
        }
    }
}
