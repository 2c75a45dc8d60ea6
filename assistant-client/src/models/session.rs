use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Close code sent for an orderly shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code the server uses to reject the credential.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts exhausted. Only an explicit `open` leaves this state.
    Failed,
}

impl SessionState {
    /// States in which a channel exists or is about to be (re)established.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Connected | SessionState::Reconnecting
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloseReason {
    /// Close code 1000.
    Normal,
    /// Close code 1008; the server refused the credential.
    PolicyViolation { detail: String },
    /// Any other close code, a transport error, or a failed connect.
    Abnormal { code: Option<u16>, detail: String },
    UserLogout,
    Expired,
    /// An explicit `open` replaced the channel.
    Replaced,
    Teardown,
}

impl CloseReason {
    pub fn from_close_code(code: Option<u16>, detail: impl Into<String>) -> Self {
        match code {
            Some(CLOSE_NORMAL) => CloseReason::Normal,
            Some(CLOSE_POLICY_VIOLATION) => CloseReason::PolicyViolation {
                detail: detail.into(),
            },
            code => CloseReason::Abnormal {
                code,
                detail: detail.into(),
            },
        }
    }

    pub fn abnormal(detail: impl Into<String>) -> Self {
        CloseReason::Abnormal {
            code: None,
            detail: detail.into(),
        }
    }

    /// Only abnormal closes are eligible for backoff-reconnect.
    pub fn suppresses_reconnect(&self) -> bool {
        !matches!(self, CloseReason::Abnormal { .. })
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            CloseReason::PolicyViolation { .. } | CloseReason::Expired
        )
    }
}

/// Observable state of the realtime session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub reconnect_attempt: u32,
    pub backoff_ms: u64,
    pub last_close_reason: Option<CloseReason>,
    pub requires_reauth: bool,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            reconnect_attempt: 0,
            backoff_ms: 0,
            last_close_reason: None,
            requires_reauth: false,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(CloseReason::from_close_code(Some(1000), ""), CloseReason::Normal);
        assert!(matches!(
            CloseReason::from_close_code(Some(1008), "Invalid or expired token"),
            CloseReason::PolicyViolation { .. }
        ));
        assert!(matches!(
            CloseReason::from_close_code(Some(1011), "server error"),
            CloseReason::Abnormal {
                code: Some(1011),
                ..
            }
        ));
        assert!(matches!(
            CloseReason::from_close_code(None, "reset"),
            CloseReason::Abnormal { code: None, .. }
        ));
    }

    #[test]
    fn test_only_abnormal_closes_reconnect() {
        assert!(CloseReason::Normal.suppresses_reconnect());
        assert!(CloseReason::Expired.suppresses_reconnect());
        assert!(CloseReason::UserLogout.suppresses_reconnect());
        assert!(!CloseReason::abnormal("reset").suppresses_reconnect());
    }

    #[test]
    fn test_reauth_reasons() {
        assert!(CloseReason::Expired.requires_reauth());
        assert!(CloseReason::PolicyViolation {
            detail: String::new()
        }
        .requires_reauth());
        assert!(!CloseReason::Normal.requires_reauth());
    }
}
