//! Error taxonomy for cell edits, locks and notices.
//!
//! - `EditRejection`: local pre-flight refusal, nothing was mutated
//! - `RemoteError`: the store refused a write (tagged, not text-matched)
//! - `SessionError`: missing login/credential or admin rights, checked before
//!   any lock or notice action touches state

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("max {limit} requests per week")]
    QuotaExceeded { limit: usize },

    #[error("priority slots used (max 2 per week)")]
    PrioritySlotExhausted,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("cell is locked")]
    Locked,

    #[error("week is closed for requests")]
    WeekClosed,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("{0}")]
    Unknown(String),
}

impl RemoteError {
    /// Classifies a bare error message from a store that cannot report a tag.
    pub fn classify(message: &str) -> Self {
        let m = message.to_ascii_lowercase();
        if let Some(limit) = quota_limit(&m) {
            RemoteError::QuotaExceeded { limit }
        } else if m.contains("priority") || m.contains("max 2") {
            RemoteError::PrioritySlotExhausted
        } else {
            RemoteError::Unknown(message.to_string())
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RemoteError::QuotaExceeded { .. } => "quota_exceeded",
            RemoteError::PrioritySlotExhausted => "priority_exhausted",
            RemoteError::Unauthorized(_) => "unauthorized",
            RemoteError::Locked => "cell_locked",
            RemoteError::WeekClosed => "week_closed",
            RemoteError::NotFound(_) => "not_found",
            RemoteError::Invalid(_) => "bad_params",
            RemoteError::Unknown(_) => "store_failed",
        }
    }
}

/// The N of a lowercased "max N requests" message.
fn quota_limit(m: &str) -> Option<usize> {
    let rest = &m[m.find("max ")? + 4..];
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 || !rest[digits..].trim_start().starts_with("request") {
        return None;
    }
    rest[..digits].parse().ok()
}

// SQLite only reports text, so constraint failures go through the classifier.
impl From<rusqlite::Error> for RemoteError {
    fn from(e: rusqlite::Error) -> Self {
        RemoteError::classify(&e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditRejection {
    #[error("cell is not editable")]
    NotEditable,

    #[error("unread notices must be acknowledged first")]
    NoticesPending,

    #[error("cell is locked: {reason}")]
    Locked { reason: String },

    #[error("weekly request limit reached ({count}/{limit})")]
    Quota { count: usize, limit: usize },

    #[error("no strong preference slots left this week")]
    PriorityExhausted,
}

impl EditRejection {
    pub fn code(&self) -> &'static str {
        match self {
            EditRejection::NotEditable => "not_editable",
            EditRejection::NoticesPending => "notices_pending",
            EditRejection::Locked { .. } => "cell_locked",
            EditRejection::Quota { .. } => "quota_exceeded",
            EditRejection::PriorityExhausted => "priority_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("not logged in")]
    NotLoggedIn,

    #[error("missing session PIN, log in again")]
    LoginRequired,

    #[error("admin only")]
    AdminOnly,

    #[error("no period loaded")]
    NoPeriod,

    #[error("date {0} is not part of the loaded period")]
    UnknownDate(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotLoggedIn => "not_logged_in",
            SessionError::LoginRequired => "login_required",
            SessionError::AdminOnly => "admin_only",
            SessionError::NoPeriod => "no_period",
            SessionError::UnknownDate(_) => "bad_params",
            SessionError::Remote(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_known_fragments() {
        assert_eq!(
            RemoteError::classify("ERROR: Max 5 requests per week"),
            RemoteError::QuotaExceeded { limit: 5 }
        );
        assert_eq!(
            RemoteError::classify("max 3 requests per week"),
            RemoteError::QuotaExceeded { limit: 3 }
        );
        assert_eq!(
            RemoteError::classify("important rank already used (max 2)"),
            RemoteError::PrioritySlotExhausted
        );
        assert_eq!(
            RemoteError::classify("Priority conflict"),
            RemoteError::PrioritySlotExhausted
        );
        assert_eq!(
            RemoteError::classify("connection reset"),
            RemoteError::Unknown("connection reset".into())
        );
    }

    #[test]
    fn tagged_errors_round_trip_through_their_own_message() {
        assert_eq!(
            RemoteError::classify(&RemoteError::QuotaExceeded { limit: 4 }.to_string()),
            RemoteError::QuotaExceeded { limit: 4 }
        );
        assert_eq!(
            RemoteError::classify(&RemoteError::PrioritySlotExhausted.to_string()),
            RemoteError::PrioritySlotExhausted
        );
    }
}
