use crate::cache::RequestCache;
use crate::model::CellKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Reject { count: usize, limit: usize },
}

/// Caps distinct requested days per user per week. Changing the value of an
/// already occupied day never counts against the cap.
pub fn check_quota(cache: &RequestCache, candidate: &CellKey, limit: usize) -> QuotaDecision {
    if cache.is_occupied(candidate) {
        return QuotaDecision::Allow;
    }
    let count = cache.occupied_days(&candidate.user_id, candidate.week_start());
    if count >= limit {
        QuotaDecision::Reject { count, limit }
    } else {
        QuotaDecision::Allow
    }
}
