use crate::messages::default_lock_reason;
use crate::model::{CellKey, CellLock, Language};
use std::collections::HashMap;

/// Admin-authored per-cell edit blocks.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: HashMap<CellKey, CellLock>,
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

/// Reason to show for a lock: the reader's language first, then the other
/// one, then the stock message.
pub fn lock_reason(lock: &CellLock, lang: Language) -> String {
    let (preferred, other) = match lang {
        Language::En => (lock.reason_en.as_deref(), lock.reason_es.as_deref()),
        Language::Es => (lock.reason_es.as_deref(), lock.reason_en.as_deref()),
    };
    non_blank(preferred)
        .or_else(|| non_blank(other))
        .map(|s| s.to_string())
        .unwrap_or_else(|| default_lock_reason(lang).to_string())
}

impl LockRegistry {
    pub fn from_locks<I>(locks: I) -> Self
    where
        I: IntoIterator<Item = CellLock>,
    {
        Self {
            locks: locks.into_iter().map(|l| (l.key(), l)).collect(),
        }
    }

    pub fn is_locked(&self, key: &CellKey) -> bool {
        self.locks.contains_key(key)
    }

    pub fn insert(&mut self, lock: CellLock) {
        self.locks.insert(lock.key(), lock);
    }

    pub fn remove(&mut self, key: &CellKey) -> Option<CellLock> {
        self.locks.remove(key)
    }

    pub fn reason_for(&self, key: &CellKey, lang: Language) -> Option<String> {
        self.locks.get(key).map(|l| lock_reason(l, lang))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn lock(en: Option<&str>, es: Option<&str>) -> CellLock {
        CellLock {
            user_id: "b".into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"),
            reason_en: en.map(str::to_string),
            reason_es: es.map(str::to_string),
            locked_by: "admin".into(),
            locked_at: Utc::now(),
        }
    }

    #[test]
    fn reason_prefers_reader_language_then_other_then_default() {
        let both = lock(Some("Night cover confirmed."), Some("Noche cubierta."));
        assert_eq!(lock_reason(&both, Language::En), "Night cover confirmed.");
        assert_eq!(lock_reason(&both, Language::Es), "Noche cubierta.");

        let en_only = lock(Some("Night cover confirmed."), Some("  "));
        assert_eq!(lock_reason(&en_only, Language::Es), "Night cover confirmed.");

        let none = lock(None, Some(""));
        assert_eq!(
            lock_reason(&none, Language::Es),
            default_lock_reason(Language::Es)
        );
    }

    #[test]
    fn registry_is_keyed_by_user_and_date() {
        let l = lock(Some("x"), None);
        let key = l.key();
        let mut reg = LockRegistry::from_locks(vec![l]);
        assert!(reg.is_locked(&key));
        assert_eq!(reg.reason_for(&key, Language::En).as_deref(), Some("x"));
        assert!(reg.remove(&key).is_some());
        assert!(!reg.is_locked(&key));
    }
}
