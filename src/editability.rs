use crate::error::EditRejection;
use crate::locks::LockRegistry;
use crate::model::{CellKey, Language, User};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellAccess {
    pub editable: bool,
    /// A lock exists and the actor is not an admin; interacting shows the reason.
    pub locked: bool,
    /// Admin-only marker for locked cells. Display only.
    pub lock_hint: bool,
}

pub fn row_unlocked(actor: &User, row_user_id: &str) -> bool {
    actor.is_admin || actor.id == row_user_id
}

pub fn cell_access(
    actor: &User,
    row_user_id: &str,
    effective_open: bool,
    notices_blocking: bool,
    has_lock: bool,
) -> CellAccess {
    CellAccess {
        editable: row_unlocked(actor, row_user_id) && effective_open && !notices_blocking,
        locked: has_lock && !actor.is_admin,
        lock_hint: has_lock && actor.is_admin,
    }
}

/// Full gate for an interaction on one cell, lock included. A lock reason
/// comes back in `lang`.
pub fn check_edit(
    actor: &User,
    key: &CellKey,
    effective_open: bool,
    notices_blocking: bool,
    locks: &LockRegistry,
    lang: Language,
) -> Result<(), EditRejection> {
    if !row_unlocked(actor, &key.user_id) {
        return Err(EditRejection::NotEditable);
    }
    if notices_blocking {
        return Err(EditRejection::NoticesPending);
    }
    if !effective_open {
        return Err(EditRejection::NotEditable);
    }
    if !actor.is_admin {
        if let Some(reason) = locks.reason_for(key, lang) {
            return Err(EditRejection::Locked { reason });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellLock, Language, RoleTier};
    use chrono::{NaiveDate, Utc};

    fn user(id: &str, admin: bool) -> User {
        User {
            id: id.into(),
            name: id.to_uppercase(),
            role: RoleTier::Staff,
            is_admin: admin,
            is_active: true,
            display_order: 0,
            language: Language::En,
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).expect("date")
    }

    #[test]
    fn own_row_and_admin_rows_are_unlocked() {
        let a = user("a", false);
        let admin = user("boss", true);
        assert!(row_unlocked(&a, "a"));
        assert!(!row_unlocked(&a, "b"));
        assert!(row_unlocked(&admin, "b"));
    }

    #[test]
    fn editable_needs_open_week_and_no_blocking_notice() {
        let a = user("a", false);
        assert!(cell_access(&a, "a", true, false, false).editable);
        assert!(!cell_access(&a, "a", false, false, false).editable);
        assert!(!cell_access(&a, "a", true, true, false).editable);
        assert!(!cell_access(&a, "b", true, false, false).editable);
    }

    #[test]
    fn lock_hint_only_for_admins() {
        let a = user("a", false);
        let admin = user("boss", true);
        let staff_view = cell_access(&a, "a", true, false, true);
        assert!(staff_view.locked && !staff_view.lock_hint);
        let admin_view = cell_access(&admin, "a", true, false, true);
        assert!(admin_view.editable && admin_view.lock_hint && !admin_view.locked);
    }

    #[test]
    fn locked_cell_rejects_staff_with_reason_but_not_admin() {
        let locks = LockRegistry::from_locks(vec![CellLock {
            user_id: "b".into(),
            date: monday(),
            reason_en: Some("Night cover confirmed.".into()),
            reason_es: None,
            locked_by: "boss".into(),
            locked_at: Utc::now(),
        }]);
        let key = CellKey::new("b", monday());
        assert_eq!(
            check_edit(&user("b", false), &key, true, false, &locks, Language::En),
            Err(EditRejection::Locked {
                reason: "Night cover confirmed.".into()
            })
        );
        assert_eq!(
            check_edit(&user("boss", true), &key, true, false, &locks, Language::En),
            Ok(())
        );
    }

    #[test]
    fn notices_block_admins_too() {
        let locks = LockRegistry::default();
        let key = CellKey::new("b", monday());
        assert_eq!(
            check_edit(&user("boss", true), &key, true, true, &locks, Language::En),
            Err(EditRejection::NoticesPending)
        );
    }

    #[test]
    fn lock_reason_follows_requested_language_not_profile() {
        let locks = LockRegistry::from_locks(vec![CellLock {
            user_id: "b".into(),
            date: monday(),
            reason_en: Some("Night cover confirmed.".into()),
            reason_es: Some("Noche cubierta.".into()),
            locked_by: "boss".into(),
            locked_at: Utc::now(),
        }]);
        let key = CellKey::new("b", monday());
        let english_profile = user("b", false);
        assert_eq!(
            check_edit(&english_profile, &key, true, false, &locks, Language::Es),
            Err(EditRejection::Locked {
                reason: "Noche cubierta.".into()
            })
        );
    }
}
