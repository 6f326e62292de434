//! Optimistic cell editing.
//!
//! An edit runs in two halves so the caller decides when the store answers:
//! `begin_edit` validates and writes the pending value into the cache, and
//! `resolve` folds the store's answer back in. Each pending write carries the
//! generation it was issued with; an answer for an older generation is
//! dropped without touching the cache.

use crate::cache::RequestCache;
use crate::editability::check_edit;
use crate::error::{EditRejection, RemoteError};
use crate::locks::LockRegistry;
use crate::messages::UserMessage;
use crate::model::{CellKey, CellValue, Language, User, OFF_CODE};
use crate::priority::{next_rank, RankOutcome};
use crate::quota::{check_quota, QuotaDecision};
use crate::store::{Credentials, RequestStore};
use serde::Serialize;

/// What the user picked for a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditChoice {
    Clear,
    Off,
    /// One activation of the strong-preference control.
    StrongOff,
    Code(String),
}

impl EditChoice {
    /// Wire form: `CLEAR`, `O`, `O*` for the strong-preference control, or
    /// any other non-blank shift code.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let s = raw.trim();
        if s.is_empty() {
            return Err("value must not be empty".to_string());
        }
        if s.eq_ignore_ascii_case("clear") {
            return Ok(EditChoice::Clear);
        }
        if s == OFF_CODE {
            return Ok(EditChoice::Off);
        }
        if s == "O*" {
            return Ok(EditChoice::StrongOff);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(format!("invalid shift code: {s}"));
        }
        Ok(EditChoice::Code(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    Validating,
    OptimisticWrite,
    RemoteWrite,
    Committed,
    Reverted,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set(CellValue),
    Clear,
}

impl WriteOp {
    pub fn value(&self) -> Option<&CellValue> {
        match self {
            WriteOp::Set(v) => Some(v),
            WriteOp::Clear => None,
        }
    }
}

/// A pending write handed out by `begin_edit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTicket {
    pub key: CellKey,
    pub generation: u64,
    pub op: WriteOp,
}

pub struct EditContext<'a> {
    pub actor: &'a User,
    pub effective_open: bool,
    pub notices_blocking: bool,
    pub quota_limit: usize,
    /// Language of the session, used for lock reasons.
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Committed {
        value: Option<CellValue>,
    },
    /// The store refused; the cell shows its last authoritative value again.
    Reverted {
        value: Option<CellValue>,
        error: RemoteError,
        message: UserMessage,
    },
    /// A newer edit or a reload got there first.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    Committed,
    Reverted,
    Superseded,
}

impl Resolution {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Resolution::Committed { .. } => ResolutionKind::Committed,
            Resolution::Reverted { .. } => ResolutionKind::Reverted,
            Resolution::Superseded => ResolutionKind::Superseded,
        }
    }
}

fn phase(key: &CellKey, phase: EditPhase) {
    tracing::debug!(cell = %key, ?phase, "cell edit");
}

/// Validates an edit and, if allowed, applies it to the cache as pending.
/// A rejection leaves the cache untouched.
pub fn begin_edit(
    ctx: &EditContext<'_>,
    cache: &mut RequestCache,
    locks: &LockRegistry,
    key: &CellKey,
    choice: &EditChoice,
) -> Result<WriteTicket, EditRejection> {
    phase(key, EditPhase::Validating);
    check_edit(
        ctx.actor,
        key,
        ctx.effective_open,
        ctx.notices_blocking,
        locks,
        ctx.language,
    )?;

    let op = match choice {
        EditChoice::Clear => WriteOp::Clear,
        EditChoice::Off => WriteOp::Set(CellValue::off()),
        EditChoice::Code(code) => WriteOp::Set(CellValue::Code(code.clone())),
        EditChoice::StrongOff => {
            match next_rank(cache.current_rank(key), cache.taken_ranks(key)) {
                RankOutcome::Assign(rank) => WriteOp::Set(CellValue::Off { rank }),
                RankOutcome::Blocked => return Err(EditRejection::PriorityExhausted),
            }
        }
    };

    if let WriteOp::Set(_) = op {
        if let QuotaDecision::Reject { count, limit } = check_quota(cache, key, ctx.quota_limit) {
            return Err(EditRejection::Quota { count, limit });
        }
    }

    phase(key, EditPhase::OptimisticWrite);
    let generation = cache.record_pending(key.clone(), op.value().cloned());
    Ok(WriteTicket {
        key: key.clone(),
        generation,
        op,
    })
}

/// Sends a ticket's write to the store. Writes to another user's row go
/// through the admin path.
pub fn dispatch<S>(
    store: &mut S,
    auth: &Credentials,
    ticket: &WriteTicket,
) -> Result<Option<crate::model::RequestCell>, RemoteError>
where
    S: RequestStore + ?Sized,
{
    phase(&ticket.key, EditPhase::RemoteWrite);
    let target = auth.target_for(&ticket.key.user_id);
    match &ticket.op {
        WriteOp::Set(value) => store
            .set_cell(auth, target, ticket.key.date, value)
            .map(Some),
        WriteOp::Clear => store
            .clear_cell(auth, target, ticket.key.date)
            .map(|_| None),
    }
}

/// Folds the store's answer for `ticket` into the cache.
///
/// A success always reaches the authoritative side unless something newer
/// already did, even when a later edit to the same cell is still pending.
/// Only the latest edit decides what the user is told; an older one reports
/// `Superseded`. A refused latest edit falls back to whatever the cell showed
/// before it, which may be an older edit still in flight.
pub fn resolve(
    cache: &mut RequestCache,
    ticket: &WriteTicket,
    result: Result<Option<crate::model::RequestCell>, RemoteError>,
) -> Resolution {
    let key = &ticket.key;
    cache.take_pending(key, ticket.generation);
    if cache.is_settled(key, ticket.generation) {
        phase(key, EditPhase::Superseded);
        return Resolution::Superseded;
    }
    let latest = cache.latest_generation(key) == ticket.generation;

    match result {
        Ok(record) => {
            let value = record.as_ref().map(|c| c.value.clone());
            cache.commit(key, ticket.generation, record);
            if !latest {
                phase(key, EditPhase::Superseded);
                return Resolution::Superseded;
            }
            phase(key, EditPhase::Committed);
            Resolution::Committed { value }
        }
        Err(error) if !latest => {
            tracing::debug!(cell = %key, error = %error, "older cell write refused");
            phase(key, EditPhase::Superseded);
            Resolution::Superseded
        }
        Err(error) => {
            phase(key, EditPhase::Reverted);
            tracing::info!(cell = %key, error = %error, "cell write refused, reverted");
            Resolution::Reverted {
                value: cache.displayed(key).cloned(),
                message: UserMessage::for_remote(&error),
                error,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellLock, Language, Rank, RequestCell, RoleTier};
    use crate::store::memory::MemoryStore;
    use chrono::{NaiveDate, Utc};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

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

    fn ctx(actor: &User) -> EditContext<'_> {
        EditContext {
            actor,
            effective_open: true,
            notices_blocking: false,
            quota_limit: 5,
            language: Language::En,
        }
    }

    fn store_with(actor: &User) -> (MemoryStore, Credentials) {
        let mut store = MemoryStore::default();
        store.users.push(actor.clone());
        store.pins.insert(actor.id.clone(), "1234".into());
        let auth = Credentials {
            actor_id: actor.id.clone(),
            pin: "1234".into(),
        };
        (store, auth)
    }

    fn cell(user: &str, date: &str, value: CellValue) -> RequestCell {
        RequestCell {
            id: format!("{user}-{date}"),
            user_id: user.into(),
            date: d(date),
            value,
            updated_at: None,
        }
    }

    fn run(
        store: &mut MemoryStore,
        auth: &Credentials,
        cache: &mut RequestCache,
        actor: &User,
        key: &CellKey,
        choice: EditChoice,
    ) -> Result<Resolution, EditRejection> {
        let ticket = begin_edit(&ctx(actor), cache, &LockRegistry::default(), key, &choice)?;
        let result = dispatch(store, auth, &ticket);
        Ok(resolve(cache, &ticket, result))
    }

    #[test]
    fn parse_choices() {
        assert_eq!(EditChoice::parse("CLEAR"), Ok(EditChoice::Clear));
        assert_eq!(EditChoice::parse(" O "), Ok(EditChoice::Off));
        assert_eq!(EditChoice::parse("O*"), Ok(EditChoice::StrongOff));
        assert_eq!(EditChoice::parse("LD"), Ok(EditChoice::Code("LD".into())));
        assert!(EditChoice::parse("  ").is_err());
        assert!(EditChoice::parse("L D").is_err());
    }

    #[test]
    fn fifth_request_commits_sixth_is_rejected_locally() {
        let a = user("a", false);
        let (mut store, auth) = store_with(&a);
        let mut cache = RequestCache::default();
        for date in ["2026-03-02", "2026-03-03", "2026-03-04", "2026-03-05", "2026-03-06"] {
            let key = CellKey::new("a", d(date));
            let r = run(&mut store, &auth, &mut cache, &a, &key, EditChoice::Off).expect("allowed");
            assert_eq!(r.kind(), ResolutionKind::Committed);
        }

        let sat = CellKey::new("a", d("2026-03-07"));
        let writes_before = store.writes;
        let err = run(&mut store, &auth, &mut cache, &a, &sat, EditChoice::Off).unwrap_err();
        assert_eq!(err, EditRejection::Quota { count: 5, limit: 5 });
        assert_eq!(cache.displayed(&sat), None);
        assert_eq!(store.writes, writes_before);
        assert_eq!(
            UserMessage::for_rejection(&err).text(Language::En),
            "You can only enter 5 requests per week."
        );
    }

    #[test]
    fn strong_preference_cycles_and_skips_taken_rank() {
        let a = user("a", false);
        let (mut store, auth) = store_with(&a);
        let tue = CellKey::new("a", d("2026-03-03"));
        let wed = CellKey::new("a", d("2026-03-04"));
        let mut cache = RequestCache::default();

        run(&mut store, &auth, &mut cache, &a, &tue, EditChoice::StrongOff).expect("tue");
        assert_eq!(cache.current_rank(&tue), Some(Rank::First));

        // First is held by Tuesday, so Wednesday gets Second.
        run(&mut store, &auth, &mut cache, &a, &wed, EditChoice::StrongOff).expect("wed");
        assert_eq!(cache.current_rank(&wed), Some(Rank::Second));

        // Second -> None is always allowed.
        run(&mut store, &auth, &mut cache, &a, &wed, EditChoice::StrongOff).expect("wed again");
        assert_eq!(cache.displayed(&wed), Some(&CellValue::off()));
    }

    #[test]
    fn both_ranks_taken_blocks_and_leaves_cell_alone() {
        let a = user("a", false);
        let mut cache = RequestCache::from_cells(vec![
            cell("a", "2026-03-02", CellValue::ranked_off(Rank::First)),
            cell("a", "2026-03-03", CellValue::ranked_off(Rank::Second)),
            cell("a", "2026-03-04", CellValue::Code("LD".into())),
        ]);
        let wed = CellKey::new("a", d("2026-03-04"));
        let err = begin_edit(
            &ctx(&a),
            &mut cache,
            &LockRegistry::default(),
            &wed,
            &EditChoice::StrongOff,
        )
        .unwrap_err();
        assert_eq!(err, EditRejection::PriorityExhausted);
        assert_eq!(cache.displayed(&wed), Some(&CellValue::Code("LD".into())));
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn remote_quota_refusal_reverts_to_committed_value() {
        let a = user("a", false);
        let (mut store, auth) = store_with(&a);
        let key = CellKey::new("a", d("2026-03-03"));
        let mut cache = RequestCache::from_cells(vec![cell("a", "2026-03-03", CellValue::off())]);

        store.fail_next = Some(RemoteError::classify("ERROR: max 5 requests per week"));
        let r = run(
            &mut store,
            &auth,
            &mut cache,
            &a,
            &key,
            EditChoice::Code("N".into()),
        )
        .expect("validated");
        match r {
            Resolution::Reverted { value, message, .. } => {
                assert_eq!(value, Some(CellValue::off()));
                assert_eq!(
                    message.text(Language::En),
                    "Max 5 requests per week. Clear one day to pick another."
                );
            }
            other => panic!("expected revert, got {other:?}"),
        }
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn stale_answer_is_ignored_even_on_success() {
        let a = user("a", false);
        let (mut store, auth) = store_with(&a);
        let key = CellKey::new("a", d("2026-03-03"));
        let mut cache = RequestCache::default();
        let locks = LockRegistry::default();

        let first = begin_edit(&ctx(&a), &mut cache, &locks, &key, &EditChoice::Off).expect("first");
        let second = begin_edit(
            &ctx(&a),
            &mut cache,
            &locks,
            &key,
            &EditChoice::Code("LD".into()),
        )
        .expect("second");
        let r1 = dispatch(&mut store, &auth, &first);
        let r2 = dispatch(&mut store, &auth, &second);

        // Answers arrive newest first.
        assert_eq!(resolve(&mut cache, &second, r2).kind(), ResolutionKind::Committed);
        assert_eq!(resolve(&mut cache, &first, r1), Resolution::Superseded);
        assert_eq!(cache.displayed(&key), Some(&CellValue::Code("LD".into())));
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn refused_newer_edit_falls_back_to_older_one_still_in_flight() {
        let a = user("a", false);
        let (mut store, auth) = store_with(&a);
        let key = CellKey::new("a", d("2026-03-03"));
        let mut cache = RequestCache::default();
        let locks = LockRegistry::default();

        let first = begin_edit(&ctx(&a), &mut cache, &locks, &key, &EditChoice::Off).expect("first");
        let r1 = dispatch(&mut store, &auth, &first);
        let second = begin_edit(
            &ctx(&a),
            &mut cache,
            &locks,
            &key,
            &EditChoice::Code("LD".into()),
        )
        .expect("second");
        store.fail_next = Some(RemoteError::Unknown("timeout".into()));
        let r2 = dispatch(&mut store, &auth, &second);

        match resolve(&mut cache, &second, r2) {
            Resolution::Reverted { value, .. } => assert_eq!(value, Some(CellValue::off())),
            other => panic!("expected revert, got {other:?}"),
        }
        assert_eq!(cache.displayed(&key), Some(&CellValue::off()));

        // The older write did land in the store; the cache must agree.
        assert_eq!(resolve(&mut cache, &first, r1), Resolution::Superseded);
        assert_eq!(cache.displayed(&key), Some(&CellValue::off()));
        assert_eq!(cache.occupied_days("a", key.week_start()), 1);
        assert_eq!(cache.pending_len(), 0);
        assert!(store.cells.contains_key(&key));
    }

    #[test]
    fn older_success_lands_under_a_newer_pending_edit() {
        let a = user("a", false);
        let (mut store, auth) = store_with(&a);
        let key = CellKey::new("a", d("2026-03-03"));
        let mut cache = RequestCache::default();
        let locks = LockRegistry::default();

        let first = begin_edit(&ctx(&a), &mut cache, &locks, &key, &EditChoice::Off).expect("first");
        let second = begin_edit(&ctx(&a), &mut cache, &locks, &key, &EditChoice::Clear).expect("second");
        let r1 = dispatch(&mut store, &auth, &first);

        assert_eq!(resolve(&mut cache, &first, r1), Resolution::Superseded);
        // The newer clear is still what the grid shows.
        assert_eq!(cache.displayed(&key), None);
        assert!(cache.pending(&key).is_some());

        store.fail_next = Some(RemoteError::Unknown("timeout".into()));
        let r2 = dispatch(&mut store, &auth, &second);
        match resolve(&mut cache, &second, r2) {
            Resolution::Reverted { value, .. } => assert_eq!(value, Some(CellValue::off())),
            other => panic!("expected revert, got {other:?}"),
        }
    }

    #[test]
    fn pending_edit_is_superseded_by_reload() {
        let a = user("a", false);
        let key = CellKey::new("a", d("2026-03-03"));
        let mut cache = RequestCache::default();
        let ticket = begin_edit(
            &ctx(&a),
            &mut cache,
            &LockRegistry::default(),
            &key,
            &EditChoice::Off,
        )
        .expect("begin");
        cache.reload(Vec::new());
        assert_eq!(
            resolve(&mut cache, &ticket, Err(RemoteError::Unknown("late".into()))),
            Resolution::Superseded
        );
    }

    #[test]
    fn locked_cell_rejects_before_any_write() {
        let b = user("b", false);
        let key = CellKey::new("b", d("2026-03-03"));
        let locks = LockRegistry::from_locks(vec![CellLock {
            user_id: "b".into(),
            date: key.date,
            reason_en: Some("Night cover confirmed.".into()),
            reason_es: None,
            locked_by: "boss".into(),
            locked_at: Utc::now(),
        }]);
        let mut cache = RequestCache::default();
        let err = begin_edit(&ctx(&b), &mut cache, &locks, &key, &EditChoice::Off).unwrap_err();
        assert_eq!(
            UserMessage::for_rejection(&err).render(Language::En),
            "Night cover confirmed."
        );
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn admin_clear_on_other_row_uses_admin_path() {
        let boss = user("boss", true);
        let (mut store, auth) = store_with(&boss);
        store.users.push(user("b", false));
        let key = CellKey::new("b", d("2026-03-03"));
        store
            .cells
            .insert(key.clone(), cell("b", "2026-03-03", CellValue::off()));
        let mut cache = RequestCache::from_cells(vec![cell("b", "2026-03-03", CellValue::off())]);

        let r = run(&mut store, &auth, &mut cache, &boss, &key, EditChoice::Clear).expect("clear");
        assert_eq!(r, Resolution::Committed { value: None });
        assert!(store.cells.is_empty());
        assert_eq!(cache.displayed(&key), None);
    }
}
