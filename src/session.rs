//! Per-actor engine state.
//!
//! A `Session` owns everything the grid needs for one logged-in actor: the
//! loaded period and its weeks, the request cache, locks and the notice gate.
//! Nothing here is global; the IPC layer keeps at most one session alive.

use crate::autosave::{self, EditChoice, EditContext, Resolution, WriteTicket};
use crate::cache::RequestCache;
use crate::calendar::{build_weeks, effective_open, period_closed, CalendarWeek};
use crate::config::EngineConfig;
use crate::editability::{cell_access, row_unlocked, CellAccess};
use crate::error::{EditRejection, RemoteError, SessionError};
use crate::locks::LockRegistry;
use crate::messages::UserMessage;
use crate::model::{
    CellKey, CellValue, Language, PeriodDateRow, RequestCell, RoleTier, SchedulingPeriod, User,
};
use crate::notices::NoticeGate;
use crate::store::{Credentials, RequestStore, RotaReader};
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of the cross-surface login carrier string.
pub const CARRIER_PREFIX: &str = "rotareq:";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CarrierPayload {
    user_id: String,
    pin: String,
}

pub fn encode_carrier(creds: &Credentials) -> Result<String, serde_json::Error> {
    let payload = CarrierPayload {
        user_id: creds.actor_id.clone(),
        pin: creds.pin.clone(),
    };
    let json = serde_json::to_vec(&payload)?;
    Ok(format!(
        "{CARRIER_PREFIX}{}",
        base64::engine::general_purpose::STANDARD.encode(json)
    ))
}

/// Malformed or foreign carriers decode to `None`.
pub fn decode_carrier(raw: &str) -> Option<Credentials> {
    let encoded = raw.trim().strip_prefix(CARRIER_PREFIX)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let payload: CarrierPayload = serde_json::from_slice(&bytes).ok()?;
    if payload.user_id.trim().is_empty() || payload.pin.is_empty() {
        return None;
    }
    Some(Credentials {
        actor_id: payload.user_id,
        pin: payload.pin,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Rejected {
        rejection: EditRejection,
        message: UserMessage,
    },
    Resolved(Resolution),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub date: NaiveDate,
    pub value: Option<CellValue>,
    pub label: String,
    pub pending: bool,
    pub synthetic: bool,
    #[serde(flatten)]
    pub access: CellAccess,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRow {
    pub user_id: String,
    pub name: String,
    pub role: RoleTier,
    pub unlocked: bool,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridWeek {
    #[serde(flatten)]
    pub week: CalendarWeek,
    pub effective_open: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridView {
    pub period: SchedulingPeriod,
    pub period_closed: bool,
    pub language: Language,
    pub notices_blocking: bool,
    pub unread_notices: usize,
    pub weeks: Vec<GridWeek>,
    pub rows: Vec<GridRow>,
}

pub struct Session {
    actor: User,
    credentials: Option<Credentials>,
    language: Language,
    config: EngineConfig,
    period: Option<SchedulingPeriod>,
    dates: Vec<PeriodDateRow>,
    weeks: Vec<CalendarWeek>,
    users: Vec<User>,
    cache: RequestCache,
    locks: LockRegistry,
    notices: NoticeGate,
}

impl Session {
    pub fn new(actor: User, credentials: Option<Credentials>, config: EngineConfig) -> Self {
        let language = actor.language;
        Self {
            actor,
            credentials,
            language,
            config,
            period: None,
            dates: Vec::new(),
            weeks: Vec::new(),
            users: Vec::new(),
            cache: RequestCache::default(),
            locks: LockRegistry::default(),
            notices: NoticeGate::default(),
        }
    }

    pub fn actor(&self) -> &User {
        &self.actor
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, lang: Language) {
        self.language = lang;
    }

    /// Also rebuilds the weeks under the new flag fallback.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
        self.weeks = build_weeks(&self.dates, self.config.week_flag_fallback);
    }

    pub fn period(&self) -> Option<&SchedulingPeriod> {
        self.period.as_ref()
    }

    pub fn notices(&self) -> &NoticeGate {
        &self.notices
    }

    pub fn credentials(&self) -> Result<&Credentials, SessionError> {
        self.credentials.as_ref().ok_or(SessionError::LoginRequired)
    }

    /// Admin check comes first so a non-admin never sees a PIN prompt for an
    /// action they cannot take anyway.
    pub fn admin_credentials(&self) -> Result<&Credentials, SessionError> {
        if !self.actor.is_admin {
            return Err(SessionError::AdminOnly);
        }
        self.credentials()
    }

    /// Rebuilds all period state from the store. On failure the previous
    /// state is kept.
    pub fn reload<R>(&mut self, reader: &R, period_id: &str) -> Result<(), SessionError>
    where
        R: RotaReader + ?Sized,
    {
        let period = reader
            .period(period_id)?
            .ok_or_else(|| RemoteError::NotFound(format!("period {period_id}")))?;
        let dates = reader.period_dates(period_id)?;
        let mut users: Vec<User> = reader.users()?.into_iter().filter(|u| u.is_active).collect();
        users.sort_by(|a, b| {
            (a.role.id(), a.display_order, &a.name).cmp(&(b.role.id(), b.display_order, &b.name))
        });
        let cells = reader.cells_for_period(period_id)?;
        let locks = reader.locks_for_period(period_id)?;

        let dropped = self.cache.pending_len();
        if dropped > 0 {
            tracing::debug!(dropped, "reload discards in-flight edits");
        }
        self.weeks = build_weeks(&dates, self.config.week_flag_fallback);
        self.dates = dates;
        self.users = users;
        self.cache.reload(cells);
        self.locks = LockRegistry::from_locks(locks);
        self.period = Some(period);
        if let Err(e) = self.notices.refresh(reader, &self.actor) {
            tracing::warn!(error = %e, "notice refresh failed, keeping previous notices");
        }
        tracing::info!(
            period = period_id,
            weeks = self.weeks.len(),
            users = self.users.len(),
            "period loaded"
        );
        Ok(())
    }

    pub fn refresh_notices<R>(&mut self, reader: &R) -> Result<(), SessionError>
    where
        R: RotaReader + ?Sized,
    {
        self.notices.refresh(reader, &self.actor)?;
        Ok(())
    }

    pub fn week_for(&self, date: NaiveDate) -> Option<&CalendarWeek> {
        self.weeks.iter().find(|w| w.contains(date))
    }

    pub fn week_by_id(&self, week_id: &str) -> Option<&CalendarWeek> {
        self.weeks
            .iter()
            .find(|w| w.week_id.as_deref() == Some(week_id))
    }

    /// Whether the date's week accepts edits now. Filler days that are not
    /// part of the period never do.
    pub fn effective_open_on(&self, date: NaiveDate, now: DateTime<Utc>) -> bool {
        let (Some(period), Some(week)) = (self.period.as_ref(), self.week_for(date)) else {
            return false;
        };
        let in_period = week.days.iter().any(|d| d.date == date && !d.synthetic);
        in_period && effective_open(week.flags, period, now)
    }

    pub fn displayed(&self, key: &CellKey) -> Option<&CellValue> {
        self.cache.displayed(key)
    }

    pub fn begin_edit(
        &mut self,
        key: &CellKey,
        choice: &EditChoice,
        now: DateTime<Utc>,
    ) -> Result<WriteTicket, EditRejection> {
        let ctx = EditContext {
            actor: &self.actor,
            effective_open: self.effective_open_on(key.date, now),
            notices_blocking: self.notices.is_blocking(),
            quota_limit: self.config.max_requests_per_week,
            language: self.language,
        };
        autosave::begin_edit(&ctx, &mut self.cache, &self.locks, key, choice)
    }

    pub fn resolve(
        &mut self,
        ticket: &WriteTicket,
        result: Result<Option<RequestCell>, RemoteError>,
    ) -> Resolution {
        autosave::resolve(&mut self.cache, ticket, result)
    }

    /// One full edit cycle against the store.
    pub fn edit_cell<S>(
        &mut self,
        store: &mut S,
        key: &CellKey,
        choice: &EditChoice,
        now: DateTime<Utc>,
    ) -> EditOutcome
    where
        S: RequestStore + ?Sized,
    {
        let ticket = match self.begin_edit(key, choice, now) {
            Ok(t) => t,
            Err(rejection) => {
                tracing::debug!(cell = %key, code = rejection.code(), "edit rejected");
                let message = UserMessage::for_rejection(&rejection);
                return EditOutcome::Rejected { rejection, message };
            }
        };
        let result = match self.credentials.as_ref() {
            Some(auth) => autosave::dispatch(store, auth, &ticket),
            None => Err(RemoteError::Unauthorized("missing session PIN".into())),
        };
        EditOutcome::Resolved(self.resolve(&ticket, result))
    }

    pub fn lock_cell<S>(
        &mut self,
        store: &mut S,
        key: &CellKey,
        reason_en: Option<&str>,
        reason_es: Option<&str>,
    ) -> Result<(), SessionError>
    where
        S: RequestStore + ?Sized,
    {
        let auth = self.admin_credentials()?;
        let lock = store.set_lock(auth, &key.user_id, key.date, reason_en, reason_es)?;
        tracing::info!(cell = %key, "cell locked");
        self.locks.insert(lock);
        Ok(())
    }

    pub fn unlock_cell<S>(&mut self, store: &mut S, key: &CellKey) -> Result<(), SessionError>
    where
        S: RequestStore + ?Sized,
    {
        let auth = self.admin_credentials()?;
        store.clear_lock(auth, &key.user_id, key.date)?;
        tracing::info!(cell = %key, "cell unlocked");
        self.locks.remove(key);
        Ok(())
    }

    pub fn acknowledge_notice<S>(
        &mut self,
        store: &mut S,
        notice_id: &str,
        version: i64,
    ) -> Result<(), SessionError>
    where
        S: RequestStore + RotaReader + ?Sized,
    {
        self.credentials()?;
        self.notices
            .acknowledge(store, &self.actor, notice_id, version)?;
        Ok(())
    }

    /// Gate for writing a week comment on `target_user`'s row.
    pub fn check_week_comment(
        &self,
        week_id: &str,
        target_user: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EditRejection> {
        if !row_unlocked(&self.actor, target_user) {
            return Err(EditRejection::NotEditable);
        }
        if self.notices.is_blocking() {
            return Err(EditRejection::NoticesPending);
        }
        let Some(week) = self.week_by_id(week_id) else {
            return Err(EditRejection::NotEditable);
        };
        let open = self
            .period
            .as_ref()
            .map(|p| effective_open(week.flags, p, now))
            .unwrap_or(false);
        if !open && !self.actor.is_admin {
            return Err(EditRejection::NotEditable);
        }
        Ok(())
    }

    /// Grid for `window_weeks` weeks starting at the week containing `from`
    /// (or the first week of the period).
    pub fn grid(
        &self,
        now: DateTime<Utc>,
        from: Option<NaiveDate>,
    ) -> Result<GridView, SessionError> {
        let period = self.period.as_ref().ok_or(SessionError::NoPeriod)?;
        let start = match from {
            Some(date) => self
                .weeks
                .iter()
                .position(|w| w.contains(date))
                .ok_or_else(|| SessionError::UnknownDate(date.to_string()))?,
            None => 0,
        };
        let window: Vec<&CalendarWeek> = self
            .weeks
            .iter()
            .skip(start)
            .take(self.config.window_weeks)
            .collect();

        let blocking = self.notices.is_blocking();
        let weeks = window
            .iter()
            .map(|w| GridWeek {
                week: (*w).clone(),
                effective_open: effective_open(w.flags, period, now),
            })
            .collect::<Vec<_>>();

        let rows = self
            .users
            .iter()
            .map(|u| {
                let cells = weeks
                    .iter()
                    .flat_map(|gw| {
                        gw.week.days.iter().map(move |day| (gw.effective_open, day))
                    })
                    .map(|(open, day)| {
                        let key = CellKey::new(u.id.clone(), day.date);
                        let value = self.cache.displayed(&key).cloned();
                        let mut access = cell_access(
                            &self.actor,
                            &u.id,
                            open,
                            blocking,
                            self.locks.is_locked(&key),
                        );
                        if day.synthetic {
                            access.editable = false;
                        }
                        GridCell {
                            date: day.date,
                            label: value.as_ref().map(|v| v.label()).unwrap_or_default(),
                            value,
                            pending: self.cache.pending(&key).is_some(),
                            synthetic: day.synthetic,
                            access,
                        }
                    })
                    .collect();
                GridRow {
                    user_id: u.id.clone(),
                    name: u.name.clone(),
                    role: u.role,
                    unlocked: row_unlocked(&self.actor, &u.id),
                    cells,
                }
            })
            .collect();

        Ok(GridView {
            period: period.clone(),
            period_closed: period_closed(period, now),
            language: self.language,
            notices_blocking: blocking,
            unread_notices: self.notices.unread().len(),
            weeks,
            rows,
        })
    }
}
