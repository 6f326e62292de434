//! Store of record on the workspace SQLite database.
//!
//! Every write re-checks the rules the client already applied (credential,
//! admin rights, locks, week open state, weekly cap, rank uniqueness) and
//! answers with a tagged `RemoteError`.

use crate::calendar::effective_open;
use crate::config::EngineConfig;
use crate::db::hash_pin;
use crate::error::RemoteError;
use crate::model::{
    week_start, CellKey, CellLock, CellValue, Language, Notice, PeriodDateRow, Rank, RequestCell,
    RoleTier, SchedulingPeriod, User, WeekComment, WeekFlags,
};
use crate::store::{Credentials, RequestStore, RotaReader};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

fn conversion(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion(idx, e))
}

/// Unparseable timestamps read as absent.
fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    Ok(s.and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|t| t.with_timezone(&Utc)))
}

fn role_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<RoleTier> {
    let v: i64 = row.get(idx)?;
    RoleTier::try_from(v).map_err(|msg| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, msg.into())
    })
}

fn value_cols(row: &Row<'_>, code_idx: usize, rank_idx: usize) -> rusqlite::Result<CellValue> {
    let code: String = row.get(code_idx)?;
    let rank: Option<u8> = row.get(rank_idx)?;
    let rank = match rank {
        Some(r) => Some(Rank::try_from(r).map_err(|msg| {
            rusqlite::Error::FromSqlConversionFailure(rank_idx, Type::Integer, msg.into())
        })?),
        None => None,
    };
    CellValue::from_parts(&code, rank)
        .map_err(|msg| rusqlite::Error::FromSqlConversionFailure(code_idx, Type::Text, msg.into()))
}

const USER_COLUMNS: &str = "id, name, role, is_admin, is_active, display_order, language";

fn user_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let lang: String = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        role: role_col(row, 2)?,
        is_admin: row.get(3)?,
        is_active: row.get(4)?,
        display_order: row.get(5)?,
        language: Language::parse(&lang).unwrap_or_default(),
    })
}

const PERIOD_COLUMNS: &str = "id, name, start_date, end_date, is_active, is_hidden, closes_at";

fn period_row(row: &Row<'_>) -> rusqlite::Result<SchedulingPeriod> {
    Ok(SchedulingPeriod {
        id: row.get(0)?,
        name: row.get(1)?,
        start_date: date_col(row, 2)?,
        end_date: date_col(row, 3)?,
        is_active: row.get(4)?,
        is_hidden: row.get(5)?,
        closes_at: ts_col(row, 6)?,
    })
}

fn cell_row(row: &Row<'_>) -> rusqlite::Result<RequestCell> {
    Ok(RequestCell {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: date_col(row, 2)?,
        value: value_cols(row, 3, 4)?,
        updated_at: ts_col(row, 5)?,
    })
}

fn lock_row(row: &Row<'_>) -> rusqlite::Result<CellLock> {
    Ok(CellLock {
        user_id: row.get(0)?,
        date: date_col(row, 1)?,
        reason_en: row.get(2)?,
        reason_es: row.get(3)?,
        locked_by: row.get(4)?,
        locked_at: ts_col(row, 5)?.unwrap_or_default(),
    })
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|v| !v.is_empty())
}

/// Which weeks an admin flag change applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeekScope {
    Week(String),
    Period(String),
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
    config: EngineConfig,
    now: DateTime<Utc>,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection, config: EngineConfig) -> Self {
        Self {
            conn,
            config,
            now: Utc::now(),
        }
    }

    /// Pins the clock used for deadline checks and timestamps.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn user(&self, user_id: &str) -> Result<Option<User>, RemoteError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        Ok(self
            .conn
            .query_row(&sql, [user_id], user_row)
            .optional()?)
    }

    /// Returns the user when the PIN matches and the account is active.
    pub fn verify_credential(&self, user_id: &str, pin: &str) -> Result<User, RemoteError> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT pin_hash FROM users WHERE id = ? AND is_active = 1",
                [user_id],
                |r| r.get(0),
            )
            .optional()?;
        match stored {
            Some(h) if h == hash_pin(user_id, pin) => {}
            _ => return Err(RemoteError::Unauthorized("invalid credentials".into())),
        }
        self.user(user_id)?
            .ok_or_else(|| RemoteError::Unauthorized("invalid credentials".into()))
    }

    fn require_admin(&self, auth: &Credentials) -> Result<User, RemoteError> {
        let actor = self.verify_credential(&auth.actor_id, &auth.pin)?;
        if !actor.is_admin {
            return Err(RemoteError::Unauthorized("admin only".into()));
        }
        Ok(actor)
    }

    /// Resolves whose row a write targets. Other users' rows need admin.
    fn target_user(&self, actor: &User, target: Option<&str>) -> Result<String, RemoteError> {
        match target {
            None => Ok(actor.id.clone()),
            Some(t) if t == actor.id => Ok(actor.id.clone()),
            Some(t) => {
                if !actor.is_admin {
                    return Err(RemoteError::Unauthorized("admin only".into()));
                }
                if self.user(t)?.is_none() {
                    return Err(RemoteError::NotFound(format!("user {t}")));
                }
                Ok(t.to_string())
            }
        }
    }

    /// Period and resolved week flags for a date, if the date belongs to one.
    fn week_of(&self, date: NaiveDate) -> Result<Option<(SchedulingPeriod, WeekFlags)>, RemoteError> {
        let sql = "SELECT p.id, p.name, p.start_date, p.end_date, p.is_active, p.is_hidden, p.closes_at,
                          w.open, w.open_after_close
                   FROM period_dates d
                   JOIN periods p ON p.id = d.period_id
                   LEFT JOIN weeks w ON w.id = d.week_id
                   WHERE d.date = ?
                   ORDER BY p.start_date DESC
                   LIMIT 1";
        let fallback = self.config.week_flag_fallback;
        Ok(self
            .conn
            .query_row(sql, [date.to_string()], |r| {
                let open: Option<bool> = r.get(7)?;
                let after: Option<bool> = r.get(8)?;
                Ok((
                    period_row(r)?,
                    WeekFlags {
                        open: fallback.resolve(open),
                        open_after_close: fallback.resolve(after),
                    },
                ))
            })
            .optional()?)
    }

    fn is_locked(&self, user_id: &str, date: NaiveDate) -> Result<bool, RemoteError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cell_locks WHERE user_id = ? AND date = ?",
            (user_id, date.to_string()),
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    /// Lock and week checks. Admins bypass both.
    fn check_writable(&self, actor: &User, user_id: &str, date: NaiveDate) -> Result<(), RemoteError> {
        let Some((period, flags)) = self.week_of(date)? else {
            return Err(RemoteError::Invalid(format!(
                "{date} is not part of any period"
            )));
        };
        if actor.is_admin {
            return Ok(());
        }
        if self.is_locked(user_id, date)? {
            return Err(RemoteError::Locked);
        }
        if !effective_open(flags, &period, self.now) {
            return Err(RemoteError::WeekClosed);
        }
        Ok(())
    }

    /// Other days of the user's week holding a request.
    fn week_neighbours(&self, user_id: &str, date: NaiveDate) -> Result<Vec<RequestCell>, RemoteError> {
        let start = week_start(date);
        let end = start + Duration::days(6);
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, date, code, rank, updated_at FROM request_cells
             WHERE user_id = ? AND date >= ? AND date <= ? AND date <> ?",
        )?;
        let rows = stmt
            .query_map(
                (
                    user_id,
                    start.to_string(),
                    end.to_string(),
                    date.to_string(),
                ),
                cell_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn cell(&self, user_id: &str, date: NaiveDate) -> Result<Option<RequestCell>, RemoteError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id, date, code, rank, updated_at FROM request_cells
                 WHERE user_id = ? AND date = ?",
                (user_id, date.to_string()),
                cell_row,
            )
            .optional()?)
    }

    pub fn list_periods(&self, include_hidden: bool) -> Result<Vec<SchedulingPeriod>, RemoteError> {
        let sql = format!(
            "SELECT {PERIOD_COLUMNS} FROM periods WHERE ? OR is_hidden = 0 ORDER BY start_date"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([include_hidden], period_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Admin change of week flags. Returns the number of weeks touched.
    pub fn set_week_flags(
        &self,
        auth: &Credentials,
        scope: &WeekScope,
        flags: WeekFlags,
    ) -> Result<usize, RemoteError> {
        self.require_admin(auth)?;
        let n = match scope {
            WeekScope::Week(id) => self.conn.execute(
                "UPDATE weeks SET open = ?, open_after_close = ? WHERE id = ?",
                (flags.open, flags.open_after_close, id),
            )?,
            WeekScope::Period(id) => self.conn.execute(
                "UPDATE weeks SET open = ?, open_after_close = ? WHERE period_id = ?",
                (flags.open, flags.open_after_close, id),
            )?,
        };
        if n == 0 {
            return Err(RemoteError::NotFound(match scope {
                WeekScope::Week(id) => format!("week {id}"),
                WeekScope::Period(id) => format!("weeks of period {id}"),
            }));
        }
        tracing::info!(?scope, open = flags.open, open_after_close = flags.open_after_close, weeks = n, "week flags set");
        Ok(n)
    }

    pub fn week_comments(&self, week_id: &str) -> Result<Vec<WeekComment>, RemoteError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.week_id, c.user_id, u.name, c.comment, c.updated_at
             FROM week_comments c
             LEFT JOIN users u ON u.id = c.user_id
             WHERE c.week_id = ?
             ORDER BY u.role, u.display_order, u.name",
        )?;
        let rows = stmt
            .query_map([week_id], |r| {
                Ok(WeekComment {
                    week_id: r.get(0)?,
                    user_id: r.get(1)?,
                    user_name: r.get(2)?,
                    comment: r.get(3)?,
                    updated_at: ts_col(r, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// A blank comment deletes the entry and yields `None`.
    pub fn upsert_week_comment(
        &self,
        auth: &Credentials,
        target_user: Option<&str>,
        week_id: &str,
        comment: &str,
    ) -> Result<Option<WeekComment>, RemoteError> {
        let actor = self.verify_credential(&auth.actor_id, &auth.pin)?;
        let user_id = self.target_user(&actor, target_user)?;
        let exists: Option<String> = self
            .conn
            .query_row("SELECT id FROM weeks WHERE id = ?", [week_id], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(RemoteError::NotFound(format!("week {week_id}")));
        }

        let Some(text) = non_blank(Some(comment)) else {
            self.conn.execute(
                "DELETE FROM week_comments WHERE week_id = ? AND user_id = ?",
                (week_id, &user_id),
            )?;
            return Ok(None);
        };
        self.conn.execute(
            "INSERT INTO week_comments(week_id, user_id, comment, updated_at) VALUES(?, ?, ?, ?)
             ON CONFLICT(week_id, user_id) DO UPDATE SET
               comment = excluded.comment,
               updated_at = excluded.updated_at",
            (week_id, &user_id, text, self.now.to_rfc3339()),
        )?;
        Ok(self
            .week_comments(week_id)?
            .into_iter()
            .find(|c| c.user_id == user_id))
    }

    fn updated_period(&self, period_id: &str, n: usize) -> Result<SchedulingPeriod, RemoteError> {
        if n == 0 {
            return Err(RemoteError::NotFound(format!("period {period_id}")));
        }
        self.period(period_id)?
            .ok_or_else(|| RemoteError::NotFound(format!("period {period_id}")))
    }

    /// `None` removes the deadline.
    pub fn set_period_closes_at(
        &self,
        auth: &Credentials,
        period_id: &str,
        closes_at: Option<DateTime<Utc>>,
    ) -> Result<SchedulingPeriod, RemoteError> {
        self.require_admin(auth)?;
        let n = self.conn.execute(
            "UPDATE periods SET closes_at = ? WHERE id = ?",
            (closes_at.map(|t| t.to_rfc3339()), period_id),
        )?;
        let period = self.updated_period(period_id, n)?;
        tracing::info!(period = period_id, closes_at = ?period.closes_at, "period deadline set");
        Ok(period)
    }

    /// At most one period is active; activating one clears the rest.
    pub fn set_active_period(
        &self,
        auth: &Credentials,
        period_id: &str,
    ) -> Result<SchedulingPeriod, RemoteError> {
        self.require_admin(auth)?;
        if self.period(period_id)?.is_none() {
            return Err(RemoteError::NotFound(format!("period {period_id}")));
        }
        self.conn.execute(
            "UPDATE periods SET is_active = (id = ?)",
            [period_id],
        )?;
        tracing::info!(period = period_id, "active period set");
        self.updated_period(period_id, 1)
    }

    pub fn set_period_hidden(
        &self,
        auth: &Credentials,
        period_id: &str,
        hidden: bool,
    ) -> Result<SchedulingPeriod, RemoteError> {
        self.require_admin(auth)?;
        let n = self.conn.execute(
            "UPDATE periods SET is_hidden = ? WHERE id = ?",
            (hidden, period_id),
        )?;
        let period = self.updated_period(period_id, n)?;
        tracing::info!(period = period_id, hidden, "period visibility set");
        Ok(period)
    }

    /// Stores the display language a user last picked.
    pub fn set_user_language(&self, user_id: &str, language: Language) -> Result<(), RemoteError> {
        let n = self.conn.execute(
            "UPDATE users SET language = ? WHERE id = ?",
            (language.as_str(), user_id),
        )?;
        if n == 0 {
            return Err(RemoteError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }
}

impl RequestStore for SqliteStore<'_> {
    fn set_cell(
        &mut self,
        auth: &Credentials,
        target_user: Option<&str>,
        date: NaiveDate,
        value: &CellValue,
    ) -> Result<RequestCell, RemoteError> {
        let actor = self.verify_credential(&auth.actor_id, &auth.pin)?;
        let user_id = self.target_user(&actor, target_user)?;
        self.check_writable(&actor, &user_id, date)?;

        let neighbours = self.week_neighbours(&user_id, date)?;
        let limit = self.config.max_requests_per_week;
        if neighbours.len() >= limit {
            return Err(RemoteError::QuotaExceeded { limit });
        }
        if let Some(rank) = value.rank() {
            if neighbours.iter().any(|c| c.value.rank() == Some(rank)) {
                return Err(RemoteError::PrioritySlotExhausted);
            }
        }

        self.conn.execute(
            "INSERT INTO request_cells(id, user_id, date, code, rank, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, date) DO UPDATE SET
               code = excluded.code,
               rank = excluded.rank,
               updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                &user_id,
                date.to_string(),
                value.code(),
                value.rank().map(|r| r.number()),
                self.now.to_rfc3339(),
            ),
        )?;
        tracing::debug!(cell = %CellKey::new(user_id.clone(), date), by = %actor.id, "cell saved");
        self.cell(&user_id, date)?
            .ok_or_else(|| RemoteError::Unknown("saved cell not found".into()))
    }

    fn clear_cell(
        &mut self,
        auth: &Credentials,
        target_user: Option<&str>,
        date: NaiveDate,
    ) -> Result<(), RemoteError> {
        let actor = self.verify_credential(&auth.actor_id, &auth.pin)?;
        let user_id = self.target_user(&actor, target_user)?;
        self.check_writable(&actor, &user_id, date)?;
        self.conn.execute(
            "DELETE FROM request_cells WHERE user_id = ? AND date = ?",
            (&user_id, date.to_string()),
        )?;
        Ok(())
    }

    fn set_lock(
        &mut self,
        auth: &Credentials,
        target_user: &str,
        date: NaiveDate,
        reason_en: Option<&str>,
        reason_es: Option<&str>,
    ) -> Result<CellLock, RemoteError> {
        let actor = self.require_admin(auth)?;
        if self.user(target_user)?.is_none() {
            return Err(RemoteError::NotFound(format!("user {target_user}")));
        }
        let lock = CellLock {
            user_id: target_user.to_string(),
            date,
            reason_en: non_blank(reason_en).map(str::to_string),
            reason_es: non_blank(reason_es).map(str::to_string),
            locked_by: actor.id,
            locked_at: self.now,
        };
        self.conn.execute(
            "INSERT INTO cell_locks(user_id, date, reason_en, reason_es, locked_by, locked_at)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, date) DO UPDATE SET
               reason_en = excluded.reason_en,
               reason_es = excluded.reason_es,
               locked_by = excluded.locked_by,
               locked_at = excluded.locked_at",
            (
                &lock.user_id,
                date.to_string(),
                &lock.reason_en,
                &lock.reason_es,
                &lock.locked_by,
                lock.locked_at.to_rfc3339(),
            ),
        )?;
        Ok(lock)
    }

    fn clear_lock(
        &mut self,
        auth: &Credentials,
        target_user: &str,
        date: NaiveDate,
    ) -> Result<(), RemoteError> {
        self.require_admin(auth)?;
        self.conn.execute(
            "DELETE FROM cell_locks WHERE user_id = ? AND date = ?",
            (target_user, date.to_string()),
        )?;
        Ok(())
    }

    fn acknowledge_notice(
        &mut self,
        user_id: &str,
        notice_id: &str,
        version: i64,
    ) -> Result<(), RemoteError> {
        let current: Option<i64> = self
            .conn
            .query_row(
                "SELECT version FROM notices WHERE id = ?",
                [notice_id],
                |r| r.get(0),
            )
            .optional()?;
        if current.is_none() {
            return Err(RemoteError::NotFound(format!("notice {notice_id}")));
        }
        self.conn.execute(
            "INSERT INTO notice_acks(notice_id, user_id, version, acked_at) VALUES(?, ?, ?, ?)
             ON CONFLICT(notice_id, user_id) DO UPDATE SET
               version = excluded.version,
               acked_at = excluded.acked_at",
            (notice_id, user_id, version, self.now.to_rfc3339()),
        )?;
        Ok(())
    }
}

impl RotaReader for SqliteStore<'_> {
    fn period(&self, period_id: &str) -> Result<Option<SchedulingPeriod>, RemoteError> {
        let sql = format!("SELECT {PERIOD_COLUMNS} FROM periods WHERE id = ?");
        Ok(self
            .conn
            .query_row(&sql, [period_id], period_row)
            .optional()?)
    }

    fn period_dates(&self, period_id: &str) -> Result<Vec<PeriodDateRow>, RemoteError> {
        let mut stmt = self.conn.prepare(
            "SELECT d.date, d.week_id, w.open, w.open_after_close
             FROM period_dates d
             LEFT JOIN weeks w ON w.id = d.week_id
             WHERE d.period_id = ?
             ORDER BY d.date",
        )?;
        let rows = stmt
            .query_map([period_id], |r| {
                Ok(PeriodDateRow {
                    date: date_col(r, 0)?,
                    week_id: r.get(1)?,
                    week_open: r.get(2)?,
                    week_open_after_close: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn users(&self) -> Result<Vec<User>, RemoteError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY role, display_order, name");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], user_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn cells_for_period(&self, period_id: &str) -> Result<Vec<RequestCell>, RemoteError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.user_id, c.date, c.code, c.rank, c.updated_at
             FROM request_cells c
             JOIN period_dates d ON d.date = c.date AND d.period_id = ?",
        )?;
        let rows = stmt
            .query_map([period_id], cell_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn locks_for_period(&self, period_id: &str) -> Result<Vec<CellLock>, RemoteError> {
        let mut stmt = self.conn.prepare(
            "SELECT l.user_id, l.date, l.reason_en, l.reason_es, l.locked_by, l.locked_at
             FROM cell_locks l
             JOIN period_dates d ON d.date = l.date AND d.period_id = ?",
        )?;
        let rows = stmt
            .query_map([period_id], lock_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn notices_for_user(&self, user_id: &str) -> Result<Vec<Notice>, RemoteError> {
        let mut stmt = self.conn.prepare(
            "SELECT n.id, n.version, n.title, n.body_en, n.body_es, n.target_all, n.target_roles,
                    n.is_active, n.mandatory, n.updated_at, a.acked_at, a.version
             FROM notices n
             LEFT JOIN notice_acks a ON a.notice_id = n.id AND a.user_id = ?
             ORDER BY n.updated_at DESC",
        )?;
        let rows = stmt
            .query_map([user_id], |r| {
                let roles: String = r.get(6)?;
                Ok(Notice {
                    id: r.get(0)?,
                    version: r.get(1)?,
                    title: r.get(2)?,
                    body_en: r.get(3)?,
                    body_es: r.get(4)?,
                    target_all: r.get(5)?,
                    target_roles: serde_json::from_str(&roles).unwrap_or_default(),
                    is_active: r.get(7)?,
                    mandatory: r.get(8)?,
                    updated_at: ts_col(r, 9)?,
                    ack_at: ts_col(r, 10)?,
                    ack_version: r.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::directory::{self, Directory};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 20, 12, 0, 0).unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn seeded() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        let dir: Directory = serde_json::from_value(serde_json::json!({
            "users": [
                { "id": "boss", "name": "Boss", "role": 1, "isAdmin": true, "pin": "9999" },
                { "id": "a", "name": "Ana", "role": 2, "pin": "1234" },
                { "id": "b", "name": "Ben", "role": 3, "pin": "5678", "language": "es" }
            ],
            "periods": [{
                "id": "p1", "name": "March",
                "startDate": "2026-03-01", "endDate": "2026-03-14",
                "closesAt": "2026-02-25T00:00:00Z",
                "weeks": [
                    { "id": "w1", "open": true, "openAfterClose": false,
                      "dates": ["2026-03-01","2026-03-02","2026-03-03","2026-03-04","2026-03-05","2026-03-06","2026-03-07"] },
                    { "id": "w2", "open": false, "openAfterClose": true,
                      "dates": ["2026-03-08","2026-03-09","2026-03-10"] }
                ]
            }]
        }))
        .expect("dir");
        directory::import(&mut conn, &dir, &EngineConfig::default()).expect("import");
        conn
    }

    fn creds(id: &str, pin: &str) -> Credentials {
        Credentials {
            actor_id: id.into(),
            pin: pin.into(),
        }
    }

    #[test]
    fn wrong_pin_is_unauthorized() {
        let conn = seeded();
        let mut store = SqliteStore::new(&conn, EngineConfig::default()).at(now());
        let err = store
            .set_cell(&creds("a", "0000"), None, d("2026-03-02"), &CellValue::off())
            .unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized(_)));
        assert!(store.verify_credential("a", "1234").is_ok());
    }

    #[test]
    fn sixth_request_in_a_week_is_quota_exceeded() {
        let conn = seeded();
        let mut store = SqliteStore::new(&conn, EngineConfig::default()).at(now());
        let a = creds("a", "1234");
        for day in 1..=5 {
            let date = d("2026-03-01") + Duration::days(day);
            store
                .set_cell(&a, None, date, &CellValue::off())
                .expect("within cap");
        }
        let err = store
            .set_cell(&a, None, d("2026-03-07"), &CellValue::off())
            .unwrap_err();
        assert_eq!(err, RemoteError::QuotaExceeded { limit: 5 });
        // Re-saving an existing day is fine.
        store
            .set_cell(&a, None, d("2026-03-02"), &CellValue::Code("N".into()))
            .expect("overwrite");
    }

    #[test]
    fn quota_refusal_carries_the_configured_cap() {
        let conn = seeded();
        let cfg = EngineConfig {
            max_requests_per_week: 3,
            ..EngineConfig::default()
        };
        let mut store = SqliteStore::new(&conn, cfg).at(now());
        let a = creds("a", "1234");
        for day in 1..=3 {
            let date = d("2026-03-01") + Duration::days(day);
            store
                .set_cell(&a, None, date, &CellValue::off())
                .expect("within cap");
        }
        let err = store
            .set_cell(&a, None, d("2026-03-05"), &CellValue::off())
            .unwrap_err();
        assert_eq!(err, RemoteError::QuotaExceeded { limit: 3 });
        assert_eq!(
            crate::messages::UserMessage::for_remote(&err).render(Language::En),
            "Max 3 requests per week. Clear one day to pick another."
        );
    }

    #[test]
    fn duplicate_rank_is_refused() {
        let conn = seeded();
        let mut store = SqliteStore::new(&conn, EngineConfig::default()).at(now());
        let a = creds("a", "1234");
        store
            .set_cell(&a, None, d("2026-03-02"), &CellValue::ranked_off(Rank::First))
            .expect("first");
        let err = store
            .set_cell(&a, None, d("2026-03-03"), &CellValue::ranked_off(Rank::First))
            .unwrap_err();
        assert_eq!(err, RemoteError::PrioritySlotExhausted);
    }

    #[test]
    fn closed_week_and_locks_only_bind_non_admins() {
        let conn = seeded();
        let mut store = SqliteStore::new(&conn, EngineConfig::default()).at(now());
        let a = creds("a", "1234");
        let boss = creds("boss", "9999");

        assert_eq!(
            store
                .set_cell(&a, None, d("2026-03-09"), &CellValue::off())
                .unwrap_err(),
            RemoteError::WeekClosed
        );
        store
            .set_cell(&boss, Some("a"), d("2026-03-09"), &CellValue::off())
            .expect("admin write");

        store
            .set_lock(&boss, "a", d("2026-03-03"), Some("Night cover confirmed."), None)
            .expect("lock");
        assert_eq!(
            store
                .set_cell(&a, None, d("2026-03-03"), &CellValue::off())
                .unwrap_err(),
            RemoteError::Locked
        );
        assert!(matches!(
            store.set_lock(&a, "a", d("2026-03-04"), None, None),
            Err(RemoteError::Unauthorized(_))
        ));
        assert!(matches!(
            store.set_cell(&a, Some("b"), d("2026-03-04"), &CellValue::off()),
            Err(RemoteError::Unauthorized(_))
        ));
    }

    #[test]
    fn deadline_switches_to_after_close_flag() {
        let conn = seeded();
        let late = Utc.with_ymd_and_hms(2026, 2, 26, 0, 0, 0).unwrap();
        let mut store = SqliteStore::new(&conn, EngineConfig::default()).at(late);
        let a = creds("a", "1234");
        assert_eq!(
            store
                .set_cell(&a, None, d("2026-03-02"), &CellValue::off())
                .unwrap_err(),
            RemoteError::WeekClosed
        );
        store
            .set_cell(&a, None, d("2026-03-09"), &CellValue::off())
            .expect("open after close");
    }

    #[test]
    fn acknowledgment_is_per_user_and_version() {
        let mut conn = seeded();
        let dir: Directory = serde_json::from_value(serde_json::json!({
            "notices": [{ "id": "n1", "version": 2, "title": "Rules", "bodyEn": "Read", "mandatory": true }]
        }))
        .expect("dir");
        directory::import(&mut conn, &dir, &EngineConfig::default()).expect("notices");
        let mut store = SqliteStore::new(&conn, EngineConfig::default()).at(now());

        store.acknowledge_notice("a", "n1", 2).expect("ack");
        let for_a = store.notices_for_user("a").expect("a");
        assert!(for_a[0].is_acknowledged());
        let for_b = store.notices_for_user("b").expect("b");
        assert!(!for_b[0].is_acknowledged());
        assert!(matches!(
            store.acknowledge_notice("a", "missing", 1),
            Err(RemoteError::NotFound(_))
        ));
    }

    #[test]
    fn week_comment_upsert_and_delete() {
        let conn = seeded();
        let store = SqliteStore::new(&conn, EngineConfig::default()).at(now());
        let a = creds("a", "1234");
        let c = store
            .upsert_week_comment(&a, None, "w1", "  Prefer early shifts  ")
            .expect("upsert")
            .expect("comment");
        assert_eq!(c.comment, "Prefer early shifts");
        assert_eq!(c.user_name.as_deref(), Some("Ana"));
        assert_eq!(store.week_comments("w1").expect("list").len(), 1);
        assert_eq!(store.upsert_week_comment(&a, None, "w1", " ").expect("delete"), None);
        assert!(store.week_comments("w1").expect("list").is_empty());
    }

    #[test]
    fn week_flags_reset_for_period() {
        let conn = seeded();
        let store = SqliteStore::new(&conn, EngineConfig::default()).at(now());
        let n = store
            .set_week_flags(
                &creds("boss", "9999"),
                &WeekScope::Period("p1".into()),
                WeekFlags {
                    open: false,
                    open_after_close: false,
                },
            )
            .expect("reset");
        assert_eq!(n, 2);
        let rows = store.period_dates("p1").expect("dates");
        assert!(rows.iter().all(|r| r.week_open == Some(false)));
    }

    #[test]
    fn moving_the_deadline_reopens_the_week_for_requests() {
        let conn = seeded();
        let late = Utc.with_ymd_and_hms(2026, 2, 26, 0, 0, 0).unwrap();
        let mut store = SqliteStore::new(&conn, EngineConfig::default()).at(late);
        let a = creds("a", "1234");
        let boss = creds("boss", "9999");
        assert_eq!(
            store
                .set_cell(&a, None, d("2026-03-02"), &CellValue::off())
                .unwrap_err(),
            RemoteError::WeekClosed
        );

        let later = Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap();
        let p = store
            .set_period_closes_at(&boss, "p1", Some(later))
            .expect("move deadline");
        assert_eq!(p.closes_at, Some(later));
        store
            .set_cell(&a, None, d("2026-03-02"), &CellValue::off())
            .expect("open again");

        assert!(matches!(
            store.set_period_closes_at(&a, "p1", None),
            Err(RemoteError::Unauthorized(_))
        ));
        assert!(matches!(
            store.set_period_closes_at(&boss, "missing", None),
            Err(RemoteError::NotFound(_))
        ));
        let p = store.set_period_closes_at(&boss, "p1", None).expect("clear");
        assert_eq!(p.closes_at, None);
    }

    #[test]
    fn only_one_period_is_active_and_hidden_ones_drop_from_the_list() {
        let mut conn = seeded();
        let dir: Directory = serde_json::from_value(serde_json::json!({
            "periods": [{
                "id": "p2", "name": "April",
                "startDate": "2026-04-01", "endDate": "2026-04-07",
                "weeks": [{ "id": "w3", "dates": ["2026-04-01"] }]
            }]
        }))
        .expect("dir");
        directory::import(&mut conn, &dir, &EngineConfig::default()).expect("p2");
        let store = SqliteStore::new(&conn, EngineConfig::default()).at(now());
        let boss = creds("boss", "9999");

        store.set_active_period(&boss, "p1").expect("p1 active");
        let p2 = store.set_active_period(&boss, "p2").expect("p2 active");
        assert!(p2.is_active);
        let active: Vec<_> = store
            .list_periods(true)
            .expect("list")
            .into_iter()
            .filter(|p| p.is_active)
            .map(|p| p.id)
            .collect();
        assert_eq!(active, vec!["p2".to_string()]);

        let p1 = store.set_period_hidden(&boss, "p1", true).expect("hide");
        assert!(p1.is_hidden);
        let visible: Vec<_> = store
            .list_periods(false)
            .expect("list")
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(visible, vec!["p2".to_string()]);
        assert_eq!(store.list_periods(true).expect("all").len(), 2);

        assert!(matches!(
            store.set_active_period(&creds("a", "1234"), "p1"),
            Err(RemoteError::Unauthorized(_))
        ));
        assert!(matches!(
            store.set_period_hidden(&boss, "missing", true),
            Err(RemoteError::NotFound(_))
        ));
    }

    #[test]
    fn user_language_is_persisted() {
        let conn = seeded();
        let store = SqliteStore::new(&conn, EngineConfig::default()).at(now());
        store.set_user_language("a", Language::Es).expect("save");
        assert_eq!(store.user("a").expect("read").expect("a").language, Language::Es);
        assert!(matches!(
            store.set_user_language("ghost", Language::En),
            Err(RemoteError::NotFound(_))
        ));
    }
}
