use crate::error::RemoteError;
use crate::model::{
    CellLock, CellValue, Notice, PeriodDateRow, RequestCell, SchedulingPeriod, User,
};
use chrono::NaiveDate;

/// Identity plus session PIN sent with every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub actor_id: String,
    pub pin: String,
}

impl Credentials {
    /// `None` when acting on one's own row, so the store uses the self-service path.
    pub fn target_for<'a>(&self, user_id: &'a str) -> Option<&'a str> {
        if user_id == self.actor_id {
            None
        } else {
            Some(user_id)
        }
    }
}

/// Server-validated write operations of the store of record. Implementations
/// enforce their own rules and answer with tagged errors.
pub trait RequestStore {
    fn set_cell(
        &mut self,
        auth: &Credentials,
        target_user: Option<&str>,
        date: NaiveDate,
        value: &CellValue,
    ) -> Result<RequestCell, RemoteError>;

    fn clear_cell(
        &mut self,
        auth: &Credentials,
        target_user: Option<&str>,
        date: NaiveDate,
    ) -> Result<(), RemoteError>;

    fn set_lock(
        &mut self,
        auth: &Credentials,
        target_user: &str,
        date: NaiveDate,
        reason_en: Option<&str>,
        reason_es: Option<&str>,
    ) -> Result<CellLock, RemoteError>;

    fn clear_lock(
        &mut self,
        auth: &Credentials,
        target_user: &str,
        date: NaiveDate,
    ) -> Result<(), RemoteError>;

    fn acknowledge_notice(
        &mut self,
        user_id: &str,
        notice_id: &str,
        version: i64,
    ) -> Result<(), RemoteError>;
}

/// Read models the engine rebuilds its state from on reload.
pub trait RotaReader {
    fn period(&self, period_id: &str) -> Result<Option<SchedulingPeriod>, RemoteError>;
    fn period_dates(&self, period_id: &str) -> Result<Vec<PeriodDateRow>, RemoteError>;
    fn users(&self) -> Result<Vec<User>, RemoteError>;
    fn cells_for_period(&self, period_id: &str) -> Result<Vec<RequestCell>, RemoteError>;
    fn locks_for_period(&self, period_id: &str) -> Result<Vec<CellLock>, RemoteError>;
    fn notices_for_user(&self, user_id: &str) -> Result<Vec<Notice>, RemoteError>;
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-process store used by unit tests. Mirrors the server rules that
    //! matter for the client paths and can be told to fail the next write.

    use super::*;
    use crate::config::EngineConfig;
    use crate::model::CellKey;
    use crate::priority::RankSet;
    use chrono::Utc;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    pub struct MemoryStore {
        pub period: Option<SchedulingPeriod>,
        pub dates: Vec<PeriodDateRow>,
        pub users: Vec<User>,
        pub pins: HashMap<String, String>,
        pub cells: HashMap<CellKey, RequestCell>,
        pub locks: HashMap<CellKey, CellLock>,
        pub notices: Vec<Notice>,
        pub fail_next: Option<RemoteError>,
        pub writes: usize,
        /// Weekly cap; zero means the engine default.
        pub max_per_week: usize,
        next_id: u64,
    }

    impl MemoryStore {
        fn auth(&self, auth: &Credentials) -> Result<&User, RemoteError> {
            match self.pins.get(&auth.actor_id) {
                Some(pin) if *pin == auth.pin => {}
                _ => return Err(RemoteError::Unauthorized("bad credentials".into())),
            }
            self.users
                .iter()
                .find(|u| u.id == auth.actor_id)
                .ok_or_else(|| RemoteError::Unauthorized("unknown user".into()))
        }

        fn target(&self, auth: &Credentials, target_user: Option<&str>) -> Result<String, RemoteError> {
            let actor = self.auth(auth)?;
            match target_user {
                Some(t) if t != actor.id && !actor.is_admin => {
                    Err(RemoteError::Unauthorized("admin only".into()))
                }
                Some(t) => Ok(t.to_string()),
                None => Ok(actor.id.clone()),
            }
        }

        fn take_failure(&mut self) -> Result<(), RemoteError> {
            self.writes += 1;
            match self.fail_next.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    impl RequestStore for MemoryStore {
        fn set_cell(
            &mut self,
            auth: &Credentials,
            target_user: Option<&str>,
            date: NaiveDate,
            value: &CellValue,
        ) -> Result<RequestCell, RemoteError> {
            self.take_failure()?;
            let user_id = self.target(auth, target_user)?;
            let key = CellKey::new(user_id.clone(), date);
            let same_week: Vec<&RequestCell> = self
                .cells
                .values()
                .filter(|c| c.user_id == user_id && c.key().week_start() == key.week_start())
                .filter(|c| c.date != date)
                .collect();
            let limit = match self.max_per_week {
                0 => EngineConfig::default().max_requests_per_week,
                n => n,
            };
            if same_week.len() >= limit {
                return Err(RemoteError::QuotaExceeded { limit });
            }
            if let Some(rank) = value.rank() {
                let taken: RankSet = same_week.iter().filter_map(|c| c.value.rank()).collect();
                if taken.contains(rank) {
                    return Err(RemoteError::PrioritySlotExhausted);
                }
            }
            self.next_id += 1;
            let cell = RequestCell {
                id: format!("cell-{}", self.next_id),
                user_id,
                date,
                value: value.clone(),
                updated_at: Some(Utc::now()),
            };
            self.cells.insert(key, cell.clone());
            Ok(cell)
        }

        fn clear_cell(
            &mut self,
            auth: &Credentials,
            target_user: Option<&str>,
            date: NaiveDate,
        ) -> Result<(), RemoteError> {
            self.take_failure()?;
            let user_id = self.target(auth, target_user)?;
            self.cells.remove(&CellKey::new(user_id, date));
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
            self.take_failure()?;
            let actor = self.auth(auth)?;
            if !actor.is_admin {
                return Err(RemoteError::Unauthorized("admin only".into()));
            }
            let lock = CellLock {
                user_id: target_user.to_string(),
                date,
                reason_en: reason_en.map(str::to_string),
                reason_es: reason_es.map(str::to_string),
                locked_by: actor.id.clone(),
                locked_at: Utc::now(),
            };
            self.locks.insert(lock.key(), lock.clone());
            Ok(lock)
        }

        fn clear_lock(
            &mut self,
            auth: &Credentials,
            target_user: &str,
            date: NaiveDate,
        ) -> Result<(), RemoteError> {
            self.take_failure()?;
            if !self.auth(auth)?.is_admin {
                return Err(RemoteError::Unauthorized("admin only".into()));
            }
            self.locks.remove(&CellKey::new(target_user, date));
            Ok(())
        }

        fn acknowledge_notice(
            &mut self,
            _user_id: &str,
            notice_id: &str,
            version: i64,
        ) -> Result<(), RemoteError> {
            self.take_failure()?;
            let n = self
                .notices
                .iter_mut()
                .find(|n| n.id == notice_id)
                .ok_or_else(|| RemoteError::NotFound(notice_id.to_string()))?;
            n.ack_at = Some(Utc::now());
            n.ack_version = Some(version);
            Ok(())
        }
    }

    impl RotaReader for MemoryStore {
        fn period(&self, period_id: &str) -> Result<Option<SchedulingPeriod>, RemoteError> {
            Ok(self.period.clone().filter(|p| p.id == period_id))
        }

        fn period_dates(&self, _period_id: &str) -> Result<Vec<PeriodDateRow>, RemoteError> {
            Ok(self.dates.clone())
        }

        fn users(&self) -> Result<Vec<User>, RemoteError> {
            Ok(self.users.clone())
        }

        fn cells_for_period(&self, _period_id: &str) -> Result<Vec<RequestCell>, RemoteError> {
            Ok(self.cells.values().cloned().collect())
        }

        fn locks_for_period(&self, _period_id: &str) -> Result<Vec<CellLock>, RemoteError> {
            Ok(self.locks.values().cloned().collect())
        }

        fn notices_for_user(&self, _user_id: &str) -> Result<Vec<Notice>, RemoteError> {
            Ok(self.notices.clone())
        }
    }
}
