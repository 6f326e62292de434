use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value code stored for a day-off request. Ranked offs are stored as this
/// code plus a rank.
pub const OFF_CODE: &str = "O";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Language::En),
            "es" => Some(Language::Es),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }
}

/// Staff tier. Wire and storage use the numeric ids 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RoleTier {
    Charge,
    Staff,
    Assistant,
}

impl RoleTier {
    pub fn id(self) -> i64 {
        match self {
            RoleTier::Charge => 1,
            RoleTier::Staff => 2,
            RoleTier::Assistant => 3,
        }
    }
}

impl TryFrom<i64> for RoleTier {
    type Error = String;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(RoleTier::Charge),
            2 => Ok(RoleTier::Staff),
            3 => Ok(RoleTier::Assistant),
            other => Err(format!("unknown role id: {other}")),
        }
    }
}

impl From<RoleTier> for i64 {
    fn from(r: RoleTier) -> i64 {
        r.id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: RoleTier,
    pub is_admin: bool,
    pub is_active: bool,
    pub display_order: i64,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingPeriod {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub is_hidden: bool,
    pub closes_at: Option<DateTime<Utc>>,
}

/// The two editability flags a week carries: one for before the period
/// deadline, one for after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekFlags {
    pub open: bool,
    pub open_after_close: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Week {
    pub id: String,
    pub period_id: String,
    #[serde(flatten)]
    pub flags: WeekFlags,
}

/// One dated row of a period as the store returns it. Week flags are
/// optional because a date may not be attached to a week yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodDateRow {
    pub date: NaiveDate,
    pub week_id: Option<String>,
    pub week_open: Option<bool>,
    pub week_open_after_close: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellKey {
    pub user_id: String,
    pub date: NaiveDate,
}

impl CellKey {
    pub fn new(user_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            date,
        }
    }

    pub fn week_start(&self) -> NaiveDate {
        week_start(self.date)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.user_id, self.date)
    }
}

/// Sunday that starts the 7-day window containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rank {
    First,
    Second,
}

impl Rank {
    pub fn number(self) -> u8 {
        match self {
            Rank::First => 1,
            Rank::Second => 2,
        }
    }

    pub fn other(self) -> Rank {
        match self {
            Rank::First => Rank::Second,
            Rank::Second => Rank::First,
        }
    }
}

impl TryFrom<u8> for Rank {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Rank::First),
            2 => Ok(Rank::Second),
            other => Err(format!("rank must be 1 or 2, got {other}")),
        }
    }
}

impl From<Rank> for u8 {
    fn from(r: Rank) -> u8 {
        r.number()
    }
}

/// Content of a request cell. A rank can only exist on a day off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CellValueWire", into = "CellValueWire")]
pub enum CellValue {
    Off { rank: Option<Rank> },
    Code(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CellValueWire {
    code: String,
    #[serde(default)]
    rank: Option<Rank>,
}

impl CellValue {
    pub fn off() -> Self {
        CellValue::Off { rank: None }
    }

    pub fn ranked_off(rank: Rank) -> Self {
        CellValue::Off { rank: Some(rank) }
    }

    /// Build a value from its stored parts. Rejects blank codes and ranks on
    /// anything other than a day off.
    pub fn from_parts(code: &str, rank: Option<Rank>) -> Result<Self, String> {
        let code = code.trim();
        if code.is_empty() {
            return Err("value code must not be empty".to_string());
        }
        if code == OFF_CODE {
            return Ok(CellValue::Off { rank });
        }
        if rank.is_some() {
            return Err(format!("rank is only valid on {OFF_CODE}, got {code}"));
        }
        Ok(CellValue::Code(code.to_string()))
    }

    pub fn code(&self) -> &str {
        match self {
            CellValue::Off { .. } => OFF_CODE,
            CellValue::Code(c) => c.as_str(),
        }
    }

    pub fn rank(&self) -> Option<Rank> {
        match self {
            CellValue::Off { rank } => *rank,
            CellValue::Code(_) => None,
        }
    }

    /// Short label used by grid views: `O`, `O¹`, `O²` or the code.
    pub fn label(&self) -> String {
        match self {
            CellValue::Off { rank: None } => OFF_CODE.to_string(),
            CellValue::Off {
                rank: Some(Rank::First),
            } => format!("{OFF_CODE}¹"),
            CellValue::Off {
                rank: Some(Rank::Second),
            } => format!("{OFF_CODE}²"),
            CellValue::Code(c) => c.clone(),
        }
    }
}

impl TryFrom<CellValueWire> for CellValue {
    type Error = String;

    fn try_from(w: CellValueWire) -> Result<Self, Self::Error> {
        CellValue::from_parts(&w.code, w.rank)
    }
}

impl From<CellValue> for CellValueWire {
    fn from(v: CellValue) -> Self {
        CellValueWire {
            code: v.code().to_string(),
            rank: v.rank(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCell {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub value: CellValue,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RequestCell {
    pub fn key(&self) -> CellKey {
        CellKey::new(self.user_id.clone(), self.date)
    }
}

/// Speculative local edit awaiting the store. `value: None` is a pending clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEdit {
    pub key: CellKey,
    pub value: Option<CellValue>,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellLock {
    pub user_id: String,
    pub date: NaiveDate,
    pub reason_en: Option<String>,
    pub reason_es: Option<String>,
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
}

impl CellLock {
    pub fn key(&self) -> CellKey {
        CellKey::new(self.user_id.clone(), self.date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    pub version: i64,
    pub title: String,
    pub body_en: String,
    pub body_es: Option<String>,
    pub target_all: bool,
    #[serde(default)]
    pub target_roles: Vec<RoleTier>,
    pub is_active: bool,
    pub mandatory: bool,
    pub updated_at: Option<DateTime<Utc>>,
    /// Caller's acknowledgment, if any.
    #[serde(default)]
    pub ack_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ack_version: Option<i64>,
}

impl Notice {
    /// Notices with no role list are shown to everyone.
    pub fn targets(&self, user: &User) -> bool {
        self.target_all || self.target_roles.is_empty() || self.target_roles.contains(&user.role)
    }

    pub fn is_acknowledged(&self) -> bool {
        if self.ack_at.is_none() {
            return false;
        }
        match self.ack_version {
            Some(v) => v == self.version,
            None => true,
        }
    }

    pub fn body(&self, lang: Language) -> &str {
        if lang == Language::Es {
            if let Some(es) = self.body_es.as_deref() {
                if !es.trim().is_empty() {
                    return es;
                }
            }
        }
        &self.body_en
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekComment {
    pub week_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub comment: String,
    pub updated_at: Option<DateTime<Utc>>,
}
