use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

pub const ENGINE_CONFIG_KEY: &str = "engine.config";

/// What a calendar window resolves to when none of its rows carried a known
/// open flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekFlagFallback {
    #[default]
    Closed,
    Open,
}

impl WeekFlagFallback {
    pub fn resolve(self, known: Option<bool>) -> bool {
        known.unwrap_or(matches!(self, WeekFlagFallback::Open))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub max_requests_per_week: usize,
    pub window_weeks: usize,
    pub week_flag_fallback: WeekFlagFallback,
    pub pin_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_requests_per_week: 5,
            window_weeks: 5,
            week_flag_fallback: WeekFlagFallback::Closed,
            pin_length: 4,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests_per_week == 0 || self.max_requests_per_week > 7 {
            return Err("maxRequestsPerWeek must be between 1 and 7".to_string());
        }
        if self.window_weeks == 0 {
            return Err("windowWeeks must be >= 1".to_string());
        }
        if !(4..=8).contains(&self.pin_length) {
            return Err("pinLength must be between 4 and 8".to_string());
        }
        Ok(())
    }

    pub fn is_valid_pin(&self, pin: &str) -> bool {
        pin.len() == self.pin_length && pin.chars().all(|c| c.is_ascii_digit())
    }
}

/// Reads the workspace config, falling back to defaults when none was saved.
pub fn load(conn: &Connection) -> anyhow::Result<EngineConfig> {
    match db::settings_get_json(conn, ENGINE_CONFIG_KEY)? {
        Some(v) => Ok(serde_json::from_value(v)?),
        None => Ok(EngineConfig::default()),
    }
}

pub fn save(conn: &Connection, cfg: &EngineConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, ENGINE_CONFIG_KEY, &serde_json::to_value(cfg)?)
}
