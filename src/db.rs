use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;

pub const DB_FILE: &str = "rotareq.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role INTEGER NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            display_order INTEGER NOT NULL DEFAULT 0,
            pin_hash TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before per-user language were English only.
    ensure_users_language(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS periods(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            closes_at TEXT
        )",
        [],
    )?;

    // NULL flags are "unknown" and resolved by the configured fallback.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS weeks(
            id TEXT PRIMARY KEY,
            period_id TEXT NOT NULL,
            open INTEGER,
            open_after_close INTEGER,
            FOREIGN KEY(period_id) REFERENCES periods(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_weeks_period ON weeks(period_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS period_dates(
            period_id TEXT NOT NULL,
            date TEXT NOT NULL,
            week_id TEXT,
            PRIMARY KEY(period_id, date),
            FOREIGN KEY(period_id) REFERENCES periods(id),
            FOREIGN KEY(week_id) REFERENCES weeks(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_period_dates_date ON period_dates(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS request_cells(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            date TEXT NOT NULL,
            code TEXT NOT NULL,
            rank INTEGER,
            updated_at TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id),
            UNIQUE(user_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_request_cells_date ON request_cells(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cell_locks(
            user_id TEXT NOT NULL,
            date TEXT NOT NULL,
            reason_en TEXT,
            reason_es TEXT,
            locked_by TEXT NOT NULL,
            locked_at TEXT NOT NULL,
            PRIMARY KEY(user_id, date),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notices(
            id TEXT PRIMARY KEY,
            version INTEGER NOT NULL DEFAULT 1,
            title TEXT NOT NULL,
            body_en TEXT NOT NULL,
            body_es TEXT,
            target_all INTEGER NOT NULL DEFAULT 1,
            target_roles TEXT NOT NULL DEFAULT '[]',
            is_active INTEGER NOT NULL DEFAULT 1,
            mandatory INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS notice_acks(
            notice_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            acked_at TEXT NOT NULL,
            PRIMARY KEY(notice_id, user_id),
            FOREIGN KEY(notice_id) REFERENCES notices(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS week_comments(
            week_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            comment TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(week_id, user_id),
            FOREIGN KEY(week_id) REFERENCES weeks(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_users_language(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "language")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE users ADD COLUMN language TEXT NOT NULL DEFAULT 'en'",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// PINs are stored salted with the user id, never in clear.
pub fn hash_pin(user_id: &str, pin: &str) -> String {
    let mut h = Sha256::new();
    h.update(user_id.as_bytes());
    h.update(b":");
    h.update(pin.as_bytes());
    format!("{:x}", h.finalize())
}
