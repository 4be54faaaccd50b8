// SQLite persistence for the journal service: connection setup, schema and
// the handful of row-level primitives the handlers need.

use crate::session::{User, UserDirectory};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    uid      INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS entries (
    entryid    INTEGER PRIMARY KEY AUTOINCREMENT,
    uid        INTEGER NOT NULL REFERENCES users(uid),
    date       TEXT NOT NULL,
    notes      TEXT NOT NULL,
    sleep      INTEGER NOT NULL CHECK (sleep BETWEEN 0 AND 10),
    eat        INTEGER NOT NULL CHECK (eat BETWEEN 0 AND 10),
    water      INTEGER NOT NULL CHECK (water BETWEEN 0 AND 10),
    social     INTEGER NOT NULL CHECK (social BETWEEN 0 AND 10),
    overall    INTEGER NOT NULL CHECK (overall BETWEEN 0 AND 10),
    request_id TEXT UNIQUE
);
CREATE TABLE IF NOT EXISTS images (
    imageid    INTEGER PRIMARY KEY AUTOINCREMENT,
    uid        INTEGER NOT NULL REFERENCES users(uid),
    date       TEXT NOT NULL,
    filename   TEXT NOT NULL,
    data       BLOB NOT NULL,
    request_id TEXT UNIQUE
);
CREATE INDEX IF NOT EXISTS idx_entries_uid ON entries(uid);
CREATE INDEX IF NOT EXISTS idx_images_uid ON images(uid);
";

/// Open `path` with foreign keys enforced and a busy timeout, so that
/// concurrent handlers wait for each other instead of failing.
pub fn connect(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

/// Open a database that must already exist; the file is never created.
pub fn open_existing(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(())
}

pub fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

/// Create the database file (and schema) if it does not exist yet.
pub fn initialize_at(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = connect(path).with_context(|| format!("Failed to open {}", path.display()))?;
    initialize(&conn).context("Failed to create schema")?;
    Ok(())
}

pub fn add_user(conn: &Connection, username: &str) -> rusqlite::Result<i64> {
    conn.execute("INSERT INTO users(username) VALUES(?1)", params![username])?;
    Ok(conn.last_insert_rowid())
}

pub fn find_user(conn: &Connection, uid: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT uid, username FROM users WHERE uid = ?1",
        params![uid],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
            })
        },
    )
    .optional()
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inserted {
    pub id: i64,
    /// The request id was already stored; nothing new was written.
    pub duplicate: bool,
}

/// Row to be written to `entries`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRow {
    pub uid: i64,
    pub date: String,
    pub notes: String,
    pub scores: [i64; 5],
    pub request_id: Option<String>,
}

pub fn insert_entry(conn: &Connection, row: &EntryRow) -> rusqlite::Result<Inserted> {
    let [sleep, eat, water, social, overall] = row.scores;
    let changed = conn.execute(
        "INSERT INTO entries(uid, date, notes, sleep, eat, water, social, overall, request_id)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(request_id) DO NOTHING",
        params![row.uid, row.date, row.notes, sleep, eat, water, social, overall, row.request_id],
    )?;
    finish_insert(conn, changed, "entries", "entryid", row.request_id.as_deref())
}

/// Row to be written to `images`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRow {
    pub uid: i64,
    pub date: String,
    pub filename: String,
    pub data: Vec<u8>,
    pub request_id: Option<String>,
}

pub fn insert_image(conn: &Connection, row: &ImageRow) -> rusqlite::Result<Inserted> {
    let changed = conn.execute(
        "INSERT INTO images(uid, date, filename, data, request_id)
         VALUES(?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(request_id) DO NOTHING",
        params![row.uid, row.date, row.filename, row.data, row.request_id],
    )?;
    finish_insert(conn, changed, "images", "imageid", row.request_id.as_deref())
}

fn finish_insert(
    conn: &Connection,
    changed: usize,
    table: &str,
    id_column: &str,
    request_id: Option<&str>,
) -> rusqlite::Result<Inserted> {
    if changed > 0 {
        return Ok(Inserted {
            id: conn.last_insert_rowid(),
            duplicate: false,
        });
    }
    // Only a request id conflict can make the insert a no-op.
    let sql = format!("SELECT {} FROM {} WHERE request_id = ?1", id_column, table);
    let id = conn.query_row(&sql, params![request_id], |r| r.get(0))?;
    Ok(Inserted {
        id,
        duplicate: true,
    })
}

/// A stored entry as returned to clients.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StoredEntry {
    pub entryid: i64,
    pub date: String,
    pub sleep: i64,
    pub eat: i64,
    pub water: i64,
    pub social: i64,
    pub overall: i64,
    pub notes: String,
}

/// Entries of `uid`, newest first.
pub fn entries_for(conn: &Connection, uid: i64) -> rusqlite::Result<Vec<StoredEntry>> {
    let mut stmt = conn.prepare(
        "SELECT entryid, date, sleep, eat, water, social, overall, notes
         FROM entries WHERE uid = ?1
         ORDER BY date DESC, entryid DESC",
    )?;
    let rows = stmt.query_map(params![uid], |r| {
        Ok(StoredEntry {
            entryid: r.get(0)?,
            date: r.get(1)?,
            sleep: r.get(2)?,
            eat: r.get(3)?,
            water: r.get(4)?,
            social: r.get(5)?,
            overall: r.get(6)?,
            notes: r.get(7)?,
        })
    })?;
    let entries: rusqlite::Result<Vec<StoredEntry>> = rows.collect();
    entries
}

pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
}

pub fn image_data(conn: &Connection, imageid: i64) -> rusqlite::Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT data FROM images WHERE imageid = ?1",
        params![imageid],
        |r| r.get(0),
    )
    .optional()
}

/// [`UserDirectory`] backed by the users table.
pub struct SqliteUsers {
    conn: Connection,
}

impl SqliteUsers {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_existing(path).with_context(|| {
            format!(
                "Failed to open {}; run `journalapp init` to create it",
                path.display()
            )
        })?;
        Ok(Self { conn })
    }
}

impl UserDirectory for SqliteUsers {
    fn find_user(&self, id: i64) -> Result<Option<User>> {
        find_user(&self.conn, id).context("Failed to look up user")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        configure(&conn).unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn entry(uid: i64, request_id: Option<&str>) -> EntryRow {
        EntryRow {
            uid,
            date: "2024-03-01 10:00:00".into(),
            notes: "ok".into(),
            scores: [1, 2, 3, 4, 5],
            request_id: request_id.map(str::to_string),
        }
    }

    #[test]
    fn missing_database_is_not_created_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let err = SqliteUsers::open(&path).err().unwrap();
        assert!(format!("{:#}", err).contains("journalapp init"));
        assert!(open_existing(&path).is_err());
        assert!(!path.exists());

        initialize_at(&path).unwrap();
        let users = SqliteUsers::open(&path).unwrap();
        assert!(users.find_user(1).unwrap().is_none());
    }

    #[test]
    fn user_round_trip() {
        let conn = memory_db();
        let id = add_user(&conn, "jenny").unwrap();
        let user = find_user(&conn, id).unwrap().unwrap();
        assert_eq!(user.username, "jenny");
        assert!(find_user(&conn, id + 1).unwrap().is_none());
    }

    #[test]
    fn duplicate_request_id_is_ignored() {
        let conn = memory_db();
        let uid = add_user(&conn, "jerry").unwrap();
        let first = insert_entry(&conn, &entry(uid, Some("r1"))).unwrap();
        let again = insert_entry(&conn, &entry(uid, Some("r1"))).unwrap();
        assert!(!first.duplicate);
        assert!(again.duplicate);
        assert_eq!(first.id, again.id);
        assert_eq!(count_rows(&conn, "entries").unwrap(), 1);
    }

    #[test]
    fn missing_request_id_is_not_deduplicated() {
        let conn = memory_db();
        let uid = add_user(&conn, "joey").unwrap();
        insert_entry(&conn, &entry(uid, None)).unwrap();
        insert_entry(&conn, &entry(uid, None)).unwrap();
        assert_eq!(count_rows(&conn, "entries").unwrap(), 2);
    }

    #[test]
    fn foreign_key_guards_unknown_user() {
        let conn = memory_db();
        assert!(insert_entry(&conn, &entry(42, None)).is_err());
        assert_eq!(count_rows(&conn, "entries").unwrap(), 0);
    }

    #[test]
    fn entries_newest_first() {
        let conn = memory_db();
        let uid = add_user(&conn, "joe").unwrap();
        let mut older = entry(uid, None);
        older.date = "2024-01-01 08:00:00".into();
        insert_entry(&conn, &older).unwrap();
        insert_entry(&conn, &entry(uid, None)).unwrap();
        let rows = entries_for(&conn, uid).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2024-03-01 10:00:00");
    }
}
