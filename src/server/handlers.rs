// One handler per remote operation. Writes run the user check and the
// insert inside a single IMMEDIATE transaction.

use super::stats::fit_factors;
use super::{HandlerError, Request};
use crate::db::{self, EntryRow, ImageRow};
use crate::model::{check_score, FACTORS};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::{Connection, TransactionBehavior};
use serde_json::{json, Map, Value};

/// Fields of an entry in the order they are checked.
const ENTRY_SCORES: [&str; 5] = ["sleep", "eat", "water", "social", "overall"];

const LOW_QUOTES: &[&str] = &[
    "This too shall pass.",
    "Rock bottom became the solid foundation on which I rebuilt my life.",
    "You don't have to see the whole staircase, just take the first step.",
];
const MID_QUOTES: &[&str] = &[
    "Small steps every day add up to big results.",
    "Progress, not perfection.",
    "Keep going. Everything you need will come to you at the perfect time.",
];
const HIGH_QUOTES: &[&str] = &[
    "Happiness is not by chance, but by choice.",
    "Keep your face always toward the sunshine.",
    "Enjoy the little things, for one day you may look back and realize they were the big things.",
];
const GENERAL_QUOTES: &[&str] = &[
    "Every day is a fresh start.",
    "Write it down. Then you can let it go.",
];

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn require<'a>(body: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, HandlerError> {
    body.get(field).ok_or(HandlerError::MissingField(field))
}

fn require_str(body: &Map<String, Value>, field: &'static str) -> Result<String, HandlerError> {
    match require(body, field)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(HandlerError::InvalidField {
            field,
            reason: format!("expected a string, got {}", other),
        }),
    }
}

/// Scores may arrive as numbers or numeric strings.
fn require_score(body: &Map<String, Value>, field: &'static str) -> Result<i64, HandlerError> {
    let value = require(body, field)?;
    let n = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| HandlerError::InvalidField {
        field,
        reason: format!("expected a whole number, got {}", value),
    })?;
    check_score(field, n)
        .map(i64::from)
        .map_err(|reason| HandlerError::InvalidField { field, reason })
}

fn optional_request_id(body: &Map<String, Value>) -> Option<String> {
    body.get("requestid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn ensure_user(conn: &Connection, uid: i64) -> Result<(), HandlerError> {
    match db::find_user(conn, uid)? {
        Some(_) => Ok(()),
        None => {
            tracing::info!(uid, "no such user");
            Err(HandlerError::NoSuchUser)
        }
    }
}

pub fn upload_entry(conn: &mut Connection, req: &Request) -> Result<Value, HandlerError> {
    let uid = req.uid()?;
    let body = req.json_body()?;

    let notes = require_str(&body, "notes")?;
    let mut scores = [0i64; 5];
    for (slot, field) in scores.iter_mut().zip(ENTRY_SCORES) {
        *slot = require_score(&body, field)?;
    }
    let row = EntryRow {
        uid,
        date: now(),
        notes,
        scores,
        request_id: optional_request_id(&body),
    };
    tracing::debug!(uid, ?scores, "entry validated");

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_user(&tx, uid)?;
    let inserted = db::insert_entry(&tx, &row)?;
    tx.commit()?;

    tracing::info!(uid, entryid = inserted.id, duplicate = inserted.duplicate, "entry stored");
    Ok(json!({
        "message": "success",
        "entryid": inserted.id,
        "duplicate": inserted.duplicate,
    }))
}

pub fn upload_image(conn: &mut Connection, req: &Request) -> Result<Value, HandlerError> {
    let uid = req.uid()?;
    let body = req.json_body()?;

    let filename = require_str(&body, "filename")?;
    if filename.trim().is_empty() {
        return Err(HandlerError::InvalidField {
            field: "filename",
            reason: "must not be empty".into(),
        });
    }
    let encoded = require_str(&body, "data")?;
    let data = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| HandlerError::InvalidField {
            field: "data",
            reason: e.to_string(),
        })?;
    let row = ImageRow {
        uid,
        date: now(),
        filename,
        data,
        request_id: optional_request_id(&body),
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_user(&tx, uid)?;
    let inserted = db::insert_image(&tx, &row)?;
    tx.commit()?;

    tracing::info!(uid, imageid = inserted.id, bytes = row.data.len(), "image stored");
    Ok(json!({
        "message": "success",
        "imageid": inserted.id,
        "duplicate": inserted.duplicate,
    }))
}

/// Quote picked from the bucket matching the latest overall score.
pub fn pick_quote(latest_overall: Option<i64>, seed: i64) -> &'static str {
    let bucket = match latest_overall {
        None => GENERAL_QUOTES,
        Some(0..=3) => LOW_QUOTES,
        Some(4..=6) => MID_QUOTES,
        Some(_) => HIGH_QUOTES,
    };
    bucket[seed.rem_euclid(bucket.len() as i64) as usize]
}

pub fn quote(conn: &Connection, req: &Request) -> Result<Value, HandlerError> {
    let uid = req.uid()?;
    ensure_user(conn, uid)?;
    let entries = db::entries_for(conn, uid)?;
    let latest = entries.first();
    let seed = latest.map(|e| e.entryid).unwrap_or(uid);
    let quote = pick_quote(latest.map(|e| e.overall), seed);
    Ok(json!({ "quote": quote }))
}

pub fn stats(conn: &Connection, req: &Request) -> Result<Value, HandlerError> {
    let uid = req.uid()?;
    ensure_user(conn, uid)?;
    let entries = db::entries_for(conn, uid)?;
    let samples: Vec<([f64; 4], f64)> = entries
        .iter()
        .map(|e| {
            (
                [e.sleep as f64, e.eat as f64, e.water as f64, e.social as f64],
                e.overall as f64,
            )
        })
        .collect();
    let coef = fit_factors(&samples).map_err(|e| HandlerError::Rejected(e.to_string()))?;
    tracing::debug!(uid, ?coef, factors = ?FACTORS, "stats computed");
    Ok(json!({ "coef": coef }))
}

pub fn entries(conn: &Connection, req: &Request) -> Result<Value, HandlerError> {
    let uid = req.uid()?;
    ensure_user(conn, uid)?;
    let entries = db::entries_for(conn, uid)?;
    Ok(json!({ "entries": entries }))
}
