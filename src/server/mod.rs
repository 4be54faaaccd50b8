// Server side of the journal service. Each handler is stateless: it reads
// the request, checks it, performs at most one write against the store and
// answers with a status envelope.

pub mod gateway;
pub mod handlers;
pub mod stats;

use crate::api::{Method, StatusEnvelope};
use crate::db;
use crate::model::Operation;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use gateway::LocalGateway;

/// An incoming call, shaped like an API gateway event.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path_params: HashMap<String, String>,
    pub body: Option<String>,
}

impl Request {
    pub fn new(method: Method, uid: impl Into<String>, body: Option<String>) -> Self {
        let mut path_params = HashMap::new();
        path_params.insert("uid".to_string(), uid.into());
        Self {
            method,
            path_params,
            body,
        }
    }

    pub fn uid(&self) -> Result<i64, HandlerError> {
        let raw = self
            .path_params
            .get("uid")
            .ok_or(HandlerError::MissingField("uid"))?;
        raw.trim().parse().map_err(|_| HandlerError::InvalidField {
            field: "uid",
            reason: format!("'{}' is not a number", raw),
        })
    }

    /// The body parsed as a JSON object.
    pub fn json_body(&self) -> Result<serde_json::Map<String, Value>, HandlerError> {
        let raw = self.body.as_deref().ok_or(HandlerError::MissingField("body"))?;
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(HandlerError::InvalidField {
                field: "body",
                reason: "expected a JSON object".into(),
            }),
            Err(e) => Err(HandlerError::InvalidField {
                field: "body",
                reason: e.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("request has no {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("no such user...")]
    NoSuchUser,
    #[error("{0}")]
    Rejected(String),
    #[error("database error: {0}")]
    Internal(#[from] rusqlite::Error),
}

impl HandlerError {
    pub fn status(&self) -> u16 {
        match self {
            HandlerError::Internal(_) => 500,
            _ => 400,
        }
    }
}

/// Turn a handler result into the envelope sent back to the caller.
pub fn respond(result: Result<Value, HandlerError>) -> StatusEnvelope {
    match result {
        Ok(body) => StatusEnvelope::json(200, &body),
        Err(e) => {
            let status = e.status();
            if status >= 500 {
                tracing::error!(error = %e, "handler failed");
            } else {
                tracing::info!(error = %e, "request rejected");
            }
            StatusEnvelope::json(status, &Value::String(e.to_string()))
        }
    }
}

/// Runs handlers against the database at `db_path`, one connection per call.
#[derive(Debug, Clone)]
pub struct JournalService {
    db_path: PathBuf,
}

impl JournalService {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Whether this service has a handler for `op`.
    pub fn serves(op: Operation) -> bool {
        !matches!(op, Operation::DownloadCollage)
    }

    pub fn handle(&self, op: Operation, request: &Request) -> StatusEnvelope {
        tracing::debug!(operation = op.path(), "handling request");
        let mut conn = match db::open_existing(&self.db_path) {
            Ok(conn) => conn,
            Err(e) => return respond(Err(HandlerError::Internal(e))),
        };
        let result = match op {
            Operation::UploadEntry => handlers::upload_entry(&mut conn, request),
            Operation::UploadImage => handlers::upload_image(&mut conn, request),
            Operation::GetQuote => handlers::quote(&conn, request),
            Operation::GetStats => handlers::stats(&conn, request),
            Operation::ListEntries => handlers::entries(&conn, request),
            Operation::DownloadCollage => {
                return StatusEnvelope::json(404, &Value::String("no such route".into()))
            }
        };
        respond(result)
    }
}
