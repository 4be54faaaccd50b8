// Wire payloads and the operation table shared by the client commands and
// the server handlers.

use crate::api::Method;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest and highest accepted rating score.
pub const RATING_MIN: i64 = 0;
pub const RATING_MAX: i64 = 10;

/// Factors whose coefficients the stats operation returns, in wire order.
pub const FACTORS: [&str; 4] = ["sleep", "eat", "water", "social"];

/// One remote operation. Path, verb and command code live here so the
/// dispatcher, the client handlers and the gateway agree on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    UploadEntry,
    UploadImage,
    GetQuote,
    DownloadCollage,
    GetStats,
    ListEntries,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::UploadEntry,
        Operation::UploadImage,
        Operation::GetQuote,
        Operation::DownloadCollage,
        Operation::GetStats,
        Operation::ListEntries,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Operation::UploadEntry => "upload-entry",
            Operation::UploadImage => "upload-image",
            Operation::GetQuote => "quote",
            Operation::DownloadCollage => "collage",
            Operation::GetStats => "stats",
            Operation::ListEntries => "entries",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Operation::UploadEntry | Operation::UploadImage => Method::Post,
            _ => Method::Get,
        }
    }

    /// Menu number of the command bound to this operation.
    pub fn code(self) -> u32 {
        match self {
            Operation::UploadEntry => 1,
            Operation::UploadImage => 2,
            Operation::GetQuote => 3,
            Operation::DownloadCollage => 4,
            Operation::GetStats => 5,
            Operation::ListEntries => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Operation::UploadEntry => "upload journal entry",
            Operation::UploadImage => "upload image",
            Operation::GetQuote => "get a quote",
            Operation::DownloadCollage => "download collage",
            Operation::GetStats => "stats",
            Operation::ListEntries => "list entries",
        }
    }

    pub fn from_code(code: u32) -> Option<Operation> {
        Operation::ALL.into_iter().find(|op| op.code() == code)
    }

    pub fn from_path(path: &str) -> Option<Operation> {
        Operation::ALL.into_iter().find(|op| op.path() == path)
    }
}

/// The five scores of a journal entry, each in `[0, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratings {
    pub sleep: u8,
    pub eat: u8,
    pub water: u8,
    pub social: u8,
    pub overall: u8,
}

impl Ratings {
    /// Parse and range-check raw answers given in the order sleep, eat,
    /// water, social, overall. Every score is checked before anything is
    /// returned.
    pub fn parse(raw: [&str; 5]) -> Result<Self, String> {
        const NAMES: [&str; 5] = ["sleep", "eat", "water", "social", "overall"];
        let mut scores = [0u8; 5];
        for (i, (name, value)) in NAMES.iter().zip(raw).enumerate() {
            scores[i] = parse_score(name, value)?;
        }
        Ok(Self {
            sleep: scores[0],
            eat: scores[1],
            water: scores[2],
            social: scores[3],
            overall: scores[4],
        })
    }
}

/// Parse one score, rejecting non-integers and values outside the range.
pub fn parse_score(name: &str, raw: &str) -> Result<u8, String> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("{} must be a whole number, got '{}'", name, raw.trim()))?;
    check_score(name, value)
}

pub fn check_score(name: &str, value: i64) -> Result<u8, String> {
    if !(RATING_MIN..=RATING_MAX).contains(&value) {
        return Err(format!(
            "{} must be between {} and {}, got {}",
            name, RATING_MIN, RATING_MAX, value
        ));
    }
    Ok(value as u8)
}

/// Body of an `upload-entry` request. The date is assigned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    #[serde(flatten)]
    pub ratings: Ratings,
    pub notes: String,
    #[serde(rename = "requestid")]
    pub request_id: String,
}

impl JournalEntry {
    pub fn new(ratings: Ratings, notes: impl Into<String>) -> Self {
        Self {
            ratings,
            notes: notes.into(),
            request_id: new_request_id(),
        }
    }
}

/// Body of an `upload-image` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUpload {
    pub filename: String,
    pub data: String,
    #[serde(rename = "requestid")]
    pub request_id: String,
}

impl ImageUpload {
    pub fn from_bytes(filename: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            data: STANDARD.encode(bytes),
            request_id: new_request_id(),
        }
    }
}

/// Fresh idempotency key for one logical write.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
