// Client-side command handlers. Each one collects its inputs, validates
// them locally, makes at most one remote call and renders the classified
// outcome. Failures stop at `run_action`; the session always continues.

use crate::api::{Transport, TransportError};
use crate::classify::{classify, Outcome};
use crate::model::{ImageUpload, JournalEntry, Operation, Ratings, FACTORS};
use crate::session::Session;
use crate::ui::Console;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Extension appended to downloaded collages.
pub const COLLAGE_EXTENSION: &str = ".png";

const RATING_PROMPTS: [&str; 5] = [
    "Rate your sleep today on a scale from 0 to 10",
    "Rate your nutrition today on a scale from 0 to 10",
    "Rate your hydration today on a scale from 0 to 10",
    "Rate your social connection today on a scale from 0 to 10",
    "Rate your overall day on a scale from 0 to 10",
];

#[derive(Debug, Error)]
pub enum ActionError {
    /// Caught before any network call.
    #[error("{0}")]
    LocalValidation(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("console input failed: {0:#}")]
    Console(anyhow::Error),
    #[error("{}: {source}", .path.display())]
    File { path: PathBuf, source: io::Error },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("could not encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Run the command bound to `op`. Never fails: errors are logged with the
/// attempted URL and shown to the user.
pub fn run_action<C: Console>(
    op: Operation,
    session: &Session,
    transport: &Transport,
    console: &mut C,
) {
    let url = session.url_for(op);
    tracing::debug!(operation = op.path(), url = %url, "running command");
    let result = match op {
        Operation::UploadEntry => upload_entry(session, transport, console),
        Operation::UploadImage => upload_image(session, transport, console),
        Operation::GetQuote => get_quote(session, transport, console),
        Operation::DownloadCollage => download_collage(session, transport, console),
        Operation::GetStats => get_stats(session, transport, console),
        Operation::ListEntries => list_entries(session, transport, console),
    };
    if let Err(e) = result {
        match &e {
            ActionError::LocalValidation(_) => {
                tracing::info!(url = %url, error = %e, "command abandoned before sending");
            }
            _ => tracing::error!(url = %url, error = %e, "command failed"),
        }
        console.show(&format!("**ERROR: {}", e));
    }
}

fn ask<C: Console>(console: &mut C, message: &str) -> Result<String, ActionError> {
    console.prompt(message).map_err(ActionError::Console)
}

/// Issue the call for `op` and classify what came back.
fn call<C: Console>(
    op: Operation,
    session: &Session,
    transport: &Transport,
    console: &C,
    payload: Option<&Value>,
) -> Result<Outcome, ActionError> {
    let url = session.url_for(op);
    let spinner = console.spinner(&format!("{}...", op.label()));
    let result = transport.call(op.method(), &url, payload);
    spinner.finish_and_clear();
    Ok(classify(&result?))
}

/// Render every non-success outcome; hand back the body on success.
fn success_body<C: Console>(outcome: Outcome, url: &str, console: &mut C) -> Option<Value> {
    match outcome {
        Outcome::Success(body) => Some(body),
        Outcome::ClientRejected(reason) => {
            tracing::info!(url, reason = %reason, "request rejected");
            console.show(&format!("Request rejected: {}", reason));
            None
        }
        Outcome::ServerFault(message) => {
            tracing::error!(url, message = %message, "server fault");
            console.show(&format!("**ERROR: server fault: {}", message));
            None
        }
        Outcome::Unrecognized(code) => {
            tracing::warn!(url, code, "unrecognized status code");
            console.show(&format!("**ERROR: unexpected status code {}", code));
            None
        }
    }
}

fn string_field(body: &Value, field: &str) -> Result<String, ActionError> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ActionError::MalformedResponse(format!("no '{}' in response", field)))
}

pub fn upload_entry<C: Console>(
    session: &Session,
    transport: &Transport,
    console: &mut C,
) -> Result<(), ActionError> {
    let mut raw = Vec::with_capacity(RATING_PROMPTS.len());
    for prompt in RATING_PROMPTS {
        raw.push(ask(console, prompt)?);
    }
    let notes = ask(console, "If you'd like, journal about what happened today")?;

    let ratings = Ratings::parse([
        raw[0].as_str(),
        raw[1].as_str(),
        raw[2].as_str(),
        raw[3].as_str(),
        raw[4].as_str(),
    ])
    .map_err(ActionError::LocalValidation)?;
    let entry = JournalEntry::new(ratings, notes);
    let payload = serde_json::to_value(&entry)?;

    let url = session.url_for(Operation::UploadEntry);
    let outcome = call(Operation::UploadEntry, session, transport, &*console, Some(&payload))?;
    if let Some(body) = success_body(outcome, &url, console) {
        let duplicate = body.get("duplicate").and_then(Value::as_bool).unwrap_or(false);
        match body.get("entryid").and_then(Value::as_i64) {
            Some(id) if duplicate => console.show(&format!("Entry {} was already recorded", id)),
            Some(id) => console.show(&format!("Journal entry uploaded (entry {})", id)),
            None => console.show("Journal entry uploaded"),
        }
    }
    Ok(())
}

pub fn upload_image<C: Console>(
    session: &Session,
    transport: &Transport,
    console: &mut C,
) -> Result<(), ActionError> {
    let raw_path = ask(console, "Image file path")?;
    let path = PathBuf::from(raw_path.trim());
    if !path.is_file() {
        return Err(ActionError::LocalValidation(format!(
            "local file '{}' does not exist",
            path.display()
        )));
    }
    let bytes = fs::read(&path).map_err(|source| ActionError::File {
        path: path.clone(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let upload = ImageUpload::from_bytes(filename, &bytes);
    let payload = serde_json::to_value(&upload)?;

    let url = session.url_for(Operation::UploadImage);
    let outcome = call(Operation::UploadImage, session, transport, &*console, Some(&payload))?;
    if let Some(body) = success_body(outcome, &url, console) {
        match body.get("imageid").and_then(Value::as_i64) {
            Some(id) => console.show(&format!("Image uploaded (image {})", id)),
            None => console.show("Image uploaded"),
        }
    }
    Ok(())
}

pub fn get_quote<C: Console>(
    session: &Session,
    transport: &Transport,
    console: &mut C,
) -> Result<(), ActionError> {
    let url = session.url_for(Operation::GetQuote);
    let outcome = call(Operation::GetQuote, session, transport, &*console, None)?;
    if let Some(body) = success_body(outcome, &url, console) {
        let quote = string_field(&body, "quote")?;
        console.show(&format!("\"{}\"", quote));
    }
    Ok(())
}

pub fn download_collage<C: Console>(
    session: &Session,
    transport: &Transport,
    console: &mut C,
) -> Result<(), ActionError> {
    let url = session.url_for(Operation::DownloadCollage);
    let outcome = call(Operation::DownloadCollage, session, transport, &*console, None)?;
    let Some(body) = success_body(outcome, &url, console) else {
        return Ok(());
    };
    let name = ask(console, "Name for the collage file (without extension)")?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ActionError::LocalValidation(
            "collage file name must not be empty".into(),
        ));
    }
    let encoded = string_field(&body, "collage")?;
    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| ActionError::MalformedResponse(format!("collage is not base64: {}", e)))?;
    let path = collage_path(name);
    fs::write(&path, &bytes).map_err(|source| ActionError::File {
        path: path.clone(),
        source,
    })?;
    console.show(&format!("Collage saved to {}", path.display()));
    Ok(())
}

pub fn collage_path(name: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", name, COLLAGE_EXTENSION))
}

/// Pair factor names with coefficients and order them by descending
/// magnitude. Equal magnitudes keep factor order.
pub fn rank_factors(coef: &[f64]) -> Vec<(&'static str, f64)> {
    let mut ranked: Vec<(&'static str, f64)> =
        FACTORS.iter().copied().zip(coef.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    ranked
}

pub fn direction(coef: f64) -> &'static str {
    if coef < 0.0 {
        "negatively"
    } else {
        "positively"
    }
}

pub fn get_stats<C: Console>(
    session: &Session,
    transport: &Transport,
    console: &mut C,
) -> Result<(), ActionError> {
    let url = session.url_for(Operation::GetStats);
    let outcome = call(Operation::GetStats, session, transport, &*console, None)?;
    let Some(body) = success_body(outcome, &url, console) else {
        return Ok(());
    };
    let coef = body
        .get("coef")
        .and_then(Value::as_array)
        .ok_or_else(|| ActionError::MalformedResponse("no 'coef' in response".into()))?
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| ActionError::MalformedResponse("'coef' must be numbers".into()))?;
    if coef.len() != FACTORS.len() {
        return Err(ActionError::MalformedResponse(format!(
            "expected {} coefficients, got {}",
            FACTORS.len(),
            coef.len()
        )));
    }

    console.show("What shapes your overall day, strongest first:");
    for (rank, (factor, c)) in rank_factors(&coef).into_iter().enumerate() {
        console.show(&format!(
            "  {}. {} affects your day {} ({:+.3})",
            rank + 1,
            factor,
            direction(c),
            c
        ));
    }
    Ok(())
}

pub fn list_entries<C: Console>(
    session: &Session,
    transport: &Transport,
    console: &mut C,
) -> Result<(), ActionError> {
    let url = session.url_for(Operation::ListEntries);
    let outcome = call(Operation::ListEntries, session, transport, &*console, None)?;
    let Some(body) = success_body(outcome, &url, console) else {
        return Ok(());
    };
    let entries = body
        .get("entries")
        .and_then(Value::as_array)
        .ok_or_else(|| ActionError::MalformedResponse("no 'entries' in response".into()))?;
    if entries.is_empty() {
        console.show("no entries yet");
        return Ok(());
    }
    for entry in entries {
        let score = |k: &str| {
            entry
                .get(k)
                .and_then(Value::as_i64)
                .map_or_else(|| "?".to_string(), |v| v.to_string())
        };
        console.show(&format!(
            "{}  sleep {} eat {} water {} social {} overall {}  {}",
            entry.get("date").and_then(Value::as_str).unwrap_or("?"),
            score("sleep"),
            score("eat"),
            score("water"),
            score("social"),
            score("overall"),
            entry.get("notes").and_then(Value::as_str).unwrap_or(""),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HttpBackend, Method, SendError, StatusEnvelope};
    use crate::session::{User, UserDirectory};
    use crate::ui::ScriptedConsole;
    use anyhow::Result;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Log = Rc<RefCell<Vec<(Method, String, Option<Value>)>>>;

    /// Records every request and answers with a fixed envelope.
    struct Fixed {
        reply: Option<StatusEnvelope>,
        log: Log,
    }

    impl HttpBackend for Fixed {
        fn send(
            &self,
            method: Method,
            url: &str,
            payload: Option<&Value>,
        ) -> Result<StatusEnvelope, SendError> {
            self.log
                .borrow_mut()
                .push((method, url.to_string(), payload.cloned()));
            self.reply
                .clone()
                .ok_or_else(|| SendError::NoResponse(anyhow::anyhow!("connection reset")))
        }
    }

    struct AnyUser;

    impl UserDirectory for AnyUser {
        fn find_user(&self, id: i64) -> Result<Option<User>> {
            Ok(Some(User {
                id,
                username: "u".into(),
            }))
        }
    }

    fn fixture(reply: Option<StatusEnvelope>) -> (Session, Transport, Log) {
        let log: Log = Rc::default();
        let session = Session::resolve("https://journal.example.com/prod", "4", &AnyUser).unwrap();
        let transport = Transport::new(Box::new(Fixed {
            reply,
            log: Rc::clone(&log),
        }))
        .with_delay_unit(Duration::ZERO);
        (session, transport, log)
    }

    fn ok(body: Value) -> Option<StatusEnvelope> {
        Some(StatusEnvelope::json(200, &body))
    }

    #[test]
    fn out_of_range_ratings_never_reach_the_network() {
        let tuples = [
            ["11", "5", "5", "5", "5"],
            ["5", "-1", "5", "5", "5"],
            ["5", "5", "5", "5", "100"],
            ["5", "five", "5", "5", "5"],
        ];
        for ratings in tuples {
            let (session, transport, log) = fixture(ok(json!({})));
            let mut answers: Vec<&str> = ratings.to_vec();
            answers.push("notes");
            let mut console = ScriptedConsole::new(answers);
            run_action(Operation::UploadEntry, &session, &transport, &mut console);
            assert!(log.borrow().is_empty(), "sent {:?}", ratings);
            assert!(console.transcript().contains("**ERROR"));
        }
    }

    #[test]
    fn valid_entry_is_posted_to_user_path() {
        let (session, transport, log) = fixture(ok(json!({"message":"success","entryid":9})));
        let mut console = ScriptedConsole::new(["7", "6", "5", "4", "8", "slept well"]);
        run_action(Operation::UploadEntry, &session, &transport, &mut console);

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        let (method, url, payload) = &log[0];
        assert_eq!(*method, Method::Post);
        assert_eq!(url, "https://journal.example.com/prod/upload-entry/4");
        let payload = payload.as_ref().unwrap();
        assert_eq!(payload["overall"], 8);
        assert_eq!(payload["notes"], "slept well");
        assert!(payload["requestid"].as_str().is_some());
        assert!(console.transcript().contains("entry 9"));
    }

    #[test]
    fn rejection_and_fault_are_rendered() {
        let (session, transport, _) = fixture(Some(StatusEnvelope::new(400, "\"no such user...\"")));
        let mut console = ScriptedConsole::new(Vec::<String>::new());
        run_action(Operation::GetQuote, &session, &transport, &mut console);
        assert!(console.transcript().contains("Request rejected: no such user..."));

        let (session, transport, _) = fixture(Some(StatusEnvelope::new(500, "\"db down\"")));
        let mut console = ScriptedConsole::new(Vec::<String>::new());
        run_action(Operation::GetQuote, &session, &transport, &mut console);
        assert!(console.transcript().contains("server fault: db down"));

        let (session, transport, _) = fixture(Some(StatusEnvelope::new(502, "")));
        let mut console = ScriptedConsole::new(Vec::<String>::new());
        run_action(Operation::GetQuote, &session, &transport, &mut console);
        assert!(console.transcript().contains("unexpected status code 502"));
    }

    /// Writer that appends formatted log lines to a shared buffer.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logs_of(reply: StatusEnvelope) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let (session, transport, _) = fixture(Some(reply));
            let mut console = ScriptedConsole::new(Vec::<String>::new());
            run_action(Operation::GetQuote, &session, &transport, &mut console);
        });
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn non_success_outcomes_are_logged_with_url() {
        let url = "https://journal.example.com/prod/quote/4";

        let out = logs_of(StatusEnvelope::new(400, "\"no such user...\""));
        let line = out.lines().find(|l| l.contains("request rejected")).unwrap();
        assert!(line.contains("INFO"), "{}", line);
        assert!(line.contains(url), "{}", line);

        let out = logs_of(StatusEnvelope::new(500, "\"db down\""));
        let line = out.lines().find(|l| l.contains("server fault")).unwrap();
        assert!(line.contains("ERROR"), "{}", line);
        assert!(line.contains(url), "{}", line);

        let out = logs_of(StatusEnvelope::new(502, ""));
        let line = out.lines().find(|l| l.contains("unrecognized status code")).unwrap();
        assert!(line.contains("WARN"), "{}", line);
        assert!(line.contains(url), "{}", line);
    }

    #[test]
    fn unreachable_server_is_reported_after_three_attempts() {
        let (session, transport, log) = fixture(None);
        let mut console = ScriptedConsole::new(Vec::<String>::new());
        run_action(Operation::GetStats, &session, &transport, &mut console);
        assert_eq!(log.borrow().len(), 3);
        assert!(console.transcript().contains("no response"));
    }

    #[test]
    fn quote_without_field_is_malformed() {
        let (session, transport, _) = fixture(ok(json!({"text":"hi"})));
        let mut console = ScriptedConsole::new(Vec::<String>::new());
        let err = get_quote(&session, &transport, &mut console).unwrap_err();
        assert!(matches!(err, ActionError::MalformedResponse(_)));

        let (session, transport, _) = fixture(ok(json!({"quote":"carpe diem"})));
        get_quote(&session, &transport, &mut console).unwrap();
        assert!(console.transcript().contains("\"carpe diem\""));
    }

    #[test]
    fn missing_image_file_is_caught_locally() {
        let (session, transport, log) = fixture(ok(json!({})));
        let mut console = ScriptedConsole::new(["/definitely/not/here.jpg"]);
        let err = upload_image(&session, &transport, &mut console).unwrap_err();
        assert!(matches!(err, ActionError::LocalValidation(_)));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn image_is_sent_base64_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        let bytes: Vec<u8> = vec![0xff, 0xd8, 0x00, 0x10, 0x7f, 0x80, 0xff, 0xd9];
        fs::write(&path, &bytes).unwrap();

        let (session, transport, log) = fixture(ok(json!({"imageid": 1})));
        let mut console = ScriptedConsole::new([path.to_string_lossy().into_owned()]);
        upload_image(&session, &transport, &mut console).unwrap();

        let log = log.borrow();
        let payload = log[0].2.as_ref().unwrap();
        assert_eq!(payload["filename"], "photo.jpg");
        let decoded = STANDARD.decode(payload["data"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn collage_is_written_with_extension() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("mine");
        let bytes = b"\x89PNG\r\n\x1a\nrest".to_vec();
        let (session, transport, _) = fixture(ok(json!({"collage": STANDARD.encode(&bytes)})));
        let mut console = ScriptedConsole::new([name.to_string_lossy().into_owned()]);
        download_collage(&session, &transport, &mut console).unwrap();
        let written = fs::read(dir.path().join("mine.png")).unwrap();
        assert_eq!(written, bytes);
    }

    #[test]
    fn collage_rejection_does_not_prompt() {
        let (session, transport, _) = fixture(Some(StatusEnvelope::new(400, "\"no images\"")));
        let mut console = ScriptedConsole::new(["unused"]);
        download_collage(&session, &transport, &mut console).unwrap();
        assert_eq!(console.remaining_answers(), 1);
    }

    #[test]
    fn factors_rank_by_magnitude_with_stable_ties() {
        let ranked = rank_factors(&[-0.5, 0.9, 0.1, -0.9]);
        let names: Vec<&str> = ranked.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["eat", "social", "sleep", "water"]);
        let dirs: Vec<&str> = ranked.iter().map(|(_, c)| direction(*c)).collect();
        assert_eq!(dirs, ["positively", "negatively", "negatively", "positively"]);
    }

    #[test]
    fn ranking_tolerates_nan_coefficients() {
        let ranked = rank_factors(&[0.2, f64::NAN, -0.7, 0.2]);
        let names: Vec<&str> = ranked.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["eat", "water", "sleep", "social"]);
    }

    #[test]
    fn stats_are_rendered_in_rank_order() {
        let (session, transport, _) = fixture(ok(json!({"coef": [-0.5, 0.9, 0.1, -0.9]})));
        let mut console = ScriptedConsole::new(Vec::<String>::new());
        get_stats(&session, &transport, &mut console).unwrap();
        let out = console.output();
        assert!(out[1].contains("1. eat affects your day positively"));
        assert!(out[2].contains("2. social affects your day negatively"));
        assert!(out[4].contains("4. water"));
    }

    #[test]
    fn stats_with_wrong_shape_are_malformed() {
        for body in [json!({}), json!({"coef": [1.0, 2.0]}), json!({"coef": ["a", 1, 2, 3]})] {
            let (session, transport, _) = fixture(ok(body));
            let mut console = ScriptedConsole::new(Vec::<String>::new());
            let err = get_stats(&session, &transport, &mut console).unwrap_err();
            assert!(matches!(err, ActionError::MalformedResponse(_)));
        }
    }

    #[test]
    fn empty_entry_list() {
        let (session, transport, _) = fixture(ok(json!({"entries": []})));
        let mut console = ScriptedConsole::new(Vec::<String>::new());
        list_entries(&session, &transport, &mut console).unwrap();
        assert_eq!(console.transcript(), "no entries yet");
    }

    #[test]
    fn missing_scores_render_as_unknown() {
        let body = json!({"entries": [
            {"date": "2026-01-02", "sleep": 7, "eat": 6, "social": 5, "overall": 8, "notes": "ok"}
        ]});
        let (session, transport, _) = fixture(ok(body));
        let mut console = ScriptedConsole::new(Vec::<String>::new());
        list_entries(&session, &transport, &mut console).unwrap();
        let out = console.transcript();
        assert!(out.contains("water ?"), "{}", out);
        assert!(out.contains("sleep 7 eat 6"), "{}", out);
    }
}
