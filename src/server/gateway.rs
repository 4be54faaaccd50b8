// In-process stand-in for the API gateway: routes `{base}/{path}/{uid}`
// straight to the journal handlers without touching the network.

use super::{JournalService, Request};
use crate::api::{HttpBackend, Method, SendError, StatusEnvelope};
use crate::model::Operation;
use serde_json::Value;

pub struct LocalGateway {
    base_url: String,
    service: JournalService,
}

impl LocalGateway {
    pub fn new(base_url: &str, service: JournalService) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        }
    }

    fn route<'a>(&self, url: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = url.strip_prefix(self.base_url.as_str())?.strip_prefix('/')?;
        let (path, uid) = rest.split_once('/')?;
        if uid.is_empty() || uid.contains('/') {
            return None;
        }
        Some((path, uid))
    }
}

fn not_found() -> StatusEnvelope {
    StatusEnvelope::json(404, &Value::String("no such route".into()))
}

impl HttpBackend for LocalGateway {
    fn send(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<StatusEnvelope, SendError> {
        let Some((path, uid)) = self.route(url) else {
            tracing::debug!(url, "no route");
            return Ok(not_found());
        };
        let Some(op) = Operation::from_path(path).filter(|op| JournalService::serves(*op)) else {
            tracing::debug!(url, path, "operation not served locally");
            return Ok(not_found());
        };
        if op.method() != method {
            return Ok(StatusEnvelope::json(
                405,
                &Value::String(format!("{} not allowed on {}", method, path)),
            ));
        }
        let request = Request::new(method, uid, payload.map(Value::to_string));
        Ok(self.service.handle(op, &request))
    }
}
