//! `ResolutionEngine` over the engine's REST gateway.
//!
//! | Call                        | Request                                              |
//! |-----------------------------|------------------------------------------------------|
//! | getEntityByEntityID         | `GET    {base}/entities/{id}`                        |
//! | getEntityByRecordID         | `GET    {base}/data-sources/{ds}/records/{rid}/entity` |
//! | whyEntityByEntityID         | `GET    {base}/entities/{id}/why`                    |
//! | searchByAttributes          | `POST   {base}/search`                               |
//! | addRecord                   | `PUT    {base}/data-sources/{ds}/records/{rid}`      |
//! | deleteRecord                | `DELETE {base}/data-sources/{ds}/records/{rid}`      |
//! | getRecord                   | `GET    {base}/data-sources/{ds}/records/{rid}`      |
//! | engine configuration        | `GET    {base}/config`                               |
//!
//! A 404 is "not found"; any other failure is an engine error.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde_json::Value;

use matchlens_evidence::{EvidenceError, ResolutionEngine};

const USER_AGENT: &str = concat!("matchlens/", env!("CARGO_PKG_VERSION"));

pub struct HttpEngine {
    http: Client,
    base: Url,
}

fn engine_error(msg: impl Into<String>) -> EvidenceError {
    EvidenceError::Engine(msg.into())
}

/// Error text from a gateway error body: `message`, `error`, or the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string()),
        Err(_) => body.trim().to_string(),
    }
}

impl HttpEngine {
    pub fn new(base_url: &str) -> Result<Self, EvidenceError> {
        let base = Url::parse(base_url)
            .map_err(|e| engine_error(format!("invalid engine url {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(engine_error(format!("invalid engine url {}", base_url)));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| engine_error(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Base URL plus percent-encoded path segments.
    fn url(&self, segments: &[&str]) -> Result<Url, EvidenceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| engine_error(format!("invalid engine url {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, EvidenceError> {
        let resp = request
            .send()
            .map_err(|e| engine_error(format!("cannot reach engine at {}: {}", self.base, e)))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(EvidenceError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(engine_error(format!(
                "{} failed ({}): {}",
                what,
                status.as_u16(),
                error_message(&body)
            )));
        }
        Ok(resp)
    }

    fn read_json(resp: Response, what: &str) -> Result<Value, EvidenceError> {
        let value: Value = resp
            .json()
            .map_err(|e| engine_error(format!("unreadable response for {}: {}", what, e)))?;
        log::debug!("{} -> {}", what, value);
        Ok(value)
    }

    fn get_json(&self, segments: &[&str], what: &str) -> Result<Value, EvidenceError> {
        let url = self.url(segments)?;
        log::debug!("GET {}", url);
        let resp = self.send(self.http.get(url), what)?;
        Self::read_json(resp, what)
    }

    /// The engine's active configuration document (`G2_CONFIG`).
    pub fn engine_config(&self) -> Result<Value, EvidenceError> {
        self.get_json(&["config"], "engine config")
    }
}

impl ResolutionEngine for HttpEngine {
    fn get_entity_by_entity_id(&self, entity_id: i64) -> Result<Value, EvidenceError> {
        let id = entity_id.to_string();
        self.get_json(&["entities", &id], &format!("entity {}", entity_id))
    }

    fn get_entity_by_record_id(&self, data_source: &str, record_id: &str) -> Result<Value, EvidenceError> {
        self.get_json(
            &["data-sources", data_source, "records", record_id, "entity"],
            &format!("{}: {}", data_source, record_id),
        )
    }

    fn why_entity_by_entity_id(&self, entity_id: i64) -> Result<Value, EvidenceError> {
        let id = entity_id.to_string();
        self.get_json(&["entities", &id, "why"], &format!("entity {}", entity_id))
    }

    fn search_by_attributes(&self, attributes: &Value) -> Result<Value, EvidenceError> {
        let url = self.url(&["search"])?;
        log::debug!("POST {} {}", url, attributes);
        let resp = self.send(self.http.post(url).json(attributes), "search")?;
        Self::read_json(resp, "search")
    }

    fn add_record(&mut self, data_source: &str, record_id: &str, record: &Value) -> Result<(), EvidenceError> {
        let url = self.url(&["data-sources", data_source, "records", record_id])?;
        log::debug!("PUT {} {}", url, record);
        self.send(self.http.put(url).json(record), &format!("add {}: {}", data_source, record_id))?;
        Ok(())
    }

    /// Deleting a record the engine no longer has is not an error.
    fn delete_record(&mut self, data_source: &str, record_id: &str) -> Result<(), EvidenceError> {
        let url = self.url(&["data-sources", data_source, "records", record_id])?;
        log::debug!("DELETE {}", url);
        match self.send(self.http.delete(url), &format!("{}: {}", data_source, record_id)) {
            Ok(_) | Err(EvidenceError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn get_record(&self, data_source: &str, record_id: &str) -> Result<Value, EvidenceError> {
        self.get_json(
            &["data-sources", data_source, "records", record_id],
            &format!("record {}: {}", data_source, record_id),
        )
    }
}
