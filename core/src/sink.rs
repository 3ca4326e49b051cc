//! Stream sinks for scored records.
//!
//! Publishing is fire-and-forget from the job's point of view: the job logs
//! a failed publish and moves on. Sinks never see uncommitted rows.

use crate::{
    config::SinkSettings,
    error::{ScoringError, ScoringResult},
};
use std::{
    fs::OpenOptions,
    io::Write,
    path::PathBuf,
    time::Duration,
};

pub trait EventSink: Send {
    /// Stable name used in log lines.
    fn name(&self) -> &str;

    /// Deliver a batch of JSON records to `destination`.
    fn publish(&self, destination: &str, records: &[serde_json::Value]) -> ScoringResult<()>;
}

/// Build the sink described by `settings`.
pub fn from_settings(settings: &SinkSettings) -> ScoringResult<Box<dyn EventSink>> {
    Ok(match settings {
        SinkSettings::JsonLines { dir } => Box::new(JsonLinesSink::new(dir)),
        SinkSettings::Http { endpoint, token } => {
            Box::new(HttpSink::new(endpoint.clone(), token.clone())?)
        }
    })
}

// ── JSON lines ─────────────────────────────────────────────────────

/// Appends one JSON document per line to `<dir>/<destination>.jsonl`.
pub struct JsonLinesSink {
    dir: PathBuf,
}

impl JsonLinesSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, destination: &str) -> PathBuf {
        self.dir.join(format!("{destination}.jsonl"))
    }
}

impl EventSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn publish(&self, destination: &str, records: &[serde_json::Value]) -> ScoringResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut buf = Vec::new();
        for r in records {
            serde_json::to_writer(&mut buf, r)?;
            buf.push(b'\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(destination))?;
        file.write_all(&buf)?;
        Ok(())
    }
}

// ── HTTP ───────────────────────────────────────────────────────────

/// POSTs each batch as a JSON array to `<endpoint>/<destination>/messages`.
pub struct HttpSink {
    endpoint: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpSink {
    pub fn new(endpoint: String, token: Option<String>) -> ScoringResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { endpoint, token, client })
    }
}

impl EventSink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    fn publish(&self, destination: &str, records: &[serde_json::Value]) -> ScoringResult<()> {
        let url = format!("{}/{destination}/messages", self.endpoint);
        let mut req = self.client.post(&url).json(records);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ScoringError::SinkRejected {
                sink: self.name().to_string(),
                destination: destination.to_string(),
                reason: format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
            });
        }
        log::debug!("http sink: {} records accepted by {url}", records.len());
        Ok(())
    }
}
