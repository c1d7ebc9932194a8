use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSONL audit log of one CLI session.
pub struct Transcript {
    pub path: PathBuf,
    session_id: String,
    file: File,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    session_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl Transcript {
    pub fn new(path: &Path, session_id: &str) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            session_id: session_id.to_string(),
            file,
        })
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            session_id: &self.session_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn login(&mut self, email: &str, ok: bool, error: Option<&str>) -> Result<()> {
        let event_type = if ok { "login_ok" } else { "login_failed" };
        self.log(
            event_type,
            serde_json::json!({ "email": email, "error": error }),
        )
    }

    pub fn logout(&mut self) -> Result<()> {
        self.log("logout", serde_json::json!({}))
    }

    pub fn page_loaded(&mut self, page: u32, total_pages: u32, count: usize) -> Result<()> {
        self.log(
            "page_loaded",
            serde_json::json!({ "page": page, "total_pages": total_pages, "count": count }),
        )
    }

    pub fn page_failed(&mut self, page: u32) -> Result<()> {
        self.log("page_failed", serde_json::json!({ "page": page }))
    }

    /// Log a change of search term or attribute filter
    pub fn filter(&mut self, search_term: &str, active: Option<bool>, role: Option<&str>) -> Result<()> {
        self.log(
            "filter",
            serde_json::json!({
                "search_term": search_term,
                "active": active,
                "role": role,
            }),
        )
    }

    pub fn user_updated(&mut self, id: u64, fields: &serde_json::Value) -> Result<()> {
        self.log(
            "user_updated",
            serde_json::json!({ "id": id, "fields": fields }),
        )
    }

    pub fn user_update_failed(&mut self, id: u64, error: &str) -> Result<()> {
        self.log(
            "user_update_failed",
            serde_json::json!({ "id": id, "error": error }),
        )
    }

    pub fn user_deleted(&mut self, id: u64) -> Result<()> {
        self.log("user_deleted", serde_json::json!({ "id": id }))
    }

    pub fn user_delete_failed(&mut self, id: u64, error: &str) -> Result<()> {
        self.log(
            "user_delete_failed",
            serde_json::json!({ "id": id, "error": error }),
        )
    }
}
