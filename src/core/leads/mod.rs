//! Lead capture and persistence.
//!
//! A lead is the structured record the model extracts mid-call through the
//! `save_lead` tool. Persistence is an append-only CSV: at-least-once, no
//! primary key, no dedup. Appends block the tool turn that produced them,
//! so the sink result decides whether the tool call is acknowledged.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::core::realtime::ToolDefinition;

/// Name of the tool declared to the model.
pub const SAVE_LEAD_TOOL: &str = "save_lead";

/// CSV header row, written when the file is created.
const CSV_HEADER: &str = "TIMESTAMP,NAME,PHONE,INTEREST,BUDGET,LANGUAGE";

// =============================================================================
// Lead Record
// =============================================================================

/// One captured lead, parsed from the tool call's arguments.
///
/// Write-once; the timestamp is stamped by the sink at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    /// Lead's name
    pub name: String,
    /// Phone number, if the lead provided one
    #[serde(default)]
    pub phone: Option<String>,
    /// Buying, renting, or investment
    pub interest: String,
    /// Budget range
    pub budget: String,
    /// Conversation language
    pub language: String,
}

/// Tool declaration for `save_lead`, sent with the session configuration.
pub fn save_lead_tool() -> ToolDefinition {
    ToolDefinition {
        name: SAVE_LEAD_TOOL.to_string(),
        description: Some("Save the lead's information when they provide it.".to_string()),
        parameters: Some(serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "phone": {
                    "type": "string",
                    "description": "The lead's phone number if provided, otherwise leave blank"
                },
                "interest": {
                    "type": "string",
                    "description": "Buying, renting, or investment"
                },
                "budget": { "type": "string" },
                "language": { "type": "string" }
            },
            "required": ["name", "interest", "budget", "language"]
        })),
    }
}

// =============================================================================
// Lead Sink
// =============================================================================

/// Errors from lead persistence.
#[derive(Debug, Error)]
pub enum LeadSinkError {
    /// Writing the record failed
    #[error("Failed to write lead record: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only store for lead records.
///
/// Must be safe to call concurrently from different call sessions;
/// at-least-once semantics, duplicates are not deduplicated here.
#[async_trait]
pub trait LeadSink: Send + Sync {
    /// Durably append one record.
    async fn append(&self, record: &LeadRecord) -> Result<(), LeadSinkError>;
}

/// CSV-file lead sink.
///
/// Writes are serialized by an internal mutex so concurrent calls from
/// different sessions append whole lines. The header row is written when
/// the file is created or empty.
pub struct CsvLeadSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvLeadSink {
    /// Create a sink writing to the given path. The file is created lazily
    /// on the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing CSV file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl LeadSink for CsvLeadSink {
    async fn append(&self, record: &LeadRecord) -> Result<(), LeadSinkError> {
        let _guard = self.write_lock.lock().await;

        let needs_header = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut out = String::new();
        if needs_header {
            out.push_str(CSV_HEADER);
            out.push('\n');
        }
        out.push_str(&csv_line(&[
            &timestamp,
            &record.name,
            record.phone.as_deref().unwrap_or(""),
            &record.interest,
            &record.budget,
            &record.language,
        ]));
        out.push('\n');

        file.write_all(out.as_bytes()).await?;
        file.flush().await?;

        tracing::info!(name = %record.name, language = %record.language, "lead saved");
        Ok(())
    }
}

/// Join fields into one CSV line, quoting where required.
fn csv_line(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Quote a field if it contains a separator, quote, or newline.
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
