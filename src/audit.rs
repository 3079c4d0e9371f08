//! Audit trail for deploy triggers and access denials
//!
//! Appends one JSON object per line to `<state dir>/quill/audit.log`.
//! Enabled unless `general.audit_log = false`.

use crate::config::{schema::Config, ConfigManager};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Something worth a line in the audit log
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    DeployTriggered { task_id: String, identity: String },
    AccessDenied { identity: String, reason: String },
    BuildCompleted { steps: usize },
    BuildFailed { step: String, reason: String },
}

/// Append-only JSON lines logger
#[derive(Debug, Clone)]
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
}

impl AuditLog {
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.audit_log,
            path: ConfigManager::audit_log_path(),
        }
    }

    /// Log to a specific file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            path: path.into(),
        }
    }

    /// A logger that drops everything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
        }
    }

    /// Record an event. IO failures are logged and dropped.
    pub async fn record(&self, event: AuditEvent) {
        if !self.enabled {
            return;
        }

        let mut entry = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        if let Some(fields) = entry.as_object_mut() {
            fields.insert(
                "timestamp".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }

        let mut line = entry.to_string();
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
