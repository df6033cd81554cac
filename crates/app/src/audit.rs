//! Broadcast event handler keeping an audit trail.

use std::sync::Arc;

use async_trait::async_trait;
use bus::{EventHandler, HandlerError};
use chrono::{DateTime, Utc};
use common::EventRef;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub event_type: &'static str,
    pub recorded_at: DateTime<Utc>,
}

/// Records the type of every event the dispatcher delivers.
///
/// Clones share the same trail.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Returns the recorded event types, oldest first.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.event_type)
            .collect()
    }
}

#[async_trait]
impl EventHandler for AuditLog {
    async fn handle(&self, event: EventRef) -> Result<(), HandlerError> {
        self.entries.lock().push(AuditEntry {
            event_type: event.event_type(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "AuditLog"
    }
}
