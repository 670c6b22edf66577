//! Webhook activity log
//!
//! Bounded, thread-safe record of recent deliveries for operators. Owned by
//! `AppState`; the oldest entry is dropped once capacity is reached.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Created,
    Duplicate,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub received_at: DateTime<Utc>,
    pub outcome: DeliveryOutcome,
    pub user_id: Option<String>,
    pub source_message_id: Option<String>,
    pub booking_id: Option<Uuid>,
    pub parse_method: Option<String>,
    pub confidence: Option<f64>,
    /// Canonical field ← provider alias pairs that matched
    pub matched_aliases: Vec<String>,
    pub error: Option<String>,
}

impl ActivityEntry {
    pub fn new(outcome: DeliveryOutcome) -> Self {
        Self {
            received_at: Utc::now(),
            outcome,
            user_id: None,
            source_message_id: None,
            booking_id: None,
            parse_method: None,
            confidence: None,
            matched_aliases: Vec::new(),
            error: None,
        }
    }
}

#[derive(Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<ActivityEntry>>>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub async fn record(&self, entry: ActivityEntry) {
        let mut entries = self.entries.lock().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent entries first
    pub async fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        let entries = self.entries.lock().await;
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
