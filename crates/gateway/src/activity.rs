//! Activity feed backing `GET /activity`: a flattened, newest-first log of
//! voice sessions, turns, and provider connect/disconnect events. Durable,
//! file-backed, and capped so it can't grow without bound.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use vco_domain::{Error, Result};

const MAX_ITEMS: usize = 2_000;
const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Session,
    Command,
    OauthConnect,
    OauthDisconnect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl ActivityItem {
    pub fn command(title: impl Into<String>, description: impl Into<String>, success: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind: ActivityType::Command,
            title: title.into(),
            description: description.into(),
            success: Some(success),
            service: None,
        }
    }

    pub fn session(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind: ActivityType::Session,
            title: title.into(),
            description: description.into(),
            success: None,
            service: None,
        }
    }

    pub fn oauth_connect(service: impl Into<String>, success: bool) -> Self {
        let service = service.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind: ActivityType::OauthConnect,
            title: format!("Connected {service}"),
            description: format!("Established a connection to {service}"),
            success: Some(success),
            service: Some(service),
        }
    }

    pub fn oauth_disconnect(service: impl Into<String>) -> Self {
        let service = service.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind: ActivityType::OauthDisconnect,
            title: format!("Disconnected {service}"),
            description: format!("Connection to {service} was closed"),
            success: None,
            service: Some(service),
        }
    }
}

pub struct ActivityLog {
    path: PathBuf,
    items: RwLock<Vec<ActivityItem>>,
}

impl ActivityLog {
    pub fn new(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join("activity.json");
        let items = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw)?
        } else {
            Vec::new()
        };
        Ok(Self { path, items: RwLock::new(items) })
    }

    fn flush(&self, items: &[ActivityItem]) {
        match serde_json::to_string(items) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!(error = %e, "failed to flush activity log");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize activity log"),
        }
    }

    pub fn record(&self, item: ActivityItem) {
        let mut items = self.items.write();
        items.push(item);
        if items.len() > MAX_ITEMS {
            let drop = items.len() - MAX_ITEMS;
            items.drain(0..drop);
        }
        self.flush(&items);
    }

    /// Newest-first page. `before` excludes anything at or after that
    /// timestamp, used as an opaque pagination cursor.
    pub fn list(&self, limit: Option<usize>, before: Option<DateTime<Utc>>) -> Vec<ActivityItem> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let items = self.items.read();
        items
            .iter()
            .rev()
            .filter(|item| before.map(|cutoff| item.timestamp < cutoff).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path()).unwrap();
        log.record(ActivityItem::command("first", "desc", true));
        log.record(ActivityItem::command("second", "desc", true));
        let page = log.list(None, None);
        assert_eq!(page[0].title, "second");
        assert_eq!(page[1].title, "first");
    }

    #[test]
    fn limit_is_capped_at_max() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path()).unwrap();
        for i in 0..10 {
            log.record(ActivityItem::command(format!("item-{i}"), "desc", true));
        }
        assert_eq!(log.list(Some(3), None).len(), 3);
        assert_eq!(log.list(Some(10_000), None).len(), 10);
    }

    #[test]
    fn survives_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = ActivityLog::new(dir.path()).unwrap();
            log.record(ActivityItem::session("started", "voice session opened"));
        }
        let reloaded = ActivityLog::new(dir.path()).unwrap();
        assert_eq!(reloaded.list(None, None).len(), 1);
    }
}
