use std::{collections::BTreeMap, sync::Arc};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::executor::DownloadOutcome;

pub const HISTORY_PAGE_LIMIT: usize = 50;
const ID_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DownloadInfo {
    /// Second-resolution timestamp, so two attempts started within the same
    /// second share an id.
    pub id: String,
    pub title: String,
    pub url: String,
    pub status: DownloadStatus,
    pub filename: Option<String>,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
}

impl DownloadInfo {
    pub fn started(url: &str, now: NaiveDateTime) -> Self {
        Self {
            id: now.format(ID_FORMAT).to_string(),
            title: String::new(),
            url: url.to_string(),
            status: DownloadStatus::Downloading,
            filename: None,
            error: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryTicket(u64);

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub downloads: Vec<DownloadInfo>,
    pub total: usize,
}

#[derive(Default)]
struct HistoryInner {
    next_seq: u64,
    entries: BTreeMap<u64, DownloadInfo>,
}

#[derive(Clone, Default)]
pub struct HistoryStore {
    inner: Arc<Mutex<HistoryInner>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self, url: &str) -> HistoryTicket {
        self.append(DownloadInfo::started(url, Local::now().naive_local()))
            .await
    }

    pub async fn append(&self, entry: DownloadInfo) -> HistoryTicket {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(seq, entry);
        HistoryTicket(seq)
    }

    /// Moves a `downloading` entry to its terminal state. Returns the updated
    /// entry, or `None` when it was deleted meanwhile or already finished.
    pub async fn finish(
        &self,
        ticket: HistoryTicket,
        outcome: &DownloadOutcome,
    ) -> Option<DownloadInfo> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.entries.get_mut(&ticket.0) else {
            debug!("History entry {:?} was removed before the download finished", ticket);
            return None;
        };
        if entry.status != DownloadStatus::Downloading {
            return None;
        }

        match outcome {
            Ok(completed) => {
                entry.status = DownloadStatus::Completed;
                entry.title = completed.title.clone();
                entry.filename = Some(completed.filename.clone());
            }
            Err(error) => {
                entry.status = DownloadStatus::Failed;
                entry.error = Some(error.clone());
            }
        }

        Some(entry.clone())
    }

    pub async fn list(&self, limit: usize) -> HistoryPage {
        let inner = self.inner.lock().await;
        let total = inner.entries.len();
        let downloads = inner
            .entries
            .values()
            .skip(total.saturating_sub(limit))
            .cloned()
            .collect();
        HistoryPage { downloads, total }
    }

    pub async fn delete(&self, id: &str) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.id != id);
        before - inner.entries.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
