//! Download progress records and the single-slot cell they are published through.
//!
//! The worker overwrites the cell; readers sample whatever value is current.
//! Intermediate values may be skipped. The `watch` channel gives the write a
//! happens-before edge with any read that observes it.

use serde::Serialize;
use tokio::sync::watch;

use crate::util::progress_percent;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DownloadProgress {
    /// 1-based position of the file within this run's downloads.
    pub index: usize,
    pub total: usize,
    pub filename: String,
    pub bytes_so_far: u64,
    /// Zero when the server sent no content length.
    pub total_bytes: u64,
    pub bytes_per_second: f64,
}

impl DownloadProgress {
    pub fn starting(index: usize, total: usize, filename: &str) -> Self {
        Self {
            index,
            total,
            filename: filename.to_owned(),
            ..Default::default()
        }
    }

    pub fn percent(&self) -> f32 {
        let total = (self.total_bytes > 0).then_some(self.total_bytes);
        progress_percent(self.bytes_so_far, total)
    }
}

pub type ProgressCallback<'a> = Option<&'a mut (dyn FnMut(DownloadProgress) + Send)>;

pub(crate) fn emit_progress(cb: &mut ProgressCallback<'_>, update: DownloadProgress) {
    if let Some(callback) = cb.as_deref_mut() {
        callback(update);
    }
}

/// Writer half of the latest-value cell.
#[derive(Debug)]
pub struct ProgressCell {
    tx: watch::Sender<Option<DownloadProgress>>,
}

/// Reader half of the latest-value cell.
#[derive(Clone, Debug)]
pub struct ProgressReader {
    rx: watch::Receiver<Option<DownloadProgress>>,
}

impl ProgressCell {
    pub fn new() -> (Self, ProgressReader) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, ProgressReader { rx })
    }

    pub fn publish(&self, update: DownloadProgress) {
        self.tx.send_replace(Some(update));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn reader(&self) -> ProgressReader {
        ProgressReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl ProgressReader {
    /// The most recently published value, if any.
    pub fn latest(&self) -> Option<DownloadProgress> {
        self.rx.borrow().clone()
    }

    /// Like [`latest`](Self::latest) but only when something new was published
    /// since the previous call.
    pub fn changed(&mut self) -> Option<DownloadProgress> {
        if self.rx.has_changed().unwrap_or(false) {
            self.rx.borrow_and_update().clone()
        } else {
            None
        }
    }
}
