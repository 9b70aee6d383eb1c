use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress notifications during resolution and installation.
///
/// Callbacks may arrive from any task or thread, including several parallel
/// installs at once. Implementations must synchronise any state they mutate.
pub trait ProgressMonitor: Send + Sync {
    /// A manifest or release listing is being requested for `id`.
    fn request_pending(&self, _id: &str) {}

    fn download_started(&self, _id: &str, _total_bytes: Option<u64>) {}

    fn download_progress(&self, _id: &str, _bytes: u64) {}

    fn extraction_started(&self, _id: &str) {}

    fn extraction_completed(&self, _id: &str) {}
}

/// Counters aggregated over every package reported to it.
#[derive(Debug, Default)]
pub struct AggregateProgress {
    requests: AtomicU64,
    downloads: AtomicU64,
    downloaded_bytes: AtomicU64,
    expected_bytes: AtomicU64,
    extractions_started: AtomicU64,
    extractions_completed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub requests: u64,
    pub downloads: u64,
    pub downloaded_bytes: u64,
    pub expected_bytes: u64,
    pub extractions_started: u64,
    pub extractions_completed: u64,
}

impl AggregateProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            downloaded_bytes: self.downloaded_bytes.load(Ordering::Relaxed),
            expected_bytes: self.expected_bytes.load(Ordering::Relaxed),
            extractions_started: self.extractions_started.load(Ordering::Relaxed),
            extractions_completed: self.extractions_completed.load(Ordering::Relaxed),
        }
    }
}

impl ProgressMonitor for AggregateProgress {
    fn request_pending(&self, _id: &str) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn download_started(&self, _id: &str, total_bytes: Option<u64>) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
        if let Some(total) = total_bytes {
            self.expected_bytes.fetch_add(total, Ordering::Relaxed);
        }
    }

    fn download_progress(&self, _id: &str, bytes: u64) {
        self.downloaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn extraction_started(&self, _id: &str) {
        self.extractions_started.fetch_add(1, Ordering::Relaxed);
    }

    fn extraction_completed(&self, _id: &str) {
        self.extractions_completed.fetch_add(1, Ordering::Relaxed);
    }
}
