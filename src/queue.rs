//! Requests held back while the host is unreachable.
//!
//! The [`RetryQueue`] stores tasks that could not be sent and resumes them
//! when connectivity comes back. How a new task enters the queue is decided
//! per request by its [`QueueAdmissionPolicy`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

/// How a request that could not be sent is added to the retry queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueAdmissionPolicy {
    /// Never queue. The failure is reported and the request is dropped.
    #[default]
    NoQueueing,

    /// Append to the tail. Nothing is deduplicated.
    Fifo,

    /// Replace the whole queue with this request, whatever its target.
    LastRequestOnly,

    /// Remove any queued request for the same URL, then append.
    ///
    /// At most one request per URL is pending and the newest one wins. The
    /// relative order of other URLs is preserved.
    LastUniqueRequestPerUrl,
}

/// A pending task together with the URL it targets.
pub struct RetryQueueEntry {
    url: Url,
    resume: Box<dyn FnOnce() + Send + 'static>,
}

impl RetryQueueEntry {
    /// Creates an entry that runs `resume` when the queue is drained.
    pub fn new(url: Url, resume: impl FnOnce() + Send + 'static) -> Self {
        Self {
            url,
            resume: Box::new(resume),
        }
    }

    /// The URL the task targets.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Runs the task.
    pub fn resume(self) {
        (self.resume)()
    }
}

impl fmt::Debug for RetryQueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryQueueEntry")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

/// Ordered collection of pending tasks.
///
/// Admission and draining both lock the queue; drained tasks are resumed
/// after the lock is released.
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: Mutex<VecDeque<RetryQueueEntry>>,
}

impl RetryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entry` according to `policy`. Returns `true` if it was queued.
    pub fn admit(&self, entry: RetryQueueEntry, policy: QueueAdmissionPolicy) -> bool {
        let mut entries = self.lock();

        match policy {
            QueueAdmissionPolicy::NoQueueing => {
                tracing::debug!(url = %entry.url, "Request not queued");
                return false;
            }
            QueueAdmissionPolicy::Fifo => {}
            QueueAdmissionPolicy::LastRequestOnly => {
                if !entries.is_empty() {
                    tracing::debug!(evicted = entries.len(), "Superseding queued requests");
                }
                entries.clear();
            }
            QueueAdmissionPolicy::LastUniqueRequestPerUrl => {
                let before = entries.len();
                entries.retain(|queued| queued.url != entry.url);
                if entries.len() < before {
                    tracing::debug!(url = %entry.url, "Superseding queued request for URL");
                }
            }
        }

        tracing::debug!(
            url = %entry.url,
            policy = ?policy,
            depth = entries.len() + 1,
            "Queued request for retry"
        );
        entries.push_back(entry);
        true
    }

    /// Resumes every task for which `is_reachable` holds at the time it is
    /// visited. Tasks visited while unreachable stay queued, in order.
    ///
    /// Returns the number of resumed tasks.
    pub fn drain(&self, is_reachable: impl Fn() -> bool) -> usize {
        let ready: Vec<RetryQueueEntry> = {
            let mut entries = self.lock();
            if entries.is_empty() {
                return 0;
            }

            let mut kept = VecDeque::with_capacity(entries.len());
            let mut ready = Vec::new();
            for entry in entries.drain(..) {
                if is_reachable() {
                    ready.push(entry);
                } else {
                    kept.push_back(entry);
                }
            }
            *entries = kept;

            if !entries.is_empty() {
                tracing::info!(
                    remaining = entries.len(),
                    "Host became unreachable again while draining"
                );
            }
            ready
        };

        let resumed = ready.len();
        if resumed > 0 {
            tracing::info!(resumed, "Resuming queued requests");
        }
        for entry in ready {
            entry.resume();
        }
        resumed
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// URLs of the queued tasks, head first.
    pub fn urls(&self) -> Vec<Url> {
        self.lock().iter().map(|entry| entry.url.clone()).collect()
    }

    /// Drops every queued task without running it.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RetryQueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn url(path: &str) -> Url {
        Url::parse("https://api.example.com").unwrap().join(path).unwrap()
    }

    fn entry(path: &str, log: &Arc<Mutex<Vec<String>>>, tag: &str) -> RetryQueueEntry {
        let log = log.clone();
        let tag = tag.to_string();
        RetryQueueEntry::new(url(path), move || log.lock().unwrap().push(tag))
    }

    fn paths(queue: &RetryQueue) -> Vec<String> {
        queue.urls().iter().map(|u| u.path().to_string()).collect()
    }

    #[test]
    fn test_no_queueing_drops() {
        let queue = RetryQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(!queue.admit(entry("/a", &log, "a"), QueueAdmissionPolicy::NoQueueing));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_accumulates() {
        let queue = RetryQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (path, tag) in [("/a", "a1"), ("/b", "b"), ("/a", "a2")] {
            assert!(queue.admit(entry(path, &log, tag), QueueAdmissionPolicy::Fifo));
        }
        assert_eq!(paths(&queue), ["/a", "/b", "/a"]);

        assert_eq!(queue.drain(|| true), 3);
        assert_eq!(*log.lock().unwrap(), ["a1", "b", "a2"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_last_request_only_replaces_everything() {
        let queue = RetryQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        queue.admit(entry("/a", &log, "a"), QueueAdmissionPolicy::Fifo);
        queue.admit(entry("/b", &log, "b"), QueueAdmissionPolicy::Fifo);
        queue.admit(entry("/c", &log, "c"), QueueAdmissionPolicy::LastRequestOnly);

        assert_eq!(paths(&queue), ["/c"]);
        queue.drain(|| true);
        assert_eq!(*log.lock().unwrap(), ["c"]);
    }

    #[test]
    fn test_last_unique_per_url() {
        let queue = RetryQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let policy = QueueAdmissionPolicy::LastUniqueRequestPerUrl;
        queue.admit(entry("/a", &log, "a"), policy);
        queue.admit(entry("/b", &log, "b"), policy);
        queue.admit(entry("/a", &log, "a'"), policy);

        assert_eq!(paths(&queue), ["/b", "/a"]);
        queue.drain(|| true);
        assert_eq!(*log.lock().unwrap(), ["b", "a'"]);
    }

    #[test]
    fn test_drain_keeps_tasks_while_unreachable() {
        let queue = RetryQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (path, tag) in [("/a", "a"), ("/b", "b"), ("/c", "c")] {
            queue.admit(entry(path, &log, tag), QueueAdmissionPolicy::Fifo);
        }

        assert_eq!(queue.drain(|| false), 0);
        assert_eq!(queue.len(), 3);

        // Connectivity drops after the first task is visited
        let visits = Cell::new(0);
        let resumed = queue.drain(|| {
            visits.set(visits.get() + 1);
            visits.get() == 1
        });
        assert_eq!(resumed, 1);
        assert_eq!(*log.lock().unwrap(), ["a"]);
        assert_eq!(paths(&queue), ["/b", "/c"]);
    }

    #[test]
    fn test_task_resumed_exactly_once() {
        let queue = RetryQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        queue.admit(
            RetryQueueEntry::new(url("/x"), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            QueueAdmissionPolicy::Fifo,
        );

        assert_eq!(queue.drain(|| true), 1);
        assert_eq!(queue.drain(|| true), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear() {
        let queue = RetryQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        queue.admit(entry("/a", &log, "a"), QueueAdmissionPolicy::Fifo);
        queue.clear();
        assert_eq!(queue.drain(|| true), 0);
        assert!(log.lock().unwrap().is_empty());
    }
}
