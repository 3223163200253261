//! Short-lived suppression of repeated file submissions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::metrics::record_duplicate;

/// Default suppression window.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(10);

/// Remembers recently admitted source file ids.
#[derive(Debug)]
pub struct DedupWindow {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Admit `file_id` unless it was admitted within the window.
    ///
    /// A rejection leaves the stored timestamp untouched.
    pub fn admit(&self, file_id: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());

        seen.retain(|_, admitted_at| now.duration_since(*admitted_at) < self.window);

        if seen.contains_key(file_id) {
            record_duplicate();
            return false;
        }

        seen.insert(file_id.to_string(), now);
        true
    }

    /// Ids currently inside the window.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_admits_once_within_window() {
        let dedup = DedupWindow::default();

        assert!(dedup.admit("file-1"));
        assert!(!dedup.admit("file-1"));
        assert!(dedup.admit("file-2"));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!dedup.admit("file-1"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(dedup.admit("file-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_does_not_extend_window() {
        let dedup = DedupWindow::new(Duration::from_secs(10));
        assert!(dedup.admit("file-1"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!dedup.admit("file-1"));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(dedup.admit("file-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_entries_are_pruned() {
        let dedup = DedupWindow::new(Duration::from_secs(10));
        dedup.admit("a");
        dedup.admit("b");
        assert_eq!(dedup.len(), 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        dedup.admit("c");
        assert_eq!(dedup.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_admission_of_one_id() {
        let dedup = Arc::new(DedupWindow::default());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                tokio::spawn(async move { dedup.admit("same") })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
