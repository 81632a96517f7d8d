//! Registry of fire-and-forget tasks keyed by conversation.
//!
//! At most one task runs per [`TaskKey`]. Spawning onto an occupied key aborts
//! the stale task first, so a newer reconciliation supersedes an older one
//! instead of racing it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Count recompute after a generation or deletion.
    Summary,
    /// Summary initialization and generated title for a new conversation.
    Title,
    /// Usage/cost polling for one generation id.
    Enrichment(String),
    /// Account balance refresh.
    Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub timestamp: i64,
    pub kind: TaskKind,
}

impl TaskKey {
    pub fn new(timestamp: i64, kind: TaskKind) -> Self {
        Self { timestamp, kind }
    }
}

#[derive(Default)]
pub struct BackgroundTasks {
    tasks: Mutex<HashMap<TaskKey, JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `future` under `key`, aborting whatever still runs there.
    pub fn spawn<F>(&self, key: TaskKey, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|_, task| !task.is_finished());
        if let Some(stale) = tasks.insert(key.clone(), handle) {
            tracing::debug!(timestamp = key.timestamp, kind = ?key.kind, "Superseding background task");
            stale.abort();
        }
    }

    /// Aborts every task belonging to `timestamp`.
    pub fn cancel_conversation(&self, timestamp: i64) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|key, task| {
            if key.timestamp == timestamp {
                task.abort();
                false
            } else {
                true
            }
        });
    }

    /// Number of tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.values().filter(|task| !task.is_finished()).count()
    }

    /// Waits until every task, including ones spawned while waiting, is done.
    pub async fn wait_idle(&self) {
        loop {
            let drained: Vec<_> = {
                let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
                tasks.drain().map(|(_, task)| task).collect()
            };
            if drained.is_empty() {
                return;
            }
            for task in drained {
                if let Err(e) = task.await {
                    if e.is_panic() {
                        tracing::error!("Background task panicked: {}", e);
                    }
                }
            }
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_idle_runs_everything() {
        let tasks = BackgroundTasks::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for ts in 0..3 {
            let counter = counter.clone();
            tasks.spawn(TaskKey::new(ts, TaskKind::Summary), async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        tasks.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_same_key_supersedes_stale_task() {
        let tasks = BackgroundTasks::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let stale = hits.clone();
        tasks.spawn(TaskKey::new(1, TaskKind::Summary), async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            stale.lock().unwrap().push("stale");
        });
        let fresh = hits.clone();
        tasks.spawn(TaskKey::new(1, TaskKind::Summary), async move {
            fresh.lock().unwrap().push("fresh");
        });

        tasks.wait_idle().await;
        assert_eq!(*hits.lock().unwrap(), vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_distinct_kinds_do_not_interfere() {
        let tasks = BackgroundTasks::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for kind in [
            TaskKind::Summary,
            TaskKind::Title,
            TaskKind::Enrichment("gen-1".into()),
            TaskKind::Enrichment("gen-2".into()),
        ] {
            let counter = counter.clone();
            tasks.spawn(TaskKey::new(7, kind), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        tasks.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancel_conversation() {
        let tasks = BackgroundTasks::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for ts in [1, 2] {
            let counter = counter.clone();
            tasks.spawn(TaskKey::new(ts, TaskKind::Title), async move {
                tokio::time::sleep(Duration::from_millis(if ts == 1 { 60_000 } else { 1 })).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        tasks.cancel_conversation(1);
        tasks.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
