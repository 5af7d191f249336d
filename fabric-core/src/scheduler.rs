use crate::messages::TaskDescriptor;
use crate::workers::now_secs;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// An in-flight assignment: a task handed to a specific worker.
#[derive(Clone, Debug)]
pub struct InFlight {
    pub worker_id: String,
    pub descriptor: TaskDescriptor,
    pub start_time: f64,
    pub retry_count: u32,
}

struct Inner {
    ready_queue: VecDeque<TaskDescriptor>,
    pending_index: HashMap<String, TaskDescriptor>,
    in_flight: HashMap<String, InFlight>,
    /// Retry counts survive a task's trip through `in_flight`, so a
    /// re-enqueued descriptor keeps its count for observability.
    retry_counts: HashMap<String, u32>,
}

/// Ready queue + pending index + in-flight assignments, kept mutually
/// consistent: a task id is in at most one of `pending_index`/`in_flight`,
/// and `pending_index` mirrors `ready_queue` exactly.
#[derive(Default)]
pub struct Scheduler {
    inner: Mutex<Inner>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            ready_queue: VecDeque::new(),
            pending_index: HashMap::new(),
            in_flight: HashMap::new(),
            retry_counts: HashMap::new(),
        }
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue policy: append only if not already pending or in-flight.
    /// At-most-once enqueue per task under normal flow.
    pub async fn enqueue_ready(&self, tasks: Vec<TaskDescriptor>) {
        let mut inner = self.inner.lock().await;
        for t in tasks {
            if !inner.pending_index.contains_key(&t.id) && !inner.in_flight.contains_key(&t.id) {
                inner.pending_index.insert(t.id.clone(), t.clone());
                inner.ready_queue.push_back(t);
            }
        }
    }

    /// Atomically pop the head of the ready queue, move it to `in_flight`
    /// under `worker_id`, and return it. FIFO across all DAGs.
    pub async fn get_task(&self, worker_id: &str) -> Option<TaskDescriptor> {
        let mut inner = self.inner.lock().await;
        let task = inner.ready_queue.pop_front()?;
        inner.pending_index.remove(&task.id);
        let retry_count = *inner.retry_counts.get(&task.id).unwrap_or(&0);
        inner.in_flight.insert(
            task.id.clone(),
            InFlight {
                worker_id: worker_id.to_string(),
                descriptor: task.clone(),
                start_time: now_secs(),
                retry_count,
            },
        );
        Some(task)
    }

    /// A successful result simply drops the in-flight entry — the DAG layer
    /// already recorded the outcome.
    pub async fn complete(&self, task_id: &str) {
        self.inner.lock().await.in_flight.remove(task_id);
    }

    /// How many times a task has been retried so far. Zero for a task that
    /// has never failed, including one that was never submitted.
    pub async fn retry_count(&self, task_id: &str) -> u32 {
        self.inner
            .lock()
            .await
            .retry_counts
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    /// A failed result re-queues the descriptor at the tail, incrementing
    /// its retry count. No retry cap — a task that always fails will
    /// thrash forever, observable via `retry_count` but never capped.
    pub async fn fail_and_requeue(&self, task_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.in_flight.remove(task_id) {
            let count = inner.retry_counts.entry(task_id.to_string()).or_insert(0);
            *count += 1;
            inner
                .pending_index
                .insert(task_id.to_string(), entry.descriptor.clone());
            inner.ready_queue.push_back(entry.descriptor);
        }
    }

    /// Reclaim every in-flight task belonging to `worker_id`: move back to
    /// the ready queue + pending index. Used by the Reaper.
    pub async fn reclaim_worker(&self, worker_id: &str) -> Vec<String> {
        let mut inner = self.inner.lock().await;
        let stale: Vec<String> = inner
            .in_flight
            .iter()
            .filter(|(_, v)| v.worker_id == worker_id)
            .map(|(k, _)| k.clone())
            .collect();
        let mut reclaimed = Vec::new();
        for task_id in stale {
            if let Some(entry) = inner.in_flight.remove(&task_id) {
                inner
                    .pending_index
                    .insert(task_id.clone(), entry.descriptor.clone());
                inner.ready_queue.push_back(entry.descriptor);
                reclaimed.push(task_id);
            }
        }
        reclaimed
    }

    /// True if `task_id` is present in exactly one of pending/in-flight, or
    /// neither (never submitted / already terminal).
    #[cfg(test)]
    pub async fn location(&self, task_id: &str) -> (bool, bool) {
        let inner = self.inner.lock().await;
        (
            inner.pending_index.contains_key(task_id),
            inner.in_flight.contains_key(task_id),
        )
    }

    #[cfg(test)]
    pub async fn ready_len(&self) -> usize {
        self.inner.lock().await.ready_queue.len()
    }

    #[cfg(test)]
    pub async fn pending_matches_queue(&self) -> bool {
        let inner = self.inner.lock().await;
        let queue_ids: std::collections::HashSet<&str> =
            inner.ready_queue.iter().map(|t| t.id.as_str()).collect();
        let index_ids: std::collections::HashSet<&str> =
            inner.pending_index.keys().map(|s| s.as_str()).collect();
        queue_ids == index_ids
    }
}
