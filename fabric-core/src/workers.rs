use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// How many heartbeats may pass (60s threshold) before a worker is reaped.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 60;

/// One entry in a Worker's bounded completed-task log.
#[derive(Clone, Debug, Serialize)]
pub struct CompletedTaskEntry {
    pub task_id: String,
    pub success: bool,
    pub timestamp: f64,
}

/// Maximum retained entries in `Worker::completed_tasks`. An unbounded log
/// leaks memory over a long-lived controller; bounding it changes no
/// externally observable behavior.
const COMPLETED_LOG_CAP: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
}

/// Registered worker metadata + liveness.
#[derive(Clone, Debug, Serialize)]
pub struct Worker {
    pub node_id: String,
    pub addr: Option<SocketAddr>,
    pub ram_limit: u64,
    pub status: WorkerStatus,
    pub current_task: Option<String>,
    pub task_count: u64,
    pub last_heartbeat: f64,
    #[serde(skip)]
    completed_tasks: Vec<CompletedTaskEntry>,
}

impl Worker {
    pub fn new(node_id: String, addr: Option<SocketAddr>, ram_limit: u64) -> Self {
        Self {
            node_id,
            addr,
            ram_limit,
            status: WorkerStatus::Idle,
            current_task: None,
            task_count: 0,
            last_heartbeat: now_secs(),
            completed_tasks: Vec::new(),
        }
    }

    pub fn touch_heartbeat(&mut self) {
        self.last_heartbeat = now_secs();
    }

    pub fn is_alive(&self, timeout_secs: u64) -> bool {
        now_secs() - self.last_heartbeat < timeout_secs as f64
    }

    pub fn mark_busy(&mut self, task_id: String) {
        self.status = WorkerStatus::Busy;
        self.current_task = Some(task_id);
    }

    pub fn mark_idle_after(&mut self, task_id: &str, success: bool) {
        self.status = WorkerStatus::Idle;
        self.current_task = None;
        self.task_count += 1;
        self.completed_tasks.push(CompletedTaskEntry {
            task_id: task_id.to_string(),
            success,
            timestamp: now_secs(),
        });
        if self.completed_tasks.len() > COMPLETED_LOG_CAP {
            let drop = self.completed_tasks.len() - COMPLETED_LOG_CAP;
            self.completed_tasks.drain(0..drop);
        }
    }

    pub fn completed_tasks(&self) -> &[CompletedTaskEntry] {
        &self.completed_tasks
    }
}

pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// The Workers table. Guarded by a single lock per the lock-hierarchy
/// discipline (Workers → DAGs → Scheduler).
#[derive(Default)]
pub struct WorkerTable {
    inner: Mutex<HashMap<String, Worker>>,
}

impl WorkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a Worker record. Last-write-wins: any in-flight
    /// assignment against the prior entry becomes orphaned (the Scheduler
    /// still tracks it against the old `node_id`; the reaper or a failed
    /// `task_result` from the stale connection will eventually reclaim it).
    pub async fn register(&self, node_id: String, addr: Option<SocketAddr>, ram_limit: u64) {
        let mut map = self.inner.lock().await;
        map.insert(node_id.clone(), Worker::new(node_id, addr, ram_limit));
    }

    pub async fn heartbeat(&self, node_id: &str) -> bool {
        let mut map = self.inner.lock().await;
        match map.get_mut(node_id) {
            Some(w) => {
                w.touch_heartbeat();
                true
            }
            None => false,
        }
    }

    pub async fn mark_busy(&self, node_id: &str, task_id: String) {
        let mut map = self.inner.lock().await;
        if let Some(w) = map.get_mut(node_id) {
            w.mark_busy(task_id);
        }
    }

    pub async fn mark_idle_after(&self, node_id: &str, task_id: &str, success: bool) {
        let mut map = self.inner.lock().await;
        if let Some(w) = map.get_mut(node_id) {
            w.mark_idle_after(task_id, success);
        }
    }

    /// Returns `(node_id, in-flight task ids)` of every worker whose
    /// heartbeat is older than `timeout_secs`, removing them from the table.
    pub async fn reap_dead(&self, timeout_secs: u64) -> Vec<String> {
        let mut map = self.inner.lock().await;
        let dead: Vec<String> = map
            .iter()
            .filter(|(_, w)| !w.is_alive(timeout_secs))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &dead {
            map.remove(id);
        }
        dead
    }

    /// Acquire the table's lock directly. Used by `State::get_status` to
    /// hold the Workers guard across the DAGs acquisition too, so the two
    /// snapshots are taken from a single consistent instant rather than two
    /// independent critical sections.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, HashMap<String, Worker>> {
        self.inner.lock().await
    }

    pub async fn contains(&self, node_id: &str) -> bool {
        self.inner.lock().await.contains_key(node_id)
    }
}
