//! The State Store: Workers, DAGs and Scheduler tables plus the operations
//! that touch more than one of them. Lock acquisition order is always
//! Workers → DAGs → Scheduler (see module docs on each table) — no method
//! here acquires them out of order, and none holds a lock across an .await
//! that can suspend on socket I/O.

use crate::dags::DagTable;
use crate::messages::{DagSubmission, ResultRecord, TaskDescriptor};
use crate::scheduler::Scheduler;
use crate::workers::{now_secs, WorkerTable};
use std::net::SocketAddr;
use uuid::Uuid;

pub struct State {
    pub workers: WorkerTable,
    pub dags: DagTable,
    pub scheduler: Scheduler,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        Self {
            workers: WorkerTable::new(),
            dags: DagTable::new(),
            scheduler: Scheduler::new(),
        }
    }

    pub async fn register_node(&self, node_id: String, addr: Option<SocketAddr>, ram_limit: u64) {
        tracing::info!(node_id = %node_id, ram_limit, "node registered");
        self.workers.register(node_id, addr, ram_limit).await;
    }

    pub async fn heartbeat(&self, node_id: &str) -> bool {
        self.workers.heartbeat(node_id).await
    }

    pub async fn get_task(&self, node_id: &str) -> Option<TaskDescriptor> {
        let task = self.scheduler.get_task(node_id).await;
        if let Some(t) = &task {
            self.workers.mark_busy(node_id, t.id.clone()).await;
            tracing::info!(task_id = %t.id, node_id = %node_id, "task assigned");
        }
        task
    }

    /// Apply a worker's result to the DAG and Scheduler, update the worker's
    /// counters, then re-evaluate the DAG for newly-eligible successors.
    /// Fully applied (DAG update AND successor enqueue attempt) before the
    /// response is sent, as the ordering guarantee requires.
    pub async fn task_result(&self, node_id: &str, task_id: &str, result: ResultRecord) {
        let dag_id = result.dag_id.clone();
        let success = result.success;

        if success {
            self.scheduler.complete(task_id).await;
        } else {
            self.scheduler.fail_and_requeue(task_id).await;
        }

        let recorded = self.dags.record_result(&dag_id, task_id, result).await;
        if recorded {
            tracing::info!(task_id = %task_id, dag_id = %dag_id, success, "task result recorded");
        }

        self.workers.mark_idle_after(node_id, task_id, success).await;

        if recorded {
            self.reevaluate_dag(&dag_id).await;
        }
    }

    /// Assign a fresh `dag_id`, validate and insert the DAG, enqueue its
    /// initially-ready (root) tasks.
    pub async fn submit_dag(
        &self,
        submission: DagSubmission,
    ) -> Result<String, crate::dags::DagValidationError> {
        let dag_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let dag_id = self.dags.insert(dag_id, submission).await?;
        tracing::info!(dag_id = %dag_id, "dag submitted");
        self.reevaluate_dag(&dag_id).await;
        Ok(dag_id)
    }

    /// Recompute the ready set for one DAG and enqueue any newly-eligible
    /// task. Called on submission, on every `task_result`, on each tick of
    /// the Scheduler Loop, and after a Reaper reclaim.
    pub async fn reevaluate_dag(&self, dag_id: &str) {
        let ready = self.dags.ready_tasks(dag_id).await;
        self.scheduler.enqueue_ready(ready).await;
    }

    /// Take a consistent snapshot of the Workers and DAGs tables. The two
    /// guards are acquired Workers-then-DAGs and held together while both
    /// maps are built, so no `task_result` or reap can land between the two
    /// halves of the snapshot — the Scheduler lock is not held (Scheduler
    /// state is not reported), matching §5's "does not lock the Scheduler".
    pub async fn get_status(&self) -> (serde_json::Value, serde_json::Value, f64) {
        let workers_guard = self.workers.lock().await;
        let dags_guard = self.dags.lock().await;

        let nodes_json: serde_json::Map<String, serde_json::Value> = workers_guard
            .iter()
            .map(|(id, w)| {
                (
                    id.clone(),
                    serde_json::json!({
                        "node_id": w.node_id,
                        "addr": w.addr.map(|a| a.to_string()),
                        "ram_limit": w.ram_limit,
                        "status": w.status,
                        "current_task": w.current_task,
                        "task_count": w.task_count,
                        "last_heartbeat": w.last_heartbeat,
                    }),
                )
            })
            .collect();
        let dags_json: serde_json::Map<String, serde_json::Value> = dags_guard
            .iter()
            .map(|(id, dag)| (id.clone(), dag.to_json()))
            .collect();

        drop(dags_guard);
        drop(workers_guard);

        let mut dags = serde_json::Value::Object(dags_json);
        if let Some(obj) = dags.as_object_mut() {
            for dag_json in obj.values_mut() {
                self.attach_retry_counts(dag_json).await;
            }
        }
        (serde_json::Value::Object(nodes_json), dags, now_secs())
    }

    pub async fn get_dag_status(&self, dag_id: &str) -> Option<serde_json::Value> {
        let mut dag_json = self.dags.snapshot_one(dag_id).await?;
        self.attach_retry_counts(&mut dag_json).await;
        Some(dag_json)
    }

    /// Merge each task's current retry count (tracked by the Scheduler, not
    /// the DAG itself) into a DAG snapshot's per-task detail.
    async fn attach_retry_counts(&self, dag_json: &mut serde_json::Value) {
        let Some(tasks) = dag_json.get_mut("tasks").and_then(|v| v.as_object_mut()) else {
            return;
        };
        let ids: Vec<String> = tasks.keys().cloned().collect();
        for id in ids {
            let count = self.scheduler.retry_count(&id).await;
            if let Some(entry) = tasks.get_mut(&id).and_then(|v| v.as_object_mut()) {
                entry.insert("retry_count".to_string(), serde_json::json!(count));
            }
        }
    }

    pub async fn worker_exists(&self, node_id: &str) -> bool {
        self.workers.contains(node_id).await
    }

    pub async fn dag_exists(&self, dag_id: &str) -> bool {
        self.dags.contains(dag_id).await
    }

    /// Reap workers whose heartbeat has aged out, moving their in-flight
    /// tasks straight back into the ready queue. Returns the reclaimed task
    /// ids; callers that want a DAG re-evaluation pass too (there isn't one
    /// needed here, since `reclaim_worker` already restores ready-queue
    /// membership directly) can call `reevaluate_all_dags` afterward.
    pub async fn reap(&self, timeout_secs: u64) -> Vec<String> {
        let dead = self.workers.reap_dead(timeout_secs).await;
        let mut reclaimed = Vec::new();
        for worker_id in &dead {
            tracing::warn!(node_id = %worker_id, "worker reaped");
            let tasks = self.scheduler.reclaim_worker(worker_id).await;
            reclaimed.extend(tasks);
        }
        reclaimed
    }

    /// Re-evaluate every DAG currently tracked. Used by the Scheduler Loop.
    pub async fn reevaluate_all_dags(&self) {
        for dag_id in self.dags.all_ids().await {
            self.reevaluate_dag(&dag_id).await;
        }
    }
}
