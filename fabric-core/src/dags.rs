use crate::messages::{DagSubmission, ResultRecord, TaskDescriptor};
use crate::workers::now_secs;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DagValidationError {
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),
    #[error("task {task} depends on unknown sibling {dep}")]
    DanglingDependency { task: String, dep: String },
    #[error("dependency cycle detected involving task {0}")]
    Cycle(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DagStatus {
    Pending,
    Running,
    Completed,
}

/// A submitted workflow and its per-task results.
#[derive(Clone, Debug)]
pub struct Dag {
    pub dag_id: String,
    pub name: String,
    pub tasks: Vec<TaskDescriptor>,
    pub task_results: HashMap<String, ResultRecord>,
    pub task_dependencies: HashMap<String, HashSet<String>>,
    pub status: DagStatus,
    pub created_at: f64,
    pub started_at: Option<f64>,
    pub completed_at: Option<f64>,
}

impl Dag {
    pub fn new(dag_id: String, submission: DagSubmission) -> Self {
        let mut tasks = submission.tasks;
        for t in &mut tasks {
            t.dag_id = Some(dag_id.clone());
        }
        let task_dependencies = tasks
            .iter()
            .map(|t| (t.id.clone(), t.depends_on.clone()))
            .collect();
        Self {
            dag_id,
            name: submission.name,
            tasks,
            task_results: HashMap::new(),
            task_dependencies,
            status: DagStatus::Pending,
            created_at: now_secs(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Validate: no duplicate ids, every `depends_on` resolves to a sibling,
    /// and the dependency graph is acyclic. Performed once at submission
    /// time so a malformed DAG is rejected before any task is scheduled.
    pub fn validate(&self) -> Result<(), DagValidationError> {
        let mut seen = HashSet::new();
        for t in &self.tasks {
            if !seen.insert(t.id.clone()) {
                return Err(DagValidationError::DuplicateTaskId(t.id.clone()));
            }
        }
        for t in &self.tasks {
            for dep in &t.depends_on {
                if !seen.contains(dep) {
                    return Err(DagValidationError::DanglingDependency {
                        task: t.id.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }
        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), DagValidationError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(
            id: &'a str,
            deps: &'a HashMap<String, HashSet<String>>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), DagValidationError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(DagValidationError::Cycle(id.to_string())),
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(ds) = deps.get(id) {
                for dep in ds {
                    visit(dep, deps, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        for t in &self.tasks {
            visit(&t.id, &self.task_dependencies, &mut marks)?;
        }
        Ok(())
    }

    /// Tasks not yet in `task_results` whose every predecessor IS in
    /// `task_results` — eligibility checks presence of a result, not its
    /// `success` flag, so a failed predecessor still unblocks successors.
    pub fn ready_tasks(&self) -> Vec<TaskDescriptor> {
        self.tasks
            .iter()
            .filter(|t| !self.task_results.contains_key(&t.id))
            .filter(|t| {
                self.task_dependencies
                    .get(&t.id)
                    .map(|deps| deps.iter().all(|d| self.task_results.contains_key(d)))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Ingest a terminal result. Transitions `pending -> running` on first
    /// ingest and `running -> completed` once every task has a result.
    pub fn record_result(&mut self, task_id: &str, result: ResultRecord) {
        self.task_results.insert(task_id.to_string(), result);
        if self.task_results.len() == self.tasks.len() {
            self.status = DagStatus::Completed;
            self.completed_at = Some(now_secs());
        } else if matches!(self.status, DagStatus::Pending) {
            self.status = DagStatus::Running;
            if self.started_at.is_none() {
                self.started_at = Some(now_secs());
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut task_status = serde_json::Map::new();
        for t in &self.tasks {
            let entry = match self.task_results.get(&t.id) {
                Some(r) => serde_json::json!({
                    "status": if r.success { "completed" } else { "failed" },
                    "result": r,
                }),
                None => serde_json::json!({ "status": "pending" }),
            };
            task_status.insert(t.id.clone(), entry);
        }
        serde_json::json!({
            "dag_id": self.dag_id,
            "name": self.name,
            "status": match self.status {
                DagStatus::Pending => "pending",
                DagStatus::Running => "running",
                DagStatus::Completed => "completed",
            },
            "total_tasks": self.tasks.len(),
            "completed_tasks": self.task_results.len(),
            "tasks": task_status,
            "created_at": self.created_at,
            "started_at": self.started_at,
            "completed_at": self.completed_at,
        })
    }
}

/// The DAGs table.
#[derive(Default)]
pub struct DagTable {
    inner: Mutex<HashMap<String, Dag>>,
}

impl DagTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a new DAG. Returns the assigned id, or the
    /// validation error without mutating the table.
    pub async fn insert(
        &self,
        dag_id: String,
        submission: DagSubmission,
    ) -> Result<String, DagValidationError> {
        let dag = Dag::new(dag_id.clone(), submission);
        dag.validate()?;
        self.inner.lock().await.insert(dag_id.clone(), dag);
        Ok(dag_id)
    }

    pub async fn ready_tasks(&self, dag_id: &str) -> Vec<TaskDescriptor> {
        let map = self.inner.lock().await;
        map.get(dag_id).map(Dag::ready_tasks).unwrap_or_default()
    }

    pub async fn all_ids(&self) -> Vec<String> {
        self.inner.lock().await.keys().cloned().collect()
    }

    pub async fn record_result(&self, dag_id: &str, task_id: &str, result: ResultRecord) -> bool {
        let mut map = self.inner.lock().await;
        match map.get_mut(dag_id) {
            Some(dag) => {
                dag.record_result(task_id, result);
                true
            }
            None => false,
        }
    }

    pub async fn snapshot_one(&self, dag_id: &str) -> Option<serde_json::Value> {
        self.inner.lock().await.get(dag_id).map(Dag::to_json)
    }

    /// Acquire the table's lock directly. Used by `State::get_status` so the
    /// Workers and DAGs guards are held together across both snapshots,
    /// honoring the Workers → DAGs order without releasing Workers first.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, HashMap<String, Dag>> {
        self.inner.lock().await
    }

    pub async fn contains(&self, dag_id: &str) -> bool {
        self.inner.lock().await.contains_key(dag_id)
    }
}
