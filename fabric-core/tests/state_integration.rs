use fabric_core::messages::{DagSubmission, ResultRecord, TaskDescriptor};
use fabric_core::state::State;

fn task(id: &str, module: &str, deps: &[&str]) -> TaskDescriptor {
    TaskDescriptor {
        id: id.to_string(),
        module: module.to_string(),
        inputs: vec![],
        depends_on: deps.iter().map(|s| s.to_string()).collect(),
        dag_id: None,
    }
}

fn ok_result(dag_id: &str) -> ResultRecord {
    ResultRecord {
        success: true,
        output: "done".to_string(),
        error: String::new(),
        duration: 0.01,
        dag_id: dag_id.to_string(),
    }
}

fn fail_result(dag_id: &str) -> ResultRecord {
    ResultRecord {
        success: false,
        output: String::new(),
        error: "boom".to_string(),
        duration: 0.01,
        dag_id: dag_id.to_string(),
    }
}

/// A worker registers, polls with nothing queued, and gets `None`.
#[tokio::test]
async fn register_and_empty_poll() {
    let state = State::new();
    state.register_node("w1".into(), None, 128).await;
    assert!(state.heartbeat("w1").await);
    assert!(!state.heartbeat("unknown").await);
    assert!(state.get_task("w1").await.is_none());
}

/// A single-task DAG becomes ready on submission and is handed to the first
/// worker that asks; a second poll sees nothing left.
#[tokio::test]
async fn linear_dag_single_task_ready_on_submit() {
    let state = State::new();
    state.register_node("w1".into(), None, 128).await;

    let submission = DagSubmission {
        name: "one-task".into(),
        tasks: vec![task("a", "m", &[])],
    };
    let dag_id = state.submit_dag(submission).await.unwrap();

    let got = state.get_task("w1").await.unwrap();
    assert_eq!(got.id, "a");
    assert_eq!(got.dag_id.as_deref(), Some(dag_id.as_str()));
    assert!(state.get_task("w1").await.is_none());
}

/// A successor only becomes ready once every predecessor has a result, and
/// completion (not success) of the predecessor is what unblocks it.
#[tokio::test]
async fn successor_unblocked_by_completion_not_success() {
    let state = State::new();
    state.register_node("w1".into(), None, 128).await;

    let submission = DagSubmission {
        name: "chain".into(),
        tasks: vec![task("a", "m", &[]), task("b", "m", &["a"])],
    };
    let dag_id = state.submit_dag(submission).await.unwrap();

    let first = state.get_task("w1").await.unwrap();
    assert_eq!(first.id, "a");
    assert!(state.get_task("w1").await.is_none(), "b not ready until a completes");

    state.task_result("w1", "a", fail_result(&dag_id)).await;

    let second = state.get_task("w1").await.unwrap();
    assert_eq!(second.id, "b", "a failed predecessor still unblocks b");
}

/// A DAG transitions pending -> running -> completed as results arrive, and
/// the terminal snapshot records every task.
#[tokio::test]
async fn dag_reaches_completed_status() {
    let state = State::new();
    state.register_node("w1".into(), None, 128).await;

    let submission = DagSubmission {
        name: "pair".into(),
        tasks: vec![task("a", "m", &[]), task("b", "m", &[])],
    };
    let dag_id = state.submit_dag(submission).await.unwrap();

    let t1 = state.get_task("w1").await.unwrap();
    state.task_result("w1", &t1.id, ok_result(&dag_id)).await;
    let snapshot = state.get_dag_status(&dag_id).await.unwrap();
    assert_eq!(snapshot["status"], "running");

    let t2 = state.get_task("w1").await.unwrap();
    state.task_result("w1", &t2.id, ok_result(&dag_id)).await;

    let snapshot = state.get_dag_status(&dag_id).await.unwrap();
    assert_eq!(snapshot["status"], "completed");
    assert_eq!(snapshot["completed_tasks"], 2);
    assert_eq!(snapshot["total_tasks"], 2);
}

/// A failed task is re-queued and handed out again rather than abandoned.
#[tokio::test]
async fn failed_task_is_retried() {
    let state = State::new();
    state.register_node("w1".into(), None, 128).await;

    let submission = DagSubmission {
        name: "retry".into(),
        tasks: vec![task("a", "m", &[])],
    };
    let dag_id = state.submit_dag(submission).await.unwrap();

    let first = state.get_task("w1").await.unwrap();
    state.task_result("w1", &first.id, fail_result(&dag_id)).await;

    let second = state.get_task("w1").await.unwrap();
    assert_eq!(second.id, "a");
}

/// Submitting a DAG with a dependency cycle is rejected before anything is
/// scheduled, and the table is left untouched.
#[tokio::test]
async fn cyclic_dag_rejected_at_submission() {
    let state = State::new();
    let submission = DagSubmission {
        name: "cycle".into(),
        tasks: vec![task("a", "m", &["b"]), task("b", "m", &["a"])],
    };
    let err = state.submit_dag(submission).await.unwrap_err();
    assert!(matches!(
        err,
        fabric_core::dags::DagValidationError::Cycle(_)
    ));
}

/// A worker that stops heartbeating is reaped and its in-flight task is
/// handed to whoever asks next.
#[tokio::test]
async fn dead_worker_task_is_reclaimed() {
    let state = State::new();
    state.register_node("w1".into(), None, 128).await;
    state.register_node("w2".into(), None, 128).await;

    let submission = DagSubmission {
        name: "solo".into(),
        tasks: vec![task("a", "m", &[])],
    };
    state.submit_dag(submission).await.unwrap();

    let assigned = state.get_task("w1").await.unwrap();
    assert_eq!(assigned.id, "a");
    assert!(state.get_task("w2").await.is_none(), "already in flight on w1");

    // A zero-second timeout reaps any worker whose last heartbeat is not
    // strictly in the future, which is every worker registered above.
    let reclaimed = state.reap(0).await;
    assert!(reclaimed.contains(&"a".to_string()));
    assert!(!state.worker_exists("w1").await);

    state.reevaluate_all_dags().await;
    let reassigned = state.get_task("w2").await.unwrap();
    assert_eq!(reassigned.id, "a");
}

/// `get_status` reports a consistent worker table and DAG table snapshot at
/// a single point in time, independent of each other's internal locks.
#[tokio::test]
async fn status_snapshot_reports_both_tables() {
    let state = State::new();
    state.register_node("w1".into(), None, 256).await;
    let submission = DagSubmission {
        name: "status-check".into(),
        tasks: vec![task("a", "m", &[])],
    };
    let dag_id = state.submit_dag(submission).await.unwrap();

    let (nodes, dags, _timestamp) = state.get_status().await;
    assert!(nodes.get("w1").is_some());
    assert!(dags.get(&dag_id).is_some());
}

/// Registering the same `node_id` twice replaces the prior entry rather
/// than being rejected.
#[tokio::test]
async fn duplicate_registration_replaces() {
    let state = State::new();
    state.register_node("w1".into(), None, 64).await;
    state.register_node("w1".into(), None, 512).await;
    let (nodes, _dags, _ts) = state.get_status().await;
    assert_eq!(nodes["w1"]["ram_limit"], 512);
}

/// Submitting a DAG with a dangling dependency is rejected and never
/// reaches the ready queue.
#[tokio::test]
async fn dangling_dependency_rejected() {
    let state = State::new();
    let submission = DagSubmission {
        name: "dangling".into(),
        tasks: vec![task("a", "m", &["ghost"])],
    };
    let err = state.submit_dag(submission).await.unwrap_err();
    assert!(matches!(
        err,
        fabric_core::dags::DagValidationError::DanglingDependency { .. }
    ));
}
