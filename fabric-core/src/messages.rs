//! Wire-level JSON types: a typed request union in place of an untyped
//! JSON bag, so an unrecognized or malformed envelope fails to deserialize
//! instead of silently matching the wrong handler.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An immutable task descriptor as carried in a DAG submission and handed to
/// a worker verbatim by `get_task`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub id: String,
    pub module: String,
    #[serde(default)]
    pub inputs: Vec<serde_json::Value>,
    #[serde(default)]
    pub depends_on: HashSet<String>,
    /// Stamped by the Scheduler on submission; absent on the wire for a
    /// task still inside a `submit_dag` request.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dag_id: Option<String>,
}

/// Result record as reported verbatim by a worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultRecord {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub duration: f64,
    pub dag_id: String,
}

/// Body of a `submit_dag` request: a DAG's name plus its tasks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DagSubmission {
    pub name: String,
    pub tasks: Vec<TaskDescriptor>,
}

/// Inbound requests, dispatched on the `type` tag.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "register_node")]
    RegisterNode { node_id: String, ram_limit: u64 },
    #[serde(rename = "heartbeat")]
    Heartbeat { node_id: String },
    #[serde(rename = "get_task")]
    GetTask { node_id: String },
    #[serde(rename = "task_result")]
    TaskResult {
        node_id: String,
        task_id: String,
        result: ResultRecord,
    },
    #[serde(rename = "submit_dag")]
    SubmitDag { dag: DagSubmission },
    #[serde(rename = "get_status")]
    GetStatus,
    #[serde(rename = "get_dag_status")]
    GetDagStatus { dag_id: String },
}

/// Outbound responses. Every variant serializes with `"status"` set to
/// `"success"` or `"error"` as the Connection Handler contract requires.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success(SuccessBody),
    Error { status: &'static str, message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            status: "error",
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Response::Success(SuccessBody::Plain { status: "success" })
    }
}

/// The payload shapes a successful response can carry. Each variant embeds
/// its own `status` field so the wire object always has a top-level
/// `"status": "success"` regardless of which shape it carries.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessBody {
    Plain {
        status: &'static str,
    },
    Task {
        status: &'static str,
        task: Option<TaskDescriptor>,
    },
    DagId {
        status: &'static str,
        dag_id: String,
    },
    Status {
        status: &'static str,
        nodes: serde_json::Value,
        dags: serde_json::Value,
        timestamp: f64,
    },
    Dag {
        status: &'static str,
        dag: serde_json::Value,
    },
}
