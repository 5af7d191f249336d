use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fabric_core::workflow_file::parse_workflow_yaml;
use tracing_subscriber::EnvFilter;

mod client;
use client::Client;

/// Thin demo client for the task-execution fabric: submit workflows, poll
/// status, or run as a worker node that executes tasks as subprocesses.
#[derive(Parser, Debug)]
#[command(name = "fabric-cli")]
struct Cli {
    /// Controller host.
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,

    /// Controller port.
    #[arg(long, global = true, default_value_t = 5000)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a workflow YAML file as a DAG.
    Submit {
        /// Path to a workflow YAML file.
        workflow: PathBuf,
    },
    /// Print the Controller's current worker and DAG status snapshot.
    Status,
    /// Run as a worker node: register, heartbeat, execute tasks as
    /// subprocesses found under `--module-dir`.
    Worker {
        #[arg(long = "node-id")]
        node_id: String,
        #[arg(long = "module-dir")]
        module_dir: PathBuf,
        #[arg(long, default_value_t = 128)]
        ram_limit: u64,
        #[arg(long = "heartbeat-interval-secs", default_value_t = 30)]
        heartbeat_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Submit { workflow } => submit(&cli.host, cli.port, &workflow).await,
        Command::Status => status(&cli.host, cli.port).await,
        Command::Worker {
            node_id,
            module_dir,
            ram_limit,
            heartbeat_interval_secs,
        } => {
            worker(
                &cli.host,
                cli.port,
                node_id,
                module_dir,
                ram_limit,
                heartbeat_interval_secs,
            )
            .await
        }
    }
}

async fn submit(host: &str, port: u16, workflow_path: &PathBuf) -> anyhow::Result<()> {
    let yaml = std::fs::read_to_string(workflow_path)?;
    let dag = parse_workflow_yaml(&yaml)?;

    let mut client = Client::connect(host, port).await?;
    let req = serde_json::json!({ "type": "submit_dag", "dag": dag });
    let resp = client.call(&req).await?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

async fn status(host: &str, port: u16) -> anyhow::Result<()> {
    let mut client = Client::connect(host, port).await?;
    let req = serde_json::json!({ "type": "get_status" });
    let resp = client.call(&req).await?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

async fn worker(
    host: &str,
    port: u16,
    node_id: String,
    module_dir: PathBuf,
    ram_limit: u64,
    heartbeat_interval_secs: u64,
) -> anyhow::Result<()> {
    let mut client = Client::connect(host, port).await?;
    let register = serde_json::json!({
        "type": "register_node",
        "node_id": node_id,
        "ram_limit": ram_limit,
    });
    client.call(&register).await?;
    tracing::info!(node_id = %node_id, "registered with controller");

    let heartbeat_host = host.to_string();
    let heartbeat_node_id = node_id.clone();
    tokio::spawn(async move {
        let mut client = match Client::connect(&heartbeat_host, port).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "heartbeat connection failed");
                return;
            }
        };
        loop {
            tokio::time::sleep(Duration::from_secs(heartbeat_interval_secs)).await;
            let req = serde_json::json!({ "type": "heartbeat", "node_id": heartbeat_node_id });
            if let Err(e) = client.call(&req).await {
                tracing::warn!(error = %e, "heartbeat failed");
            }
        }
    });

    tracing::info!("ready to execute tasks");
    loop {
        let req = serde_json::json!({ "type": "get_task", "node_id": node_id });
        let resp = client.call(&req).await?;
        let task = resp.get("task").cloned().unwrap_or(serde_json::Value::Null);

        if task.is_null() {
            tokio::time::sleep(Duration::from_secs(2)).await;
            continue;
        }

        let task_id = task
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let module = task
            .get("module")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let dag_id = task
            .get("dag_id")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let inputs: Vec<String> = task
            .get("inputs")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().map(value_to_arg).collect())
            .unwrap_or_default();

        tracing::info!(task_id = %task_id, module = %module, "executing task");
        let result = execute_module(&module_dir, &module, &inputs);

        let submit = serde_json::json!({
            "type": "task_result",
            "node_id": node_id,
            "task_id": task_id,
            "result": {
                "success": result.success,
                "output": result.output,
                "error": result.error,
                "duration": result.duration,
                "dag_id": dag_id,
            },
        });
        client.call(&submit).await?;
    }
}

fn value_to_arg(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct ExecutionResult {
    success: bool,
    output: String,
    error: String,
    duration: f64,
}

/// Execute a module as a subprocess found under `module_dir`, passing its
/// inputs as command-line arguments. Stdout becomes `output`; a non-zero
/// exit (or a missing module) becomes a failed result with `error` set.
fn execute_module(module_dir: &PathBuf, module: &str, inputs: &[String]) -> ExecutionResult {
    let module_path = module_dir.join(module);
    let start = std::time::Instant::now();

    if !module_path.exists() {
        return ExecutionResult {
            success: false,
            output: String::new(),
            error: format!("module not found: {}", module_path.display()),
            duration: start.elapsed().as_secs_f64(),
        };
    }

    let output = std::process::Command::new(&module_path)
        .args(inputs)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let duration = start.elapsed().as_secs_f64();
    match output {
        Ok(out) if out.status.success() => ExecutionResult {
            success: true,
            output: String::from_utf8_lossy(&out.stdout).into_owned(),
            error: String::new(),
            duration,
        },
        Ok(out) => ExecutionResult {
            success: false,
            output: String::from_utf8_lossy(&out.stdout).into_owned(),
            error: String::from_utf8_lossy(&out.stderr).into_owned(),
            duration,
        },
        Err(e) => ExecutionResult {
            success: false,
            output: String::new(),
            error: e.to_string(),
            duration,
        },
    }
}
