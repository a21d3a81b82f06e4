//! Subcommand implementations.
//!
//! Every command writes its report to the given writer so it can be tested
//! without touching the process's stdout.

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use weaver_core::{
    ActiveNodeQueue, ExecutionCoordinator, GraphValidator, Node, NodeId, WorkflowDefinition, WorkflowGraph,
};
use weaver_runtime::{execute_workflow_async, ConcurrentExecutor, ExecutorConfig, HandlerRegistry};

/// Options of the `simulate` command.
#[derive(Clone, Debug, Default)]
pub struct SimulateOptions {
    pub log_dir: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub max_concurrency: Option<usize>,
}

async fn load(path: &Path) -> Result<(WorkflowDefinition, WorkflowGraph)> {
    let definition = WorkflowDefinition::from_file(path)
        .await
        .with_context(|| format!("failed to load workflow definition {}", path.display()))?;
    let graph = definition
        .to_graph()
        .with_context(|| format!("invalid node configuration in {}", path.display()))?;
    Ok((definition, graph))
}

fn label(graph: &WorkflowGraph, id: &NodeId) -> String {
    graph
        .node(id)
        .map(Node::label)
        .unwrap_or_else(|| id.to_string())
}

/// Validates a definition and prints every finding.
///
/// Fails if the workflow has validation errors.
pub async fn validate<W: Write>(path: &Path, out: &mut W) -> Result<()> {
    let (definition, graph) = load(path).await?;
    let report = GraphValidator::new().validate(graph.nodes(), graph.edges());

    for warning in report.warnings() {
        writeln!(out, "warning: {}", warning)?;
    }

    if !report.is_valid() {
        for error in report.errors() {
            writeln!(out, "error: {}", error)?;
        }
        bail!(
            "workflow '{}' is invalid: {} error(s)",
            definition.name,
            report.issues().len()
        );
    }

    writeln!(
        out,
        "workflow '{}' is valid: {} node(s), {} edge(s)",
        definition.name,
        graph.nodes().len(),
        graph.edges().len()
    )?;
    Ok(())
}

/// Prints the batch plan of a valid definition.
pub async fn plan<W: Write>(path: &Path, as_json: bool, out: &mut W) -> Result<()> {
    let (definition, graph) = load(path).await?;

    let report = GraphValidator::new().validate(graph.nodes(), graph.edges());
    if !report.is_valid() {
        bail!(
            "workflow '{}' is invalid: {}",
            definition.name,
            report.errors().join("; ")
        );
    }

    let batches = ActiveNodeQueue::plan_batches(graph.nodes(), graph.edges())?;

    if as_json {
        let rendered: Vec<Vec<serde_json::Value>> = batches
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .map(|id| {
                        let node = graph.node(id);
                        json!({
                            "id": id,
                            "name": node.and_then(|node| node.name.clone()),
                            "type": node.map(|node| node.tag()),
                        })
                    })
                    .collect()
            })
            .collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&rendered)?)?;
        return Ok(());
    }

    writeln!(out, "workflow '{}': {} batch(es)", definition.name, batches.len())?;
    for (index, batch) in batches.iter().enumerate() {
        let labels: Vec<String> = batch.iter().map(|id| label(&graph, id)).collect();
        writeln!(out, "  {}. {}", index + 1, labels.join(", "))?;
    }
    Ok(())
}

/// Runs a definition with echo handlers and prints the final state as JSON.
///
/// The run log is written to `log_dir` whether the run succeeds or not.
pub async fn simulate<W: Write>(path: &Path, options: &SimulateOptions, out: &mut W) -> Result<()> {
    let (definition, graph) = load(path).await?;

    let mut config = ExecutorConfig::from(&definition.settings);
    if let Some(timeout_ms) = options.timeout_ms {
        config.batch_timeout = Some(Duration::from_millis(timeout_ms));
    }
    if let Some(limit) = options.max_concurrency {
        config.max_concurrency = Some(limit);
    }

    tracing::info!(
        workflow = %definition.name,
        nodes = graph.nodes().len(),
        timeout = ?config.batch_timeout,
        max_concurrency = ?config.max_concurrency,
        "simulating workflow"
    );

    let mut executor = ConcurrentExecutor::new(HandlerRegistry::echo()).with_config(config);
    let mut coordinator = ExecutionCoordinator::new();
    let result = execute_workflow_async(&mut coordinator, graph.nodes(), graph.edges(), &mut executor).await;

    if let (Some(dir), Some(log)) = (&options.log_dir, coordinator.last_run_log()) {
        let written = log
            .persist(dir)
            .await
            .with_context(|| format!("failed to write run log to {}", dir.display()))?;
        tracing::info!(path = %written.display(), events = log.len(), "run log written");
    }

    let state = result.with_context(|| format!("workflow '{}' failed", definition.name))?;
    writeln!(out, "{}", serde_json::to_string_pretty(&state)?)?;
    Ok(())
}
