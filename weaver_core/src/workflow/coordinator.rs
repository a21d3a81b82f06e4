//! Execution coordinator.
//!
//! The coordinator validates a graph, seeds the [`ActiveNodeQueue`] and then
//! loops: take the ready batch, hand it to the [`NodeExecutor`], apply each
//! output to the [`WorkflowState`] and release dependents. It never runs node
//! logic itself and never spawns anything, so for a deterministic executor
//! the whole run is deterministic.
//!
//! The loop body lives in [`WorkflowRun`], a stepper that the synchronous
//! [`ExecutionCoordinator::execute_workflow`] and any async driver share.

use crate::audit::{RunEvent, RunLog};
use crate::error::{BoxError, WorkflowError};
use crate::workflow::graph::{join_ids, Edge, Node, NodeId};
use crate::workflow::scheduler::ActiveNodeQueue;
use crate::workflow::sort::TopologicalSorter;
use crate::workflow::state::{StateEvent, StateTransition, WorkflowState};
use crate::workflow::validate::GraphValidator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// Output of one executed node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub node_id: NodeId,
    pub output: Value,
}

impl NodeOutput {
    pub fn new(node_id: NodeId, output: impl Into<Value>) -> Self {
        Self {
            node_id,
            output: output.into(),
        }
    }
}

impl From<(NodeId, Value)> for NodeOutput {
    fn from((node_id, output): (NodeId, Value)) -> Self {
        Self { node_id, output }
    }
}

/// Executes batches of mutually independent nodes.
///
/// Implementations may run the nodes of a batch in parallel, but must return
/// exactly one output per input node (in any order) once the whole batch is
/// done. Any error fails the batch and the workflow.
///
/// Closures `FnMut(&[Node]) -> Result<Vec<NodeOutput>, BoxError>` implement
/// this trait directly.
pub trait NodeExecutor {
    fn execute_batch(&mut self, batch: &[Node]) -> Result<Vec<NodeOutput>, BoxError>;
}

impl<F> NodeExecutor for F
where
    F: FnMut(&[Node]) -> Result<Vec<NodeOutput>, BoxError>,
{
    fn execute_batch(&mut self, batch: &[Node]) -> Result<Vec<NodeOutput>, BoxError> {
        self(batch)
    }
}

/// Drives workflow graphs to completion.
///
/// Holds one [`ActiveNodeQueue`]; each run borrows the coordinator mutably,
/// so a queue is never shared between concurrent runs.
#[derive(Debug, Default)]
pub struct ExecutionCoordinator {
    validator: GraphValidator,
    sorter: TopologicalSorter,
    queue: ActiveNodeQueue,
    last_run_log: Option<RunLog>,
}

impl ExecutionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the workflow to completion with the given executor.
    ///
    /// An empty node set completes without calling the executor.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Validation`] if the graph is structurally invalid;
    ///   the executor is never called
    /// - [`WorkflowError::Execution`] if the executor fails a batch
    /// - [`WorkflowError::ExecutorContract`] if the executor's outputs do not
    ///   match its batch
    /// - [`WorkflowError::Deadlock`] / [`WorkflowError::CompletionMismatch`]
    ///   on internal invariant failures
    pub fn execute_workflow<E>(
        &mut self,
        nodes: &[Node],
        edges: &[Edge],
        executor: &mut E,
    ) -> Result<WorkflowState, WorkflowError>
    where
        E: NodeExecutor + ?Sized,
    {
        let mut run = self.start_run(nodes, edges)?;

        while let Some(batch) = run.next_batch()? {
            let outcome = executor.execute_batch(&batch);
            run.complete_batch(outcome)?;
        }

        run.conclude()
    }

    /// Validates the graph and prepares a run.
    ///
    /// The returned [`WorkflowRun`] borrows this coordinator until it is
    /// dropped. Its run log becomes available from
    /// [`last_run_log`](Self::last_run_log) afterwards.
    pub fn start_run(&mut self, nodes: &[Node], edges: &[Edge]) -> Result<WorkflowRun<'_>, WorkflowError> {
        let mut log = RunLog::new();
        log.record(RunEvent::run_started(nodes.len(), edges.len()));

        tracing::info!(
            run_id = %log.run_id(),
            nodes = nodes.len(),
            edges = edges.len(),
            "workflow run started"
        );

        let report = self.validator.validate(nodes, edges);
        for warning in report.warnings() {
            tracing::warn!(run_id = %log.run_id(), "{}", warning);
        }

        let errors = if !report.is_valid() {
            report.errors()
        } else if let Err(err) = self.sorter.sort(nodes, edges) {
            vec![err.to_string()]
        } else {
            Vec::new()
        };

        if !errors.is_empty() {
            tracing::warn!(
                run_id = %log.run_id(),
                errors = errors.len(),
                "workflow rejected by validation"
            );
            log.record(RunEvent::validation_failed(errors.clone()));
            self.last_run_log = Some(log);
            return Err(WorkflowError::Validation { errors });
        }

        if let Err(err) = self.queue.initialize(nodes, edges) {
            tracing::error!(run_id = %log.run_id(), error = %err, "scheduler initialization failed");
            log.record(RunEvent::run_failed(err.to_string()));
            self.last_run_log = Some(log);
            return Err(err.into());
        }

        Ok(WorkflowRun::new(
            &mut self.queue,
            &mut self.last_run_log,
            log,
            nodes.len(),
        ))
    }

    /// Run log of the most recently finished run, if any.
    pub fn last_run_log(&self) -> Option<&RunLog> {
        self.last_run_log.as_ref()
    }
}

/// One in-progress workflow run.
///
/// Call [`next_batch`](Self::next_batch) until it returns `None`, passing
/// each batch's executor outcome to [`complete_batch`](Self::complete_batch),
/// then [`conclude`](Self::conclude). Only one batch can be outstanding at a
/// time. Any error other than [`WorkflowError::StepOutOfOrder`] ends the run;
/// the state it carries has already been moved to Failed.
///
/// The run log is published to the coordinator when the run is dropped,
/// however it ended. A run dropped before reaching a terminal phase is
/// logged as abandoned.
#[derive(Debug)]
pub struct WorkflowRun<'a> {
    queue: &'a mut ActiveNodeQueue,
    log_slot: &'a mut Option<RunLog>,
    log: RunLog,
    state: WorkflowState,
    expected: usize,
    batches: usize,
    outstanding: Option<Vec<NodeId>>,
}

impl<'a> WorkflowRun<'a> {
    fn new(
        queue: &'a mut ActiveNodeQueue,
        log_slot: &'a mut Option<RunLog>,
        log: RunLog,
        expected: usize,
    ) -> Self {
        Self {
            queue,
            log_slot,
            log,
            state: WorkflowState::new(),
            expected,
            batches: 0,
            outstanding: None,
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.log.run_id()
    }

    /// Number of batches dispatched so far.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Node ids of the batch handed out and not yet completed.
    pub fn outstanding(&self) -> Option<&[NodeId]> {
        self.outstanding.as_deref()
    }

    /// Takes the next ready batch, or `None` when no work remains.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::StepOutOfOrder`] if the previous batch has not been
    ///   completed; the run is left untouched
    /// - [`WorkflowError::Deadlock`] if work remains but nothing is ready
    pub fn next_batch(&mut self) -> Result<Option<Vec<Node>>, WorkflowError> {
        if let Some(pending) = &self.outstanding {
            return Err(WorkflowError::StepOutOfOrder {
                reason: format!(
                    "batch {} is still outstanding: {}",
                    self.batches,
                    join_ids(pending)
                ),
            });
        }

        if self.state.is_terminal() || !self.queue.has_more_work() {
            return Ok(None);
        }

        let batch = self.queue.get_ready_nodes();
        if batch.is_empty() {
            let remaining: Vec<NodeId> = self
                .queue
                .get_remaining_nodes()
                .iter()
                .map(|node| node.id)
                .collect();
            let reason = format!("deadlock: no ready nodes, {} remaining", remaining.len());
            let state = self.fail(&reason)?;
            tracing::error!(
                run_id = %self.run_id(),
                remaining = %join_ids(&remaining),
                "workflow deadlocked"
            );
            return Err(WorkflowError::Deadlock {
                remaining,
                state: Box::new(state),
            });
        }

        let ids: Vec<NodeId> = batch.iter().map(|node| node.id).collect();
        self.state = self.apply(StateEvent::nodes_ready(ids.iter().copied()))?;
        self.batches += 1;
        self.log
            .record(RunEvent::batch_dispatched(self.batches, ids.clone()));
        self.outstanding = Some(ids);

        tracing::debug!(
            run_id = %self.run_id(),
            batch = self.batches,
            size = batch.len(),
            "dispatching batch"
        );

        Ok(Some(batch))
    }

    /// Applies the executor outcome for a batch returned by
    /// [`next_batch`](Self::next_batch).
    ///
    /// Outputs are checked against the dispatched batch before any of them
    /// is applied, then applied in returned order: each output is recorded in
    /// the state first and its dependents are released in the scheduler
    /// second.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::StepOutOfOrder`] if no batch is outstanding.
    pub fn complete_batch(&mut self, outcome: Result<Vec<NodeOutput>, BoxError>) -> Result<(), WorkflowError> {
        let batch = self.outstanding.take().ok_or_else(|| WorkflowError::StepOutOfOrder {
            reason: "no batch is outstanding".to_string(),
        })?;

        let outputs = match outcome {
            Ok(outputs) => outputs,
            Err(source) => {
                tracing::error!(
                    run_id = %self.run_id(),
                    batch = self.batches,
                    error = %source,
                    "node executor failed"
                );
                let state = self.fail(&source.to_string())?;
                return Err(WorkflowError::Execution {
                    state: Box::new(state),
                    source,
                });
            }
        };

        if let Some(reason) = contract_violation(&batch, &outputs) {
            tracing::error!(run_id = %self.run_id(), %reason, "executor contract violated");
            let state = self.fail(&reason)?;
            return Err(WorkflowError::ExecutorContract {
                reason,
                state: Box::new(state),
            });
        }

        for NodeOutput { node_id, output } in outputs {
            self.state = self.apply(StateEvent::node_completed(node_id, output))?;
            self.log.record(RunEvent::node_recorded(node_id));

            let released = match self.queue.mark_node_completed(node_id) {
                Ok(released) => released,
                Err(err) => return Err(self.abort(err.into())),
            };
            self.log
                .record(RunEvent::dependencies_released(node_id, released));
        }

        Ok(())
    }

    /// Finishes the run and returns the final Completed state.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::CompletionMismatch`] if not every node completed.
    pub fn conclude(mut self) -> Result<WorkflowState, WorkflowError> {
        let completed = self.state.completed_nodes().len();
        if completed != self.expected {
            let reason = format!(
                "completion mismatch: {} of {} node(s) completed",
                completed, self.expected
            );
            tracing::error!(run_id = %self.run_id(), completed, expected = self.expected, "{}", reason);
            let state = self.fail(&reason)?;
            return Err(WorkflowError::CompletionMismatch {
                completed,
                expected: self.expected,
                state: Box::new(state),
            });
        }

        self.state = self.apply(StateEvent::AllNodesCompleted)?;
        self.log
            .record(RunEvent::run_completed(completed, self.batches));

        tracing::info!(
            run_id = %self.run_id(),
            completed,
            batches = self.batches,
            "workflow run completed"
        );

        Ok(self.state.clone())
    }

    fn apply(&mut self, event: StateEvent) -> Result<WorkflowState, WorkflowError> {
        StateTransition::apply(&self.state, event).map_err(|err| self.abort(err.into()))
    }

    /// Moves the state to Failed and returns a copy of it.
    fn fail(&mut self, reason: &str) -> Result<WorkflowState, WorkflowError> {
        self.state = self.apply(StateEvent::workflow_failed(reason))?;
        self.log.record(RunEvent::run_failed(reason));
        Ok(self.state.clone())
    }

    /// Records an internal error that leaves the state untouched.
    fn abort(&mut self, err: WorkflowError) -> WorkflowError {
        tracing::error!(run_id = %self.run_id(), error = %err, "workflow run aborted");
        self.log.record(RunEvent::run_failed(err.to_string()));
        err
    }
}

impl Drop for WorkflowRun<'_> {
    fn drop(&mut self) {
        let closed = matches!(self.log.events().last(), Some(RunEvent::RunFailed { .. }));
        if !self.state.is_terminal() && !closed {
            tracing::warn!(
                run_id = %self.log.run_id(),
                batches = self.batches,
                "workflow run abandoned"
            );
            self.log.record(RunEvent::run_failed("abandoned"));
        }
        *self.log_slot = Some(std::mem::take(&mut self.log));
    }
}

/// Describes the first way `outputs` fails to match `batch` one to one.
fn contract_violation(batch: &[NodeId], outputs: &[NodeOutput]) -> Option<String> {
    let expected: HashSet<NodeId> = batch.iter().copied().collect();
    let mut seen: HashSet<NodeId> = HashSet::with_capacity(outputs.len());

    for output in outputs {
        if !expected.contains(&output.node_id) {
            return Some(format!(
                "output for node {} which is not in the batch",
                output.node_id
            ));
        }
        if !seen.insert(output.node_id) {
            return Some(format!("duplicate output for node {}", output.node_id));
        }
    }

    let missing: Vec<NodeId> = batch
        .iter()
        .copied()
        .filter(|id| !seen.contains(id))
        .collect();
    if !missing.is_empty() {
        return Some(format!("no output for node(s): {}", join_ids(&missing)));
    }

    None
}
