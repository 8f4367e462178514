// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The executor binds scheduler, relay, workspaces, adapters, contract
//! validation, the event bus, and the state store to run one pipeline
//! to completion or failure, updating state at every transition.

use crate::bus::EventBus;
use crate::cancel::RunCancellation;
use crate::contract::{self, ContractOutcome};
use crate::error::EngineError;
use crate::preflight;
use crate::relay::{self, UpstreamArtifact, CHECKPOINT_ARTIFACT};
use crate::scheduler::DagScheduler;
use crate::supervisor;
use crate::workspace::{StepWorkspace, WorkspaceManager};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use wave_adapters::{AdapterError, AgentAdapter, InvocationOutcome, InvocationRequest};
use wave_config::{
    Dag, Manifest, MemoryStrategy, MountMode, OnFailure, PersonaDef, PipelineDef, PromptSource,
    StepDef, WavePaths, SUMMARIZER_PERSONA,
};
use wave_core::{
    ArtifactRecord, Clock, Event, EventKind, Run, RunId, RunStatus, StepId, StepState,
    SystemClock,
};
use wave_storage::StateStore;

/// Interval at which the drive loop re-checks the store for operator
/// cancellation requests.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Attempts at minting a collision-free run id.
const MINT_ATTEMPTS: usize = 3;

/// Caller-tunable execution knobs.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Per-step timeout override; the effective timeout is the smaller
    /// of this and the manifest default.
    pub step_timeout: Option<Duration>,
}

/// Runs pipelines against the configured adapters.
pub struct Executor<A: AgentAdapter, C: Clock = SystemClock> {
    manifest: Arc<Manifest>,
    paths: WavePaths,
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    workspaces: WorkspaceManager,
    /// Adapter instances by manifest adapter name.
    adapters: HashMap<String, A>,
    clock: C,
}

impl<A: AgentAdapter, C: Clock> Executor<A, C> {
    pub fn new(
        manifest: Manifest,
        paths: WavePaths,
        store: Arc<StateStore>,
        bus: Arc<EventBus>,
        adapters: HashMap<String, A>,
        clock: C,
    ) -> Self {
        let workspaces = WorkspaceManager::new(paths.workspace_root(&manifest.runtime));
        Self {
            manifest: Arc::new(manifest),
            paths,
            store,
            bus,
            workspaces,
            adapters,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Run a pipeline from scratch.
    pub async fn execute(
        &self,
        pipeline: &PipelineDef,
        input: &str,
        cancel: RunCancellation,
        opts: &ExecuteOptions,
    ) -> Result<Run, EngineError> {
        let personas_root = self.paths.personas();
        let dag = wave_config::validate(&self.manifest, pipeline, Some(personas_root.as_path()))?;

        let run_id = self.mint_run(pipeline, input)?;
        self.bus.emit(Event::run(
            run_id.clone(),
            EventKind::RunStarted {
                pipeline: pipeline.name.clone(),
                input: input.to_string(),
            },
        ));

        if let Err(e) = preflight::check(&self.manifest, pipeline, self.paths.project_root()) {
            let hints = match &e {
                EngineError::Preflight { recovery_hints, .. } => recovery_hints.clone(),
                _ => Vec::new(),
            };
            self.bus.emit(Event::run(
                run_id.clone(),
                EventKind::RunFailed {
                    error: e.to_string(),
                    recovery_hints: hints,
                },
            ));
            self.store.update_run_status(
                &run_id,
                RunStatus::Failed,
                None,
                0,
                Some(e.to_string()),
            )?;
            return Err(e);
        }

        self.store
            .update_run_status(&run_id, RunStatus::Running, None, 0, None)?;
        for step in &pipeline.steps {
            self.store.save_step_state(
                &run_id,
                &StepId::new(&step.id),
                StepState::Pending,
                None,
            )?;
        }

        let scheduler = DagScheduler::new(dag);
        let input = input.to_string();
        self.drive(run_id, input, pipeline, scheduler, 0, cancel, opts)
            .await
    }

    /// Continue a prior run, skipping steps already completed.
    pub async fn resume(
        &self,
        run_id: &RunId,
        pipeline: &PipelineDef,
        cancel: RunCancellation,
        opts: &ExecuteOptions,
    ) -> Result<Run, EngineError> {
        let (run, dag) = self.load_for_resume(run_id, pipeline)?;
        let completed = self.completed_indices(run_id, &dag)?;
        self.reopen(&run)?;

        let mut scheduler = DagScheduler::new(dag);
        scheduler.mark_already_completed(&completed);
        self.reset_pending_steps(run_id, pipeline, &completed)?;

        self.drive(
            run_id.clone(),
            run.input.clone(),
            pipeline,
            scheduler,
            run.total_tokens,
            cancel,
            opts,
        )
        .await
    }

    /// Resume from a caller-specified step. Without `force`, every
    /// dependency of `from_step` must already be completed.
    pub async fn resume_from(
        &self,
        run_id: &RunId,
        pipeline: &PipelineDef,
        from_step: &str,
        force: bool,
        cancel: RunCancellation,
        opts: &ExecuteOptions,
    ) -> Result<Run, EngineError> {
        if pipeline.get_step(from_step).is_none() {
            return Err(EngineError::Usage(format!(
                "step '{}' not found in pipeline '{}'",
                from_step, pipeline.name
            )));
        }
        let (run, dag) = self.load_for_resume(run_id, pipeline)?;
        let from_idx = dag
            .index_of(from_step)
            .ok_or_else(|| EngineError::Internal(format!("step '{}' missing from dag", from_step)))?;

        let mut completed = self.completed_indices(run_id, &dag)?;
        if !force {
            let missing: Vec<&str> = dag
                .deps(from_idx)
                .iter()
                .filter(|d| !completed.contains(d))
                .map(|&d| dag.id(d))
                .collect();
            if !missing.is_empty() {
                return Err(EngineError::Usage(format!(
                    "cannot resume from '{}': dependencies not completed: {} (use force to override)",
                    from_step,
                    missing.join(", ")
                )));
            }
        }

        // Re-execute the target and everything downstream of it.
        let rerun: Vec<usize> = std::iter::once(from_idx)
            .chain(dag.downstream(from_idx))
            .collect();
        completed.retain(|idx| !rerun.contains(idx));

        self.reopen(&run)?;
        let mut scheduler = DagScheduler::new(dag);
        scheduler.mark_already_completed(&completed);
        self.reset_pending_steps(run_id, pipeline, &completed)?;

        self.drive(
            run_id.clone(),
            run.input.clone(),
            pipeline,
            scheduler,
            run.total_tokens,
            cancel,
            opts,
        )
        .await
    }

    fn mint_run(&self, pipeline: &PipelineDef, input: &str) -> Result<RunId, EngineError> {
        for _ in 0..MINT_ATTEMPTS {
            let run_id = supervisor::mint_run_id(&pipeline.name, Utc::now());
            let run = Run::new(run_id.clone(), &pipeline.name, input);
            match self.store.create_run(run) {
                Ok(()) => return Ok(run_id),
                Err(wave_storage::StoreError::RunExists(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Internal(
            "could not mint a collision-free run id".into(),
        ))
    }

    fn load_for_resume(
        &self,
        run_id: &RunId,
        pipeline: &PipelineDef,
    ) -> Result<(Run, Dag), EngineError> {
        if !self.store.is_persistent() {
            return Err(EngineError::Usage(
                "resume requires a persistent state store".into(),
            ));
        }
        let Some(run) = self.store.get_run(run_id) else {
            return Err(EngineError::Usage(format!("run not found: {}", run_id)));
        };
        if run.status == RunStatus::Completed {
            return Err(EngineError::Usage(format!(
                "run {} already completed",
                run_id
            )));
        }
        if run.pipeline != pipeline.name {
            return Err(EngineError::Usage(format!(
                "run {} belongs to pipeline '{}', not '{}'",
                run_id, run.pipeline, pipeline.name
            )));
        }
        let personas_root = self.paths.personas();
        let dag = wave_config::validate(&self.manifest, pipeline, Some(personas_root.as_path()))?;
        Ok((run, dag))
    }

    fn completed_indices(&self, run_id: &RunId, dag: &Dag) -> Result<Vec<usize>, EngineError> {
        let mut completed = Vec::new();
        for record in self.store.get_step_states(run_id) {
            if record.state != StepState::Completed {
                continue;
            }
            let Some(idx) = dag.index_of(record.step_id.as_str()) else {
                return Err(EngineError::Usage(format!(
                    "stored step '{}' no longer exists in the pipeline definition",
                    record.step_id
                )));
            };
            completed.push(idx);
        }
        Ok(completed)
    }

    fn reopen(&self, run: &Run) -> Result<(), EngineError> {
        if run.status.is_terminal() {
            self.store.reopen_run(&run.id)?;
        } else {
            self.store.update_run_status(
                &run.id,
                RunStatus::Running,
                None,
                run.total_tokens,
                None,
            )?;
        }
        Ok(())
    }

    fn reset_pending_steps(
        &self,
        run_id: &RunId,
        pipeline: &PipelineDef,
        completed: &[usize],
    ) -> Result<(), EngineError> {
        for (idx, step) in pipeline.steps.iter().enumerate() {
            if !completed.contains(&idx) {
                self.store.save_step_state(
                    run_id,
                    &StepId::new(&step.id),
                    StepState::Pending,
                    None,
                )?;
            }
        }
        Ok(())
    }

    /// Effective per-step timeout: the smaller of the manifest default
    /// and any caller override.
    fn step_timeout(&self, opts: &ExecuteOptions) -> Duration {
        let default = Duration::from_secs(self.manifest.runtime.default_timeout_minutes * 60);
        match opts.step_timeout {
            Some(override_) => default.min(override_),
            None => default,
        }
    }

    /// The scheduler loop: launch ready steps up to the concurrency
    /// cap, await completions, apply contract/retry policy, observe
    /// cancellation at every tick.
    async fn drive(
        &self,
        run_id: RunId,
        input: String,
        pipeline: &PipelineDef,
        mut scheduler: DagScheduler,
        base_tokens: u64,
        cancel: RunCancellation,
        opts: &ExecuteOptions,
    ) -> Result<Run, EngineError> {
        let started = self.clock.now();
        let step_timeout = self.step_timeout(opts);
        let max_workers = self.manifest.runtime.max_concurrent_workers;

        let mut join_set: JoinSet<(usize, Result<StepSuccess, StepFailure>)> = JoinSet::new();
        let mut attempts: HashMap<usize, u32> = HashMap::new();
        let mut total_tokens = base_tokens;
        let mut first_failure: Option<(StepId, StepFailure)> = None;

        let result = loop {
            // Drain operator cancellation requests from the store
            if let Some(request) = self.store.check_cancellation(&run_id) {
                if request.force {
                    cancel.cancel_force();
                } else {
                    cancel.cancel_graceful();
                }
            }
            if cancel.is_force_requested() {
                scheduler.request_cancel(true);
            } else if cancel.is_graceful_requested() {
                scheduler.request_cancel(false);
            }

            // Launch ready steps while worker slots remain
            while scheduler.running() < max_workers {
                let Some(idx) = scheduler.next_ready() else {
                    break;
                };
                let attempt = *attempts.get(&idx).unwrap_or(&0);
                let step = &pipeline.steps[idx];
                let step_id = StepId::new(&step.id);

                if let Err(e) =
                    self.store
                        .save_step_state(&run_id, &step_id, StepState::Running, None)
                {
                    break_store_error(&self.bus, &run_id, &e);
                    return Err(e.into());
                }
                self.bus.emit(Event::step(
                    run_id.clone(),
                    step_id.clone(),
                    EventKind::StepStarted {
                        persona: step.persona.clone(),
                        attempt,
                    },
                ));

                let ctx = self.step_context(
                    run_id.clone(),
                    input.clone(),
                    pipeline,
                    idx,
                    total_tokens,
                    step_timeout,
                    cancel.step_token(),
                )?;
                join_set.spawn(async move { (ctx.idx, run_step(ctx).await) });
            }

            if join_set.is_empty() {
                if scheduler.is_settled() {
                    break Ok(());
                }
                break Err(EngineError::Internal(
                    "scheduler stalled: nothing running yet not settled".into(),
                ));
            }

            // Await a completion, waking periodically to re-check the
            // store for cancellation requests
            let joined = tokio::select! {
                joined = join_set.join_next() => joined,
                _ = tokio::time::sleep(CANCEL_POLL_INTERVAL) => continue,
            };
            let Some(joined) = joined else { continue };
            let (idx, step_result) = match joined {
                Ok(value) => value,
                Err(e) => {
                    break Err(EngineError::Internal(format!("step task panicked: {}", e)));
                }
            };
            let step = &pipeline.steps[idx];
            let step_id = StepId::new(&step.id);

            match step_result {
                Ok(success) => {
                    total_tokens += success.tokens;
                    self.bus.emit(Event::step(
                        run_id.clone(),
                        step_id.clone(),
                        EventKind::TokenUsage {
                            tokens: success.tokens,
                            cumulative: total_tokens,
                        },
                    ));
                    if let Err(e) = self.store.update_run_status(
                        &run_id,
                        RunStatus::Running,
                        Some(step_id.clone()),
                        total_tokens,
                        None,
                    ) {
                        break_store_error(&self.bus, &run_id, &e);
                        return Err(e.into());
                    }
                    scheduler.on_completed(idx);
                }
                Err(failure) if failure.kind == FailureKind::Cancelled => {
                    self.store
                        .save_step_state(&run_id, &step_id, StepState::Failed, Some("cancelled"))?;
                    self.bus.emit(Event::step(
                        run_id.clone(),
                        step_id.clone(),
                        EventKind::StepFailed {
                            error: "cancelled".to_string(),
                            recovery_hints: Vec::new(),
                        },
                    ));
                    scheduler.on_failed(idx);
                }
                Err(failure) => {
                    let attempt = *attempts.get(&idx).unwrap_or(&0);
                    let max_retries = step.contract.max_retries;
                    if failure.retryable && attempt < max_retries {
                        attempts.insert(idx, attempt + 1);
                        self.store.save_step_state(
                            &run_id,
                            &step_id,
                            StepState::Retrying,
                            Some(&failure.error),
                        )?;
                        self.bus.emit(Event::step(
                            run_id.clone(),
                            step_id.clone(),
                            EventKind::StepRetrying {
                                attempt: attempt + 1,
                                max_retries,
                                reason: failure.error.clone(),
                            },
                        ));
                        scheduler.on_retry(idx);
                    } else {
                        self.store.save_step_state(
                            &run_id,
                            &step_id,
                            StepState::Failed,
                            Some(&failure.error),
                        )?;
                        self.bus.emit(Event::step(
                            run_id.clone(),
                            step_id.clone(),
                            EventKind::StepFailed {
                                error: failure.error.clone(),
                                recovery_hints: failure.hints.clone(),
                            },
                        ));
                        for skipped in scheduler.on_failed(idx) {
                            self.bus.emit(Event::step(
                                run_id.clone(),
                                StepId::new(&pipeline.steps[skipped].id),
                                EventKind::StepSkipped {
                                    reason: format!("upstream step '{}' failed", step.id),
                                },
                            ));
                        }
                        if first_failure.is_none() {
                            first_failure = Some((step_id.clone(), failure));
                        }
                    }
                }
            }
        };
        result?;

        let duration_ms = (self.clock.now() - started).as_millis() as u64;

        if cancel.is_graceful_requested() || cancel.is_force_requested() {
            let force = cancel.is_force_requested();
            let reason = self
                .store
                .check_cancellation(&run_id)
                .and_then(|r| r.reason);
            self.store.update_run_status(
                &run_id,
                RunStatus::Cancelled,
                None,
                total_tokens,
                Some("cancelled".to_string()),
            )?;
            self.bus.emit(Event::run(
                run_id.clone(),
                EventKind::RunCancelled { force, reason },
            ));
            return Err(EngineError::Cancelled { force });
        }

        if let Some((step_id, failure)) = first_failure {
            self.store.update_run_status(
                &run_id,
                RunStatus::Failed,
                Some(step_id.clone()),
                total_tokens,
                Some(failure.error.clone()),
            )?;
            self.bus.emit(Event::run(
                run_id.clone(),
                EventKind::RunFailed {
                    error: failure.error.clone(),
                    recovery_hints: failure.hints.clone(),
                },
            ));
            return Err(failure.into_engine_error(step_id));
        }

        let run = self.store.update_run_status(
            &run_id,
            RunStatus::Completed,
            None,
            total_tokens,
            None,
        )?;
        self.bus.emit(Event::run(
            run_id.clone(),
            EventKind::RunCompleted {
                total_tokens,
                duration_ms,
            },
        ));
        Ok(run)
    }

    #[allow(clippy::too_many_arguments)]
    fn step_context(
        &self,
        run_id: RunId,
        run_input: String,
        pipeline: &PipelineDef,
        idx: usize,
        cumulative_tokens: u64,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<StepContext<A>, EngineError> {
        let step = pipeline.steps[idx].clone();
        let persona = self
            .manifest
            .get_persona(&step.persona)
            .cloned()
            .ok_or_else(|| {
                EngineError::Internal(format!("persona '{}' vanished after validation", step.persona))
            })?;
        let adapter = self.resolve_adapter(&persona)?;

        let summarizer = if step.memory == MemoryStrategy::SummarizeToCheckpoint {
            let persona = self
                .manifest
                .summarizer()
                .cloned()
                .ok_or_else(|| EngineError::Internal("summarizer persona vanished".into()))?;
            let adapter = self.resolve_adapter(&persona)?;
            Some((persona, adapter))
        } else {
            None
        };

        Ok(StepContext {
            idx,
            step_id: StepId::new(&step.id),
            step,
            persona,
            run_id,
            run_input,
            pipeline_name: pipeline.name.clone(),
            cumulative_tokens,
            manifest: Arc::clone(&self.manifest),
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            workspaces: self.workspaces.clone(),
            adapter,
            summarizer,
            project_root: self.paths.project_root().to_path_buf(),
            personas_root: self.paths.personas(),
            pipelines_root: self.paths.pipelines(),
            pids_root: self.paths.pids(),
            timeout,
            cancel,
        })
    }

    fn resolve_adapter(&self, persona: &PersonaDef) -> Result<A, EngineError> {
        self.adapters.get(&persona.adapter).cloned().ok_or_else(|| {
            EngineError::Internal(format!(
                "no adapter instance registered for '{}'",
                persona.adapter
            ))
        })
    }
}

/// Best-effort failure event when a store write breaks the drive loop.
fn break_store_error(bus: &EventBus, run_id: &RunId, error: &wave_storage::StoreError) {
    bus.emit(Event::run(
        run_id.clone(),
        EventKind::RunFailed {
            error: format!("store error: {}", error),
            recovery_hints: Vec::new(),
        },
    ));
}

/// What one finished step task reports back.
#[derive(Debug)]
struct StepSuccess {
    tokens: u64,
    duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Adapter,
    Contract,
    Workspace,
    Internal,
    Cancelled,
}

#[derive(Debug)]
struct StepFailure {
    kind: FailureKind,
    error: String,
    retryable: bool,
    hints: Vec<String>,
    adapter_source: Option<AdapterError>,
}

impl StepFailure {
    fn internal(error: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Internal,
            error: error.into(),
            retryable: false,
            hints: Vec::new(),
            adapter_source: None,
        }
    }

    fn workspace(error: impl std::fmt::Display) -> Self {
        Self {
            kind: FailureKind::Workspace,
            error: error.to_string(),
            retryable: false,
            hints: Vec::new(),
            adapter_source: None,
        }
    }

    fn adapter(error: AdapterError) -> Self {
        if matches!(error, AdapterError::Cancelled) {
            return Self {
                kind: FailureKind::Cancelled,
                error: "cancelled".to_string(),
                retryable: false,
                hints: Vec::new(),
                adapter_source: Some(error),
            };
        }
        Self {
            kind: FailureKind::Adapter,
            error: error.to_string(),
            retryable: error.is_transient(),
            hints: Vec::new(),
            adapter_source: Some(error),
        }
    }

    fn store(error: wave_storage::StoreError) -> Self {
        Self::internal(format!("store error: {}", error))
    }

    fn into_engine_error(self, step_id: StepId) -> EngineError {
        match self.kind {
            FailureKind::Adapter => EngineError::Adapter {
                step_id,
                source: self
                    .adapter_source
                    .unwrap_or(AdapterError::InvocationFailed(self.error)),
            },
            FailureKind::Contract => EngineError::Contract {
                step_id,
                reason: self.error,
            },
            FailureKind::Workspace => EngineError::Workspace {
                step_id,
                message: self.error,
            },
            FailureKind::Cancelled => EngineError::Cancelled { force: true },
            FailureKind::Internal => EngineError::Internal(self.error),
        }
    }
}

/// Everything one step task needs, owned.
struct StepContext<A: AgentAdapter> {
    idx: usize,
    step: StepDef,
    step_id: StepId,
    persona: PersonaDef,
    run_id: RunId,
    run_input: String,
    pipeline_name: String,
    cumulative_tokens: u64,
    manifest: Arc<Manifest>,
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    workspaces: WorkspaceManager,
    adapter: A,
    summarizer: Option<(PersonaDef, A)>,
    project_root: PathBuf,
    personas_root: PathBuf,
    pipelines_root: PathBuf,
    pids_root: PathBuf,
    timeout: Duration,
    cancel: CancellationToken,
}

/// Run one step: workspace → relay → adapter → contract → artifacts.
/// State transitions and step events around the task are handled by
/// the drive loop; in-task writes keep the linearizability contract
/// (artifacts recorded before the step reads `completed`).
async fn run_step<A: AgentAdapter>(ctx: StepContext<A>) -> Result<StepSuccess, StepFailure> {
    let started = Instant::now();
    let workspace = ctx
        .workspaces
        .provision(&ctx.run_id, &ctx.step_id)
        .map_err(StepFailure::workspace)?;

    let upstream = load_upstream(&ctx)?;

    let mut checkpoint_tokens = 0u64;
    let checkpoint = if ctx.step.memory == MemoryStrategy::SummarizeToCheckpoint
        && relay::needs_checkpoint(&ctx.manifest.runtime.relay, ctx.cumulative_tokens)
    {
        match obtain_checkpoint(&ctx, &workspace, &upstream).await? {
            Some((text, tokens)) => {
                checkpoint_tokens = tokens;
                Some(text)
            }
            None => None,
        }
    } else {
        None
    };

    let step_prompt = resolve_step_prompt(&ctx)?;
    let user_prompt = relay::assemble_prompt(
        &step_prompt,
        &ctx.run_input,
        ctx.step.memory,
        &upstream,
        checkpoint.as_deref(),
    );

    materialize_mounts(&ctx, &workspace)?;

    let request = build_request(
        &ctx,
        &ctx.persona,
        &ctx.step.persona,
        &workspace,
        ctx.step_id.clone(),
        user_prompt,
    )?;
    let outcome = ctx
        .adapter
        .invoke(request, ctx.cancel.clone())
        .await
        .map_err(StepFailure::adapter)?;

    if let ContractOutcome::Invalid(reason) =
        contract::validate_outputs(&ctx.step.contract, &ctx.step.outputs, &workspace.path)
    {
        return Err(StepFailure {
            kind: FailureKind::Contract,
            error: reason,
            retryable: ctx.step.contract.on_failure == OnFailure::Retry,
            hints: Vec::new(),
            adapter_source: None,
        });
    }

    record_outputs(&ctx, &workspace)?;

    let duration_ms = started.elapsed().as_millis() as u64;
    let tokens = outcome.tokens_used + checkpoint_tokens;
    ctx.store
        .save_step_state(&ctx.run_id, &ctx.step_id, StepState::Completed, None)
        .map_err(StepFailure::store)?;
    ctx.bus.emit(Event::step(
        ctx.run_id.clone(),
        ctx.step_id.clone(),
        EventKind::StepCompleted {
            persona: ctx.step.persona.clone(),
            tokens: Some(tokens),
            duration_ms: Some(duration_ms),
        },
    ));

    Ok(StepSuccess {
        tokens,
        duration_ms,
    })
}

/// Load upstream artifact texts for relay assembly (skipped entirely
/// for fresh-memory steps).
fn load_upstream<A: AgentAdapter>(
    ctx: &StepContext<A>,
) -> Result<Vec<UpstreamArtifact>, StepFailure> {
    let mut upstream = Vec::new();
    if ctx.step.memory == MemoryStrategy::Fresh {
        return Ok(upstream);
    }
    let artifacts = ctx.store.get_artifacts(&ctx.run_id);
    for dep in &ctx.step.depends_on {
        for artifact in artifacts.iter().filter(|a| {
            a.step_id == dep.as_str() && a.name != CHECKPOINT_ARTIFACT
        }) {
            let text = std::fs::read_to_string(&artifact.path).unwrap_or_default();
            upstream.push(UpstreamArtifact {
                step_id: artifact.step_id.clone(),
                name: artifact.name.clone(),
                text,
            });
        }
    }
    Ok(upstream)
}

/// Produce (or reuse) the summarized checkpoint for this step.
///
/// The checkpoint is an artifact recorded on the consuming step so a
/// retry observes the same context. A summarizer failure degrades to
/// the verbose history instead of failing the step, except for
/// cancellation, which propagates.
async fn obtain_checkpoint<A: AgentAdapter>(
    ctx: &StepContext<A>,
    workspace: &StepWorkspace,
    upstream: &[UpstreamArtifact],
) -> Result<Option<(String, u64)>, StepFailure> {
    if let Some(existing) = ctx
        .store
        .get_artifact(&ctx.run_id, &ctx.step_id, CHECKPOINT_ARTIFACT)
    {
        let text = std::fs::read_to_string(&existing.path).unwrap_or_default();
        return Ok(Some((text, 0)));
    }

    let Some((persona, adapter)) = &ctx.summarizer else {
        return Err(StepFailure::internal("summarizer adapter missing"));
    };

    let prompt = relay::summarizer_prompt(&ctx.run_input, upstream);
    let request = build_request(
        ctx,
        persona,
        SUMMARIZER_PERSONA,
        workspace,
        StepId::new(format!("{}#summarizer", ctx.step_id)),
        prompt,
    )?;

    let outcome = match adapter.invoke(request, ctx.cancel.clone()).await {
        Ok(outcome) => outcome,
        Err(AdapterError::Cancelled) => {
            return Err(StepFailure::adapter(AdapterError::Cancelled));
        }
        Err(e) => {
            tracing::warn!(
                run_id = %ctx.run_id,
                step_id = %ctx.step_id,
                error = %e,
                "summarizer failed, falling back to verbose context",
            );
            return Ok(None);
        }
    };

    let text = checkpoint_text(&outcome);
    let path = workspace.path.join(CHECKPOINT_ARTIFACT);
    std::fs::write(&path, &text).map_err(StepFailure::workspace)?;
    let artifact = ArtifactRecord {
        run_id: ctx.run_id.clone(),
        step_id: ctx.step_id.clone(),
        name: CHECKPOINT_ARTIFACT.to_string(),
        path: path.clone(),
        size_bytes: text.len() as u64,
        content_type: "text/markdown".to_string(),
        exists: true,
    };
    ctx.store
        .record_artifact(artifact)
        .map_err(StepFailure::store)?;
    ctx.bus.emit(Event::step(
        ctx.run_id.clone(),
        ctx.step_id.clone(),
        EventKind::RelayCheckpoint {
            artifact: CHECKPOINT_ARTIFACT.to_string(),
            tokens_before: ctx.cumulative_tokens,
            tokens_after: wave_adapters::agent::estimate_tokens(&text),
        },
    ));

    Ok(Some((text, outcome.tokens_used)))
}

/// Record the step's declared outputs at their canonical workspace
/// paths. Contract validation already proved they exist. Recording is
/// idempotent for retries and resumes: an artifact already in the
/// store keeps its original record.
fn record_outputs<A: AgentAdapter>(
    ctx: &StepContext<A>,
    workspace: &StepWorkspace,
) -> Result<(), StepFailure> {
    for output in &ctx.step.outputs {
        if ctx
            .store
            .get_artifact(&ctx.run_id, &ctx.step_id, &output.name)
            .is_some()
        {
            continue;
        }
        let path = workspace.path.join(&output.path);
        let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        ctx.store
            .record_artifact(ArtifactRecord {
                run_id: ctx.run_id.clone(),
                step_id: ctx.step_id.clone(),
                name: output.name.clone(),
                path,
                size_bytes,
                content_type: output.content_type.clone(),
                exists: true,
            })
            .map_err(StepFailure::store)?;
    }
    Ok(())
}

/// The checkpoint body: the structured `result` string when the
/// summarizer reports one, else raw stdout.
fn checkpoint_text(outcome: &InvocationOutcome) -> String {
    outcome
        .result
        .as_ref()
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| outcome.stdout.clone())
}

fn resolve_step_prompt<A: AgentAdapter>(ctx: &StepContext<A>) -> Result<String, StepFailure> {
    match &ctx.step.prompt {
        PromptSource::Inline(text) => Ok(text.clone()),
        PromptSource::File { file } => {
            let path = ctx.pipelines_root.join(file);
            std::fs::read_to_string(&path).map_err(|e| {
                StepFailure::internal(format!(
                    "prompt file {} unreadable: {}",
                    path.display(),
                    e
                ))
            })
        }
    }
}

/// Copy injections and declared mounts into the workspace.
fn materialize_mounts<A: AgentAdapter>(
    ctx: &StepContext<A>,
    workspace: &StepWorkspace,
) -> Result<(), StepFailure> {
    for injection in &ctx.step.inject {
        let Some(record) = ctx.store.get_artifact(
            &ctx.run_id,
            &StepId::new(&injection.from_step),
            &injection.artifact,
        ) else {
            // Dependency completed yet artifact missing: invariant breach
            return Err(StepFailure::internal(format!(
                "artifact '{}' from completed step '{}' not recorded",
                injection.artifact, injection.from_step
            )));
        };
        ctx.workspaces
            .mount(
                workspace,
                &record.path,
                std::path::Path::new(injection.local_name()),
                MountMode::Ro,
            )
            .map_err(StepFailure::workspace)?;
    }

    for mount in &ctx.step.mounts {
        let source = if mount.source.is_absolute() {
            mount.source.clone()
        } else {
            ctx.project_root.join(&mount.source)
        };
        ctx.workspaces
            .mount(workspace, &source, &mount.target, mount.mode)
            .map_err(StepFailure::workspace)?;
    }
    Ok(())
}

/// Resolve a persona into an adapter request.
fn build_request<A: AgentAdapter>(
    ctx: &StepContext<A>,
    persona: &PersonaDef,
    persona_name: &str,
    workspace: &StepWorkspace,
    step_id: StepId,
    user_prompt: String,
) -> Result<InvocationRequest, StepFailure> {
    let adapter_def = ctx
        .manifest
        .get_adapter(&persona.adapter)
        .ok_or_else(|| StepFailure::internal(format!("adapter '{}' vanished", persona.adapter)))?;

    let system_prompt = match (&persona.system_prompt, &persona.prompt_file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(file)) => {
            let path = ctx.personas_root.join(file);
            std::fs::read_to_string(&path).map_err(|e| {
                StepFailure::internal(format!(
                    "persona prompt {} unreadable: {}",
                    path.display(),
                    e
                ))
            })?
        }
        (None, None) => String::new(),
    };

    let allowed_tools = if persona.allowed_tools.is_empty() {
        adapter_def.allowed_tools.clone()
    } else {
        persona.allowed_tools.clone()
    };
    let denied_tools = if persona.denied_tools.is_empty() {
        adapter_def.denied_tools.clone()
    } else {
        persona.denied_tools.clone()
    };

    Ok(InvocationRequest {
        run_id: ctx.run_id.clone(),
        step_id,
        persona: persona_name.to_string(),
        workdir: workspace.path.clone(),
        system_prompt,
        user_prompt,
        allowed_tools,
        denied_tools,
        model: persona.model.clone(),
        temperature: persona.temperature,
        timeout: ctx.timeout,
        env: vec![
            ("WAVE_RUN_ID".to_string(), ctx.run_id.to_string()),
            ("WAVE_STEP_ID".to_string(), ctx.step_id.to_string()),
            ("WAVE_PIPELINE".to_string(), ctx.pipeline_name.clone()),
        ],
        pids_root: ctx.pids_root.clone(),
    })
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
