//! Shared harness for engine specs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wave_adapters::{MockAgentAdapter, MockResponse};
use wave_config::{
    AdapterDef, ContractDef, Manifest, OnFailure, OutputDef, PersonaDef, PipelineDef,
    PromptSource, SchemaKind, StepDef, WavePaths,
};
use wave_core::{RunId, RunStatus, StepState, SystemClock};
use wave_engine::{CollectingSubscriber, EventBus, Executor, StoreSubscriber, Subscriber};
use wave_storage::StateStore;

/// One spec environment: a project dir, a persistent store, a mock
/// adapter, and an event collector shared by every executor built
/// from it.
pub struct Spec {
    pub dir: tempfile::TempDir,
    pub manifest: Manifest,
    pub store: Arc<StateStore>,
    pub adapter: MockAgentAdapter,
    pub collector: Arc<CollectingSubscriber>,
}

impl Spec {
    pub fn new() -> Self {
        Self::with_manifest(default_manifest())
    }

    pub fn with_manifest(manifest: Manifest) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Arc::new(StateStore::open(&dir.path().join(".wave/state.db")).unwrap());
        Self {
            dir,
            manifest,
            store,
            adapter: MockAgentAdapter::new(),
            collector: Arc::new(CollectingSubscriber::new()),
        }
    }

    /// Build an engine over this spec's store and adapter. Call again
    /// to model a fresh process after a crash.
    pub fn executor(&self) -> Executor<MockAgentAdapter> {
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(StoreSubscriber::new(Arc::clone(&self.store))));
        bus.subscribe(Arc::clone(&self.collector) as Arc<dyn Subscriber>);

        let mut adapters = HashMap::new();
        adapters.insert("mock".to_string(), self.adapter.clone());

        Executor::new(
            self.manifest.clone(),
            WavePaths::new(self.dir.path()),
            Arc::clone(&self.store),
            Arc::new(bus),
            adapters,
            SystemClock,
        )
    }

    /// Reopen the state store from disk, as a freshly started engine
    /// would. Only meaningful after the previous executor is gone.
    pub fn reopen_store(&mut self) {
        self.store =
            Arc::new(StateStore::open(&self.dir.path().join(".wave/state.db")).unwrap());
    }

    /// The single run this spec produced.
    pub fn only_run(&self) -> wave_core::Run {
        let runs = self.store.list_runs();
        assert_eq!(runs.len(), 1, "expected exactly one run");
        runs.into_iter().next().unwrap()
    }

    /// Poll until the given step reaches a state (or panic after 5 s).
    pub async fn wait_for_step_state(&self, run_id: &RunId, step: &str, state: StepState) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let reached = self
                .store
                .get_step_states(run_id)
                .into_iter()
                .any(|s| s.step_id == step && s.state == state);
            if reached {
                return;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "step '{}' never reached {:?}",
                step,
                state
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until a run exists and return its id.
    pub async fn wait_for_run(&self) -> RunId {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(run) = self.store.list_runs().into_iter().next() {
                return run.id;
            }
            assert!(std::time::Instant::now() < deadline, "run never created");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// (label, step id) pairs for every collected event, in order.
    pub fn event_seq(&self) -> Vec<(&'static str, Option<String>)> {
        self.collector
            .events()
            .iter()
            .map(|e| (e.label(), e.step_id.as_ref().map(|s| s.to_string())))
            .collect()
    }
}

/// Manifest with a mock adapter, a builder persona, and a summarizer.
pub fn default_manifest() -> Manifest {
    let mut manifest = Manifest::default();
    manifest.adapters.insert(
        "mock".to_string(),
        AdapterDef {
            command: "mock-agent".to_string(),
            args: Vec::new(),
            output: Default::default(),
            allowed_tools: Vec::new(),
            denied_tools: Vec::new(),
        },
    );
    manifest
        .personas
        .insert("builder".to_string(), persona("You build things."));
    manifest.personas.insert(
        "summarizer".to_string(),
        persona("You compress context into checkpoints."),
    );
    manifest.runtime.max_concurrent_workers = 2;
    manifest
}

pub fn persona(system_prompt: &str) -> PersonaDef {
    PersonaDef {
        adapter: "mock".to_string(),
        prompt_file: None,
        system_prompt: Some(system_prompt.to_string()),
        model: None,
        temperature: None,
        allowed_tools: Vec::new(),
        denied_tools: Vec::new(),
        requires_tools: Vec::new(),
        requires_skills: Vec::new(),
    }
}

pub fn pipeline(name: &str, steps: Vec<StepDef>) -> PipelineDef {
    PipelineDef {
        name: name.to_string(),
        description: None,
        steps,
    }
}

pub fn step(id: &str, deps: &[&str]) -> StepDef {
    StepDef {
        id: id.to_string(),
        persona: "builder".to_string(),
        depends_on: deps.iter().map(|s| s.to_string()).collect(),
        prompt: PromptSource::Inline(format!("Run step {}.", id)),
        memory: Default::default(),
        inject: Vec::new(),
        mounts: Vec::new(),
        outputs: Vec::new(),
        contract: Default::default(),
    }
}

/// A step that declares a JSON `result` artifact with a retrying
/// contract.
pub fn step_with_output(id: &str, deps: &[&str], max_retries: u32) -> StepDef {
    let mut def = step(id, deps);
    def.outputs.push(OutputDef {
        name: "result".to_string(),
        path: "result.json".into(),
        content_type: "application/json".to_string(),
    });
    def.contract = ContractDef {
        schema: SchemaKind::Json,
        on_failure: OnFailure::Retry,
        max_retries,
    };
    def
}

/// A mock response that writes the declared `result` artifact.
pub fn ok_with_result(tokens: u64) -> MockResponse {
    MockResponse::with_output(r#"{"ok":true}"#)
        .with_tokens(tokens)
        .with_file("result.json", r#"{"ok":true}"#)
}

/// Assert a run's status in the store.
pub fn assert_run_status(spec: &Spec, run_id: &RunId, expected: RunStatus) {
    let run = spec.store.get_run(run_id).unwrap();
    assert_eq!(run.status, expected, "run {:?}", run);
}
