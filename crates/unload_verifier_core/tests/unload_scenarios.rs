use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use unload_verifier_core::{
    ArtifactStore, CollectorTrigger, Component, ComponentRegistry, DedicatedThreadContext,
    DeferredReleaseQueue, DirectoryArtifactStore, EventKind, ExecutionContext, HarnessConfig,
    HarnessError, HarnessSettings, InMemoryRegistry, InlineExecutionContext, NoopCollector,
    PluginId, RecordingSink, RunOutcome, ServiceMessageSink, SkipReason, Slot, SlotPolicy, Stage,
    UnloadHarness, Verdict,
};

struct CleanProvider;

impl Component for CleanProvider {}

struct CachedProvider;

impl Component for CachedProvider {}

struct PlatformProvider;

impl Component for PlatformProvider {}

struct StubbornProvider;

impl Component for StubbornProvider {
    fn dispose(&self) -> Result<(), String> {
        Err("listener still attached".to_string())
    }
}

struct ThreadRecorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Component for ThreadRecorder {
    fn dispose(&self) -> Result<(), String> {
        let name = thread::current().name().unwrap_or("unnamed").to_string();
        self.seen.lock().expect("seen threads").push(name);
        Ok(())
    }
}

struct HangingCollector;

impl CollectorTrigger for HangingCollector {
    fn force_collect(&self) {
        thread::sleep(Duration::from_secs(2));
    }
}

fn plugin() -> PluginId {
    PluginId::new("demo.plugin").expect("plugin id")
}

fn settings() -> HarnessSettings {
    HarnessSettings {
        settle: Duration::ZERO,
        ..HarnessSettings::default()
    }
}

struct Host {
    registry: Arc<InMemoryRegistry>,
    artifacts: tempfile::TempDir,
}

impl Host {
    fn new() -> Self {
        Self {
            registry: Arc::new(InMemoryRegistry::new()),
            artifacts: tempfile::tempdir().expect("artifact dir"),
        }
    }

    fn with_registry(registry: InMemoryRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            artifacts: tempfile::tempdir().expect("artifact dir"),
        }
    }

    fn slot(&self, slot: Slot) -> &Self {
        self.registry.register_slot(slot).expect("slot registers");
        self
    }

    fn add(&self, slot: &str, owner: PluginId, component: Arc<dyn Component>) -> &Self {
        self.registry
            .register(slot, owner, component)
            .expect("instance registers");
        self
    }

    fn harness_with(
        &self,
        context: Arc<dyn ExecutionContext>,
        collector: Arc<dyn CollectorTrigger>,
        settings: HarnessSettings,
    ) -> UnloadHarness {
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(DirectoryArtifactStore::new(self.artifacts.path()));
        UnloadHarness::new(
            self.registry.clone(),
            context,
            collector,
            artifacts,
            settings,
        )
    }

    fn harness(&self) -> UnloadHarness {
        self.harness_with(
            Arc::new(InlineExecutionContext),
            Arc::new(NoopCollector),
            settings(),
        )
    }
}

fn completed(outcome: RunOutcome) -> unload_verifier_core::RunReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::Skipped(reason) => panic!("run unexpectedly skipped: {reason}"),
    }
}

#[test]
fn empty_allow_list_without_override_skips_and_emits_nothing() {
    let host = Host::new();
    host.slot(Slot::dynamic("demo.fileType"))
        .add("demo.fileType", plugin(), Arc::new(CleanProvider));
    let config = HarnessConfig::load_from_map(&HashMap::new()).expect("default config");

    let mut sink = RecordingSink::new();
    let outcome = host
        .harness()
        .run(&config.policy(), &mut sink)
        .expect("skip is not an error");

    assert_eq!(outcome, RunOutcome::Skipped(SkipReason::PolicyEmpty));
    assert!(sink.events().is_empty());
    assert_eq!(host.registry.instance_count("demo.fileType"), 1);
}

#[test]
fn clean_slot_passes_and_cached_slot_leaks() {
    let host = Host::new();
    let external_cache: Arc<dyn Component> = Arc::new(CachedProvider);
    host.slot(Slot::dynamic("A"))
        .slot(Slot::dynamic("B"))
        .add("A", plugin(), Arc::new(CleanProvider))
        .add("B", plugin(), external_cache.clone());

    let mut sink = RecordingSink::new();
    let report = completed(
        host.harness()
            .run(&SlotPolicy::All, &mut sink)
            .expect("run completes"),
    );

    let kinds: Vec<(EventKind, &str)> = sink
        .events()
        .iter()
        .map(|event| (event.kind, event.name.as_str()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (EventKind::Start, "Dynamic slot unloading A"),
            (EventKind::Finish, "Dynamic slot unloading A"),
            (EventKind::Start, "Dynamic slot unloading B"),
            (EventKind::Failure, "Dynamic slot unloading B"),
        ]
    );
    let failure = sink.events()[3].message.as_deref().expect("failure message");
    assert!(failure.contains("CachedProvider"));

    assert_eq!(report.verdict, Verdict::Failed);
    let leak = report.slot("B").expect("slot B verdict");
    assert_eq!(leak.alive.len(), 1);
    assert!(leak.alive[0].ends_with("CachedProvider"));
    assert!(report.slot("A").expect("slot A verdict").passed());

    let artifact = report.artifact.as_ref().expect("artifact id on failure");
    assert!(std::path::Path::new(artifact.as_str()).exists());
    assert!(report
        .failure_message()
        .expect("aggregate failure")
        .contains(artifact.as_str()));
}

#[test]
fn protocol_symbols_in_slot_names_are_escaped() {
    let host = Host::new();
    host.slot(Slot::dynamic("it's|odd"))
        .add("it's|odd", plugin(), Arc::new(CleanProvider));

    let mut sink = RecordingSink::new();
    host.harness()
        .run(&SlotPolicy::explicit(["it's|odd"]), &mut sink)
        .expect("run completes");

    assert_eq!(sink.events().len(), 2);
    assert_eq!(sink.events()[0].name, "Dynamic slot unloading it|'s||odd");
    assert_eq!(sink.events()[1].name, "Dynamic slot unloading it|'s||odd");
}

#[test]
fn fixed_slots_are_never_snapshotted_or_unloaded() {
    let host = Host::new();
    let service: Arc<dyn Component> = Arc::new(CachedProvider);
    host.slot(Slot::fixed("demo.service"))
        .add("demo.service", plugin(), service.clone());

    for policy in [SlotPolicy::All, SlotPolicy::explicit(["demo.service"])] {
        let mut sink = RecordingSink::new();
        let report = completed(host.harness().run(&policy, &mut sink).expect("run"));
        assert!(report.slots.is_empty());
        assert!(report.passed());
        assert!(sink.events().is_empty());
    }
    assert_eq!(host.registry.instance_count("demo.service"), 1);
}

#[test]
fn base_layer_instances_never_count_as_leaks() {
    let host = Host::new();
    let platform: Arc<dyn Component> = Arc::new(PlatformProvider);
    host.slot(Slot::dynamic("demo.fileType"))
        .add("demo.fileType", PluginId::base_layer(), platform.clone())
        .add("demo.fileType", plugin(), Arc::new(CleanProvider));

    let mut sink = RecordingSink::new();
    let report = completed(host.harness().run(&SlotPolicy::All, &mut sink).expect("run"));

    assert!(report.passed());
    assert!(report.artifact.is_none());
}

#[test]
fn parked_instances_are_released_by_forced_collection() {
    let queue = Arc::new(DeferredReleaseQueue::new());
    let host = Host::with_registry(InMemoryRegistry::with_deferred_release(queue.clone()));
    host.slot(Slot::dynamic("demo.fileType"))
        .add("demo.fileType", plugin(), Arc::new(CleanProvider))
        .add("demo.fileType", plugin(), Arc::new(CleanProvider));

    let mut sink = RecordingSink::new();
    let report = completed(
        host.harness_with(Arc::new(InlineExecutionContext), queue.clone(), settings())
            .run(&SlotPolicy::All, &mut sink)
            .expect("run"),
    );

    assert!(report.passed());
    assert_eq!(queue.cycles(), 2);
    assert_eq!(queue.pending(), 0);
}

#[test]
fn unload_runs_on_the_designated_context() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let host = Host::new();
    host.slot(Slot::dynamic("demo.action")).add(
        "demo.action",
        plugin(),
        Arc::new(ThreadRecorder { seen: seen.clone() }),
    );
    let context = Arc::new(DedicatedThreadContext::spawn("host-ui").expect("context"));

    let mut sink = RecordingSink::new();
    let report = completed(
        host.harness_with(context.clone(), Arc::new(NoopCollector), settings())
            .run(&SlotPolicy::All, &mut sink)
            .expect("run"),
    );

    assert!(report.passed());
    assert_eq!(*seen.lock().expect("seen threads"), vec!["host-ui".to_string()]);
}

#[test]
fn removal_failures_are_reported_and_verification_still_runs() {
    let host = Host::new();
    host.slot(Slot::dynamic("demo.listener"))
        .add("demo.listener", plugin(), Arc::new(StubbornProvider));

    let mut sink = RecordingSink::new();
    let report = completed(host.harness().run(&SlotPolicy::All, &mut sink).expect("run"));

    let verdict = report.slot("demo.listener").expect("verdict");
    assert_eq!(verdict.removal_failures.len(), 1);
    assert!(verdict.removal_failures[0].contains("listener still attached"));
    assert!(verdict.unload_failure.is_none());
    assert!(verdict.alive[0].ends_with("StubbornProvider"));
    assert_eq!(report.verdict, Verdict::Failed);
}

#[test]
fn slot_missing_at_unload_time_is_an_unload_failure_not_a_run_error() {
    struct VanishingRegistry {
        inner: InMemoryRegistry,
    }

    impl ComponentRegistry for VanishingRegistry {
        fn list_slots(&self) -> Vec<Slot> {
            let mut slots = self.inner.list_slots();
            slots.push(Slot::dynamic("zz.ghost"));
            slots
        }

        fn instances_of(&self, slot: &Slot) -> Vec<unload_verifier_core::ComponentInstance> {
            self.inner.instances_of(slot)
        }

        fn unregister(
            &self,
            slot: &Slot,
            retain: unload_verifier_core::host::registry::RetainFn<'_>,
            best_effort: bool,
        ) -> Result<unload_verifier_core::UnregisterOutcome, unload_verifier_core::RegistryError>
        {
            self.inner.unregister(slot, retain, best_effort)
        }
    }

    let inner = InMemoryRegistry::new();
    inner
        .register_slot(Slot::dynamic("demo.action"))
        .expect("slot");
    let registry = Arc::new(VanishingRegistry { inner });
    let artifacts = tempfile::tempdir().expect("artifact dir");
    let harness = UnloadHarness::new(
        registry,
        Arc::new(InlineExecutionContext),
        Arc::new(NoopCollector),
        Arc::new(DirectoryArtifactStore::new(artifacts.path())),
        settings(),
    );

    let mut sink = RecordingSink::new();
    let report = completed(harness.run(&SlotPolicy::All, &mut sink).expect("run"));

    assert!(report.slot("demo.action").expect("first slot").passed());
    let ghost = report.slot("zz.ghost").expect("ghost slot");
    assert!(ghost.unload_failure.is_some());
    assert!(ghost.alive.is_empty());
    assert_eq!(report.verdict, Verdict::Failed);
}

#[test]
fn hanging_collection_is_a_distinct_timeout() {
    let host = Host::new();
    host.slot(Slot::dynamic("demo.action"))
        .add("demo.action", plugin(), Arc::new(CleanProvider));
    let harness = host.harness_with(
        Arc::new(InlineExecutionContext),
        Arc::new(HangingCollector),
        HarnessSettings {
            run_timeout: Duration::from_millis(100),
            ..settings()
        },
    );

    let mut sink = RecordingSink::new();
    let err = harness
        .run(&SlotPolicy::All, &mut sink)
        .expect_err("hanging collector must time out");

    assert!(matches!(
        err,
        HarnessError::TimeoutExceeded {
            stage: Stage::Collect,
            ..
        }
    ));
    assert!(sink.events().is_empty());
}

#[test]
fn service_message_output_matches_ci_protocol() {
    let host = Host::new();
    let cache: Arc<dyn Component> = Arc::new(CachedProvider);
    host.slot(Slot::dynamic("demo.cache"))
        .add("demo.cache", plugin(), cache.clone());

    let mut sink = ServiceMessageSink::new(Vec::new());
    let report = completed(host.harness().run(&SlotPolicy::All, &mut sink).expect("run"));
    let output = String::from_utf8(sink.into_inner()).expect("utf8");
    let lines: Vec<&str> = output.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "##teamcity[testStarted name='Dynamic slot unloading demo.cache']"
    );
    assert!(lines[1].starts_with(
        "##teamcity[testFailed name='Dynamic slot unloading demo.cache' \
         message='Not unloaded components:|n"
    ));
    assert!(lines[1].ends_with("See testDynamicSlots output to find a diagnostic artifact']"));
    assert!(lines[2].starts_with(
        "##teamcity[buildStatisticValue key='unloadVerifier.totalTimeMs' value='"
    ));
    assert!(!report.passed());
}
