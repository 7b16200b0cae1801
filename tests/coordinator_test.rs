use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use orincheck::core::component::{ComponentKind, ComponentTestSpec};
use orincheck::core::config::CoordinatorConfig;
use orincheck::core::coordinator::Coordinator;
use orincheck::core::error::{CoordinatorError, Result};
use orincheck::core::verdict::VerdictTier;
use orincheck::remote::{CommandOutput, RemoteExecutor, PROBE_COMMAND, TELEMETRY_COMMAND};
use orincheck::runners::{ComponentRunner, RunnerHandle};

/// Canned remote endpoint: answers the probe, inspection, and telemetry
/// commands without any network.
struct MockExecutor {
    fail_probe: bool,
    flaky_telemetry: bool,
    telemetry_calls: AtomicUsize,
}

impl MockExecutor {
    fn reachable() -> Self {
        Self {
            fail_probe: false,
            flaky_telemetry: false,
            telemetry_calls: AtomicUsize::new(0),
        }
    }

    fn unreachable() -> Self {
        Self { fail_probe: true, ..Self::reachable() }
    }

    /// Every other telemetry call fails, as a flapping target would.
    fn flaky_telemetry() -> Self {
        Self { flaky_telemetry: true, ..Self::reachable() }
    }
}

impl RemoteExecutor for MockExecutor {
    fn run(&self, command: &str, _timeout: Duration) -> Result<CommandOutput> {
        if command == PROBE_COMMAND {
            if self.fail_probe {
                return Ok(CommandOutput {
                    exit_code: 255,
                    stdout: String::new(),
                    stderr: "Connection refused".into(),
                });
            }
            return Ok(CommandOutput {
                exit_code: 0,
                stdout: "connectivity_ok\n".into(),
                stderr: String::new(),
            });
        }

        if command == TELEMETRY_COMMAND {
            let call = self.telemetry_calls.fetch_add(1, Ordering::SeqCst);
            if self.flaky_telemetry && call % 2 == 0 {
                return Ok(CommandOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "read timed out".into(),
                });
            }
            return Ok(CommandOutput {
                exit_code: 0,
                stdout: "cpu_load=2.10\nmem_pct=55.0\ncpu_temp=48000\ngpu_temp=46000\ngpu_util=300\nio_sectors=1000\n"
                    .into(),
                stderr: String::new(),
            });
        }

        // Baseline / final-state inspection.
        Ok(CommandOutput {
            exit_code: 0,
            stdout: "=== uptime ===\n up 3 days\n=== kernel ===\nLinux orin 5.15\n".into(),
            stderr: String::new(),
        })
    }
}

#[derive(Debug, Clone)]
struct LaunchRecord {
    kind: ComponentKind,
    at: Instant,
    duration_hours: f64,
}

/// Stub runner: each launch is a thread that sleeps briefly and exits with
/// the scripted code for its component kind.
struct StubRunner {
    exit_codes: [(ComponentKind, i32); 4],
    delays: [(ComponentKind, Duration); 4],
    fail_launch: Option<ComponentKind>,
    launches: Mutex<Vec<LaunchRecord>>,
}

impl StubRunner {
    fn all_pass() -> Self {
        Self::with_exit_codes([0, 0, 0, 0])
    }

    fn with_exit_codes(codes: [i32; 4]) -> Self {
        let kinds = [
            ComponentKind::Cpu,
            ComponentKind::Gpu,
            ComponentKind::Ram,
            ComponentKind::Storage,
        ];
        Self {
            exit_codes: [
                (kinds[0], codes[0]),
                (kinds[1], codes[1]),
                (kinds[2], codes[2]),
                (kinds[3], codes[3]),
            ],
            delays: kinds.map(|k| (k, Duration::from_millis(20))),
            fail_launch: None,
            launches: Mutex::new(Vec::new()),
        }
    }

    /// The given component's launch fails outright, as if its runner
    /// executable were missing.
    fn with_launch_failure(mut self, kind: ComponentKind) -> Self {
        self.fail_launch = Some(kind);
        self
    }

    fn with_delay(mut self, kind: ComponentKind, delay: Duration) -> Self {
        for entry in &mut self.delays {
            if entry.0 == kind {
                entry.1 = delay;
            }
        }
        self
    }

    fn launch_records(&self) -> Vec<LaunchRecord> {
        self.launches.lock().unwrap().clone()
    }

    fn code_for(&self, kind: ComponentKind) -> i32 {
        self.exit_codes.iter().find(|(k, _)| *k == kind).unwrap().1
    }

    fn delay_for(&self, kind: ComponentKind) -> Duration {
        self.delays.iter().find(|(k, _)| *k == kind).unwrap().1
    }
}

struct StubHandle {
    join: Option<JoinHandle<i32>>,
}

impl RunnerHandle for StubHandle {
    fn id(&self) -> u32 {
        0
    }

    fn wait(&mut self) -> Result<i32> {
        self.join
            .take()
            .expect("wait called twice")
            .join()
            .map_err(|_| CoordinatorError::Unexpected("stub runner panicked".into()))
    }
}

impl ComponentRunner for StubRunner {
    fn launch(
        &self,
        spec: &ComponentTestSpec,
        config: &CoordinatorConfig,
        output_dir: &Path,
    ) -> Result<Box<dyn RunnerHandle>> {
        if self.fail_launch == Some(spec.kind) {
            return Err(CoordinatorError::Launch {
                component: spec.display_name.to_string(),
                reason: "no such file or directory".into(),
            });
        }

        self.launches.lock().unwrap().push(LaunchRecord {
            kind: spec.kind,
            at: Instant::now(),
            duration_hours: config.duration_hours,
        });

        // Leave a runner-style report behind for the aggregator.
        let reports = output_dir.join("reports");
        fs::create_dir_all(&reports)?;
        fs::write(
            reports.join("report.txt"),
            format!("{} TEST REPORT\nstub run finished\n", spec.display_name.to_uppercase()),
        )?;

        let code = self.code_for(spec.kind);
        let delay = self.delay_for(spec.kind);
        let join = thread::spawn(move || {
            thread::sleep(delay);
            code
        });

        Ok(Box::new(StubHandle { join: Some(join) }))
    }
}

fn fast_config(base: &Path) -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.host = "10.0.0.5".into();
    config.username = "test".into();
    config.password = "x".into();
    config.duration_hours = 0.0167;
    config.stagger = Duration::from_millis(30);
    config.sample_interval = Duration::from_millis(5);
    config.status_interval = Duration::from_millis(50);
    config.output_base = base.to_path_buf();
    config
}

#[test]
fn all_pass_yields_excellent_and_exit_zero() {
    let base = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::all_pass());
    let coordinator = Coordinator::new(
        fast_config(base.path()),
        Arc::new(MockExecutor::reachable()),
        runner.clone(),
    )
    .unwrap();

    let outcome = coordinator.run().unwrap();

    assert_eq!(outcome.verdict.total, 4);
    assert_eq!(outcome.verdict.passed, 4);
    assert_eq!(outcome.verdict.rate, 100);
    assert_eq!(outcome.verdict.tier, VerdictTier::Excellent);
    assert_eq!(outcome.verdict.exit_code(), 0);
    assert!(outcome.report_written);

    // Exactly four launches, all handed the same duration.
    let launches = runner.launch_records();
    assert_eq!(launches.len(), 4);
    assert!(launches.iter().all(|l| l.duration_hours == 0.0167));

    let report = fs::read_to_string(outcome.layout.combined_report()).unwrap();
    assert!(report.contains("EXCELLENT"));
    assert!(report.contains("4 of 4 components passed (100%)"));

    // Runner report excerpts flow into the combined report.
    assert!(report.contains("CPU TEST REPORT"));

    assert!(outcome.layout.verdict_json().is_file());
    assert!(outcome.layout.baseline_log().is_file());
    assert!(outcome.layout.final_state_log().is_file());
}

#[test]
fn single_failure_yields_acceptable_with_concerns() {
    let base = tempfile::tempdir().unwrap();
    // GPU fails, the other three pass.
    let runner = Arc::new(StubRunner::with_exit_codes([0, 1, 0, 0]));
    let coordinator = Coordinator::new(
        fast_config(base.path()),
        Arc::new(MockExecutor::reachable()),
        runner,
    )
    .unwrap();

    let outcome = coordinator.run().unwrap();

    assert_eq!(outcome.verdict.passed, 3);
    assert_eq!(outcome.verdict.rate, 75);
    assert_eq!(outcome.verdict.tier, VerdictTier::AcceptableWithConcerns);
    assert_eq!(outcome.verdict.exit_code(), 1);

    let gpu = outcome
        .results
        .iter()
        .find(|r| r.kind == ComponentKind::Gpu)
        .unwrap();
    assert_eq!(gpu.exit_code, 1);
    assert!(!gpu.passed());

    let report = fs::read_to_string(outcome.layout.combined_report()).unwrap();
    assert!(report.contains("ACCEPTABLE_WITH_CONCERNS"));
    assert!(report.contains("Recommended next actions"));
}

#[test]
fn two_failures_yield_system_issues() {
    let base = tempfile::tempdir().unwrap();
    // CPU and RAM fail; GPU and Storage pass.
    let runner = Arc::new(StubRunner::with_exit_codes([1, 0, 1, 0]));
    let coordinator = Coordinator::new(
        fast_config(base.path()),
        Arc::new(MockExecutor::reachable()),
        runner,
    )
    .unwrap();

    let outcome = coordinator.run().unwrap();

    assert_eq!(outcome.verdict.passed, 2);
    assert_eq!(outcome.verdict.rate, 50);
    assert_eq!(outcome.verdict.tier, VerdictTier::SystemIssuesDetected);
    assert_eq!(outcome.verdict.exit_code(), 1);

    let report = fs::read_to_string(outcome.layout.combined_report()).unwrap();
    assert!(report.contains("SYSTEM_ISSUES_DETECTED"));
}

#[test]
fn preflight_failure_launches_nothing() {
    let base = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::all_pass());
    let coordinator = Coordinator::new(
        fast_config(base.path()),
        Arc::new(MockExecutor::unreachable()),
        runner.clone(),
    )
    .unwrap();

    let err = coordinator.run().unwrap_err();
    assert!(matches!(err, CoordinatorError::Connectivity(_)));
    assert!(err.is_fatal_pre_launch());

    assert!(runner.launch_records().is_empty());
    // No output root is created either.
    assert_eq!(fs::read_dir(base.path()).unwrap().count(), 0);
}

#[test]
fn launches_respect_minimum_stagger() {
    let base = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::all_pass());
    let mut config = fast_config(base.path());
    config.stagger = Duration::from_millis(50);

    let coordinator = Coordinator::new(
        config,
        Arc::new(MockExecutor::reachable()),
        runner.clone(),
    )
    .unwrap();
    coordinator.run().unwrap();

    let launches = runner.launch_records();
    assert_eq!(launches.len(), 4);

    // Fixed order, each spaced at least the configured stagger apart.
    let kinds: Vec<ComponentKind> = launches.iter().map(|l| l.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ComponentKind::Cpu,
            ComponentKind::Gpu,
            ComponentKind::Ram,
            ComponentKind::Storage
        ]
    );
    for pair in launches.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(gap >= Duration::from_millis(50), "gap was {:?}", gap);
    }
}

#[test]
fn join_handles_out_of_order_completion() {
    let base = tempfile::tempdir().unwrap();
    // The first-launched runner finishes last; joining in launch order must
    // still collect every code correctly.
    let runner = Arc::new(
        StubRunner::with_exit_codes([0, 1, 0, 1])
            .with_delay(ComponentKind::Cpu, Duration::from_millis(200))
            .with_delay(ComponentKind::Gpu, Duration::from_millis(5))
            .with_delay(ComponentKind::Storage, Duration::from_millis(5)),
    );

    let coordinator = Coordinator::new(
        fast_config(base.path()),
        Arc::new(MockExecutor::reachable()),
        runner,
    )
    .unwrap();
    let outcome = coordinator.run().unwrap();

    let codes: Vec<(ComponentKind, i32)> =
        outcome.results.iter().map(|r| (r.kind, r.exit_code)).collect();
    assert_eq!(
        codes,
        vec![
            (ComponentKind::Cpu, 0),
            (ComponentKind::Gpu, 1),
            (ComponentKind::Ram, 0),
            (ComponentKind::Storage, 1),
        ]
    );
    assert_eq!(outcome.verdict.rate, 50);
}

#[test]
fn launch_failure_counts_as_failed_and_siblings_continue() {
    let base = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::all_pass().with_launch_failure(ComponentKind::Gpu));
    let coordinator = Coordinator::new(
        fast_config(base.path()),
        Arc::new(MockExecutor::reachable()),
        runner.clone(),
    )
    .unwrap();

    let outcome = coordinator.run().unwrap();

    // The un-spawnable runner is just a failed component, not an abort.
    assert_eq!(outcome.verdict.passed, 3);
    assert_eq!(outcome.verdict.rate, 75);
    assert_eq!(outcome.verdict.tier, VerdictTier::AcceptableWithConcerns);

    let gpu = outcome
        .results
        .iter()
        .find(|r| r.kind == ComponentKind::Gpu)
        .unwrap();
    assert!(!gpu.passed());
    assert_eq!(gpu.exit_code, 127);

    // The other three still launched and ran to completion.
    let launched: Vec<ComponentKind> = runner.launch_records().iter().map(|l| l.kind).collect();
    assert_eq!(
        launched,
        vec![ComponentKind::Cpu, ComponentKind::Ram, ComponentKind::Storage]
    );

    let report = fs::read_to_string(outcome.layout.combined_report()).unwrap();
    assert!(report.contains("ACCEPTABLE_WITH_CONCERNS"));
    assert!(report.contains("FAILED (exit code 127)"));
}

#[test]
fn transient_telemetry_failures_do_not_stop_sampling() {
    let base = tempfile::tempdir().unwrap();
    let executor = Arc::new(MockExecutor::flaky_telemetry());
    let runner = Arc::new(
        StubRunner::all_pass().with_delay(ComponentKind::Storage, Duration::from_millis(200)),
    );

    let coordinator =
        Coordinator::new(fast_config(base.path()), executor.clone(), runner).unwrap();
    let outcome = coordinator.run().unwrap();

    assert_eq!(outcome.verdict.tier, VerdictTier::Excellent);

    // Sampling kept going between failures: samples were written, and the
    // failed attempts show up only as extra calls, not log rows.
    assert!(outcome.telemetry_samples > 0);
    let calls = executor.telemetry_calls.load(Ordering::SeqCst);
    assert!(
        calls > outcome.telemetry_samples,
        "{} calls vs {} samples",
        calls,
        outcome.telemetry_samples
    );

    let log = fs::read_to_string(outcome.layout.monitor_log()).unwrap();
    assert_eq!(log.lines().count() - 1, outcome.telemetry_samples);
}

#[test]
fn monitoring_log_is_written_and_loop_terminates() {
    let base = tempfile::tempdir().unwrap();
    let executor = Arc::new(MockExecutor::reachable());
    // Slow runners give the 5ms sampler time to collect several samples.
    let runner = Arc::new(
        StubRunner::all_pass().with_delay(ComponentKind::Storage, Duration::from_millis(150)),
    );

    let coordinator =
        Coordinator::new(fast_config(base.path()), executor.clone(), runner).unwrap();
    let outcome = coordinator.run().unwrap();

    let log = fs::read_to_string(outcome.layout.monitor_log()).unwrap();
    let mut lines = log.lines();
    assert_eq!(
        lines.next().unwrap(),
        "timestamp,cpu_load,mem_pct,cpu_temp,gpu_temp,gpu_util,io_mb_s"
    );
    assert!(outcome.telemetry_samples > 0);
    assert_eq!(lines.count(), outcome.telemetry_samples);

    // run() joined the monitor: the sample count is final.
    let calls_after_run = executor.telemetry_calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(executor.telemetry_calls.load(Ordering::SeqCst), calls_after_run);
}

#[test]
fn repeat_runs_use_independent_output_roots() {
    let base = tempfile::tempdir().unwrap();
    let executor = Arc::new(MockExecutor::reachable());

    for _ in 0..2 {
        let runner = Arc::new(StubRunner::all_pass());
        let coordinator =
            Coordinator::new(fast_config(base.path()), executor.clone(), runner).unwrap();
        let outcome = coordinator.run().unwrap();
        assert!(outcome.layout.combined_report().is_file());
    }

    let roots: Vec<_> = fs::read_dir(base.path()).unwrap().flatten().collect();
    assert_eq!(roots.len(), 2, "each run must get its own output root");
}

#[test]
fn zero_duration_is_accepted() {
    let base = tempfile::tempdir().unwrap();
    let runner = Arc::new(StubRunner::all_pass());
    let mut config = fast_config(base.path());
    config.duration_hours = 0.0;

    let coordinator = Coordinator::new(
        config,
        Arc::new(MockExecutor::reachable()),
        runner.clone(),
    )
    .unwrap();
    let outcome = coordinator.run().unwrap();

    assert_eq!(outcome.verdict.tier, VerdictTier::Excellent);
    assert!(runner.launch_records().iter().all(|l| l.duration_hours == 0.0));
}
