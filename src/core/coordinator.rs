use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::core::component::{ComponentCell, ComponentResult, ComponentTestSpec};
use crate::core::config::{CoordinatorConfig, OutputLayout};
use crate::core::error::{CoordinatorError, Result};
use crate::core::verdict::AggregateVerdict;
use crate::monitor::{self, MonitorSchedule};
use crate::remote::{RemoteExecutor, INSPECTION_COMMAND, PROBE_COMMAND};
use crate::report;
use crate::runners::ComponentRunner;

/// Timeout for the one-shot baseline/final inspection captures.
const INSPECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit code recorded for a runner that could not be spawned at all.
const LAUNCH_FAILURE_CODE: i32 = 127;

/// Everything a caller needs after a combined run: the verdict, the four
/// terminal component records, and where the artifacts landed.
#[derive(Debug)]
pub struct CombinedRunOutcome {
    pub verdict: AggregateVerdict,
    pub results: Vec<ComponentResult>,
    pub layout: OutputLayout,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub wall_clock: Duration,
    pub telemetry_samples: usize,
    /// False when report synthesis failed; the verdict itself still stands.
    pub report_written: bool,
}

/// One launched component test: its liveness cell plus the supervising
/// thread that owns the runner handle.
struct LaunchedComponent {
    spec: ComponentTestSpec,
    cell: Arc<ComponentCell>,
    output_dir: PathBuf,
    /// None when the spawn itself failed; the cell already holds the
    /// failure code in that case.
    supervisor: Option<JoinHandle<i32>>,
}

/// Runs the four component test runners concurrently against one target,
/// observes them to completion, and produces the aggregate verdict plus the
/// combined report.
pub struct Coordinator {
    config: CoordinatorConfig,
    executor: Arc<dyn RemoteExecutor>,
    runner: Arc<dyn ComponentRunner>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        executor: Arc<dyn RemoteExecutor>,
        runner: Arc<dyn ComponentRunner>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, executor, runner })
    }

    /// Execute the full combined test sequence.
    ///
    /// Fatal errors (connectivity, configuration) are only possible before
    /// the first runner launches; afterwards every failure is absorbed into
    /// the verdict or logged.
    pub fn run(&self) -> Result<CombinedRunOutcome> {
        self.preflight()?;

        let layout = OutputLayout::create(&self.config.output_base)?;
        info!("Output directory: {}", layout.root.display());

        self.capture_inspection(layout.baseline_log(), "baseline");

        let started_at = Utc::now();
        let started = Instant::now();

        let launched = self.launch_all(&layout);

        let cells: Arc<Vec<Arc<ComponentCell>>> =
            Arc::new(launched.iter().map(|l| l.cell.clone()).collect());
        let monitor = monitor::spawn_monitor(
            self.executor.clone(),
            cells,
            &layout.monitor_log(),
            MonitorSchedule {
                sample_interval: self.config.sample_interval,
                status_interval: self.config.status_interval,
                command_timeout: INSPECTION_TIMEOUT,
                configured_duration: Duration::from_secs(self.config.duration_seconds()),
            },
        );
        if let Err(e) = &monitor {
            warn!("System monitor could not start: {}", e);
        }

        let results = self.join_all(launched);

        let telemetry_samples = match monitor {
            Ok(handle) => handle.stop().samples,
            Err(_) => 0,
        };

        self.capture_inspection(layout.final_state_log(), "final state");

        let verdict = AggregateVerdict::from_results(&results);
        let finished_at = Utc::now();

        let mut outcome = CombinedRunOutcome {
            verdict,
            results,
            layout,
            started_at,
            finished_at,
            wall_clock: started.elapsed(),
            telemetry_samples,
            report_written: false,
        };

        match report::write_combined_report(&self.config, &outcome) {
            Ok(()) => {
                outcome.report_written = true;
                info!(
                    "Combined report written to {}",
                    outcome.layout.combined_report().display()
                );
                if let Some(cmd) = &self.config.pdf_command {
                    report::convert_to_pdf(cmd, &outcome.layout.combined_report());
                }
            }
            Err(e) => {
                // The report is the primary deliverable; its loss is loud,
                // but the verdict and exit code are already decided.
                error!("Report generation failed: {}", e);
                error!("Tests completed but the combined report is incomplete");
            }
        }

        Ok(outcome)
    }

    /// Short-timeout connectivity probe. Nothing is launched if this fails.
    fn preflight(&self) -> Result<()> {
        info!("Verifying connectivity to {}...", self.config.host);
        let output = self
            .executor
            .run(PROBE_COMMAND, self.config.connect_timeout)
            .map_err(|e| CoordinatorError::Connectivity(format!("{}", e)))?;

        if !output.success() {
            return Err(CoordinatorError::Connectivity(format!(
                "Probe command failed on {} (exit {}): {}",
                self.config.host,
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    /// Run the read-only inspection command and persist its output.
    /// Failure here is a logged gap, never fatal.
    fn capture_inspection(&self, path: PathBuf, label: &str) {
        match self.executor.run(INSPECTION_COMMAND, INSPECTION_TIMEOUT) {
            Ok(output) if output.success() => {
                if let Err(e) = fs::write(&path, output.stdout) {
                    warn!("Failed to persist {} capture: {}", label, e);
                }
            }
            Ok(output) => {
                warn!("{} capture failed (exit {})", label, output.exit_code);
            }
            Err(e) => {
                warn!("{} capture failed: {}", label, e);
            }
        }
    }

    /// Launch the four runners in fixed order with the configured minimum
    /// stagger between launches. The stagger avoids simultaneous
    /// initialization contention on the target (concurrent SSH session
    /// setup, driver initialization races).
    fn launch_all(&self, layout: &OutputLayout) -> Vec<LaunchedComponent> {
        let mut launched = Vec::with_capacity(4);

        for (i, spec) in ComponentTestSpec::all().into_iter().enumerate() {
            if i > 0 {
                thread::sleep(self.config.stagger);
            }

            let output_dir = layout.component_dir(spec.subdir);
            let cell = Arc::new(ComponentCell::new(spec.kind));

            let supervisor = match self.runner.launch(&spec, &self.config, &output_dir) {
                Ok(mut handle) => {
                    info!(
                        "Launched {} test (job {}) -> {}",
                        spec.display_name,
                        handle.id(),
                        output_dir.display()
                    );
                    let cell_for_thread = cell.clone();
                    let name = spec.display_name;
                    Some(thread::spawn(move || {
                        let code = match handle.wait() {
                            Ok(code) => code,
                            Err(e) => {
                                warn!("{} runner wait failed: {}", name, e);
                                -1
                            }
                        };
                        cell_for_thread.complete(code);
                        code
                    }))
                }
                Err(e) => {
                    // One runner failing to spawn never aborts its siblings;
                    // it simply counts as a failed component.
                    error!("{}", e);
                    cell.complete(LAUNCH_FAILURE_CODE);
                    None
                }
            };

            launched.push(LaunchedComponent { spec, cell, output_dir, supervisor });
        }

        launched
    }

    /// Block on each supervisor in launch order and build the terminal
    /// component records. Joining the first handle may itself block while
    /// later handles have already exited; their codes are collected
    /// afterwards without loss or reordering.
    fn join_all(&self, launched: Vec<LaunchedComponent>) -> Vec<ComponentResult> {
        let mut results = Vec::with_capacity(launched.len());

        for component in launched {
            let exit_code = match component.supervisor {
                Some(join) => join.join().unwrap_or_else(|_| {
                    warn!("{} supervisor panicked", component.spec.display_name);
                    -1
                }),
                None => component.cell.exit_code().unwrap_or(LAUNCH_FAILURE_CODE),
            };

            info!(
                "{} test completed with exit code {}",
                component.spec.display_name, exit_code
            );

            let (report_path, summary) = report::locate_runner_report(&component.output_dir);

            results.push(ComponentResult {
                kind: component.spec.kind,
                launched_at: component.cell.launched_at,
                output_dir: component.output_dir,
                exit_code,
                report_path,
                summary,
            });
        }

        results
    }
}
