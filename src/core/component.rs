use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// The four fixed component kinds validated by a combined run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Cpu,
    Gpu,
    Ram,
    Storage,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Cpu => write!(f, "CPU"),
            ComponentKind::Gpu => write!(f, "GPU"),
            ComponentKind::Ram => write!(f, "RAM"),
            ComponentKind::Storage => write!(f, "Storage"),
        }
    }
}

/// Static description of one component test: how to launch it and where
/// its output lives. Defined once at coordinator start, never mutated.
#[derive(Debug, Clone)]
pub struct ComponentTestSpec {
    pub kind: ComponentKind,
    pub display_name: &'static str,
    pub subdir: &'static str,
    pub program: &'static str,
}

impl ComponentTestSpec {
    /// The fixed battery, in launch order.
    pub fn all() -> [ComponentTestSpec; 4] {
        [
            ComponentTestSpec {
                kind: ComponentKind::Cpu,
                display_name: "CPU",
                subdir: "cpu_test",
                program: "jetson-cpu-test",
            },
            ComponentTestSpec {
                kind: ComponentKind::Gpu,
                display_name: "GPU",
                subdir: "gpu_test",
                program: "jetson-gpu-test",
            },
            ComponentTestSpec {
                kind: ComponentKind::Ram,
                display_name: "RAM",
                subdir: "ram_test",
                program: "jetson-ram-test",
            },
            ComponentTestSpec {
                kind: ComponentKind::Storage,
                display_name: "Storage",
                subdir: "storage_test",
                program: "jetson-storage-test",
            },
        ]
    }
}

/// Terminal record for one launched component test.
///
/// Built by the coordinator after the runner's exit status has been
/// collected; the report renderer consumes this struct and never re-reads
/// runner output itself.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentResult {
    pub kind: ComponentKind,
    pub launched_at: DateTime<Utc>,
    pub output_dir: PathBuf,
    pub exit_code: i32,
    /// Path to the runner's own report file, when one was produced.
    pub report_path: Option<PathBuf>,
    /// Bounded excerpt of that report, located by its heading marker.
    #[serde(skip)]
    pub summary: Option<String>,
}

impl ComponentResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    pub fn status_label(&self) -> &'static str {
        if self.passed() { "PASSED" } else { "FAILED" }
    }
}

/// Liveness cell for one in-flight component test.
///
/// The supervising thread publishes the exit code and then flips `done`;
/// readers (the monitor loop) only ever observe RUNNING or COMPLETED.
#[derive(Debug)]
pub struct ComponentCell {
    pub kind: ComponentKind,
    pub launched_at: DateTime<Utc>,
    done: AtomicBool,
    exit_code: Mutex<Option<i32>>,
}

impl ComponentCell {
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            launched_at: Utc::now(),
            done: AtomicBool::new(false),
            exit_code: Mutex::new(None),
        }
    }

    /// Called exactly once, by the supervising thread, when the runner
    /// process has exited.
    pub fn complete(&self, exit_code: i32) {
        *self.exit_code.lock().unwrap() = Some(exit_code);
        self.done.store(true, Ordering::Release);
    }

    pub fn is_terminal(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// The exit code, present only once the cell is terminal.
    pub fn exit_code(&self) -> Option<i32> {
        if self.is_terminal() {
            *self.exit_code.lock().unwrap()
        } else {
            None
        }
    }

    pub fn liveness_label(&self) -> &'static str {
        if self.is_terminal() { "COMPLETED" } else { "RUNNING" }
    }
}
