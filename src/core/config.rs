use serde::{Serialize, Deserialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{CoordinatorError, Result};

/// Immutable configuration for one combined test run.
///
/// Credentials and timing knobs are fixed at construction and passed by
/// reference into the coordinator and every task it spawns; nothing reads
/// them from the environment afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub host: String,
    pub username: String,
    pub password: String,

    /// Soft test duration handed to every runner, in decimal hours.
    pub duration_hours: f64,

    /// Minimum spacing between successive runner launches.
    pub stagger: Duration,
    /// Telemetry sampling cadence.
    pub sample_interval: Duration,
    /// Console status-line cadence, independent of sampling.
    pub status_interval: Duration,
    /// Timeout for the pre-flight connectivity probe.
    pub connect_timeout: Duration,

    /// Directory under which the timestamped output root is created.
    pub output_base: PathBuf,
    /// Directory holding the four component runner executables.
    pub runner_dir: Option<PathBuf>,
    /// Optional report-to-PDF converter, invoked best-effort after the run.
    pub pdf_command: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            duration_hours: 1.0,
            stagger: Duration::from_secs(2),
            sample_interval: Duration::from_secs(30),
            status_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            output_base: PathBuf::from("."),
            runner_dir: None,
            pdf_command: None,
        }
    }
}

impl CoordinatorConfig {
    /// Parse a duration given as decimal hours, e.g. "0.5" or "2".
    ///
    /// Fractional hours are truncated to whole seconds downstream; the
    /// value itself only needs to be a finite, non-negative decimal.
    pub fn parse_duration_hours(input: &str) -> Result<f64> {
        let hours: f64 = input
            .trim()
            .parse()
            .map_err(|_| CoordinatorError::Config(format!("Invalid duration: {:?}", input)))?;

        if !hours.is_finite() || hours < 0.0 {
            return Err(CoordinatorError::Config(format!(
                "Duration must be a non-negative number of hours, got {}",
                input
            )));
        }

        Ok(hours)
    }

    /// The configured duration as whole seconds, truncated.
    pub fn duration_seconds(&self) -> u64 {
        (self.duration_hours * 3600.0) as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(CoordinatorError::Config("Target host must not be empty".into()));
        }
        if self.username.trim().is_empty() {
            return Err(CoordinatorError::Config("Username must not be empty".into()));
        }
        if !self.duration_hours.is_finite() || self.duration_hours < 0.0 {
            return Err(CoordinatorError::Config(format!(
                "Duration must be non-negative, got {}",
                self.duration_hours
            )));
        }
        Ok(())
    }

    /// Load overrides from a TOML or JSON file; credentials and duration
    /// given on the command line still win.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CoordinatorError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config = if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
            toml::from_str::<Self>(&contents)
                .map_err(|e| CoordinatorError::Config(format!("Failed to parse TOML config: {}", e)))?
        } else {
            serde_json::from_str::<Self>(&contents)
                .map_err(|e| CoordinatorError::Config(format!("Failed to parse JSON config: {}", e)))?
        };

        Ok(config)
    }
}

/// The fixed on-disk layout of one run's output root.
///
/// The root is timestamp-qualified so repeat runs against the same target
/// never collide or overwrite a prior report.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub monitoring_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl OutputLayout {
    pub const COMPONENT_SUBDIRS: [&'static str; 4] =
        ["cpu_test", "gpu_test", "ram_test", "storage_test"];

    /// Create the full directory tree under `base`, named with the current
    /// local timestamp. Back-to-back runs within the same second get a
    /// numeric suffix instead of colliding.
    pub fn create(base: &Path) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut root = base.join(format!("jetson_combined_test_{}", stamp));
        let mut counter = 1;
        while root.exists() {
            counter += 1;
            root = base.join(format!("jetson_combined_test_{}_{}", stamp, counter));
        }
        Self::create_at(root)
    }

    /// Create the tree at an explicit root. Fails if the root already
    /// exists, preserving prior runs.
    pub fn create_at(root: PathBuf) -> Result<Self> {
        if root.exists() {
            return Err(CoordinatorError::Config(format!(
                "Output directory already exists: {}",
                root.display()
            )));
        }

        // Creation failures here happen before any runner launches and must
        // classify as configuration errors for the pre-launch exit code.
        let mkdir = |path: &PathBuf| {
            fs::create_dir_all(path).map_err(|e| {
                CoordinatorError::Config(format!(
                    "Failed to create output directory {}: {}",
                    path.display(),
                    e
                ))
            })
        };

        for subdir in Self::COMPONENT_SUBDIRS {
            mkdir(&root.join(subdir))?;
        }
        let monitoring_dir = root.join("monitoring");
        let logs_dir = root.join("logs");
        let reports_dir = root.join("reports");
        mkdir(&monitoring_dir)?;
        mkdir(&logs_dir)?;
        mkdir(&reports_dir)?;

        Ok(Self { root, monitoring_dir, logs_dir, reports_dir })
    }

    pub fn component_dir(&self, subdir: &str) -> PathBuf {
        self.root.join(subdir)
    }

    pub fn monitor_log(&self) -> PathBuf {
        self.monitoring_dir.join("system_monitor.log")
    }

    pub fn baseline_log(&self) -> PathBuf {
        self.logs_dir.join("baseline.log")
    }

    pub fn final_state_log(&self) -> PathBuf {
        self.logs_dir.join("final_state.log")
    }

    pub fn combined_report(&self) -> PathBuf {
        self.reports_dir.join("COMBINED_TEST_REPORT.txt")
    }

    pub fn verdict_json(&self) -> PathBuf {
        self.reports_dir.join("verdict.json")
    }
}
