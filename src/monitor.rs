use std::fs::File;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::core::component::ComponentCell;
use crate::core::error::{CoordinatorError, Result};
use crate::remote::{RemoteExecutor, TELEMETRY_COMMAND};

/// One timestamped snapshot of target-host health metrics.
///
/// Individual fields are optional: a target that lacks a sysfs node simply
/// leaves the column empty for that sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: DateTime<Utc>,
    pub cpu_load: Option<f64>,
    pub mem_pct: Option<f64>,
    pub cpu_temp: Option<f64>,
    pub gpu_temp: Option<f64>,
    pub gpu_util: Option<f64>,
    pub io_mb_s: Option<f64>,
}

impl TelemetrySample {
    pub const CSV_HEADER: [&'static str; 7] = [
        "timestamp", "cpu_load", "mem_pct", "cpu_temp", "gpu_temp", "gpu_util", "io_mb_s",
    ];

    /// Parse the `key=value` lines emitted by [`TELEMETRY_COMMAND`].
    ///
    /// Temperatures arrive in millidegrees and GPU load in tenths of a
    /// percent; the disk counter is cumulative sectors, turned into a rate
    /// against the previous sample by the caller.
    pub fn parse(raw: &str, timestamp: DateTime<Utc>) -> (Self, Option<u64>) {
        let mut sample = Self {
            timestamp,
            cpu_load: None,
            mem_pct: None,
            cpu_temp: None,
            gpu_temp: None,
            gpu_util: None,
            io_mb_s: None,
        };
        let mut io_sectors = None;

        for line in raw.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            match key {
                "cpu_load" => sample.cpu_load = value.parse().ok(),
                "mem_pct" => sample.mem_pct = value.parse().ok(),
                "cpu_temp" => sample.cpu_temp = value.parse::<f64>().ok().map(|v| v / 1000.0),
                "gpu_temp" => sample.gpu_temp = value.parse::<f64>().ok().map(|v| v / 1000.0),
                "gpu_util" => sample.gpu_util = value.parse::<f64>().ok().map(|v| v / 10.0),
                "io_sectors" => io_sectors = value.parse().ok(),
                _ => {}
            }
        }

        (sample, io_sectors)
    }

    fn csv_fields(&self) -> [String; 7] {
        fn fmt(value: Option<f64>) -> String {
            value.map(|v| format!("{:.2}", v)).unwrap_or_default()
        }
        [
            self.timestamp.to_rfc3339(),
            fmt(self.cpu_load),
            fmt(self.mem_pct),
            fmt(self.cpu_temp),
            fmt(self.gpu_temp),
            fmt(self.gpu_util),
            fmt(self.io_mb_s),
        ]
    }
}

/// Peak temperatures extracted from a finished monitoring log.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakTemperatures {
    pub cpu: Option<f64>,
    pub gpu: Option<f64>,
}

/// Scan the monitoring CSV for the hottest CPU/GPU readings of the run.
pub fn peak_temperatures(log_path: &Path) -> PeakTemperatures {
    let mut peaks = PeakTemperatures::default();

    let Ok(mut reader) = csv::Reader::from_path(log_path) else {
        return peaks;
    };
    for record in reader.records().flatten() {
        let cpu = record.get(3).and_then(|f| f.parse::<f64>().ok());
        let gpu = record.get(4).and_then(|f| f.parse::<f64>().ok());
        if let Some(t) = cpu {
            peaks.cpu = Some(peaks.cpu.map_or(t, |p: f64| p.max(t)));
        }
        if let Some(t) = gpu {
            peaks.gpu = Some(peaks.gpu.map_or(t, |p: f64| p.max(t)));
        }
    }

    peaks
}

/// Counters reported by the monitoring thread when it exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorStats {
    pub samples: usize,
    pub status_lines: usize,
}

/// Handle to the monitoring thread. The coordinator stops and joins it
/// explicitly; the thread is never abandoned.
pub struct MonitorHandle {
    stop_tx: Sender<()>,
    join: JoinHandle<MonitorStats>,
}

impl MonitorHandle {
    /// Signal the loop to stop and wait for it.
    pub fn stop(self) -> MonitorStats {
        // The loop may already have exited on its own once all cells
        // turned terminal, so a closed channel is fine here.
        let _ = self.stop_tx.send(());
        self.join.join().unwrap_or_default()
    }
}

/// Timing knobs for the monitoring loop, split from CoordinatorConfig so
/// the thread owns plain values.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSchedule {
    pub sample_interval: Duration,
    pub status_interval: Duration,
    pub command_timeout: Duration,
    pub configured_duration: Duration,
}

/// Spawn the system monitoring loop.
///
/// Every `sample_interval` it collects one telemetry sample and appends it
/// to the CSV log; every `status_interval` (independent cadence) it emits a
/// human-readable status line with per-component liveness. It terminates as
/// soon as all cells are terminal or the stop signal arrives, whichever
/// comes first.
pub fn spawn_monitor(
    executor: Arc<dyn RemoteExecutor>,
    cells: Arc<Vec<Arc<ComponentCell>>>,
    log_path: &Path,
    schedule: MonitorSchedule,
) -> Result<MonitorHandle> {
    let file = File::create(log_path)?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(TelemetrySample::CSV_HEADER)
        .map_err(|e| CoordinatorError::Telemetry(format!("Failed to write monitor header: {}", e)))?;
    writer
        .flush()
        .map_err(|e| CoordinatorError::Telemetry(format!("Failed to flush monitor log: {}", e)))?;

    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let join = thread::spawn(move || {
        let started = Instant::now();
        let mut next_sample = started + schedule.sample_interval;
        let mut next_status = started + schedule.status_interval;
        let mut prev_io: Option<(Instant, u64)> = None;
        let mut stats = MonitorStats::default();

        loop {
            if cells.iter().all(|c| c.is_terminal()) {
                break;
            }

            // The stop channel doubles as the sleep: a stop signal wakes the
            // loop immediately instead of waiting out the interval. Sampling
            // and status lines have independent cadences, so the wait only
            // runs to whichever deadline comes first.
            let wait = next_sample
                .min(next_status)
                .saturating_duration_since(Instant::now());
            match stop_rx.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            if cells.iter().all(|c| c.is_terminal()) {
                break;
            }

            let now = Instant::now();

            if now >= next_sample {
                next_sample = now + schedule.sample_interval;

                match executor.run(TELEMETRY_COMMAND, schedule.command_timeout) {
                    Ok(output) if output.success() => {
                        let taken_at = Instant::now();
                        let (mut sample, io_sectors) =
                            TelemetrySample::parse(&output.stdout, Utc::now());

                        if let (Some((prev_at, prev_sectors)), Some(sectors)) = (prev_io, io_sectors)
                        {
                            let elapsed = taken_at.duration_since(prev_at).as_secs_f64();
                            if elapsed > 0.0 && sectors >= prev_sectors {
                                let bytes = (sectors - prev_sectors) as f64 * 512.0;
                                sample.io_mb_s = Some(bytes / 1_048_576.0 / elapsed);
                            }
                        }
                        if let Some(sectors) = io_sectors {
                            prev_io = Some((taken_at, sectors));
                        }

                        let write = writer
                            .write_record(sample.csv_fields())
                            .and_then(|_| writer.flush().map_err(Into::into));
                        match write {
                            Ok(()) => stats.samples += 1,
                            Err(e) => warn!("Failed to append telemetry sample: {}", e),
                        }
                    }
                    Ok(output) => {
                        warn!(
                            "Telemetry sample failed (exit {}); continuing at next interval",
                            output.exit_code
                        );
                    }
                    Err(e) => {
                        warn!("Telemetry sample failed: {}; continuing at next interval", e);
                    }
                }
            }

            if now >= next_status {
                next_status = now + schedule.status_interval;

                let elapsed = started.elapsed();
                let remaining = schedule.configured_duration.saturating_sub(elapsed);
                let liveness: Vec<String> = cells
                    .iter()
                    .map(|c| format!("{}: {}", c.kind, c.liveness_label()))
                    .collect();
                info!(
                    "[{} elapsed / ~{} remaining] {}",
                    format_hms(elapsed),
                    format_hms(remaining),
                    liveness.join(" | ")
                );
                stats.status_lines += 1;
            }
        }

        stats
    });

    Ok(MonitorHandle { stop_tx, join })
}

/// Format a duration as `1h 2m 3s`, dropping leading zero units.
pub fn format_hms(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
