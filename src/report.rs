use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use indoc::indoc;
use log::{info, warn};
use serde_json::json;

use crate::core::config::CoordinatorConfig;
use crate::core::coordinator::CombinedRunOutcome;
use crate::core::error::{CoordinatorError, Result};
use crate::core::verdict::VerdictTier;
use crate::monitor::{self, format_hms};

/// Heading marker every component runner places at the top of its report.
/// Locating it is the only structure the coordinator assumes in runner
/// output; everything else is an opaque blob.
pub const REPORT_MARKER: &str = "TEST REPORT";

/// Lines of runner report included in the combined report per component.
const EXCERPT_LINES: usize = 20;

/// Find the runner's report file under `<output_dir>/reports/` and pull a
/// bounded excerpt starting at the heading marker.
pub fn locate_runner_report(output_dir: &Path) -> (Option<PathBuf>, Option<String>) {
    let reports_dir = output_dir.join("reports");
    let Ok(entries) = fs::read_dir(&reports_dir) else {
        return (None, None);
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    for path in &files {
        let Ok(contents) = fs::read_to_string(path) else {
            continue;
        };
        if let Some(marker_idx) = contents.lines().position(|l| l.contains(REPORT_MARKER)) {
            let excerpt: Vec<&str> = contents
                .lines()
                .skip(marker_idx)
                .take(EXCERPT_LINES)
                .collect();
            return (Some(path.clone()), Some(excerpt.join("\n")));
        }
    }

    // A report without the marker heading is still worth pointing at.
    (files.into_iter().next(), None)
}

/// Render `reports/COMBINED_TEST_REPORT.txt` and the machine-readable
/// `reports/verdict.json`.
pub fn write_combined_report(
    config: &CoordinatorConfig,
    outcome: &CombinedRunOutcome,
) -> Result<()> {
    let mut text = String::new();

    let _ = writeln!(text, "================================================================");
    let _ = writeln!(text, "          JETSON ORIN COMBINED PARALLEL TEST REPORT");
    let _ = writeln!(text, "================================================================");
    let _ = writeln!(text);
    let _ = writeln!(text, "Target host:        {}", config.host);
    let _ = writeln!(text, "Configured duration: {} h", config.duration_hours);
    let _ = writeln!(text, "Wall-clock duration: {}", format_hms(outcome.wall_clock));
    let _ = writeln!(text, "Started:            {}", outcome.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(text, "Finished:           {}", outcome.finished_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(text, "Telemetry samples:  {}", outcome.telemetry_samples);
    let _ = writeln!(text);

    let _ = writeln!(text, "COMPONENT RESULTS");
    let _ = writeln!(text, "-----------------");
    for result in &outcome.results {
        let _ = writeln!(
            text,
            "{:<8} {} (exit code {})",
            result.kind, result.status_label(), result.exit_code
        );
        if let Some(path) = &result.report_path {
            let _ = writeln!(text, "         report: {}", path.display());
        }
        if let Some(summary) = &result.summary {
            for line in summary.lines() {
                let _ = writeln!(text, "         | {}", line);
            }
        }
        let _ = writeln!(text);
    }

    let verdict = &outcome.verdict;
    let _ = writeln!(text, "VERDICT");
    let _ = writeln!(text, "-------");
    let _ = writeln!(
        text,
        "{} of {} components passed ({}%)",
        verdict.passed, verdict.total, verdict.rate
    );
    let _ = writeln!(text, "Overall verdict: {}", verdict.tier.label());
    let _ = writeln!(text);
    text.push_str(tier_guidance(verdict.tier));
    let _ = writeln!(text);

    let peaks = monitor::peak_temperatures(&outcome.layout.monitor_log());
    if peaks.cpu.is_some() || peaks.gpu.is_some() {
        let _ = writeln!(text, "PEAK TEMPERATURES");
        let _ = writeln!(text, "-----------------");
        if let Some(t) = peaks.cpu {
            let _ = writeln!(text, "CPU: {:.1} C", t);
        }
        if let Some(t) = peaks.gpu {
            let _ = writeln!(text, "GPU: {:.1} C", t);
        }
        let _ = writeln!(
            text,
            "Full telemetry: {}",
            outcome.layout.monitor_log().display()
        );
        let _ = writeln!(text);
    }

    fs::write(outcome.layout.combined_report(), &text)
        .map_err(|e| CoordinatorError::Report(format!("Failed to write combined report: {}", e)))?;

    write_verdict_json(config, outcome)?;

    Ok(())
}

fn write_verdict_json(config: &CoordinatorConfig, outcome: &CombinedRunOutcome) -> Result<()> {
    let summary = json!({
        "host": config.host,
        "duration_hours": config.duration_hours,
        "started_at": outcome.started_at.to_rfc3339(),
        "finished_at": outcome.finished_at.to_rfc3339(),
        "wall_clock_seconds": outcome.wall_clock.as_secs(),
        "telemetry_samples": outcome.telemetry_samples,
        "verdict": outcome.verdict,
        "components": outcome.results,
    });

    let pretty = serde_json::to_string_pretty(&summary)
        .map_err(|e| CoordinatorError::Report(format!("Failed to serialize verdict: {}", e)))?;
    fs::write(outcome.layout.verdict_json(), pretty)
        .map_err(|e| CoordinatorError::Report(format!("Failed to write verdict.json: {}", e)))?;

    Ok(())
}

/// Tier-specific prose and next actions. This is the tool's main actionable
/// output for a non-expert operator, so every lower tier carries concrete
/// next steps.
pub fn tier_guidance(tier: VerdictTier) -> &'static str {
    match tier {
        VerdictTier::Excellent => indoc! {"
            All four components passed their stress batteries. The device is
            healthy under combined CPU, GPU, RAM, and storage load.

            Recommended next actions:
              - Archive this report with the device's serial number.
              - The device is cleared for deployment.
        "},
        VerdictTier::AcceptableWithConcerns => indoc! {"
            One component failed while the others passed. The device is
            usable but should not ship without a closer look.

            Recommended next actions:
              - Review the failed component's logs under its test directory.
              - Check the peak temperatures below; thermal throttling during
                combined load is the most common single-component failure.
              - Re-run the failed component's test on its own to rule out
                contention effects.
        "},
        VerdictTier::SystemIssuesDetected => indoc! {"
            Two or more components failed. The device has systemic problems
            under combined load and must not be deployed.

            Recommended next actions:
              - Review each failed component's logs under its test directory.
              - Inspect the target's system error logs (dmesg, syslog) for
                hardware faults recorded during the run.
              - Verify cooling: clean or reseat the heatsink and fan, then
                re-run the combined test.
              - If failures persist, remove the device from the pool for
                bench diagnosis.
        "},
    }
}

/// Best-effort hand-off to an external report-to-PDF converter. Failure is
/// logged and never alters the run's exit code.
pub fn convert_to_pdf(command: &str, report_path: &Path) {
    info!("Converting report to PDF via: {}", command);
    let result = Command::new(command).arg(report_path).status();
    match result {
        Ok(status) if status.success() => {
            info!("PDF conversion completed");
        }
        Ok(status) => {
            warn!("PDF converter exited with {}; plain-text report remains", status);
        }
        Err(e) => {
            warn!("PDF converter could not run: {}; plain-text report remains", e);
        }
    }
}
