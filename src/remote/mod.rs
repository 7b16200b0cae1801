pub mod ssh;

use std::time::Duration;

use crate::core::error::Result;

/// Captured output of one remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam for running a command on the target host.
///
/// The production implementation shells out to an external ssh client; tests
/// substitute a canned executor. All calls are synchronous and blocking.
pub trait RemoteExecutor: Send + Sync {
    fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;
}

/// Cheap probe used by the pre-flight connectivity check.
pub const PROBE_COMMAND: &str = "echo connectivity_ok";

/// Read-only inspection command for the baseline and final-state captures.
/// Every section is allowed to fail individually on targets that lack the
/// corresponding sysfs node.
pub const INSPECTION_COMMAND: &str = concat!(
    "echo '=== uptime ==='; uptime; ",
    "echo '=== memory ==='; free -m; ",
    "echo '=== storage ==='; df -h /; ",
    "echo '=== thermal ==='; ",
    "for z in /sys/devices/virtual/thermal/thermal_zone*; do ",
    "[ -f \"$z/temp\" ] && echo \"$(cat $z/type 2>/dev/null): $(cat $z/temp)\"; ",
    "done; ",
    "echo '=== kernel ==='; uname -a",
);

/// Composite telemetry command emitting one `key=value` line per metric.
/// The thermal zone indices match the Jetson Orin layout (zone0 CPU,
/// zone1 GPU); the GPU load node reports utilization in tenths of percent.
pub const TELEMETRY_COMMAND: &str = concat!(
    "echo \"cpu_load=$(cut -d' ' -f1 /proc/loadavg)\"; ",
    "echo \"mem_pct=$(free | awk '/Mem:/ {printf \"%.1f\", $3/$2*100}')\"; ",
    "echo \"cpu_temp=$(cat /sys/devices/virtual/thermal/thermal_zone0/temp 2>/dev/null)\"; ",
    "echo \"gpu_temp=$(cat /sys/devices/virtual/thermal/thermal_zone1/temp 2>/dev/null)\"; ",
    "echo \"gpu_util=$(cat /sys/devices/platform/gpu.0/load 2>/dev/null)\"; ",
    "echo \"io_sectors=$(awk '/mmcblk0 |nvme0n1 / {print $6+$10; exit}' /proc/diskstats 2>/dev/null)\"",
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput { exit_code: 0, stdout: "ok".into(), stderr: String::new() };
        let bad = CommandOutput { exit_code: 255, stdout: String::new(), stderr: "refused".into() };
        assert!(ok.success());
        assert!(!bad.success());
    }

    #[test]
    fn test_telemetry_command_covers_all_metrics() {
        for key in ["cpu_load", "mem_pct", "cpu_temp", "gpu_temp", "gpu_util", "io_sectors"] {
            assert!(TELEMETRY_COMMAND.contains(key), "missing {}", key);
        }
    }
}
