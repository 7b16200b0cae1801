use std::process::Command;
use std::time::Duration;

use log::debug;

use crate::core::error::{CoordinatorError, Result};
use crate::remote::{CommandOutput, RemoteExecutor};

/// Remote executor backed by the system `ssh` client, with the password
/// supplied through `sshpass`.
///
/// Host-key checking is disabled: validation targets are bench devices that
/// get reflashed between runs and churn their host keys.
pub struct SshExecutor {
    host: String,
    username: String,
    password: String,
}

impl SshExecutor {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl RemoteExecutor for SshExecutor {
    fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        debug!("ssh {}@{}: {}", self.username, self.host, command);

        let output = Command::new("sshpass")
            .arg("-p")
            .arg(&self.password)
            .arg("ssh")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", timeout.as_secs().max(1)))
            .arg(format!("{}@{}", self.username, self.host))
            .arg(command)
            .output()
            .map_err(|e| {
                CoordinatorError::Connectivity(format!(
                    "Failed to invoke ssh client for {}: {}",
                    self.host, e
                ))
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
