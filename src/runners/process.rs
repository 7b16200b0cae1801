use std::fs::{self, File};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use log::debug;

use crate::core::component::ComponentTestSpec;
use crate::core::config::CoordinatorConfig;
use crate::core::error::{CoordinatorError, Result};
use crate::runners::{ComponentRunner, RunnerHandle};

/// Launches each component test as an external child process.
///
/// Invocation convention shared with the runner executables:
/// `<program> <host> <user> <password> <duration_hours> <output_dir>`.
/// The runner owns its output directory; this side only captures the raw
/// transcript under `<output_dir>/logs/`.
pub struct ProcessRunner;

impl ComponentRunner for ProcessRunner {
    fn launch(
        &self,
        spec: &ComponentTestSpec,
        config: &CoordinatorConfig,
        output_dir: &Path,
    ) -> Result<Box<dyn RunnerHandle>> {
        let program = match &config.runner_dir {
            Some(dir) => dir.join(spec.program),
            None => spec.program.into(),
        };

        let logs_dir = output_dir.join("logs");
        fs::create_dir_all(&logs_dir)?;
        let transcript = File::create(logs_dir.join("runner.log"))?;
        let transcript_err = transcript.try_clone()?;

        debug!("Launching {} runner: {}", spec.display_name, program.display());

        let child = Command::new(&program)
            .arg(&config.host)
            .arg(&config.username)
            .arg(&config.password)
            .arg(config.duration_hours.to_string())
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(transcript)
            .stderr(transcript_err)
            .spawn()
            .map_err(|e| CoordinatorError::Launch {
                component: spec.display_name.to_string(),
                reason: format!("{}: {}", program.display(), e),
            })?;

        Ok(Box::new(ProcessHandle { child }))
    }
}

/// Handle around a spawned runner process.
pub struct ProcessHandle {
    child: Child,
}

impl RunnerHandle for ProcessHandle {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait()?;
        // A signal-terminated runner has no code; treat it as a failure.
        Ok(status.code().unwrap_or(-1))
    }
}
