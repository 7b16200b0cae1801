pub mod process;

use std::path::Path;

use crate::core::component::ComponentTestSpec;
use crate::core::config::CoordinatorConfig;
use crate::core::error::Result;

/// Handle to one launched component test runner.
///
/// The coordinator wraps every handle in a supervising thread; `wait` is the
/// only way to observe the exit status, and it blocks until the runner has
/// terminated.
pub trait RunnerHandle: Send {
    /// Process or job identifier, for status lines.
    fn id(&self) -> u32;

    /// Block until the runner terminates and return its exit code.
    fn wait(&mut self) -> Result<i32>;
}

/// Seam for launching the four black-box component test runners.
///
/// The production implementation spawns external executables; tests inject
/// thread-backed stubs with scripted exit codes.
pub trait ComponentRunner: Send + Sync {
    fn launch(
        &self,
        spec: &ComponentTestSpec,
        config: &CoordinatorConfig,
        output_dir: &Path,
    ) -> Result<Box<dyn RunnerHandle>>;
}
