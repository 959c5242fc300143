//! Child-process supervision for `LAUNCH`-activated module entries
//! (SPEC_FULL.md ยง4.4, "Child-process supervisor").

use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::entrypoint::LaunchSpec;
use super::error::TransportError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Owns every child process this gateway has launched. Constructed once by
/// `Topology::create` and torn down only by `Topology::destroy` — there is
/// no implicit global supervisor (SPEC_FULL.md ยง9, "Global process-wide
/// child-process supervisor with file-scope state").
#[derive(Default)]
pub struct ChildSupervisor {
    children: Vec<(String, Child)>,
    max_grace_period: Duration,
}

impl ChildSupervisor {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            max_grace_period: Duration::from_millis(3000),
        }
    }

    /// Launch one child according to `spec`, tracked under `module_name`.
    pub fn launch(&mut self, module_name: &str, spec: &LaunchSpec) -> Result<(), TransportError> {
        let child = Command::new(&spec.path)
            .args(&spec.args)
            .spawn()
            .map_err(|e| TransportError::SpawnFailed(spec.path.clone(), e))?;
        self.max_grace_period = self
            .max_grace_period
            .max(Duration::from_millis(spec.grace_period_ms));
        self.children.push((module_name.to_string(), child));
        info!(module = module_name, path = %spec.path, "launched child process");
        Ok(())
    }

    /// Grace-period shutdown: poll for natural exit, then SIGTERM survivors
    /// (SPEC_FULL.md ยง4.4, steps 1-4).
    pub async fn shutdown(&mut self) {
        let deadline = tokio::time::Instant::now() + self.max_grace_period;
        while tokio::time::Instant::now() < deadline {
            self.children
                .retain_mut(|(_, child)| !matches!(child.try_wait(), Ok(Some(_))));
            if self.children.is_empty() {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }

        for (name, child) in &mut self.children {
            if let Err(err) = terminate(child) {
                error!(module = %name, error = %err, "failed to signal child process on shutdown");
            }
        }
        for (name, child) in &mut self.children {
            if let Err(err) = child.wait().await {
                warn!(module = %name, error = %err, "error waiting for terminated child");
            }
        }
        self.children.clear();
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> Result<(), TransportError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(raw_pid) = child.id() {
        kill(Pid::from_raw(raw_pid as i32), Signal::SIGTERM)
            .map_err(|e| TransportError::Io("control", std::io::Error::from_raw_os_error(e as i32)))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> Result<(), TransportError> {
    child
        .start_kill()
        .map_err(|e| TransportError::Io("control", e))
}
