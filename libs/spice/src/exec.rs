//! Simulator subprocess execution.
//!
//! Runs a backend's generated run script with a wall-clock budget and a
//! cooperative cancellation flag. On cancellation or timeout the child is
//! given a short grace period to exit on its own, then killed.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::SimError;
use crate::sim::SimContext;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Runs the script at `script` inside the context's working directory,
/// blocking until it exits, is canceled, or exceeds the timeout.
pub fn run_script(ctx: &SimContext, script: &Path) -> Result<(), SimError> {
    if ctx.cancel.load(Ordering::Relaxed) {
        return Err(SimError::Canceled);
    }
    debug!(script = %script.display(), "launching simulator");
    let mut child = Command::new("/bin/sh")
        .arg(script)
        .current_dir(&ctx.work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                return Ok(());
            }
            return Err(SimError::Failed(format!(
                "simulator exited with {status}"
            )));
        }
        if ctx.cancel.load(Ordering::Relaxed) {
            terminate(&mut child);
            return Err(SimError::Canceled);
        }
        if start.elapsed() > ctx.timeout {
            warn!(timeout = ?ctx.timeout, "simulator exceeded its time budget");
            terminate(&mut child);
            return Err(SimError::Timeout(ctx.timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Gives the child a grace period to exit, then kills it.
fn terminate(child: &mut std::process::Child) {
    let deadline = Instant::now() + GRACE_PERIOD;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(_) => break,
        }
    }
    if child.kill().is_err() {
        // Already gone.
        return;
    }
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;

    fn script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("run.sh");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh\n{body}").unwrap();
        path
    }

    fn test_dir(name: &str) -> std::path::PathBuf {
        let dir = std::path::PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/build"))
            .join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn successful_scripts_return_ok() {
        let dir = test_dir("exec_ok");
        let script = script(&dir, "exit 0");
        let ctx = SimContext::new(&dir);
        run_script(&ctx, &script).unwrap();
    }

    #[test]
    fn failing_scripts_are_reported() {
        let dir = test_dir("exec_fail");
        let script = script(&dir, "exit 3");
        let ctx = SimContext::new(&dir);
        assert!(matches!(
            run_script(&ctx, &script),
            Err(SimError::Failed(_))
        ));
    }

    #[test]
    fn timeouts_kill_the_child() {
        let dir = test_dir("exec_timeout");
        let script = script(&dir, "sleep 30");
        let ctx = SimContext::new(&dir).with_timeout(Duration::from_millis(100));
        let start = Instant::now();
        assert!(matches!(
            run_script(&ctx, &script),
            Err(SimError::Timeout(_))
        ));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn preset_cancel_flag_prevents_launch() {
        let dir = test_dir("exec_cancel");
        let script = script(&dir, "exit 0");
        let cancel = Arc::new(AtomicBool::new(true));
        let ctx = SimContext::new(&dir).with_cancel(cancel);
        assert!(matches!(run_script(&ctx, &script), Err(SimError::Canceled)));
    }
}
