use std::collections::HashMap;
use std::process::Command;

use sysinfo::{Pid, System};

use crate::prelude::*;

/// Well-known location of the IIS management tool.
pub const APPCMD_PATH: &str = r"C:\Windows\System32\inetsrv\appcmd.exe";

/// Worker-process pid to application-pool name. Rebuilt from scratch on
/// every run; pids are only valid within the pass that produced them.
pub type WorkerProcessMap = HashMap<u32, String>;

/// Ask IIS for its running worker processes and build the pid -> pool-name
/// map.
///
/// Failing to run appcmd at all, or an `ERROR` line in its output, is fatal
/// for the whole run: without this listing no candidate can be correlated,
/// so there is no useful partial result.
pub fn enumerate_worker_processes(sys: &System) -> Result<WorkerProcessMap> {
    let output = Command::new(APPCMD_PATH)
        .args(["list", "wp"])
        .output()
        .with_context(|| {
            format!(
                "Failed to run {APPCMD_PATH}; make sure IIS is installed and this prompt is elevated"
            )
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let workers = parse_worker_listing(&stdout)?;

    // A failing appcmd with nothing parseable must stay distinguishable
    // from "no worker processes are running".
    if workers.is_empty() && !output.status.success() {
        bail!(
            "appcmd failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    for (&pid, pool) in &workers {
        // Best effort; feeds nothing but this trace.
        let architecture = worker_architecture(sys, pid);
        debug!(
            "Worker process {pid} pool={pool:?} arch={}",
            architecture.as_deref().unwrap_or("unavailable")
        );
    }

    Ok(workers)
}

/// Parse the line-oriented `appcmd list wp` output.
///
/// Each line looks like `WP "1234" (applicationPool:DefaultAppPool)`; the
/// pool name may contain spaces. A line starting with `ERROR` means WAS is
/// not running (or the prompt is not elevated) and aborts the whole pass;
/// any other unparseable line is skipped with a warning.
pub(crate) fn parse_worker_listing(output: &str) -> Result<WorkerProcessMap> {
    let mut workers = WorkerProcessMap::new();
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with("ERROR") {
            bail!("WAS is not running or this prompt is not elevated: {line}");
        }
        let Some((pid, pool)) = parse_worker_line(line) else {
            warn!("Skipping unrecognized appcmd output line: {line:?}");
            continue;
        };
        // appcmd should never list a pid twice; if it does, the last line
        // wins.
        workers.insert(pid, pool);
    }
    Ok(workers)
}

fn parse_worker_line(line: &str) -> Option<(u32, String)> {
    let mut fields = line.splitn(3, ' ');
    let _marker = fields.next()?;
    let pid = fields.next()?.trim_matches('"').parse::<u32>().ok()?;
    let pool = fields
        .next()?
        .strip_prefix("(applicationPool:")?
        .strip_suffix(')')?;
    if pool.is_empty() {
        return None;
    }
    Some((pid, pool.to_string()))
}

/// Read the worker's declared `PROCESSOR_ARCHITECTURE` environment value.
fn worker_architecture(sys: &System, pid: u32) -> Option<String> {
    sys.process(Pid::from_u32(pid))?
        .environ()
        .iter()
        .find_map(|entry| {
            entry
                .to_str()?
                .strip_prefix("PROCESSOR_ARCHITECTURE=")
                .map(str::to_string)
        })
}
