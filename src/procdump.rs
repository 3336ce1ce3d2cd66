use std::path::{Path, PathBuf};
use std::process::Command;

use crate::dispatch::InvocationDescriptor;
use crate::prelude::*;

/// Expand and validate the configured ProcDump path.
pub fn resolve_path(configured: Option<&str>) -> Result<PathBuf> {
    let Some(configured) = configured else {
        bail!("No ProcDump path is configured");
    };
    let path = PathBuf::from(shellexpand::tilde(configured).as_ref());
    if !path.is_file() {
        bail!("ProcDump not found at {}", path.display());
    }
    Ok(path)
}

/// Launch one ProcDump instance against the invocation's target and leave
/// it running. Monitoring or stopping the launched instance is out of
/// scope; killing an attached ProcDump would take the target process down
/// with it.
pub fn launch(procdump: &Path, invocation: &InvocationDescriptor) -> Result<()> {
    let command_line = format!("{} {}", procdump.display(), invocation.args.join(" "));
    Command::new(procdump)
        .args(&invocation.args)
        .spawn()
        .with_context(|| format!("Failed to start: {command_line}"))?;
    info!("Started: {command_line}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn an_unconfigured_path_is_an_error() {
        assert!(resolve_path(None).is_err());
    }

    #[test]
    fn a_missing_file_is_an_error() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let missing = tmp_dir.path().join("procdump.exe");
        assert!(resolve_path(Some(missing.to_str().unwrap())).is_err());
    }

    #[test]
    fn an_existing_file_resolves() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let procdump = tmp_dir.path().join("procdump.exe");
        fs::write(&procdump, b"").unwrap();

        let resolved = resolve_path(Some(procdump.to_str().unwrap())).unwrap();
        assert_eq!(resolved, procdump);
    }
}
