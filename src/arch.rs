use std::fmt;

use crate::prelude::*;

/// Bitness classification of a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessArchitecture {
    X86,
    X64,
    /// The OS query failed; callers must resolve this through an explicit
    /// choice or skip the process.
    Unknown,
}

impl fmt::Display for ProcessArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessArchitecture::X86 => "x86",
            ProcessArchitecture::X64 => "x64",
            ProcessArchitecture::Unknown => "unknown",
        })
    }
}

/// Answers whether a process runs under WOW64, i.e. 32-bit emulation on a
/// 64-bit host. The query can fail on its own: missing permissions, or the
/// process exited between enumeration and the query.
pub trait BitnessProbe {
    fn is_wow64(&self, pid: u32) -> Result<bool>;
}

/// Probe backed by the operating system.
pub struct SystemProbe;

#[cfg(windows)]
impl BitnessProbe for SystemProbe {
    fn is_wow64(&self, pid: u32) -> Result<bool> {
        use windows::Win32::Foundation::{BOOL, CloseHandle, HANDLE};
        use windows::Win32::System::Threading::{
            IsWow64Process, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        // Closed on drop, so the handle is released even when the wow64
        // query fails.
        struct ProcessHandle(HANDLE);
        impl Drop for ProcessHandle {
            fn drop(&mut self) {
                unsafe {
                    let _ = CloseHandle(self.0);
                }
            }
        }

        let handle = ProcessHandle(
            unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }
                .with_context(|| format!("Failed to open process {pid}"))?,
        );

        let mut wow64 = BOOL::default();
        unsafe { IsWow64Process(handle.0, &mut wow64) }
            .with_context(|| format!("IsWow64Process failed for process {pid}"))?;
        Ok(wow64.as_bool())
    }
}

#[cfg(not(windows))]
impl BitnessProbe for SystemProbe {
    /// No WOW64 subsystem to query; report 32-bit without asking, matching
    /// how pre-WOW64 Windows versions are treated.
    fn is_wow64(&self, _pid: u32) -> Result<bool> {
        Ok(true)
    }
}

/// Resolve the architecture of `pid`, mapping a probe failure to
/// [`ProcessArchitecture::Unknown`] instead of propagating it.
pub fn resolve_with<P: BitnessProbe>(probe: &P, pid: u32) -> ProcessArchitecture {
    match probe.is_wow64(pid) {
        Ok(true) => ProcessArchitecture::X86,
        Ok(false) => ProcessArchitecture::X64,
        Err(err) => {
            debug!("Could not resolve bitness of process {pid}: {err:#}");
            ProcessArchitecture::Unknown
        }
    }
}

pub fn resolve(pid: u32) -> ProcessArchitecture {
    resolve_with(&SystemProbe, pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Stands in for the process handle the real probe holds open while it
    /// queries the OS.
    struct Handle(Rc<Cell<u32>>);

    impl Drop for Handle {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct ScriptedProbe {
        wow64: bool,
        fail: bool,
        releases: Rc<Cell<u32>>,
    }

    impl BitnessProbe for ScriptedProbe {
        fn is_wow64(&self, _pid: u32) -> Result<bool> {
            let _handle = Handle(Rc::clone(&self.releases));
            if self.fail {
                bail!("access denied");
            }
            Ok(self.wow64)
        }
    }

    fn probe(wow64: bool, fail: bool) -> (ScriptedProbe, Rc<Cell<u32>>) {
        let releases = Rc::new(Cell::new(0));
        let probe = ScriptedProbe {
            wow64,
            fail,
            releases: Rc::clone(&releases),
        };
        (probe, releases)
    }

    #[test]
    fn wow64_process_is_x86() {
        let (probe, releases) = probe(true, false);
        assert_eq!(resolve_with(&probe, 1234), ProcessArchitecture::X86);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn native_process_is_x64() {
        let (probe, releases) = probe(false, false);
        assert_eq!(resolve_with(&probe, 1234), ProcessArchitecture::X64);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn failed_query_yields_unknown_and_releases_the_handle_once() {
        let (probe, releases) = probe(false, true);
        assert_eq!(resolve_with(&probe, 1234), ProcessArchitecture::Unknown);
        assert_eq!(releases.get(), 1);
    }
}
