use crate::arch::ProcessArchitecture;
use crate::correlate::CorrelatedProcess;
use crate::prelude::*;

/// Everything needed to launch ProcDump against one correlated process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationDescriptor {
    pub process_id: u32,
    /// Full ProcDump argument list: `-accepteula <pid> [-64] <passthrough>`.
    pub args: Vec<String>,
}

/// Aggregate result of matching a target pool name. A zero `matched` count
/// is a normal outcome; fatal enumeration failures never reach this stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchOutcome {
    pub scanned: usize,
    pub matched: usize,
    pub invocations: Vec<InvocationDescriptor>,
}

/// Case-insensitive, locale-independent pool-name equality. User input is
/// matched exactly: no trimming, no substring matching.
pub fn pool_name_matches(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Filter the correlated processes on `target_pool` and build one ProcDump
/// invocation per match.
///
/// A match with `Unknown` architecture defers to `choose_arch`; returning
/// `None` abandons that one candidate (a cancellation, not an error) while
/// the remaining matches are still processed.
pub fn match_pool(
    correlated: &[CorrelatedProcess],
    target_pool: &str,
    passthrough_args: &[String],
    mut choose_arch: impl FnMut(&CorrelatedProcess) -> Option<ProcessArchitecture>,
) -> MatchOutcome {
    let mut outcome = MatchOutcome {
        scanned: correlated.len(),
        ..Default::default()
    };

    for process in correlated {
        if !pool_name_matches(&process.app_pool_name, target_pool) {
            continue;
        }
        outcome.matched += 1;

        let architecture = match process.architecture {
            ProcessArchitecture::Unknown => match choose_arch(process) {
                Some(choice) => choice,
                None => {
                    info!(
                        "Skipping pid {}: bitness left unresolved",
                        process.process_id
                    );
                    continue;
                }
            },
            resolved => resolved,
        };

        let mut args = vec!["-accepteula".to_string(), process.process_id.to_string()];
        if architecture != ProcessArchitecture::X86 {
            args.push("-64".to_string());
        }
        args.extend(passthrough_args.iter().cloned());

        outcome.invocations.push(InvocationDescriptor {
            process_id: process.process_id,
            args,
        });
    }

    outcome
}
