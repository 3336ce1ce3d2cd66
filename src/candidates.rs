use std::ffi::OsStr;

use sysinfo::{System, Users};

use crate::arch::{self, ProcessArchitecture};
use crate::prelude::*;

/// One OS process matching a configured executable name, before correlation
/// against the worker-process map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateProcess {
    /// The matched executable name, not the full path.
    pub process_name: String,
    pub process_id: u32,
    /// Zero when no parent could be resolved.
    pub parent_process_id: u32,
    pub architecture: ProcessArchitecture,
    /// Best effort; empty when the owner could not be determined.
    pub owner: String,
}

/// Collect all running processes whose reported executable name equals
/// `process_name` (case-sensitive, as the OS reports it). Zero matches is a
/// normal outcome, not an error.
pub fn enumerate_candidates(
    sys: &System,
    users: &Users,
    process_name: &str,
) -> Vec<CandidateProcess> {
    let mut candidates: Vec<CandidateProcess> = sys
        .processes()
        .iter()
        .filter(|(_, process)| process.name() == OsStr::new(process_name))
        .map(|(pid, process)| {
            let parent_process_id = process.parent().map(|p| p.as_u32()).unwrap_or(0);
            let owner = process
                .user_id()
                .and_then(|uid| users.get_user_by_id(uid))
                .map(|user| user.name().to_string())
                .unwrap_or_default();
            // A resolver failure becomes Unknown and never aborts the sweep.
            let architecture = arch::resolve(pid.as_u32());
            debug!(
                "Candidate {process_name} pid={pid} parent={parent_process_id} arch={architecture}"
            );
            CandidateProcess {
                process_name: process_name.to_string(),
                process_id: pid.as_u32(),
                parent_process_id,
                architecture,
                owner,
            }
        })
        .collect();

    // The process table iterates in hash order; keep the output stable.
    candidates.sort_by_key(|candidate| candidate.process_id);
    candidates
}

/// Enumerate every configured executable name in order and concatenate the
/// results. Names are matched independently; one process can only ever
/// match a single name, so no de-duplication is needed.
pub fn enumerate_all(
    sys: &System,
    users: &Users,
    process_names: &[String],
) -> Vec<CandidateProcess> {
    process_names
        .iter()
        .flat_map(|name| enumerate_candidates(sys, users, name))
        .collect()
}
