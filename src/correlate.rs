use crate::arch::ProcessArchitecture;
use crate::candidates::CandidateProcess;
use crate::pool::WorkerProcessMap;
use crate::prelude::*;

/// A candidate joined to its application pool through its parent pid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedProcess {
    pub process_name: String,
    pub process_id: u32,
    pub parent_process_id: u32,
    pub architecture: ProcessArchitecture,
    pub owner: String,
    pub app_pool_name: String,
}

/// Outcome of correlating one candidate against the worker-process map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    Found(CorrelatedProcess),
    /// The parent pid is not a known worker process: either a non-IIS-hosted
    /// instance of the same executable, or a parent that already exited.
    NotCorrelated,
}

/// Look the candidate's immediate parent up in the worker-process map.
/// Deeper ancestry is not followed: a worker that spawns an intermediate
/// supervisor before the runtime host will not correlate.
pub fn correlate(candidate: &CandidateProcess, workers: &WorkerProcessMap) -> Correlation {
    match workers.get(&candidate.parent_process_id) {
        Some(pool) => Correlation::Found(CorrelatedProcess {
            process_name: candidate.process_name.clone(),
            process_id: candidate.process_id,
            parent_process_id: candidate.parent_process_id,
            architecture: candidate.architecture,
            owner: candidate.owner.clone(),
            app_pool_name: pool.clone(),
        }),
        None => Correlation::NotCorrelated,
    }
}

/// Join candidates to their owning pools. Misses are dropped, which is
/// expected in normal operation (development-mode processes have no IIS
/// parent). Candidates sharing one worker parent each stay a distinct
/// record.
pub fn join(candidates: Vec<CandidateProcess>, workers: &WorkerProcessMap) -> Vec<CorrelatedProcess> {
    candidates
        .into_iter()
        .filter_map(|candidate| match correlate(&candidate, workers) {
            Correlation::Found(process) => Some(process),
            Correlation::NotCorrelated => {
                debug!(
                    "Dropping pid {} ({}): parent {} is not an IIS worker process",
                    candidate.process_id, candidate.process_name, candidate.parent_process_id
                );
                None
            }
        })
        .collect()
}
