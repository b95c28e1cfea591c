use std::fmt;

use serde::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Unknown,
}

/// A simple way to keep track of job state.
///
/// SLURM reports many more states than the launcher cares about, they are folded into
/// pending, running and the two terminal states. Unknown is only ever a poll result, it means
/// the scheduler couldn't be asked this time.
impl JobState {
    pub fn from_slurm(state: &str) -> JobState {
        // sacct reports things like "CANCELLED by 1234"
        let word = state.split_whitespace().next().unwrap_or_default();
        match word.trim_end_matches('+') {
            "PENDING" | "CONFIGURING" | "REQUEUED" | "REQUEUE_HOLD" | "REQUEUE_FED" | "RESIZING"
            | "SUSPENDED" => JobState::Pending,
            "RUNNING" | "COMPLETING" | "STAGE_OUT" => JobState::Running,
            "COMPLETED" => JobState::Completed,
            "FAILED" | "CANCELLED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "BOOT_FAIL"
            | "DEADLINE" | "PREEMPTED" | "REVOKED" => JobState::Failed,
            _ => JobState::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slurm_states_fold_into_job_states() {
        assert_eq!(JobState::from_slurm("PENDING"), JobState::Pending);
        assert_eq!(JobState::from_slurm("CONFIGURING"), JobState::Pending);
        assert_eq!(JobState::from_slurm("RUNNING"), JobState::Running);
        assert_eq!(JobState::from_slurm("COMPLETING"), JobState::Running);
        assert_eq!(JobState::from_slurm("COMPLETED"), JobState::Completed);
        assert_eq!(JobState::from_slurm("TIMEOUT"), JobState::Failed);
        assert_eq!(JobState::from_slurm("CANCELLED by 1234"), JobState::Failed);
        assert_eq!(JobState::from_slurm("CANCELLED+"), JobState::Failed);
        assert_eq!(JobState::from_slurm(""), JobState::Unknown);
        assert_eq!(JobState::from_slurm("SPECIAL_EXIT"), JobState::Unknown);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Unknown.is_terminal());
    }
}
