use std::fmt;

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::job::JobState;

/// SLURM job id, as printed by `sbatch --parsable`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Only plain numeric ids are accepted
    pub fn parse(text: &str) -> Option<JobId> {
        let text = text.trim();
        match !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
            true => Some(JobId(text.to_string())),
            false => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A job accepted by the scheduler
///
/// Only the poller changes it. It isn't persisted: a new submission or closing the panel
/// discards it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmittedJob {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmittedJob {
    pub fn new(id: JobId, name: &str) -> SubmittedJob {
        SubmittedJob {
            id,
            name: name.to_string(),
            state: JobState::Pending,
            hostname: None,
            port: None,
            submitted_at: Utc::now(),
        }
    }

    /// Record a polled state, returns true if the job changed state
    ///
    /// Unknown means the poll itself failed and says nothing about the job. Completed and failed
    /// jobs stay that way.
    pub fn apply(&mut self, state: JobState) -> bool {
        if state == JobState::Unknown || state == self.state || self.state.is_terminal() {
            return false;
        }
        info!("Job {} ({}): {} -> {}", self.id, self.name, self.state, state);
        self.state = state;
        true
    }

    pub fn connect(&mut self, hostname: &str, port: u16) {
        self.hostname = Some(hostname.to_string());
        self.port = Some(port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> SubmittedJob {
        SubmittedJob::new(JobId::parse("4242").unwrap(), "viz1")
    }

    #[test]
    fn job_ids_are_numeric() {
        assert_eq!(JobId::parse(" 123\n").unwrap().as_str(), "123");
        assert!(JobId::parse("").is_none());
        assert!(JobId::parse("12a").is_none());
        assert!(JobId::parse("Submitted batch job 12").is_none());
    }

    #[test]
    fn running_is_entered_once() {
        let mut job = job();
        assert!(job.apply(JobState::Running));
        assert!(!job.apply(JobState::Running));
        assert_eq!(job.state, JobState::Running);
    }

    #[test]
    fn unknown_keeps_the_last_known_state() {
        let mut job = job();
        assert!(!job.apply(JobState::Unknown));
        assert_eq!(job.state, JobState::Pending);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut job = job();
        assert!(job.apply(JobState::Failed));
        assert!(!job.apply(JobState::Running));
        assert_eq!(job.state, JobState::Failed);
    }
}
