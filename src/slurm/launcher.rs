use std::path::PathBuf;

use async_trait::async_trait;
use log::warn;
use serde::Serialize;

use crate::error::{LaunchError, PollError};
use crate::job::{JobId, JobState};

/// A ParaView server job found in the scheduler queue
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParaViewServer {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    pub nodes: Option<String>,
    pub partition: String,
    pub time_left: Option<String>,
}

/// What a user may submit with
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UserData {
    pub name: String,
    pub accounts: Vec<String>,
    pub partitions: Vec<String>,
    pub home: Option<PathBuf>,
}

/// A batch scheduler that runs job scripts
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Submit a rendered job script, returns the id the scheduler assigned
    async fn submit(&self, script: &str) -> Result<JobId, LaunchError>;

    /// Current state of a job
    ///
    /// Fails with [PollError::UnknownJob] only when the scheduler says the job doesn't exist,
    /// every other failure is [PollError::Transient].
    async fn query(&self, id: &JobId) -> Result<JobState, PollError>;

    async fn cancel(&self, id: &JobId) -> Result<(), LaunchError>;

    /// ParaView servers of the current user, including ones launched in earlier sessions
    async fn running_servers(&self) -> Result<Vec<ParaViewServer>, PollError>;

    async fn user_data(&self) -> Result<UserData, PollError>;
}

/// Poll a job once
///
/// Transient query failures are logged and reported as [JobState::Unknown] so the caller just
/// tries again next interval. A job the scheduler doesn't know is an error.
pub async fn poll_status(scheduler: &dyn Scheduler, id: &JobId) -> Result<JobState, PollError> {
    match scheduler.query(id).await {
        Ok(state) => Ok(state),
        Err(err) if err.is_terminal() => Err(err),
        Err(err) => {
            warn!("Polling job {id} failed, retrying next interval: {err}");
            Ok(JobState::Unknown)
        }
    }
}
