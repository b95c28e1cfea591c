use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::bridge::{Bridge, ConnectionTarget};
use crate::error::JobError;
use crate::job::{JobState, SubmittedJob};
use crate::panel::Status;
use crate::settings::PollSettings;
use crate::slurm::launcher::{poll_status, Scheduler};

/// Follows one submitted job until its ParaView server can be reached
///
/// Polls run one after another: the next one is scheduled a fixed interval after the previous
/// one finished. Every state change is published as a [Status].
pub struct Poller {
    scheduler: Arc<dyn Scheduler>,
    settings: PollSettings,
    status: StatusSender,
}

/// A poller's side of the panel's status channel
///
/// Stops publishing once the panel has moved past the poller's generation, so an aborted task
/// can't overwrite what the panel published after cancelling it.
pub struct StatusSender {
    status: Arc<watch::Sender<Status>>,
    current: Arc<AtomicU64>,
    generation: u64,
}

impl StatusSender {
    pub fn new(status: Arc<watch::Sender<Status>>, current: Arc<AtomicU64>) -> StatusSender {
        let generation = current.load(Ordering::SeqCst);
        StatusSender { status, current, generation }
    }

    /// false if the poller was cancelled and `status` dropped
    pub fn send(&self, status: Status) -> bool {
        self.status.send_if_modified(|shown| {
            if self.current.load(Ordering::SeqCst) != self.generation {
                return false;
            }
            *shown = status;
            true
        })
    }
}

/// A running [Poller] task
pub struct PollHandle {
    task: JoinHandle<Result<ConnectionTarget, JobError>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Result of the task, [JobError::Cancelled] if it was aborted
    pub async fn join(&mut self) -> Result<ConnectionTarget, JobError> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(JobError::Cancelled),
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        }
    }
}

impl Poller {
    pub fn new(scheduler: Arc<dyn Scheduler>, settings: PollSettings, status: StatusSender) -> Poller {
        Poller { scheduler, settings, status }
    }

    /// Start polling `job`, whose stdout goes to the `stdout` path pattern
    pub fn spawn(self, job: SubmittedJob, stdout: PathBuf) -> PollHandle {
        info!("Polling job {} every {:?}", job.id, self.settings.interval);
        PollHandle { task: tokio::spawn(self.run(job, stdout)) }
    }

    async fn run(self, mut job: SubmittedJob, stdout: PathBuf) -> Result<ConnectionTarget, JobError> {
        let mut bridge = Bridge::new(&stdout, &job, self.settings.connection_attempts);
        let result = self.follow(&mut job, &mut bridge).await;
        let status = match &result {
            Ok(target) => Status::Connected { job, target: target.clone() },
            Err(err) => Status::Failed(format!("job {}: {err}", job.id)),
        };
        info!("{status}");
        self.status.send(status);
        result
    }

    async fn follow(&self, job: &mut SubmittedJob, bridge: &mut Bridge) -> Result<ConnectionTarget, JobError> {
        loop {
            let state = poll_status(self.scheduler.as_ref(), &job.id).await?;
            if job.apply(state) {
                self.status.send(Status::Tracking(job.clone()));
            }

            match job.state {
                JobState::Running => {
                    if let Some(target) = bridge.probe().await? {
                        job.connect(&target.host, target.port);
                        return Ok(target);
                    }
                }
                state if state.is_terminal() => return Err(JobError::Ended(state)),
                _ => {}
            }

            sleep(self.settings.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_pollers_stop_publishing() {
        let (status, receiver) = watch::channel(Status::Idle);
        let status = Arc::new(status);
        let current = Arc::new(AtomicU64::new(0));
        let sender = StatusSender::new(status.clone(), current.clone());

        assert!(sender.send(Status::Failed("first".to_string())));
        assert_eq!(*receiver.borrow(), Status::Failed("first".to_string()));

        current.fetch_add(1, Ordering::SeqCst);
        status.send_replace(Status::Closed);
        assert!(!sender.send(Status::Failed("late".to_string())));
        assert_eq!(*receiver.borrow(), Status::Closed);
    }
}
