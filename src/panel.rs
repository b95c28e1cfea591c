//! A launcher session: the settings form, the launch action and a live job status
//!
//! The panel owns nothing global. Its settings store and scheduler are handed in, and the job it
//! launched is followed by a [poll::Poller] task that publishes [Status] updates on a watch
//! channel. Closing (or dropping) the panel cancels that task.

pub mod poll;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{info, warn};
use serde_json::Value;
use tokio::sync::watch;

use crate::bridge::ConnectionTarget;
use crate::error::{ConfigurationError, JobError};
use crate::job::{JobConfiguration, JobId, SubmittedJob};
use crate::settings::{ConfigStore, PollSettings, SettingField};
use crate::slurm::launcher::Scheduler;
use crate::slurm::template::ScriptTemplate;

use poll::{PollHandle, Poller, StatusSender};

/// What the panel shows below the form
#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    Idle,
    Submitting { name: String },
    Tracking(SubmittedJob),
    Connected { job: SubmittedJob, target: ConnectionTarget },
    Failed(String),
    Closed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "No job submitted"),
            Status::Submitting { name } => write!(f, "Submitting {name}"),
            Status::Tracking(job) => write!(f, "Job {} ({}) is {}", job.id, job.name, job.state),
            Status::Connected { job, target } => {
                write!(f, "Job {} ({}) is running, ParaView server at {}", job.id, job.name, target.url)
            }
            Status::Failed(message) => write!(f, "Error: {message}"),
            Status::Closed => write!(f, "Closed"),
        }
    }
}

pub struct Panel<S: ConfigStore> {
    store: S,
    scheduler: Arc<dyn Scheduler>,
    template: ScriptTemplate,
    status: Arc<watch::Sender<Status>>,
    /// bumped whenever polling is cancelled
    generation: Arc<AtomicU64>,
    poll: Option<PollHandle>,
}

impl<S: ConfigStore> Panel<S> {
    pub fn new(store: S, scheduler: Arc<dyn Scheduler>, template: ScriptTemplate) -> Panel<S> {
        let (status, _) = watch::channel(Status::Idle);
        Panel {
            store,
            scheduler,
            template,
            status: Arc::new(status),
            generation: Arc::new(AtomicU64::new(0)),
            poll: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn form(&self) -> Vec<SettingField> {
        self.store.fields()
    }

    pub fn edit(&mut self, key: &str, value: Value) -> Result<(), ConfigurationError> {
        self.store.set(key, value).map_err(|err| {
            self.publish(Status::Failed(err.to_string()));
            err
        })
    }

    pub fn configuration(&self) -> Result<JobConfiguration, ConfigurationError> {
        JobConfiguration::load(&self.store)
    }

    /// The job script a launch would submit
    pub fn render(&self) -> Result<String, ConfigurationError> {
        self.template.render(&self.configuration()?)
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Submit a new job and start following it
    ///
    /// Any job followed so far is dropped (not cancelled in SLURM).
    pub async fn launch(&mut self) -> Result<JobId, JobError> {
        self.cancel_poll();
        let result = self.submit().await;
        if let Err(err) = &result {
            warn!("Launch failed: {err}");
            self.publish(Status::Failed(err.to_string()));
        }
        result
    }

    async fn submit(&mut self) -> Result<JobId, JobError> {
        let config = self.configuration()?;
        let settings = PollSettings::load(&self.store)?;
        let script = self.template.render(&config)?;

        self.publish(Status::Submitting { name: config.job_name.clone() });
        let id = self.scheduler.submit(&script).await?;
        let job = SubmittedJob::new(id.clone(), &config.job_name);
        self.publish(Status::Tracking(job.clone()));

        let sender = StatusSender::new(self.status.clone(), self.generation.clone());
        let poller = Poller::new(self.scheduler.clone(), settings, sender);
        self.poll = Some(poller.spawn(job, config.stdout_path()));
        Ok(id)
    }

    /// Wait until the launched job's server can be reached
    ///
    /// Cancel safe: dropping this future leaves the poll task running until [Panel::close].
    pub async fn wait(&mut self) -> Result<ConnectionTarget, JobError> {
        let handle = self.poll.as_mut().ok_or(JobError::NoJob)?;
        let result = handle.join().await;
        self.poll = None;
        result
    }

    pub fn close(&mut self) {
        self.cancel_poll();
        self.publish(Status::Closed);
    }

    fn cancel_poll(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.poll.take() {
            info!("Cancelling job polling");
            handle.cancel();
        }
    }

    fn publish(&self, status: Status) {
        info!("{status}");
        self.status.send_replace(status);
    }
}

impl<S: ConfigStore> Drop for Panel<S> {
    fn drop(&mut self) {
        self.cancel_poll();
    }
}
