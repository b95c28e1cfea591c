use std::collections::VecDeque;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use juviz::db::open::open_memory_db;
use juviz::error::{LaunchError, PollError};
use juviz::job::{JobId, JobState};
use juviz::settings::{ConfigStore, SettingsRegistry, SettingsSchema};
use juviz::slurm::launcher::{ParaViewServer, Scheduler, UserData};

/// Scheduler answering polls from a script
///
/// Once the script runs out every query answers `then`.
pub struct MockScheduler {
    job_id: String,
    answers: Mutex<VecDeque<Result<JobState, PollError>>>,
    then: JobState,
    reject: bool,
    pub scripts: Mutex<Vec<String>>,
    pub queries: AtomicUsize,
}

impl MockScheduler {
    pub fn new(answers: Vec<Result<JobState, PollError>>, then: JobState) -> MockScheduler {
        MockScheduler {
            job_id: "4242".to_string(),
            answers: Mutex::new(answers.into()),
            then,
            reject: false,
            scripts: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn rejecting() -> MockScheduler {
        MockScheduler { reject: true, ..MockScheduler::new(Vec::new(), JobState::Pending) }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scheduler for MockScheduler {
    async fn submit(&self, script: &str) -> Result<JobId, LaunchError> {
        if self.reject {
            return Err(LaunchError::Rejected {
                program: "sbatch".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "sbatch: error: invalid account".to_string(),
            });
        }
        self.scripts.lock().unwrap().push(script.to_string());
        Ok(JobId::parse(&self.job_id).unwrap())
    }

    async fn query(&self, _id: &JobId) -> Result<JobState, PollError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.answers.lock().unwrap().pop_front().unwrap_or(Ok(self.then))
    }

    async fn cancel(&self, _id: &JobId) -> Result<(), LaunchError> {
        Ok(())
    }

    async fn running_servers(&self) -> Result<Vec<ParaViewServer>, PollError> {
        Ok(Vec::new())
    }

    async fn user_data(&self) -> Result<UserData, PollError> {
        Ok(UserData::default())
    }
}

/// Fresh directory under the system temp dir
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("juviz-it-{tag}-{}-{:08x}", std::process::id(), rand::random::<u32>()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// In-memory settings for job viz1 on account abc, job output going to `output_dir`
pub fn registry(output_dir: &Path) -> SettingsRegistry {
    let mut registry = SettingsRegistry::open(open_memory_db().unwrap(), SettingsSchema::embedded().unwrap()).unwrap();
    registry.set("account", json!("abc")).unwrap();
    registry.set("name", json!("viz1")).unwrap();
    registry.set("partition", json!("gpu")).unwrap();
    registry.set("nodes", json!(2)).unwrap();
    let stdout = output_dir.join("%x-%j.out");
    registry.set("stdout", json!(stdout.display().to_string())).unwrap();
    registry.set("connectionAttempts", json!(3)).unwrap();
    registry
}
