use std::env;
use std::path::PathBuf;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use log::{debug, info};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{LaunchError, PollError};
use crate::job::{JobId, JobState};
use crate::slurm::launcher::{ParaViewServer, Scheduler, UserData};

/// Comment the job script sets, marks jobs launched from here
pub const JOB_COMMENT: &str = "juviz";

/// Runs sbatch, squeue, sacct, scancel, sacctmgr and sinfo
pub struct Slurm {
    /// directory holding the SLURM binaries, PATH lookup if unset
    bin_dir: Option<PathBuf>,
}

impl Slurm {
    pub fn new(bin_dir: Option<PathBuf>) -> Slurm {
        Slurm { bin_dir }
    }

    fn command(&self, program: &str) -> Command {
        let mut command = match &self.bin_dir {
            Some(dir) => Command::new(dir.join(program)),
            None => Command::new(program),
        };
        command.kill_on_drop(true);
        command
    }

    async fn output(&self, program: &str, arguments: &[&str]) -> std::io::Result<Output> {
        let mut cmd = self.command(program);
        cmd.args(arguments);
        debug!("Running {:?}", &cmd);
        cmd.output().await
    }

    /// Look a job up in the accounting database, for jobs squeue has forgotten
    async fn query_accounting(&self, id: &JobId) -> Result<JobState, PollError> {
        let output = self
            .output("sacct", &["-n", "-P", "-X", "-j", id.as_str(), "-o", "State"])
            .await
            .map_err(|err| PollError::Transient(format!("can't run sacct: {err}")))?;
        if !output.status.success() {
            return Err(PollError::Transient(failure("sacct", &output)));
        }
        match parse_state_lines(&String::from_utf8_lossy(&output.stdout)) {
            Some(state) => Ok(state),
            None => Err(PollError::UnknownJob(id.to_string())),
        }
    }

    async fn lines(&self, program: &str, arguments: &[&str]) -> Result<Vec<String>, PollError> {
        let output = self
            .output(program, arguments)
            .await
            .map_err(|err| PollError::Transient(format!("can't run {program}: {err}")))?;
        if !output.status.success() {
            return Err(PollError::Transient(failure(program, &output)));
        }
        Ok(unique_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn failure(program: &str, output: &Output) -> String {
    format!(
        "{program} exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    )
}

#[async_trait]
impl Scheduler for Slurm {
    async fn submit(&self, script: &str) -> Result<JobId, LaunchError> {
        let spawn_error = |source| LaunchError::Spawn { program: "sbatch".to_string(), source };

        let mut sbatch = self.command("sbatch");
        sbatch
            .arg("--parsable")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        info!("Running sbatch process");
        info!("{:?}", &sbatch);
        let mut child = sbatch.spawn().map_err(spawn_error)?;

        // script goes in on stdin, sbatch reads it until EOF
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await.map_err(spawn_error)?;
        }
        let output = child.wait_with_output().await.map_err(spawn_error)?;

        if !output.status.success() {
            return Err(LaunchError::Rejected {
                program: "sbatch".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let job_id = parse_submission(&String::from_utf8_lossy(&output.stdout))?;
        info!("SLURM job id: {job_id}");
        Ok(job_id)
    }

    async fn query(&self, id: &JobId) -> Result<JobState, PollError> {
        let output = self
            .output("squeue", &["-h", "-j", id.as_str(), "-o", "%T"])
            .await
            .map_err(|err| PollError::Transient(format!("can't run squeue: {err}")))?;

        if output.status.success() {
            if let Some(state) = parse_state_lines(&String::from_utf8_lossy(&output.stdout)) {
                return Ok(state);
            }
        } else if !is_invalid_job(&String::from_utf8_lossy(&output.stderr)) {
            return Err(PollError::Transient(failure("squeue", &output)));
        }

        debug!("Job {id} left the queue, asking sacct");
        self.query_accounting(id).await
    }

    async fn cancel(&self, id: &JobId) -> Result<(), LaunchError> {
        info!("Cancelling job {id}");
        let output = self.output("scancel", &[id.as_str()]).await.map_err(|source| LaunchError::Spawn {
            program: "scancel".to_string(),
            source,
        })?;
        match output.status.success() {
            true => Ok(()),
            false => Err(LaunchError::Rejected {
                program: "scancel".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    async fn running_servers(&self) -> Result<Vec<ParaViewServer>, PollError> {
        let lines = self
            .lines("squeue", &["--me", "-h", "-o", "%i|%j|%T|%N|%P|%L|%k"])
            .await?;
        Ok(lines.iter().filter_map(|line| parse_server(line)).collect())
    }

    async fn user_data(&self) -> Result<UserData, PollError> {
        let name = env::var("USER").map_err(|_| PollError::Transient("USER is not set".to_string()))?;
        let user = format!("user={name}");
        let accounts = self
            .lines("sacctmgr", &["-n", "-P", "show", "associations", user.as_str(), "format=account"])
            .await?;
        let partitions = self.lines("sinfo", &["-h", "-o", "%R"]).await?;

        Ok(UserData {
            name,
            accounts,
            partitions,
            home: env::var_os("HOME").map(PathBuf::from),
        })
    }
}

/// `sbatch --parsable` prints `<id>` or `<id>;<cluster>`
pub fn parse_submission(stdout: &str) -> Result<JobId, LaunchError> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.split(';').next())
        .and_then(JobId::parse)
        .ok_or_else(|| LaunchError::UnparseableId(stdout.to_string()))
}

/// First state word printed by squeue or sacct, None if there's none
fn parse_state_lines(stdout: &str) -> Option<JobState> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(JobState::from_slurm)
}

fn is_invalid_job(stderr: &str) -> bool {
    stderr.contains("Invalid job id")
}

/// Sorted, de-duplicated, non-empty lines
fn unique_lines(stdout: &str) -> Vec<String> {
    let mut lines: Vec<String> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    lines.sort();
    lines.dedup();
    lines
}

/// One `%i|%j|%T|%N|%P|%L|%k` squeue line, None unless it's one of our jobs
fn parse_server(line: &str) -> Option<ParaViewServer> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    let [id, name, state, nodes, partition, time_left, comment] = fields.as_slice() else {
        return None;
    };
    if *comment != JOB_COMMENT {
        return None;
    }
    let optional = |value: &str| match value {
        "" | "(null)" => None,
        value => Some(value.to_string()),
    };
    Some(ParaViewServer {
        id: JobId::parse(*id)?,
        name: name.to_string(),
        state: JobState::from_slurm(*state),
        nodes: optional(*nodes),
        partition: partition.to_string(),
        time_left: optional(*time_left),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parsable_sbatch_output() {
        assert_eq!(parse_submission("123456\n").unwrap().as_str(), "123456");
        assert_eq!(parse_submission("\n987;cluster1\n").unwrap().as_str(), "987");
        assert!(matches!(parse_submission(""), Err(LaunchError::UnparseableId(_))));
        assert!(matches!(
            parse_submission("Submitted batch job 12\n"),
            Err(LaunchError::UnparseableId(_))
        ));
    }

    #[test]
    fn parses_queue_and_accounting_states() {
        assert_eq!(parse_state_lines("RUNNING\n"), Some(JobState::Running));
        assert_eq!(parse_state_lines("\n  PENDING  \n"), Some(JobState::Pending));
        assert_eq!(parse_state_lines("CANCELLED by 501\n"), Some(JobState::Failed));
        assert_eq!(parse_state_lines(""), None);
    }

    #[test]
    fn recognises_unknown_job_errors() {
        assert!(is_invalid_job("slurm_load_jobs error: Invalid job id specified\n"));
        assert!(!is_invalid_job("slurm_load_jobs error: Socket timed out on send/recv operation"));
    }

    #[test]
    fn lists_only_launcher_jobs() {
        let running = parse_server("4242|viz1|RUNNING|node[01-02]|gpu|58:12|juviz").unwrap();
        assert_eq!(running.id.as_str(), "4242");
        assert_eq!(running.state, JobState::Running);
        assert_eq!(running.nodes.as_deref(), Some("node[01-02]"));
        assert_eq!(running.time_left.as_deref(), Some("58:12"));

        let pending = parse_server("4243|viz2|PENDING||gpu|1:00:00|juviz").unwrap();
        assert_eq!(pending.nodes, None);

        assert!(parse_server("4244|train|RUNNING|node03|gpu|2:00|(null)").is_none());
        assert!(parse_server("garbage").is_none());
    }

    #[test]
    fn unique_lines_sorts_and_dedups() {
        assert_eq!(unique_lines("gpu\nbatch\n\ngpu\n"), vec!["batch", "gpu"]);
    }

    #[cfg(unix)]
    mod commands {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        use super::*;
        use crate::slurm::launcher::poll_status;
        use crate::trame::tests::scratch_dir;

        fn fake_binary(dir: &Path, name: &str, body: &str) {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn job() -> JobId {
            JobId::parse("777").unwrap()
        }

        #[tokio::test]
        async fn sbatch_reads_the_script_from_stdin() {
            let bin = scratch_dir("sbatch");
            fake_binary(&bin, "sbatch", "cat > \"$(dirname \"$0\")/submitted.sh\"\necho '777;cluster1'");
            let script = "#!/bin/bash\n#SBATCH --job-name=\"viz1\"\nsrun pvserver\n";

            let id = Slurm::new(Some(bin.clone())).submit(script).await.unwrap();
            assert_eq!(id, job());
            assert_eq!(fs::read_to_string(bin.join("submitted.sh")).unwrap(), script);
            fs::remove_dir_all(bin).unwrap();
        }

        #[tokio::test]
        async fn failing_sbatch_is_a_launch_error() {
            let bin = scratch_dir("sbatch-fails");
            fake_binary(&bin, "sbatch", "cat > /dev/null\necho 'sbatch: error: invalid account' >&2\nexit 1");

            let err = Slurm::new(Some(bin.clone())).submit("#!/bin/bash\n").await.unwrap_err();
            match err {
                LaunchError::Rejected { program, stderr, .. } => {
                    assert_eq!(program, "sbatch");
                    assert_eq!(stderr, "sbatch: error: invalid account");
                }
                other => panic!("expected a rejected submission, got {other:?}"),
            }
            fs::remove_dir_all(bin).unwrap();
        }

        #[tokio::test]
        async fn queued_jobs_come_from_squeue() {
            let bin = scratch_dir("squeue");
            fake_binary(&bin, "squeue", "echo RUNNING");
            fake_binary(&bin, "sacct", "exit 1");

            assert_eq!(Slurm::new(Some(bin.clone())).query(&job()).await.unwrap(), JobState::Running);
            fs::remove_dir_all(bin).unwrap();
        }

        #[tokio::test]
        async fn jobs_missing_from_the_queue_are_looked_up_in_sacct() {
            let bin = scratch_dir("sacct");
            fake_binary(&bin, "squeue", "exit 0");
            fake_binary(&bin, "sacct", "echo COMPLETED");

            assert_eq!(Slurm::new(Some(bin.clone())).query(&job()).await.unwrap(), JobState::Completed);
            fs::remove_dir_all(bin).unwrap();
        }

        #[tokio::test]
        async fn jobs_nobody_knows_stop_the_polling() {
            let bin = scratch_dir("unknown-job");
            fake_binary(&bin, "squeue", "echo 'slurm_load_jobs error: Invalid job id specified' >&2\nexit 1");
            fake_binary(&bin, "sacct", "exit 0");
            let slurm = Slurm::new(Some(bin.clone()));

            assert!(matches!(slurm.query(&job()).await, Err(PollError::UnknownJob(id)) if id == "777"));
            assert!(matches!(poll_status(&slurm, &job()).await, Err(PollError::UnknownJob(_))));
            fs::remove_dir_all(bin).unwrap();
        }

        #[tokio::test]
        async fn other_squeue_failures_are_retried() {
            let bin = scratch_dir("squeue-down");
            fake_binary(&bin, "squeue", "echo 'slurm_load_jobs error: Socket timed out on send/recv operation' >&2\nexit 1");
            fake_binary(&bin, "sacct", "echo COMPLETED");
            let slurm = Slurm::new(Some(bin.clone()));

            assert!(matches!(slurm.query(&job()).await, Err(PollError::Transient(_))));
            assert_eq!(poll_status(&slurm, &job()).await.unwrap(), JobState::Unknown);
            fs::remove_dir_all(bin).unwrap();
        }

        #[tokio::test]
        async fn missing_binaries_are_transient() {
            let bin = scratch_dir("no-slurm");
            let slurm = Slurm::new(Some(bin.clone()));

            assert!(matches!(slurm.query(&job()).await, Err(PollError::Transient(_))));
            assert!(matches!(slurm.submit("#!/bin/bash\n").await, Err(LaunchError::Spawn { .. })));
            fs::remove_dir_all(bin).unwrap();
        }
    }
}
