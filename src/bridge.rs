//! Find the ParaView server of a running job and describe how to connect to it
//!
//! pvserver announces itself on stdout with either of
//!
//! ```text
//! Connection URL: cs://node042:11111
//! Accepting connection(s): node042:11111
//! ```
//!
//! The first such line in the job's stdout file is the connection target. A line with one of
//! these prefixes but no usable host and port is an error.

use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;
use url::Url;

use crate::error::ConnectionError;
use crate::job::SubmittedJob;

const URL_PREFIX: &str = "Connection URL:";
const ACCEPTING_PREFIX: &str = "Accepting connection(s):";

/// Where a visualization client connects to
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub url: Url,
}

impl ConnectionTarget {
    pub fn new(host: &str, port: u16) -> Result<ConnectionTarget, ConnectionError> {
        let malformed = || ConnectionError::Malformed(format!("{host}:{port}"));
        if host.is_empty() || port == 0 {
            return Err(malformed());
        }
        let url = Url::parse(&format!("cs://{host}:{port}")).map_err(|_| malformed())?;
        Ok(ConnectionTarget { host: host.to_string(), port, url })
    }
}

/// Connection target announced on one line of job output, None if the line isn't one
pub fn parse_connection_line(line: &str) -> Option<Result<ConnectionTarget, ConnectionError>> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(URL_PREFIX) {
        return Some(parse_url(rest.trim()).ok_or_else(|| ConnectionError::Malformed(line.to_string())));
    }
    if let Some(rest) = line.strip_prefix(ACCEPTING_PREFIX) {
        return Some(parse_host_port(rest.trim()).ok_or_else(|| ConnectionError::Malformed(line.to_string())));
    }
    None
}

fn parse_url(text: &str) -> Option<ConnectionTarget> {
    let url = Url::parse(text).ok()?;
    match url.scheme() {
        "cs" | "csrc" => ConnectionTarget::new(url.host_str()?, url.port()?).ok(),
        _ => None,
    }
}

fn parse_host_port(text: &str) -> Option<ConnectionTarget> {
    let (host, port) = text.rsplit_once(':')?;
    ConnectionTarget::new(host, port.parse().ok()?).ok()
}

/// First connection line of some job output
pub fn find_connection(output: &str) -> Result<Option<ConnectionTarget>, ConnectionError> {
    output
        .lines()
        .find_map(parse_connection_line)
        .transpose()
}

/// Expand the filename patterns sbatch understands in `--output` paths
///
/// `%j` job id, `%x` job name, `%u` user name and `%%`. Anything else is left alone.
pub fn expand_output_path(pattern: &Path, job: &SubmittedJob, user: &str) -> PathBuf {
    let pattern = pattern.to_string_lossy();
    let mut expanded = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            expanded.push(c);
            continue;
        }
        match chars.next() {
            Some('j') => expanded.push_str(job.id.as_str()),
            Some('x') => expanded.push_str(&job.name),
            Some('u') => expanded.push_str(user),
            Some('%') => expanded.push('%'),
            Some(other) => {
                expanded.push('%');
                expanded.push(other);
            }
            None => expanded.push('%'),
        }
    }
    PathBuf::from(expanded)
}

/// Watches the stdout file of one job for its connection line
pub struct Bridge {
    path: PathBuf,
    attempts: u32,
    max_attempts: u32,
}

impl Bridge {
    pub fn new(stdout_pattern: &Path, job: &SubmittedJob, max_attempts: u32) -> Bridge {
        let user = env::var("USER").unwrap_or_default();
        let path = expand_output_path(stdout_pattern, job, &user);
        info!("Job {} output expected in {}", job.id, path.display());
        Bridge { path, attempts: 0, max_attempts }
    }

    /// Look for the connection line once
    ///
    /// A missing file counts as a miss: the job may not have written anything yet. The last
    /// allowed miss fails with [ConnectionError::Unreachable].
    pub async fn probe(&mut self) -> Result<Option<ConnectionTarget>, ConnectionError> {
        self.attempts += 1;
        let output = match tokio::fs::read_to_string(&self.path).await {
            Ok(output) => output,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(ConnectionError::Output { path: self.path.display().to_string(), source })
            }
        };

        if let Some(target) = find_connection(&output)? {
            info!("ParaView server is listening on {}", target.url);
            return Ok(Some(target));
        }
        debug!("No connection line in {} ({}/{})", self.path.display(), self.attempts, self.max_attempts);
        match self.attempts >= self.max_attempts {
            true => Err(ConnectionError::Unreachable {
                path: self.path.display().to_string(),
                attempts: self.attempts,
            }),
            false => Ok(None),
        }
    }
}
