//! Configure and launch a ParaView server on a Slurm cluster, then connect to it
//!
//! Job parameters live in a schema-validated settings store, get rendered into a submission
//! script and are submitted with sbatch. A poller follows the job until the server prints its
//! connection URL.

use std::path::PathBuf;

/// Persistent settings storage
pub mod db;
pub mod error;
pub mod job;
pub mod settings;
/// Render submission scripts and talk to the SLURM scheduler
pub mod slurm;
pub mod bridge;
pub mod panel;
pub mod trame;
pub mod format;

/// Directory holding the settings database and launcher state
pub struct WorkingDirectory {
    pub path: PathBuf,
}
