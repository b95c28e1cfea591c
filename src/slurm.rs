//! Render job scripts and submit them to SLURM

/// Fill the job script template with job parameters
pub mod template;

/// The scheduler seam: submit, poll, list
pub mod launcher;

/// Scheduler implementation running the SLURM command line tools
pub mod cli;
