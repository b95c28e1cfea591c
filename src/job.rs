//! Job parameters, scheduler job states and the record of a submitted job
//!
//! A JobConfiguration is read from the settings store and handed to the template renderer.
//! Once sbatch accepts the rendered script a SubmittedJob tracks the job until its ParaView
//! server can be reached.

pub mod configuration;
pub mod state;
pub mod submitted;
pub mod time_limit;

pub use configuration::JobConfiguration;
pub use state::JobState;
pub use submitted::{JobId, SubmittedJob};
pub use time_limit::TimeLimit;
