pub mod config;
pub mod error;
pub mod job;
pub mod process;
pub mod scheduler;
pub mod status;

pub use config::EngineConfig;
pub use error::*;
pub use job::{Job, JobDescription, JobId};
pub use process::{InteractiveProcess, ProcessFactory, Streams};
pub use scheduler::Scheduler;
pub use status::{JobState, JobStatus, QueuePolicy, QueueStatus};
