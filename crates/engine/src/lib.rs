pub mod metrics;
pub mod process;
pub mod queue;
pub mod scheduler;

pub use metrics::EngineMetrics;
pub use process::{LocalProcess, LocalProcessFactory};
pub use queue::Queue;
pub use scheduler::{LocalScheduler, ADAPTOR_NAME};
