pub mod queue;
pub mod runner;
pub mod selection;

pub use queue::{Job, JobQueue, RequeueGuard};
pub use runner::QueueRunner;
pub use selection::SelectionPolicy;
