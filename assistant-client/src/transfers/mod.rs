pub mod admission;
pub mod pipeline;
pub mod queue;
pub mod scheduler;

pub use admission::{media_type_for_path, AdmissionPolicy, FileSubmission};
pub use queue::TransferQueue;
pub use scheduler::{SchedulerConfig, TransferScheduler};
