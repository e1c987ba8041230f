//! Batch accumulation and submission: the flush policy, the scheduler that
//! drains the operation queue into single batch submissions, and the
//! transport seam.

pub mod metrics;
pub mod policy;
pub mod scheduler;
pub mod transport;

pub use policy::{FlushMode, FlushPolicy};
pub use scheduler::BatchScheduler;
pub use transport::BatchTransport;
