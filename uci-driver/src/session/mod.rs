mod actor;
pub mod handle;
pub mod queue;

pub use handle::EngineHandle;
pub use queue::{CommandQueue, Outbox};
