//! Worker system: queued work execution with checkpointing.
//!
//! Core components:
//! - `task`: WorkItem, its action thunk and serializable summary
//! - `state`: WorkStatus machine (Pending → Running → Completed/Failed)
//! - `manager`: TaskManager: pending queue, running map, completed log
//! - `pool`: WorkerPool: N cooperative workers draining the manager
//! - `checkpoint`: periodic snapshots to a durable sink

pub mod checkpoint;
pub mod manager;
pub mod pool;
pub mod state;
pub mod task;

pub use checkpoint::{CheckpointSink, FileSink, MemorySink, spawn_checkpoint_writer};
pub use manager::{TaskCounts, TaskManager, TaskSnapshot};
pub use pool::WorkerPool;
pub use state::{WorkStatus, WorkerPhase};
pub use task::{ClaimedWork, WorkItem, WorkOutcome, WorkSummary};
