//! Task execution engine.
//!
//! Turns a validated task graph into executable tasks and runs them for
//! one request at a time.
//!
//! ## Architecture
//! - `TaskRegistry`: one `Task` instance per configured name
//! - `Executor`: runs tasks, stages and chains with a per-task timeout
//! - `RequestContext`: request parameters plus the per-request memo of
//!   data results
//! - `kinds`: the built-in task implementations
//!
//! ## Flow
//! ```text
//! scene → layer ──bucketizer──▶ experiment → service chain → (rank)
//!                                              │
//!                                              └─ fetch ─▶ feature / algo transform ─▶ source
//! ```

pub mod bucketizer;
pub mod context;
pub mod error;
pub mod executor;
pub mod kinds;
pub mod registry;
pub mod scoring;
pub mod source;
pub mod traits;

// Re-export commonly used types for convenience
pub use bucketizer::{Bucketizer, HashBucketizer, bucket_key, normalize};
pub use context::RequestContext;
pub use error::{TaskError, TaskResult};
pub use executor::{DEFAULT_TASK_TIMEOUT, Executor};
pub use kinds::concat_results;
pub use registry::{TaskRegistry, TaskRegistryBuilder};
pub use source::MemorySource;
pub use traits::{DataSource, Scorer, SourceQuery, Task};
