/// Wall-clock helpers used for deadlines, delays, and audit timestamps.
pub mod clock;
/// Shared identifier and value types (task ids, priorities, resource costs).
pub mod ids;
/// Tracing/telemetry bootstrap.
pub mod telemetry;

pub use clock::now_ms;
pub use ids::{Priority, TaskId, TaskIdGenerator};
pub use telemetry::init_tracing;
