//! # Task Cortex
//!
//! Concurrent task execution core for a multi-model AI assistant: a
//! rate-limited, priority-ordered worker pool, a cluster dispatcher that
//! routes work between that pool and remote HTTP executors, and a
//! streaming query router built on top of both.
//!
//! ## Layout
//!
//! - [`core`] — the priority worker pool ([`core::worker_pool`]), token
//!   buckets, the task-name registry, and the scheduler error type. This is
//!   the crate's foundation; everything else is built on it.
//! - [`cluster`] — [`cluster::ClusterDispatcher`], which routes a
//!   submission to the local pool or to the least-loaded remote node, and
//!   the wire protocol spoken to remote nodes.
//! - [`router`] — [`router::Router`], the streaming query router: triage,
//!   a fast-model preamble, a per-classification continuation ramp, action
//!   routes, and counsel-mode fan-out.
//! - [`proactive`] — [`proactive::ProactiveScheduler`], a periodic
//!   self-resubmitting background task.
//! - [`external`] — the traits this crate consumes but does not implement
//!   in production: [`external::llm::LLMBackend`],
//!   [`external::memory::MemoryStore`], [`external::focus::FocusManager`].
//! - [`util`] — task ids, priority, and clock helpers shared across the
//!   crate.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use parking_lot::Mutex;
//! use task_cortex::cluster::ClusterDispatcher;
//! use task_cortex::core::registry::TaskRegistry;
//! use task_cortex::core::resource_probe::SysinfoProbe;
//! use task_cortex::core::worker_pool::{PriorityWorkerPool, WorkerPoolConfig};
//! use task_cortex::external::llm::EchoLLMBackend;
//! use task_cortex::router::{Router, RouterConfig};
//! use task_cortex::router::handlers::register_default_handlers;
//!
//! # async fn example() {
//! let registry = Arc::new(TaskRegistry::new());
//! register_default_handlers(&registry, Arc::new(EchoLLMBackend::default()));
//!
//! let mut pool = PriorityWorkerPool::new(WorkerPoolConfig::default(), Arc::new(SysinfoProbe::new()));
//! let results = Arc::new(Mutex::new(HashMap::new()));
//! pool = pool.with_end_callback(ClusterDispatcher::result_sink(Arc::clone(&results)));
//! let pool = Arc::new(pool);
//! pool.start();
//!
//! let dispatcher = Arc::new(ClusterDispatcher::new(pool, registry, results));
//! let router = Router::new(dispatcher, None, None, RouterConfig::default());
//! let stream = router.run("session-1", "what time is it");
//! while let Ok(chunk) = stream.recv_async().await {
//!     print!("{chunk}");
//! }
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Cluster dispatch: routing submissions between the local pool and remote
/// HTTP executors, and the wire protocol spoken to them.
pub mod cluster;
/// Serde-validated configuration for a whole deployment.
pub mod config;
/// Core scheduling: the priority worker pool, token buckets, and the
/// task-name registry.
pub mod core;
/// Traits this crate consumes but does not implement in production:
/// model inference, memory, and focus.
pub mod external;
/// The periodic self-resubmitting background task.
pub mod proactive;
/// The streaming query router built atop `core`/`cluster`.
pub mod router;
/// Shared utilities: task ids, priority, and clock helpers.
pub mod util;
