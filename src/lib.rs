//! An in-process asynchronous job queue and execution service.
//!
//! Submitted jobs flow Job Store -> Scheduler -> Worker Pool -> Executor,
//! with every state transition mirrored onto the Event Bus. See each
//! module for its specific contract.

pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod executors;
pub mod health;
pub mod job;
pub mod logging;
pub mod queue_manager;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod worker_pool;

pub use config::Config;
pub use error::{AppError, Result};
