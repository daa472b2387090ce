#[macro_use]
extern crate tracing;

pub mod auto_update;
pub mod config;
pub mod container_runtime;
pub mod engine_task;
pub mod executor;
pub mod job;
pub mod logging;
pub mod object_storage;
pub mod registry;
pub mod reporter;
pub mod results;
pub mod secrets;
pub mod supervisor;
pub mod worker;
