//! The `Task` trait driving the worker's long-lived control loop.
//!
//! Carried over from the teacher's per-request task dispatch shape, but
//! specialized to a single long-lived `WorkerLoop` implementation (see
//! `crate::worker`) rather than one task per inbound request: spec.md's
//! worker runs exactly one loop for the lifetime of the process.

use chrono::{DateTime, Utc};

pub trait Task: Send + Sync {
    fn created_at(&self) -> &DateTime<Utc>;
    fn id(&self) -> &str;
    fn run(&mut self);
    fn cancel(&self) -> bool;
}
