//! # payflow_engine
//!
//! The scheduling half of the payment workflow engine: a system registry
//! with declarative component predicates, the advancement algorithm that
//! picks and dispatches the next step for an entity, and the optimistic
//! write layer that substitutes for transactions in a lock-free store.
//!
//! This crate provides:
//!
//! - [`Ecs`] — the facade unifying store, scheduler, handler dispatch,
//!   defaults, and trace behind one API.
//! - [`Scheduler`] / [`Registry`] — named systems gated by
//!   required/disallowed component predicates, and the circular-scan
//!   advance algorithm.
//! - [`WriteSpec`] / [`Ecs::set_components`] — validate-then-write batches
//!   (compare-and-swap over component state).
//! - [`bookkeeping`] — the `lightningd:systems` component layout and its
//!   copy-on-write field editor.
//! - [`TraceLog`] — bounded ring buffer of dispatched steps.
//!
//! Concurrency model: single-threaded and cooperative. Every store,
//! scheduler, and write-batch operation runs to completion without
//! suspension; consistency comes from that plus the expect-then-write
//! pattern, not from locks.

pub mod bookkeeping;
pub mod error;
pub mod facade;
pub mod registry;
pub mod scheduler;
pub mod trace;
pub mod writes;

pub use error::EcsError;
pub use facade::{Ecs, RegistrationBatch, SystemHandler};
pub use registry::{Registry, SystemDef};
pub use scheduler::{Scheduler, SystemInvoke};
pub use trace::{DEFAULT_TRACE_CAPACITY, TraceLog};
pub use writes::WriteSpec;

pub use payflow_store::{Cell, Entity, Store, json_equal};
