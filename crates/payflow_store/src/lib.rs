//! # payflow_store
//!
//! The entity/component data store underneath the payment workflow engine.
//!
//! This crate provides:
//!
//! - [`Entity`] — lightweight `u32` entity identifiers.
//! - [`EntityAllocator`] — monotonically increasing ID allocator.
//! - [`Store`] — the entity/component table; components are JSON documents
//!   kept as canonical text plus parsed structure ([`Cell`]).
//! - [`json_equal`] — structural JSON comparison for the optimistic write
//!   layer.
//!
//! The store is a pure data structure: it knows nothing about systems or
//! scheduling, and is owned and driven by the engine crate.

pub mod compare;
pub mod entity;
pub mod store;

pub use compare::json_equal;
pub use entity::{Entity, EntityAllocator};
pub use store::{Cell, Store};
