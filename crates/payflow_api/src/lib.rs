//! # payflow_api
//!
//! The external command surface of the payment workflow engine: each
//! operation from the RPC contract as a JSON request/response handler, plus
//! the [`dispatch`] router the hosting process feeds method/params pairs
//! into. The transport carrying those pairs is out of scope — the hosting
//! process owns it.

pub mod commands;

pub use commands::{CommandError, dispatch};
