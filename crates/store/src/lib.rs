//! In-memory object store for tether.
//!
//! Implements the store client and watch source contracts from
//! `tether-core` with the semantics reconcilers depend on:
//!
//! - resource versions checked on every write
//! - store-assigned names from a `generate_name` prefix
//! - separate spec and status write paths
//! - deletion held back while finalizers remain
//! - per-identity write policy, write audit and fault injection for tests

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod memory;
pub mod traced;

pub use memory::{InMemoryStore, WriteOp, WritePolicy, WriteRecord};
pub use traced::TracingStore;
