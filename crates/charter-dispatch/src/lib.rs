//! Concurrent dispatch engine for quorum-bounded network fan-out
//!
//! This crate is domain-agnostic: it knows how to sample candidates without
//! replacement ([`reservoir`]), how to keep just enough work in flight to
//! reach a target number of successes ([`factory`]), and how to run a
//! caller-supplied operation concurrently over those candidates until the
//! target, a deadline, or exhaustion ([`pool`]).
//!
//! The policy layer composes these into arrangement proposal and treasure
//! map publication; nothing here mentions either.

pub mod factory;
pub mod pool;
pub mod reservoir;

pub use factory::{AllAtOnceFactory, PrefetchStrategy, ValueFactory};
pub use pool::{DispatchWorker, PoolConfig, PoolError, WorkerPool};
pub use reservoir::{MergedReservoir, Reservoir};
