//! Policy enactment orchestration
//!
//! A [`Policy`] is an access-delegation edict: a publisher grants a
//! recipient re-encryption capability over a labeled resource, backed by
//! `n` key-fragment shares held by independent peers. Enacting a policy
//! means soliciting arrangements from candidate peers until exactly `n`
//! accept, executing any kind-specific side effects (on-chain payment for
//! the paid kind), building and encrypting the treasure map, and publishing
//! it to a wider peer set with early release once a minority quorum
//! acknowledges delivery.
//!
//! The heavy lifting lives in `charter-dispatch`; this crate wires the
//! domain semantics onto it.

pub mod arrangement;
pub mod networking;
pub mod policy;
pub mod publisher;
pub mod revocation;
pub mod selection;

pub use arrangement::{AcceptedArrangement, Arrangement};
pub use policy::{
    EnactedPolicy, EnactmentOptions, PaidTerms, Policy, PolicyContext, PolicyKind,
    ProposalConfig, Share,
};
pub use publisher::{PublicationConfig, TreasureMapPublisher};
pub use revocation::{Revocation, RevocationKit};
