//! The decision path of the policy agent: the policy store, the per-request
//! cache, the rule matcher, and the evaluator that walks tiers and profiles
//! to an allow/deny verdict.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod evaluator;
pub mod matcher;
pub mod request;
pub mod selector;
pub mod spiffe;
pub mod store;

pub use self::evaluator::{evaluate, AppliedRef, Decision, DenyReason, Verdict};
pub use self::request::RequestCache;
pub use self::selector::Selector;
pub use self::store::{PolicyStore, Snapshot};

/// A label map. Replaced wholesale on update, never mutated in place, so
/// snapshots can share them freely.
pub type Labels = ahash::AHashMap<String, String>;
