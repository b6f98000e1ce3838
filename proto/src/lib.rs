//! Hand-maintained prost bindings for the two wire contracts the agent
//! participates in: the proxy's external-authorization check and the
//! control-plane policy-sync stream.
//!
//! The message/field numbering mirrors the protocols as deployed; these types
//! must stay wire-compatible, so fields are only ever added, never renumbered.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod authz;
pub mod sync;
