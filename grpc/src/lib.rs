//! The transport-facing pieces of the policy agent: the authorization check
//! handler and the policy-sync dispatcher. The gRPC transport itself is
//! mounted by the process bootstrap; everything here is transport-agnostic
//! apart from the status codes it emits.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod check;
pub mod metrics;
pub mod sync;

pub use self::check::CheckService;
pub use self::metrics::Metrics;
pub use self::sync::{Dispatcher, SyncClient};
