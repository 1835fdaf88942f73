//! In-process result store and result distribution for analysis jobs.
//!
//! [`ResultStore`] holds per-frame analysis output and the hot processing
//! status for every running job; [`distributor`] layers the pull/push
//! delivery protocol on top of it.

pub mod distributor;
mod store;

pub use store::{ResultStore, StoreError};
