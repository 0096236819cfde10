#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
#![warn(
    missing_docs,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::missing_errors_doc
)]

pub mod error;
mod factory;
mod lease;
mod metrics;
mod pool;

pub use crate::{
    error::Error,
    factory::ResourceFactory,
    lease::Lease,
    metrics::PoolState,
    pool::{PoolBuilder, ResourcePool},
};
