//! HTTP surface of one mirror replica.
//!
//! A replica serves point, batched, full and range reads for the partitions
//! assigned to it and forwards reads for other partitions to their owner,
//! flagging such answers with the cache-update header so clients refresh
//! their routing.

pub mod config;
pub mod handlers;
pub mod server;
pub mod service;
pub mod store;

pub use config::{RangeConfig, ServiceConfig};
pub use server::MirrorServer;
pub use service::{Answer, MirrorService};
pub use store::MirrorStore;
